use std::sync::Arc;

use codexd_accounts::account::{Account, AccountAuth};
use codexd_accounts::{Selector, Store};

fn account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        auth: AccountAuth::Oauth {
            access_token: format!("tok-{id}"),
            refresh_token: None,
            id_token: None,
            account_id: None,
            email: None,
            expire: Some(4_000_000_000),
            last_refresh: None,
        },
        created_at: 1,
        last_used: None,
        disabled: false,
        fail_count: 0,
        last_error_code: None,
        cooldown_until: None,
    }
}

async fn pool(dir: &std::path::Path, accounts: &[Account], cursor: usize) -> (Arc<Store>, Selector) {
    let store = Arc::new(Store::new(dir));
    store.write_accounts(accounts).await.unwrap();
    store.write_cursor(cursor).await.unwrap();
    let selector = Selector::new(store.clone());
    (store, selector)
}

#[tokio::test]
async fn empty_pool_selects_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (_, selector) = pool(dir.path(), &[], 0).await;
    assert!(selector.select().await.unwrap().is_none());
    assert!(selector.advance().await.unwrap().is_none());
}

#[tokio::test]
async fn sticky_on_healthy_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let (store, selector) = pool(
        dir.path(),
        &[account("a"), account("b"), account("c")],
        1,
    )
    .await;

    let picked = selector.select().await.unwrap().unwrap();
    assert_eq!(picked.id, "b");
    assert_eq!(store.read_cursor().await, 1);

    // Repeated selects keep returning the same account.
    let picked = selector.select().await.unwrap().unwrap();
    assert_eq!(picked.id, "b");
    assert_eq!(store.read_cursor().await, 1);
}

#[tokio::test]
async fn select_skips_unusable_cursor_and_moves_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut frozen = account("a");
    frozen.disabled = true;
    let (store, selector) = pool(dir.path(), &[frozen, account("b"), account("c")], 0).await;

    let picked = selector.select().await.unwrap().unwrap();
    assert_eq!(picked.id, "b");
    assert_eq!(store.read_cursor().await, 1);
}

#[tokio::test]
async fn select_marks_last_used() {
    let dir = tempfile::tempdir().unwrap();
    let (store, selector) = pool(dir.path(), &[account("a")], 0).await;
    selector.select().await.unwrap().unwrap();
    let accounts = store.read_accounts().await;
    assert!(accounts[0].last_used.is_some());
}

#[tokio::test]
async fn select_returns_some_usable_member_if_any_exists() {
    let dir = tempfile::tempdir().unwrap();
    let mut cooling = account("a");
    cooling.cooldown_until = Some(4_000_000_000);
    let mut expired = account("b");
    expired.auth = AccountAuth::Oauth {
        access_token: "t".into(),
        refresh_token: None,
        id_token: None,
        account_id: None,
        email: None,
        expire: Some(1),
        last_refresh: None,
    };
    let (_, selector) = pool(dir.path(), &[cooling, expired, account("c")], 0).await;

    let picked = selector.select().await.unwrap().unwrap();
    assert_eq!(picked.id, "c");
}

#[tokio::test]
async fn nothing_usable_selects_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut a = account("a");
    a.disabled = true;
    let mut b = account("b");
    b.cooldown_until = Some(4_000_000_000);
    let (store, selector) = pool(dir.path(), &[a, b], 0).await;

    assert!(selector.select().await.unwrap().is_none());
    // A failed scan leaves the cursor where it was.
    assert_eq!(store.read_cursor().await, 0);
}

#[tokio::test]
async fn advance_always_moves_past_the_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let (store, selector) = pool(
        dir.path(),
        &[account("a"), account("b"), account("c")],
        0,
    )
    .await;

    let picked = selector.advance().await.unwrap().unwrap();
    assert_eq!(picked.id, "b");
    assert_eq!(store.read_cursor().await, 1);

    let picked = selector.advance().await.unwrap().unwrap();
    assert_eq!(picked.id, "c");
    assert_eq!(store.read_cursor().await, 2);

    // Wraps around.
    let picked = selector.advance().await.unwrap().unwrap();
    assert_eq!(picked.id, "a");
    assert_eq!(store.read_cursor().await, 0);
}

#[tokio::test]
async fn advance_can_land_back_on_the_only_usable_account() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = account("b");
    b.disabled = true;
    let (store, selector) = pool(dir.path(), &[account("a"), b], 0).await;

    let picked = selector.advance().await.unwrap().unwrap();
    assert_eq!(picked.id, "a");
    assert_eq!(store.read_cursor().await, 0);
}

#[tokio::test]
async fn set_points_the_cursor_directly() {
    let dir = tempfile::tempdir().unwrap();
    let (store, selector) = pool(
        dir.path(),
        &[account("a"), account("b"), account("c")],
        0,
    )
    .await;
    selector.set(2).await.unwrap();
    assert_eq!(store.read_cursor().await, 2);
    let picked = selector.select().await.unwrap().unwrap();
    assert_eq!(picked.id, "c");
}

#[tokio::test]
async fn out_of_range_cursor_wraps() {
    let dir = tempfile::tempdir().unwrap();
    let (_, selector) = pool(dir.path(), &[account("a"), account("b")], 9).await;
    // 9 % 2 == 1
    let picked = selector.select().await.unwrap().unwrap();
    assert_eq!(picked.id, "b");
}
