use codexd_accounts::account::{Account, AccountAuth};
use codexd_accounts::Store;

fn account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        auth: AccountAuth::Oauth {
            access_token: format!("tok-{id}"),
            refresh_token: Some(format!("ref-{id}")),
            id_token: None,
            account_id: None,
            email: Some(format!("{id}@example.com")),
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

#[tokio::test]
async fn missing_files_read_as_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    assert!(store.read_accounts().await.is_empty());
    assert_eq!(store.read_cursor().await, 0);
}

#[tokio::test]
async fn accounts_round_trip_pretty_printed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store
        .write_accounts(&[account("a"), account("b")])
        .await
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("accounts.json")).unwrap();
    assert!(raw.contains("\n  {"), "expected 2-space indented output");
    assert!(raw.contains("\"kind\": \"oauth\""));

    let accounts = store.read_accounts().await;
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].id, "a");
    assert_eq!(accounts[1].id, "b");
}

#[tokio::test]
async fn cursor_is_plain_decimal_text() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.write_cursor(7).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("active_index")).unwrap(),
        "7"
    );
    assert_eq!(store.read_cursor().await, 7);
}

#[tokio::test]
async fn garbled_files_degrade_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("accounts.json"), b"{not json").unwrap();
    std::fs::write(dir.path().join("active_index"), b"zebra").unwrap();
    let store = Store::new(dir.path());
    assert!(store.read_accounts().await.is_empty());
    assert_eq!(store.read_cursor().await, 0);
}

#[tokio::test]
async fn update_mutates_one_account_and_skips_missing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store
        .write_accounts(&[account("a"), account("b")])
        .await
        .unwrap();

    let updated = store
        .update("b", |a| a.fail_count = 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.fail_count, 3);

    assert!(store.update("nope", |a| a.fail_count = 9).await.unwrap().is_none());

    let accounts = store.read_accounts().await;
    assert_eq!(accounts[0].fail_count, 0);
    assert_eq!(accounts[1].fail_count, 3);
}

#[tokio::test]
async fn remove_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store
        .write_accounts(&[account("a"), account("b")])
        .await
        .unwrap();
    assert!(store.remove("a").await.unwrap());
    assert!(!store.remove("a").await.unwrap());
    let accounts = store.read_accounts().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, "b");
}

#[tokio::test]
async fn stray_temp_file_never_shadows_committed_state() {
    // Simulates a crash after the temp write but before the rename:
    // the target keeps its prior content and the temp file is ignored.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.write_accounts(&[account("a")]).await.unwrap();

    std::fs::write(dir.path().join("accounts.tmp"), b"half-written garbage").unwrap();

    let accounts = store.read_accounts().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, "a");

    // The next successful write replaces the target atomically.
    store
        .write_accounts(&[account("a"), account("b")])
        .await
        .unwrap();
    assert_eq!(store.read_accounts().await.len(), 2);
}

#[tokio::test]
async fn insert_replaces_on_duplicate_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.insert(account("a")).await.unwrap();
    let mut replacement = account("a");
    replacement.disabled = true;
    store.insert(replacement).await.unwrap();

    let accounts = store.read_accounts().await;
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].disabled);
}
