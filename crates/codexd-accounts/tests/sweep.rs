use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::routing::post;
use codexd_accounts::account::{Account, AccountAuth};
use codexd_accounts::clock::now_ts;
use codexd_accounts::{Refresher, Store, sweep};

async fn spawn_issuer() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new()
        .route(
            "/oauth/token",
            post(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                axum::Json(serde_json::json!({
                    "access_token": "fresh",
                    "expires_in": 3600,
                }))
            }),
        )
        .with_state(counter);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

fn near_expiry_account(id: &str, expire: i64) -> Account {
    Account {
        id: id.to_string(),
        auth: AccountAuth::Oauth {
            access_token: "stale".into(),
            refresh_token: Some("ref".into()),
            id_token: None,
            account_id: None,
            email: None,
            expire: Some(expire),
            last_refresh: None,
        },
        created_at: 0,
        last_used: None,
        disabled: false,
        fail_count: 0,
        last_error_code: None,
        cooldown_until: None,
    }
}

#[tokio::test]
async fn sweep_refreshes_near_expiry_then_leaves_it_alone() {
    let (issuer, hits) = spawn_issuer().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()));
    let now = now_ts();
    store
        .write_accounts(&[near_expiry_account("soon", now + 5 * 60)])
        .await
        .unwrap();
    let refresher = Arc::new(Refresher::new(
        store.clone(),
        reqwest::Client::new(),
        &issuer,
        "client",
    ));

    sweep::run_once(&store, &refresher).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let refreshed = store.get("soon").await.unwrap();
    assert!(refreshed.expire().unwrap() > now + 10 * 60);

    // Next tick: expiry is far out again, nothing to do.
    sweep::run_once(&store, &refresher).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sweep_skips_disabled_accounts() {
    let (issuer, hits) = spawn_issuer().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()));
    let mut disabled = near_expiry_account("off", now_ts() + 60);
    disabled.disabled = true;
    store.write_accounts(&[disabled]).await.unwrap();
    let refresher = Arc::new(Refresher::new(
        store.clone(),
        reqwest::Client::new(),
        &issuer,
        "client",
    ));

    sweep::run_once(&store, &refresher).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
