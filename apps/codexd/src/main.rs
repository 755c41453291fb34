use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use codexd_accounts::{Refresher, Selector, Store, sweep};
use codexd_core::{Engine, HttpUpstreamClient};
use codexd_router::AppState;

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codexd=info")),
        )
        .init();

    let mut patch = config::ConfigPatch::from_env();
    patch.overlay(config::ConfigPatch::from_args(std::env::args().skip(1))?);
    let config = patch.into_config();

    let http = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let store = Arc::new(Store::new(&config.data_dir));
    let refresher = Arc::new(Refresher::new(
        store.clone(),
        http.clone(),
        &config.issuer,
        codexd_core::OAUTH_CLIENT_ID,
    ));
    let engine = Arc::new(Engine::new(
        store.clone(),
        Selector::new(store.clone()),
        refresher.clone(),
        Arc::new(HttpUpstreamClient::new(http.clone())),
        config.upstream_base.clone(),
    ));

    let sweeper = sweep::spawn(store, refresher);

    let state = AppState::new(
        engine,
        http,
        config.issuer.clone(),
        codexd_core::OAUTH_CLIENT_ID.to_string(),
        config.redirect_uri(),
    );
    let app = codexd_router::router(state);

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, data_dir = %config.data_dir.display(), "codexd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
