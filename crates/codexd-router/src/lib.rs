//! Inbound HTTP surface: the OpenAI-compatible proxy endpoints, the
//! OAuth login boundary, and account management.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::routing::{delete, get, post};

use codexd_core::Engine;

mod admin;
mod oauth;
mod proxy;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub http: reqwest::Client,
    pub issuer: String,
    pub client_id: String,
    /// Where the provider sends the browser back, e.g.
    /// `http://127.0.0.1:1455/auth/callback`.
    pub redirect_uri: String,
    pending_logins: Arc<Mutex<HashMap<String, oauth::PendingLogin>>>,
}

impl AppState {
    pub fn new(
        engine: Arc<Engine>,
        http: reqwest::Client,
        issuer: String,
        client_id: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            engine,
            http,
            issuer,
            client_id,
            redirect_uri,
            pending_logins: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pending_logins(&self) -> std::sync::MutexGuard<'_, HashMap<String, oauth::PendingLogin>> {
        self.pending_logins
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models", get(proxy::list_models))
        .route("/v1/responses", post(proxy::responses))
        .route("/v1/chat/completions", post(proxy::chat_completions))
        .route("/v1/completions", post(proxy::completions))
        .route("/oauth/start", get(oauth::start))
        .route("/auth/callback", get(oauth::callback))
        .route("/accounts", get(admin::list))
        .route("/accounts/import", post(admin::import))
        .route("/accounts/relay", post(admin::add_relay))
        .route("/accounts/{id}", delete(admin::remove))
        .route("/accounts/{id}/refresh", post(admin::force_refresh))
        .route("/accounts/{id}/disable", post(admin::disable))
        .route("/accounts/{id}/enable", post(admin::enable))
        .route("/accounts/{id}/activate", post(admin::activate))
        .fallback(proxy::fallthrough)
        .with_state(state)
}
