//! OAuth login boundary: PKCE start and code-exchange callback.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use sha2::Digest;
use tracing::info;

use codexd_accounts::account::TokenGrant;
use codexd_accounts::{Account, clock};

use crate::AppState;

const OAUTH_SCOPE: &str = "openid email profile offline_access";
const LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

pub(crate) struct PendingLogin {
    pub code_verifier: String,
    pub created_at: Instant,
}

pub(crate) async fn start(State(state): State<AppState>) -> Response {
    let code_verifier = random_token();
    let code_challenge = s256_challenge(&code_verifier);
    let login_state = random_token();

    {
        let mut pending = state.pending_logins();
        prune(&mut pending);
        pending.insert(
            login_state.clone(),
            PendingLogin {
                code_verifier,
                created_at: Instant::now(),
            },
        );
    }

    let query = [
        ("response_type", "code"),
        ("client_id", state.client_id.as_str()),
        ("redirect_uri", state.redirect_uri.as_str()),
        ("scope", OAUTH_SCOPE),
        ("code_challenge", code_challenge.as_str()),
        ("code_challenge_method", "S256"),
        ("id_token_add_organizations", "true"),
        ("codex_cli_simplified_flow", "true"),
        ("state", login_state.as_str()),
    ]
    .iter()
    .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
    .collect::<Vec<_>>()
    .join("&");

    let url = format!(
        "{}/oauth/authorize?{query}",
        state.issuer.trim_end_matches('/')
    );
    Redirect::temporary(&url).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub(crate) async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or(error);
        return bad_request(&detail);
    }
    let (Some(code), Some(login_state)) = (query.code, query.state) else {
        return bad_request("missing code or state");
    };

    let verifier = {
        let mut pending = state.pending_logins();
        prune(&mut pending);
        pending.remove(&login_state).map(|login| login.code_verifier)
    };
    let Some(code_verifier) = verifier else {
        return bad_request("unknown or expired state");
    };

    let grant = match exchange_code(&state, &code, &code_verifier).await {
        Ok(grant) => grant,
        Err(detail) => return bad_request(&detail),
    };

    let account = Account::from_token_grant(grant, clock::now_ts());
    let summary = json!({
        "ok": true,
        "id": account.id,
        "email": account.email(),
    });
    if let Err(err) = state.engine.store().insert(account).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response();
    }
    info!("oauth login stored new account");
    Json(summary).into_response()
}

async fn exchange_code(
    state: &AppState,
    code: &str,
    code_verifier: &str,
) -> Result<TokenGrant, String> {
    let body = format!(
        "grant_type=authorization_code&code={}&redirect_uri={}&client_id={}&code_verifier={}",
        urlencoding::encode(code),
        urlencoding::encode(&state.redirect_uri),
        urlencoding::encode(&state.client_id),
        urlencoding::encode(code_verifier),
    );
    let resp = state
        .http
        .post(format!(
            "{}/oauth/token",
            state.issuer.trim_end_matches('/')
        ))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|err| err.to_string())?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("token exchange failed: {status} {text}"));
    }
    resp.json::<TokenGrant>().await.map_err(|err| err.to_string())
}

fn bad_request(detail: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": detail }))).into_response()
}

fn prune(pending: &mut HashMap<String, PendingLogin>) {
    let now = Instant::now();
    pending.retain(|_, login| now.duration_since(login.created_at) <= LOGIN_TTL);
}

fn random_token() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(code_verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_urlsafe_sha256_of_verifier() {
        // RFC 7636 appendix B vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            s256_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn random_tokens_are_unique_and_urlsafe() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }
}
