//! Account management endpoints: thin wrappers around the store,
//! selector, and refresher.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::info;

use codexd_accounts::account::TokenGrant;
use codexd_accounts::{Account, clock, lifecycle};

use crate::AppState;

pub(crate) async fn list(State(state): State<AppState>) -> Json<JsonValue> {
    let (accounts, cursor) = state.engine.store().snapshot().await;
    let now = clock::now_ts();
    let cursor = if accounts.is_empty() {
        0
    } else {
        cursor % accounts.len()
    };
    let data: Vec<JsonValue> = accounts
        .iter()
        .enumerate()
        .map(|(index, account)| account_view(account, now, index == cursor))
        .collect();
    Json(json!({ "accounts": data, "active_index": cursor }))
}

pub(crate) async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.store().remove(&id).await {
        Ok(true) => {
            info!(account = %id, "account deleted");
            Json(json!({ "ok": true })).into_response()
        }
        Ok(false) => not_found(),
        Err(err) => store_error(err),
    }
}

pub(crate) async fn force_refresh(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.engine.store().get(&id).await.is_none() {
        return not_found();
    }
    match state.engine.refresher().refresh(&id).await {
        Ok(Some(account)) => {
            let now = clock::now_ts();
            Json(json!({ "ok": true, "account": account_view(&account, now, false) }))
                .into_response()
        }
        Ok(None) => Json(json!({ "ok": false })).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) async fn disable(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    set_disabled(&state, &id, true).await
}

pub(crate) async fn enable(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    set_disabled(&state, &id, false).await
}

pub(crate) async fn activate(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let accounts = state.engine.store().read_accounts().await;
    let Some(index) = accounts.iter().position(|account| account.id == id) else {
        return not_found();
    };
    match state.engine.selector().set(index).await {
        Ok(()) => {
            info!(account = %id, index, "account activated");
            Json(json!({ "ok": true, "active_index": index })).into_response()
        }
        Err(err) => store_error(err),
    }
}

/// Import an externally obtained token set (same shape as the OAuth
/// callback consumes).
pub(crate) async fn import(
    State(state): State<AppState>,
    Json(grant): Json<TokenGrant>,
) -> Response {
    let account = Account::from_token_grant(grant, clock::now_ts());
    let id = account.id.clone();
    match state.engine.store().insert(account).await {
        Ok(()) => {
            info!(account = %id, "account imported");
            (StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))).into_response()
        }
        Err(err) => store_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RelayBody {
    name: String,
    base_url: String,
    api_key: String,
}

pub(crate) async fn add_relay(
    State(state): State<AppState>,
    Json(body): Json<RelayBody>,
) -> Response {
    let account = Account::relay(body.name, body.base_url, body.api_key, clock::now_ts());
    let id = account.id.clone();
    match state.engine.store().insert(account).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))).into_response(),
        Err(err) => store_error(err),
    }
}

async fn set_disabled(state: &AppState, id: &str, disabled: bool) -> Response {
    match state
        .engine
        .store()
        .update(id, |account| account.disabled = disabled)
        .await
    {
        Ok(Some(account)) => {
            let now = clock::now_ts();
            Json(json!({ "ok": true, "account": account_view(&account, now, false) }))
                .into_response()
        }
        Ok(None) => not_found(),
        Err(err) => store_error(err),
    }
}

fn account_view(account: &Account, now: i64, selected: bool) -> JsonValue {
    json!({
        "id": account.id,
        "kind": if account.is_relay() { "relay" } else { "oauth" },
        "label": account.label(),
        "email": account.email(),
        "status": lifecycle::status_label(account, now),
        "state": lifecycle::state_label(account, now, selected),
        "active": selected,
        "disabled": account.disabled,
        "fail_count": account.fail_count,
        "last_error_code": account.last_error_code,
        "created_at": account.created_at,
        "last_used": account.last_used,
        "cooldown_until": account.cooldown_until,
        "expire": account.expire(),
    })
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

fn store_error(err: codexd_accounts::StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}
