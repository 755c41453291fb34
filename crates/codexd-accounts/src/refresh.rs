//! Token refresh against the OAuth issuer, single-flight per account.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::account::{Account, AccountAuth, TokenGrant};
use crate::clock;
use crate::lifecycle;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone)]
pub struct IdTokenClaims {
    pub email: Option<String>,
    pub account_id: Option<String>,
}

pub struct Refresher {
    store: Arc<Store>,
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    in_flight: Mutex<HashSet<String>>,
}

impl Refresher {
    pub fn new(store: Arc<Store>, http: reqwest::Client, issuer: &str, client_id: &str) -> Self {
        Self {
            store,
            http,
            token_url: format!("{}/oauth/token", issuer.trim_end_matches('/')),
            client_id: client_id.to_string(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Refresh one account's credentials. Returns the renewed account,
    /// or `None` when the account cannot refresh (relay, no refresh
    /// token, another refresh already in flight) or the issuer said no.
    pub async fn refresh(&self, id: &str) -> Result<Option<Account>, RefreshError> {
        let Some(account) = self.store.get(id).await else {
            return Ok(None);
        };
        let Some(refresh_token) = account.refresh_token().map(str::to_string) else {
            return Ok(None);
        };
        let Some(_guard) = InFlightGuard::begin(self, id) else {
            debug!(account = %id, "refresh already in flight");
            return Ok(None);
        };

        let body = format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}",
            urlencoding::encode(&refresh_token),
            urlencoding::encode(&self.client_id),
        );
        let resp = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let now = clock::now_ts();

        if !(200..300).contains(&status) {
            warn!(account = %id, status, "token refresh rejected");
            self.store
                .update(id, |a| apply_refresh_failure(a, status, now))
                .await?;
            return Ok(None);
        }

        let grant: TokenGrant = resp.json().await?;
        let renewed = self
            .store
            .update(id, |a| apply_token_grant(a, &grant, now))
            .await?;
        debug!(account = %id, "token refresh ok");
        Ok(renewed)
    }
}

struct InFlightGuard<'a> {
    refresher: &'a Refresher,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn begin(refresher: &'a Refresher, id: &str) -> Option<Self> {
        let mut set = refresher.in_flight.lock().ok()?;
        if !set.insert(id.to_string()) {
            return None;
        }
        Some(Self {
            refresher,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.refresher.in_flight.lock() {
            set.remove(&self.id);
        }
    }
}

/// Fold a successful token grant into the account: new credentials,
/// fresh expiry, failure state cleared.
pub fn apply_token_grant(account: &mut Account, grant: &TokenGrant, now: i64) {
    let AccountAuth::Oauth {
        access_token,
        refresh_token,
        id_token,
        account_id,
        email,
        expire,
        last_refresh,
    } = &mut account.auth
    else {
        return;
    };
    *access_token = grant.access_token.clone();
    if grant.refresh_token.is_some() {
        *refresh_token = grant.refresh_token.clone();
    }
    if let Some(token) = &grant.id_token {
        *id_token = Some(token.clone());
        let claims = decode_id_token_claims(token);
        if claims.email.is_some() {
            *email = claims.email;
        }
        if claims.account_id.is_some() {
            *account_id = claims.account_id;
        }
    }
    *expire = grant.expires_in.map(|secs| now + secs);
    *last_refresh = Some(now);
    account.fail_count = 0;
    account.last_error_code = None;
    account.cooldown_until = None;
}

/// Record a refresh rejection: bump counters and apply the refresh-path
/// cooldown schedule.
pub fn apply_refresh_failure(account: &mut Account, status: u16, now: i64) {
    if let Some(cooldown) = lifecycle::refresh_cooldown(status, account.fail_count) {
        account.cooldown_until = Some(now + cooldown.as_secs() as i64);
    }
    account.fail_count += 1;
    account.last_error_code = Some(status);
}

/// Best-effort JWT payload decode; no signature verification. Email may
/// be top-level or under the profile claim, the workspace account id
/// lives under the auth claim.
pub fn decode_id_token_claims(id_token: &str) -> IdTokenClaims {
    let mut claims = IdTokenClaims::default();
    let Some(payload_b64) = id_token.split('.').nth(1).filter(|p| !p.is_empty()) else {
        return claims;
    };
    let Ok(payload) = URL_SAFE_NO_PAD.decode(payload_b64) else {
        return claims;
    };
    let Ok(value) = serde_json::from_slice::<JsonValue>(&payload) else {
        return claims;
    };

    claims.email = value
        .get("email")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            value
                .get("https://api.openai.com/profile")
                .and_then(|profile| profile.get("email"))
                .and_then(JsonValue::as_str)
        })
        .map(str::to_string);
    claims.account_id = value
        .get("https://api.openai.com/auth")
        .and_then(|auth| auth.get("chatgpt_account_id"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::TokenGrant;

    fn oauth_account() -> Account {
        Account::from_token_grant(
            TokenGrant {
                access_token: "old".into(),
                refresh_token: Some("ref".into()),
                id_token: None,
                expires_in: Some(100),
            },
            0,
        )
    }

    fn encode_id_token(payload: serde_json::Value) -> String {
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        format!("h.{body}.s")
    }

    #[test]
    fn grant_clears_failure_state() {
        let mut account = oauth_account();
        account.fail_count = 4;
        account.last_error_code = Some(429);
        account.cooldown_until = Some(9_999);

        apply_token_grant(
            &mut account,
            &TokenGrant {
                access_token: "new".into(),
                refresh_token: None,
                id_token: None,
                expires_in: Some(3600),
            },
            1_000,
        );

        assert_eq!(account.bearer_token(), "new");
        assert_eq!(account.refresh_token(), Some("ref"));
        assert_eq!(account.expire(), Some(4_600));
        assert_eq!(account.fail_count, 0);
        assert_eq!(account.last_error_code, None);
        assert_eq!(account.cooldown_until, None);
    }

    #[test]
    fn failure_applies_refresh_schedule() {
        let mut account = oauth_account();
        apply_refresh_failure(&mut account, 429, 1_000);
        assert_eq!(account.cooldown_until, Some(1_000 + 1800));
        assert_eq!(account.fail_count, 1);
        assert_eq!(account.last_error_code, Some(429));

        // Non-schedule status bumps counters without freezing.
        let mut other = oauth_account();
        apply_refresh_failure(&mut other, 404, 1_000);
        assert_eq!(other.cooldown_until, None);
        assert_eq!(other.fail_count, 1);
    }

    #[test]
    fn claims_read_both_email_locations() {
        let top = encode_id_token(serde_json::json!({ "email": "a@b.c" }));
        assert_eq!(decode_id_token_claims(&top).email.as_deref(), Some("a@b.c"));

        let nested = encode_id_token(serde_json::json!({
            "https://api.openai.com/profile": { "email": "n@b.c" },
            "https://api.openai.com/auth": { "chatgpt_account_id": "acct_1" },
        }));
        let claims = decode_id_token_claims(&nested);
        assert_eq!(claims.email.as_deref(), Some("n@b.c"));
        assert_eq!(claims.account_id.as_deref(), Some("acct_1"));

        assert!(decode_id_token_claims("not-a-jwt").email.is_none());
    }
}
