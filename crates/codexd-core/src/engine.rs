//! The retry/refresh/switch driver.
//!
//! One driver serves every dispatch family; the differences between
//! the native fast path and the translated chat paths are carried by
//! `DispatchPolicy`.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::Method;
use tracing::{info, warn};

use codexd_accounts::account::AccountAuth;
use codexd_accounts::{Account, Refresher, Selector, Store, clock, lifecycle};

use crate::error::ProxyError;
use crate::upstream::{
    UpstreamBody, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse,
};

/// Statuses that earn one more try on the same account before the
/// refresh/switch ladder.
const SAME_ACCOUNT_RETRY: [u16; 5] = [408, 500, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// Uniform 3h freeze (request path).
    Request,
    /// Milder per-code schedule (refresh path).
    Refresh,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub same_account_retry: bool,
    pub attempt_cap: Option<usize>,
    pub cooldown: CooldownPolicy,
}

impl DispatchPolicy {
    /// Native `/v1/responses` and the generic fall-through.
    pub fn full() -> Self {
        Self {
            same_account_retry: true,
            attempt_cap: None,
            cooldown: CooldownPolicy::Request,
        }
    }

    /// Translated chat/completions paths: fewer attempts, no
    /// same-account retry, milder cooldowns.
    pub fn quick() -> Self {
        Self {
            same_account_retry: false,
            attempt_cap: Some(3),
            cooldown: CooldownPolicy::Refresh,
        }
    }
}

/// One upstream-bound call, already translated to the native dialect
/// where applicable.
#[derive(Debug)]
pub struct ProxyCall {
    pub method: Method,
    /// Path under the upstream base, e.g. `/responses`.
    pub path: String,
    /// Inbound headers to mirror (auth and framing stripped here).
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stream: bool,
}

pub enum Dispatched {
    Buffered {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    Stream {
        status: u16,
        headers: Vec<(String, String)>,
        body: BoxStream<'static, Result<Bytes, UpstreamError>>,
    },
}

impl From<UpstreamResponse> for Dispatched {
    fn from(resp: UpstreamResponse) -> Self {
        match resp.body {
            UpstreamBody::Buffered(body) => Dispatched::Buffered {
                status: resp.status,
                headers: resp.headers,
                body,
            },
            UpstreamBody::Stream(body) => Dispatched::Stream {
                status: resp.status,
                headers: resp.headers,
                body,
            },
        }
    }
}

pub struct Engine {
    store: Arc<Store>,
    selector: Selector,
    refresher: Arc<Refresher>,
    client: Arc<dyn UpstreamClient>,
    base_url: String,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        selector: Selector,
        refresher: Arc<Refresher>,
        client: Arc<dyn UpstreamClient>,
        base_url: String,
    ) -> Self {
        Self {
            store,
            selector,
            refresher,
            client,
            base_url,
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Run one request through the select → try → refresh → switch
    /// machine. For streams, retry applies only to establishment; once
    /// a 2xx stream is returned here, failures propagate as stream
    /// termination.
    pub async fn dispatch(
        &self,
        call: ProxyCall,
        policy: DispatchPolicy,
    ) -> Result<Dispatched, ProxyError> {
        let total = self.store.read_accounts().await.len();
        let mut attempt_limit = total.max(1);
        if let Some(cap) = policy.attempt_cap {
            attempt_limit = attempt_limit.min(cap);
        }

        let mut account = self
            .selector
            .select()
            .await?
            .ok_or(ProxyError::NoUsableAccount)?;
        let mut tried = 0usize;
        let mut last: Option<UpstreamResponse> = None;

        while tried < attempt_limit {
            let resp = self.client.send(self.build_request(&call, &account)).await?;
            if resp.is_success() {
                return Ok(resp.into());
            }
            if !lifecycle::is_retriable_status(resp.status) {
                info!(account = %account.id, status = resp.status, "forwarding fatal upstream status");
                return Ok(resp.into());
            }
            let mut status = resp.status;
            last = Some(resp);

            if policy.same_account_retry && SAME_ACCOUNT_RETRY.contains(&status) {
                let retry = self.client.send(self.build_request(&call, &account)).await?;
                if retry.is_success() {
                    return Ok(retry.into());
                }
                if !lifecycle::is_retriable_status(retry.status) {
                    return Ok(retry.into());
                }
                status = retry.status;
                last = Some(retry);
            }

            // RefreshFailed never surfaces on its own; the triggering
            // request keeps driving the ladder.
            match self.refresher.refresh(&account.id).await {
                Ok(Some(renewed)) => {
                    let retry = self.client.send(self.build_request(&call, &renewed)).await?;
                    if retry.is_success() {
                        return Ok(retry.into());
                    }
                    if !lifecycle::is_retriable_status(retry.status) {
                        return Ok(retry.into());
                    }
                    status = retry.status;
                    last = Some(retry);
                }
                Ok(None) => {}
                Err(err) => warn!(account = %account.id, %err, "refresh during dispatch failed"),
            }

            warn!(account = %account.id, status, "marking account and rotating");
            self.mark_failure(&account.id, status, policy.cooldown).await?;
            tried += 1;

            match self.selector.advance().await? {
                Some(next) => account = next,
                None => break,
            }
        }

        match last {
            Some(resp) => Ok(resp.into()),
            None => Err(ProxyError::NoUsableAccount),
        }
    }

    fn build_request(&self, call: &ProxyCall, account: &Account) -> UpstreamRequest {
        let base = match &account.auth {
            AccountAuth::Relay { base_url, .. } => base_url.as_str(),
            AccountAuth::Oauth { .. } => self.base_url.as_str(),
        };
        let url = format!("{}{}", base.trim_end_matches('/'), call.path);

        let mut headers: Vec<(String, String)> = call
            .headers
            .iter()
            .filter(|(name, _)| !strip_inbound_header(name))
            .cloned()
            .collect();
        headers.push((
            "Authorization".into(),
            format!("Bearer {}", account.bearer_token()),
        ));
        headers.push(("Content-Type".into(), "application/json".into()));
        let accept = if call.stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.push(("Accept".into(), accept.into()));

        if !account.is_relay() {
            headers.push(("Openai-Beta".into(), "responses=experimental".into()));
            headers.push(("Version".into(), "0.21.0".into()));
            headers.push(("Originator".into(), "codex_cli_rs".into()));
            // Fresh per attempt.
            headers.push(("Session_id".into(), clock::new_id()));
            if let Some(account_id) = account.chatgpt_account_id() {
                headers.push(("Chatgpt-Account-Id".into(), account_id.to_string()));
            }
        }

        UpstreamRequest {
            method: call.method.clone(),
            url,
            headers,
            body: (!call.body.is_empty()).then(|| call.body.clone()),
            stream: call.stream,
        }
    }

    async fn mark_failure(
        &self,
        id: &str,
        status: u16,
        policy: CooldownPolicy,
    ) -> Result<(), ProxyError> {
        let now = clock::now_ts();
        self.store
            .update(id, |account| {
                let cooldown = match policy {
                    CooldownPolicy::Request => lifecycle::request_cooldown(status),
                    CooldownPolicy::Refresh => {
                        lifecycle::refresh_cooldown(status, account.fail_count)
                    }
                };
                if let Some(cooldown) = cooldown {
                    account.cooldown_until = Some(now + cooldown.as_secs() as i64);
                }
                account.fail_count += 1;
                account.last_error_code = Some(status);
            })
            .await?;
        Ok(())
    }
}

/// Inbound headers codexd owns or that would break the upstream hop.
fn strip_inbound_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization")
        || name.eq_ignore_ascii_case("host")
        || name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("content-type")
        || name.eq_ignore_ascii_case("accept")
        || name.eq_ignore_ascii_case("accept-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("openai-beta")
        || name.eq_ignore_ascii_case("session_id")
        || name.eq_ignore_ascii_case("chatgpt-account-id")
        || name.eq_ignore_ascii_case("originator")
}
