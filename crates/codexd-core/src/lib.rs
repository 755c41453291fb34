//! Request dispatch: account selection, upstream forwarding, and the
//! retry/refresh/switch state machine, for buffered and streaming
//! responses alike.

pub mod engine;
pub mod error;
pub mod stream;
pub mod upstream;

pub use engine::{DispatchPolicy, Dispatched, Engine, ProxyCall};
pub use error::ProxyError;
pub use upstream::{HttpUpstreamClient, UpstreamBody, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Fixed upstream inference backend.
pub const DEFAULT_UPSTREAM_BASE: &str = "https://chatgpt.com/backend-api/codex";
/// OAuth issuer for login and refresh.
pub const DEFAULT_ISSUER: &str = "https://auth.openai.com";
pub const OAUTH_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
