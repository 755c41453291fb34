use codexd_accounts::StoreError;

use crate::upstream::UpstreamError;

pub const NO_USABLE_ACCOUNTS: &str =
    "No usable accounts (all disabled, cooling down or expired)";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Selection came up empty; surfaced as 503.
    #[error("{NO_USABLE_ACCOUNTS}")]
    NoUsableAccount,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("upstream unreachable: {0}")]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    pub fn status(&self) -> u16 {
        match self {
            ProxyError::NoUsableAccount => 503,
            ProxyError::Store(_) => 500,
            ProxyError::Upstream(_) => 502,
        }
    }
}
