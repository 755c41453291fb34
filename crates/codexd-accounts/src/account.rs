use serde::{Deserialize, Serialize};

use crate::clock;

/// A stored credential record. OAuth accounts come out of the login
/// flow or an import; relay accounts are plain bearer-key upstreams
/// configured by hand and never refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(flatten)]
    pub auth: AccountAuth,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub fail_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AccountAuth {
    Oauth {
        access_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        /// Best known upstream-declared expiry of `access_token`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expire: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_refresh: Option<i64>,
    },
    Relay {
        name: String,
        base_url: String,
        api_key: String,
    },
}

/// Token set produced by the OAuth boundary (callback, import, refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl Account {
    pub fn from_token_grant(grant: TokenGrant, now: i64) -> Self {
        let claims = grant
            .id_token
            .as_deref()
            .map(crate::refresh::decode_id_token_claims)
            .unwrap_or_default();
        Self {
            id: clock::new_id(),
            auth: AccountAuth::Oauth {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                id_token: grant.id_token,
                account_id: claims.account_id,
                email: claims.email,
                expire: grant.expires_in.map(|secs| now + secs),
                last_refresh: None,
            },
            created_at: now,
            last_used: None,
            disabled: false,
            fail_count: 0,
            last_error_code: None,
            cooldown_until: None,
        }
    }

    pub fn relay(name: String, base_url: String, api_key: String, now: i64) -> Self {
        Self {
            id: clock::new_id(),
            auth: AccountAuth::Relay {
                name,
                base_url,
                api_key,
            },
            created_at: now,
            last_used: None,
            disabled: false,
            fail_count: 0,
            last_error_code: None,
            cooldown_until: None,
        }
    }

    pub fn is_relay(&self) -> bool {
        matches!(self.auth, AccountAuth::Relay { .. })
    }

    pub fn bearer_token(&self) -> &str {
        match &self.auth {
            AccountAuth::Oauth { access_token, .. } => access_token,
            AccountAuth::Relay { api_key, .. } => api_key,
        }
    }

    pub fn expire(&self) -> Option<i64> {
        match &self.auth {
            AccountAuth::Oauth { expire, .. } => *expire,
            AccountAuth::Relay { .. } => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match &self.auth {
            AccountAuth::Oauth { refresh_token, .. } => refresh_token.as_deref(),
            AccountAuth::Relay { .. } => None,
        }
    }

    pub fn chatgpt_account_id(&self) -> Option<&str> {
        match &self.auth {
            AccountAuth::Oauth { account_id, .. } => account_id.as_deref(),
            AccountAuth::Relay { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match &self.auth {
            AccountAuth::Oauth { email, .. } => email.as_deref(),
            AccountAuth::Relay { .. } => None,
        }
    }

    /// Display name for listings: email, relay name, or the id.
    pub fn label(&self) -> &str {
        match &self.auth {
            AccountAuth::Oauth { email, .. } => email.as_deref().unwrap_or(&self.id),
            AccountAuth::Relay { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_sets_expiry_from_expires_in() {
        let account = Account::from_token_grant(
            TokenGrant {
                access_token: "tok".into(),
                refresh_token: Some("ref".into()),
                id_token: None,
                expires_in: Some(3600),
            },
            1_000,
        );
        assert_eq!(account.expire(), Some(4_600));
        assert_eq!(account.refresh_token(), Some("ref"));
        assert!(!account.is_relay());
    }

    #[test]
    fn account_json_round_trips_with_kind_tag() {
        let account = Account::relay("r".into(), "https://up".into(), "key".into(), 7);
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["kind"], "relay");
        assert_eq!(json["base_url"], "https://up");
        let back: Account = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, account.id);
        assert!(back.is_relay());
    }
}
