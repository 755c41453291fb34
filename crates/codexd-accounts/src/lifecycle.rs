//! Pure account classifiers and the two cooldown policies.
//!
//! Request-path failures freeze an account hard (uniform 3h); failures
//! seen during refresh itself get the milder per-code schedule. The two
//! tables are intentionally separate.

use std::time::Duration;

use crate::account::Account;

/// Window before `expire` in which the sweep refreshes an account.
pub const NEAR_EXPIRY_WINDOW: Duration = Duration::from_secs(10 * 60);

const REQUEST_COOLDOWN: Duration = Duration::from_secs(3 * 60 * 60);
const REFRESH_COOLDOWN_429: Duration = Duration::from_secs(30 * 60);
const REFRESH_COOLDOWN_AUTH: Duration = Duration::from_secs(10 * 60);
const REFRESH_COOLDOWN_CAP: Duration = Duration::from_secs(30 * 60);

pub fn is_cooling_down(account: &Account, now: i64) -> bool {
    account.cooldown_until.is_some_and(|until| until > now)
}

pub fn is_expired(account: &Account, now: i64) -> bool {
    account.expire().is_some_and(|expire| expire <= now)
}

/// Accounts with no known expiry always count as near expiry so the
/// sweep gets a chance to learn one.
pub fn is_near_expiry(account: &Account, now: i64, window: Duration) -> bool {
    match account.expire() {
        Some(expire) => expire - now <= window.as_secs() as i64,
        None => true,
    }
}

pub fn usable(account: &Account, now: i64) -> bool {
    !account.disabled && !is_cooling_down(account, now) && !is_expired(account, now)
}

pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 408 | 429 | 500 | 502 | 503 | 504)
}

/// Cooldown for a failure observed on the request path.
pub fn request_cooldown(status: u16) -> Option<Duration> {
    is_retriable_status(status).then_some(REQUEST_COOLDOWN)
}

/// Cooldown for a failure observed during token refresh. `fail_count`
/// is the count before this failure.
pub fn refresh_cooldown(status: u16, fail_count: u32) -> Option<Duration> {
    match status {
        429 => Some(REFRESH_COOLDOWN_429),
        401 | 403 => Some(REFRESH_COOLDOWN_AUTH),
        408 | 500..=599 => {
            let backoff = Duration::from_secs(60) * 2u32.pow(fail_count.min(5));
            Some(backoff.min(REFRESH_COOLDOWN_CAP))
        }
        _ => None,
    }
}

/// Human status for listings.
pub fn status_label(account: &Account, now: i64) -> &'static str {
    if account.disabled {
        return "disabled";
    }
    if is_cooling_down(account, now) {
        return "cooldown";
    }
    if is_expired(account, now) {
        return "expired";
    }
    match account.expire() {
        Some(_) if is_near_expiry(account, now, NEAR_EXPIRY_WINDOW) => "expiring-soon",
        Some(_) => "active",
        None if account.is_relay() => "active",
        None => "unknown",
    }
}

/// Coarse UI state: the selected account is `active`, other usable ones
/// `waiting`, everything else `frozen`.
pub fn state_label(account: &Account, now: i64, selected: bool) -> &'static str {
    if !usable(account, now) {
        "frozen"
    } else if selected {
        "active"
    } else {
        "waiting"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, TokenGrant};

    fn oauth_account(now: i64, expires_in: Option<i64>) -> Account {
        Account::from_token_grant(
            TokenGrant {
                access_token: "tok".into(),
                refresh_token: None,
                id_token: None,
                expires_in,
            },
            now,
        )
    }

    #[test]
    fn cooldown_gates_until_the_instant_passes() {
        let mut account = oauth_account(0, Some(9_999));
        account.cooldown_until = Some(100);
        assert!(is_cooling_down(&account, 99));
        assert!(!is_cooling_down(&account, 100));
        assert!(usable(&account, 100));
    }

    #[test]
    fn expiry_and_near_expiry() {
        let account = oauth_account(0, Some(3_600));
        assert!(!is_expired(&account, 3_599));
        assert!(is_expired(&account, 3_600));
        assert!(!is_near_expiry(&account, 0, NEAR_EXPIRY_WINDOW));
        assert!(is_near_expiry(&account, 3_100, NEAR_EXPIRY_WINDOW));
        // No declared expiry: always a sweep candidate.
        assert!(is_near_expiry(&oauth_account(0, None), 0, NEAR_EXPIRY_WINDOW));
    }

    #[test]
    fn request_cooldown_covers_the_retriable_set_only() {
        for status in [401, 403, 408, 429, 500, 502, 503, 504] {
            assert_eq!(
                request_cooldown(status),
                Some(Duration::from_secs(3 * 60 * 60)),
                "status {status}"
            );
        }
        assert_eq!(request_cooldown(400), None);
        assert_eq!(request_cooldown(404), None);
    }

    #[test]
    fn refresh_cooldown_schedule() {
        assert_eq!(refresh_cooldown(429, 0), Some(Duration::from_secs(1800)));
        assert_eq!(refresh_cooldown(401, 3), Some(Duration::from_secs(600)));
        assert_eq!(refresh_cooldown(403, 0), Some(Duration::from_secs(600)));
        assert_eq!(refresh_cooldown(500, 0), Some(Duration::from_secs(60)));
        assert_eq!(refresh_cooldown(502, 3), Some(Duration::from_secs(480)));
        // Exponent saturates at 5 and the cap wins past it.
        assert_eq!(refresh_cooldown(503, 5), Some(Duration::from_secs(1800)));
        assert_eq!(refresh_cooldown(503, 40), Some(Duration::from_secs(1800)));
        assert_eq!(refresh_cooldown(404, 0), None);
    }

    #[test]
    fn labels_follow_lifecycle() {
        let now = 1_000;
        let mut account = oauth_account(now, Some(7_200));
        assert_eq!(status_label(&account, now), "active");
        assert_eq!(state_label(&account, now, true), "active");
        assert_eq!(state_label(&account, now, false), "waiting");

        account.cooldown_until = Some(now + 60);
        assert_eq!(status_label(&account, now), "cooldown");
        assert_eq!(state_label(&account, now, false), "frozen");

        account.cooldown_until = None;
        account.disabled = true;
        assert_eq!(status_label(&account, now), "disabled");

        let no_expiry = oauth_account(now, None);
        assert_eq!(status_label(&no_expiry, now), "unknown");
    }
}
