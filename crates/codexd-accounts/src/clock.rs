//! Wall-clock seconds and unique ids, shared by every component.

use chrono::Utc;
use uuid::Uuid;

/// Current wall time as unix seconds. All persisted timestamps use this.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Opaque unique id (time-ordered, so the accounts file stays readable).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}
