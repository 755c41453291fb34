//! Wire types for the three inbound dialects and the upstream Responses
//! dialect, plus an incremental SSE frame reader.
//!
//! Only the fields the proxy reads or rewrites are modeled; everything
//! else rides along untouched inside `serde_json::Value` payloads or is
//! dropped by serde on deserialization.

pub mod chat;
pub mod completions;
pub mod responses;
pub mod sse;
