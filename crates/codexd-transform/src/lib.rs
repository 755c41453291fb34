//! Stateless dialect translation between the chat-style dialects and
//! the native Responses dialect, including per-event SSE rewriting and
//! the tool-name shortening map. No I/O here.

pub mod completions;
pub mod request;
pub mod response;
pub mod stream;
pub mod tools;


pub use request::chat_to_responses;
pub use response::responses_blob_to_chat;
pub use stream::ChatStreamState;
pub use tools::ToolNameMap;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid_upstream_response")]
    MissingCompleted,
}
