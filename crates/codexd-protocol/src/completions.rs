//! Legacy Completions dialect, adapted onto chat at the router layer.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::chat::ChatUsage;

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    #[serde(default)]
    pub prompt: Option<Prompt>,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Batch(Vec<String>),
}

impl Prompt {
    pub fn into_text(self) -> String {
        match self {
            Prompt::Text(text) => text,
            Prompt::Batch(lines) => lines.join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: i64,
    pub text: String,
    pub finish_reason: Option<String>,
    pub logprobs: Option<JsonValue>,
}
