//! Chat ⇄ legacy Completions adapter.

use codexd_protocol::chat::{ChatCompletion, ChatCompletionChunk};
use codexd_protocol::completions::{CompletionChoice, TextCompletion};

pub fn chat_to_text_completion(chat: ChatCompletion) -> TextCompletion {
    let choices = chat
        .choices
        .into_iter()
        .map(|choice| CompletionChoice {
            index: choice.index,
            text: choice.message.content.unwrap_or_default(),
            finish_reason: Some(choice.finish_reason),
            logprobs: None,
        })
        .collect();
    TextCompletion {
        id: chat.id,
        object: "text_completion",
        created: chat.created,
        model: chat.model,
        choices,
        usage: chat.usage,
    }
}

/// Streaming variant: each chat chunk becomes one text-completion
/// chunk carrying the content delta.
pub fn chunk_to_text_completion(chunk: ChatCompletionChunk) -> TextCompletion {
    let choices = chunk
        .choices
        .into_iter()
        .map(|choice| CompletionChoice {
            index: choice.index,
            text: choice.delta.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            logprobs: None,
        })
        .collect();
    TextCompletion {
        id: chunk.id,
        object: "text_completion",
        created: chunk.created,
        model: chunk.model,
        choices,
        usage: None,
    }
}
