//! Buffered Responses SSE body → one chat.completion object.

use codexd_protocol::chat::{
    ChatChoice, ChatCompletion, ChatFunctionCall, ChatResponseMessage, ChatToolCall, ChatUsage,
    CompletionTokensDetails,
};
use codexd_protocol::responses::{
    OutputContent, OutputItem, Response, ResponseEvent, ResponsesUsage, SummaryPart,
};
use codexd_protocol::sse::SseReader;

use crate::TranslateError;
use crate::tools::ToolNameMap;

/// Find the `response.completed` record in a captured SSE body and
/// rebuild it as a chat completion.
pub fn responses_blob_to_chat(
    blob: &str,
    names: &ToolNameMap,
) -> Result<ChatCompletion, TranslateError> {
    let mut reader = SseReader::new();
    let mut frames = reader.feed_str(blob);
    frames.extend(reader.close());

    let completed = frames
        .into_iter()
        .filter(|frame| !frame.data.is_empty())
        .find_map(|frame| {
            match serde_json::from_str::<ResponseEvent>(&frame.data) {
                Ok(ResponseEvent::Completed { response }) => Some(response),
                _ => None,
            }
        })
        .ok_or(TranslateError::MissingCompleted)?;

    Ok(completed_to_chat(completed, names))
}

fn completed_to_chat(response: Response, names: &ToolNameMap) -> ChatCompletion {
    let mut message = ChatResponseMessage {
        role: "assistant",
        ..Default::default()
    };
    let mut tool_calls = Vec::new();

    for item in response.output {
        match item {
            OutputItem::Reasoning { summary } => {
                let texts: Vec<String> = summary
                    .into_iter()
                    .filter_map(|part| match part {
                        SummaryPart::SummaryText { text } => Some(text),
                        SummaryPart::Other => None,
                    })
                    .collect();
                if !texts.is_empty() {
                    append(&mut message.reasoning_content, texts.join("\n\n"));
                }
            }
            OutputItem::Message { content } => {
                let text = content.into_iter().find_map(|part| match part {
                    OutputContent::OutputText { text } => Some(text),
                    OutputContent::Other => None,
                });
                if let Some(text) = text {
                    append(&mut message.content, text);
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => tool_calls.push(ChatToolCall {
                id: call_id,
                kind: "function".to_string(),
                function: ChatFunctionCall {
                    name: names.restore(&name),
                    arguments,
                },
            }),
            OutputItem::Other => {}
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        "stop"
    } else {
        "tool_calls"
    };
    message.tool_calls = (!tool_calls.is_empty()).then_some(tool_calls);

    ChatCompletion {
        id: response.id,
        object: "chat.completion",
        created: response.created_at,
        model: response.model,
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason: finish_reason.to_string(),
            native_finish_reason: finish_reason.to_string(),
        }],
        usage: response.usage.map(map_usage),
    }
}

fn append(slot: &mut Option<String>, text: String) {
    match slot {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(&text);
        }
        None => *slot = Some(text),
    }
}

pub(crate) fn map_usage(usage: ResponsesUsage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
        completion_tokens_details: usage.output_tokens_details.map(|details| {
            CompletionTokensDetails {
                reasoning_tokens: details.reasoning_tokens,
            }
        }),
    }
}
