//! Live Responses SSE events → chat.completion.chunk objects.

use codexd_protocol::chat::{
    ChatChunkChoice, ChatCompletionChunk, ChatDelta, ChatFunctionCall, ChatToolCallDelta,
};
use codexd_protocol::responses::{OutputItem, Response, ResponseEvent};

use crate::tools::ToolNameMap;

/// Per-stream rewriter state. One instance per client stream; never
/// shared.
pub struct ChatStreamState {
    names: ToolNameMap,
    fn_idx: i64,
    id: String,
    model: String,
    created: i64,
    inited: bool,
}

impl ChatStreamState {
    pub fn new(names: ToolNameMap) -> Self {
        Self {
            names,
            fn_idx: -1,
            id: "chatcmpl".to_string(),
            model: String::new(),
            created: 0,
            inited: false,
        }
    }

    /// Rewrite one upstream event; unrelated event types produce no
    /// downstream output.
    pub fn on_event(&mut self, event: ResponseEvent) -> Vec<ChatCompletionChunk> {
        match event {
            ResponseEvent::Created { response } => {
                self.absorb_meta(&response);
                Vec::new()
            }
            ResponseEvent::ReasoningSummaryTextDelta { delta } => {
                self.chunk(
                    ChatDelta {
                        reasoning_content: Some(delta),
                        ..Default::default()
                    },
                    None,
                )
            }
            ResponseEvent::ReasoningSummaryTextDone => self.chunk(
                ChatDelta {
                    reasoning_content: Some("\n\n".to_string()),
                    ..Default::default()
                },
                None,
            ),
            ResponseEvent::OutputTextDelta { delta } => self.chunk(
                ChatDelta {
                    content: Some(delta),
                    ..Default::default()
                },
                None,
            ),
            ResponseEvent::OutputItemDone { item } => match item {
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    self.fn_idx += 1;
                    self.chunk(
                        ChatDelta {
                            tool_calls: Some(vec![ChatToolCallDelta {
                                index: self.fn_idx,
                                id: call_id,
                                kind: "function".to_string(),
                                function: ChatFunctionCall {
                                    name: self.names.restore(&name),
                                    arguments,
                                },
                            }]),
                            ..Default::default()
                        },
                        None,
                    )
                }
                _ => Vec::new(),
            },
            ResponseEvent::Completed { response } => {
                self.absorb_meta(&response);
                let finish = if self.fn_idx >= 0 { "tool_calls" } else { "stop" };
                self.chunk(ChatDelta::default(), Some(finish))
            }
            ResponseEvent::Other => Vec::new(),
        }
    }

    fn absorb_meta(&mut self, response: &Response) {
        if !response.id.is_empty() {
            self.id = response.id.clone();
        }
        if !response.model.is_empty() {
            self.model = response.model.clone();
        }
        if response.created_at != 0 {
            self.created = response.created_at;
        }
    }

    fn chunk(&mut self, mut delta: ChatDelta, finish: Option<&str>) -> Vec<ChatCompletionChunk> {
        if !self.inited {
            self.inited = true;
            delta.role = Some("assistant".to_string());
        }
        vec![ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta,
                finish_reason: finish.map(str::to_string),
                native_finish_reason: finish.map(str::to_string),
            }],
        }]
    }
}
