//! Chat Completions request → native Responses request.

use codexd_protocol::chat::{
    ChatCompletionRequest, ChatContent, ChatContentPart, ChatMessage, ChatRole, ResponseFormat,
};
use codexd_protocol::responses::{
    ContentPart, FunctionTool, InputItem, Reasoning, ResponsesRequest, TextFormat, TextParam,
};

use crate::tools::ToolNameMap;

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";
const DEFAULT_EFFORT: &str = "low";

/// Rewrite a chat payload into the native dialect. The returned name
/// map is needed again on the way back to de-shorten tool calls.
pub fn chat_to_responses(request: ChatCompletionRequest) -> (ResponsesRequest, ToolNameMap) {
    let (model, effort) = split_effort_model(&request.model, request.reasoning_effort.as_deref());

    let names = ToolNameMap::build(
        request
            .tools
            .iter()
            .flatten()
            .filter(|tool| tool.kind == "function")
            .filter_map(|tool| tool.function.as_ref())
            .map(|function| function.name.as_str()),
    );

    let tools: Vec<FunctionTool> = request
        .tools
        .into_iter()
        .flatten()
        .filter(|tool| tool.kind == "function")
        .filter_map(|tool| tool.function)
        .map(|function| FunctionTool {
            kind: "function",
            name: names.shorten(&function.name),
            description: function.description,
            parameters: function.parameters,
            strict: function.strict,
        })
        .collect();

    let mut instructions = None;
    let mut input = Vec::new();
    for message in request.messages {
        if instructions.is_none() && message.role == ChatRole::System {
            instructions = Some(
                message
                    .content
                    .as_ref()
                    .map(ChatContent::joined_text)
                    .unwrap_or_default(),
            );
            continue;
        }
        push_input_items(&mut input, message, &names);
    }

    let store = request.response_format.is_some();
    let text = build_text_param(
        request.response_format,
        request.text.and_then(|t| t.verbosity),
    );

    let payload = ResponsesRequest {
        model,
        instructions: instructions.unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
        input,
        stream: request.stream,
        reasoning: Reasoning {
            effort,
            summary: "auto",
        },
        parallel_tool_calls: true,
        include: vec!["reasoning.encrypted_content"],
        store,
        text,
        tools: (!tools.is_empty()).then_some(tools),
    };
    (payload, names)
}

/// Effort-suffixed model aliases collapse onto the base model.
fn split_effort_model(model: &str, effort: Option<&str>) -> (String, String) {
    for suffix in ["minimal", "low", "medium", "high"] {
        if model == format!("gpt-5-{suffix}") {
            return ("gpt-5".to_string(), suffix.to_string());
        }
    }
    (
        model.to_string(),
        effort.unwrap_or(DEFAULT_EFFORT).to_string(),
    )
}

fn push_input_items(input: &mut Vec<InputItem>, message: ChatMessage, names: &ToolNameMap) {
    if message.role == ChatRole::Tool {
        input.push(InputItem::FunctionCallOutput {
            call_id: message.tool_call_id.unwrap_or_default(),
            output: message
                .content
                .as_ref()
                .map(ChatContent::joined_text)
                .unwrap_or_default(),
        });
        return;
    }

    let role = match message.role {
        // Later system messages ride along as user input.
        ChatRole::System | ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => unreachable!(),
    };
    let assistant = message.role == ChatRole::Assistant;

    let content = message
        .content
        .map(|content| content_parts(content, assistant))
        .unwrap_or_default();
    if !content.is_empty() {
        input.push(InputItem::Message {
            role: role.to_string(),
            content,
        });
    }

    // Tool calls the assistant made come after its message.
    for call in message.tool_calls.into_iter().flatten() {
        input.push(InputItem::FunctionCall {
            call_id: call.id,
            name: names.shorten(&call.function.name),
            arguments: call.function.arguments,
        });
    }
}

fn content_parts(content: ChatContent, assistant: bool) -> Vec<ContentPart> {
    let text_part = |text: String| {
        if assistant {
            ContentPart::OutputText { text }
        } else {
            ContentPart::InputText { text }
        }
    };
    match content {
        ChatContent::Text(text) => vec![text_part(text)],
        ChatContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                ChatContentPart::Text { text } => Some(text_part(text)),
                ChatContentPart::ImageUrl { image_url } if !assistant => {
                    Some(ContentPart::InputImage {
                        image_url: image_url.url,
                    })
                }
                ChatContentPart::ImageUrl { .. } => None,
            })
            .collect(),
    }
}

fn build_text_param(
    format: Option<ResponseFormat>,
    verbosity: Option<String>,
) -> Option<TextParam> {
    if format.is_none() && verbosity.is_none() {
        return None;
    }
    let format = format.map(|format| match format {
        ResponseFormat::Text => TextFormat::Text,
        ResponseFormat::JsonObject => TextFormat::JsonObject,
        ResponseFormat::JsonSchema { json_schema } => TextFormat::JsonSchema {
            name: json_schema.name,
            strict: json_schema.strict,
            schema: json_schema.schema,
        },
    });
    Some(TextParam { format, verbosity })
}
