//! The OpenAI-compatible proxy endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value as JsonValue, json};
use tracing::info;

use codexd_protocol::chat::{
    ChatCompletionRequest, ChatContent, ChatMessage, ChatRole,
};
use codexd_protocol::completions::CompletionRequest;
use codexd_protocol::sse::frame_data;
use codexd_core::error::NO_USABLE_ACCOUNTS;
use codexd_core::stream::rewrite_sse;
use codexd_core::{DispatchPolicy, Dispatched, ProxyCall, ProxyError};
use codexd_transform::completions::{chat_to_text_completion, chunk_to_text_completion};
use codexd_transform::{ChatStreamState, ToolNameMap, chat_to_responses, responses_blob_to_chat};

use crate::AppState;

const MODEL_IDS: [&str; 6] = [
    "gpt-5",
    "gpt-5-minimal",
    "gpt-5-low",
    "gpt-5-medium",
    "gpt-5-high",
    "codex-mini-latest",
];

pub(crate) async fn list_models() -> Json<JsonValue> {
    let data: Vec<JsonValue> = MODEL_IDS
        .iter()
        .map(|id| json!({ "id": id, "object": "model" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// Native dialect: forward as-is, stream or buffered.
pub(crate) async fn responses(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let stream = wants_stream(&headers, &body);
    let call = ProxyCall {
        method: Method::POST,
        path: "/responses".to_string(),
        headers: headers_to_vec(&headers),
        body,
        stream,
    };
    match state.engine.dispatch(call, DispatchPolicy::full()).await {
        Ok(dispatched) => forward(dispatched),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let client_streams = request.stream.unwrap_or(false);
    dispatch_chat(&state, &headers, request, ChatReply {
        client_streams,
        completions_dialect: false,
    })
    .await
}

/// Legacy dialect: wrap the prompt into a single user chat message,
/// then ride the chat path and rewrap the result.
pub(crate) async fn completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let client_streams = request.stream.unwrap_or(false);
    let chat = completion_to_chat_request(request);
    dispatch_chat(&state, &headers, chat, ChatReply {
        client_streams,
        completions_dialect: true,
    })
    .await
}

/// Generic passthrough for every other /v1/* path, preserving the
/// caller's method.
pub(crate) async fn fallthrough(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(rest) = uri.path().strip_prefix("/v1") else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response();
    };
    let mut path = rest.to_string();
    if let Some(query) = uri.query() {
        path.push('?');
        path.push_str(query);
    }
    let stream = body_asks_for_stream(&body);
    info!(%method, %path, stream, "forwarding fall-through request");
    let call = ProxyCall {
        method,
        path,
        headers: headers_to_vec(&headers),
        body,
        stream,
    };
    match state.engine.dispatch(call, DispatchPolicy::full()).await {
        Ok(dispatched) => forward(dispatched),
        Err(err) => error_response(err),
    }
}

struct ChatReply {
    client_streams: bool,
    completions_dialect: bool,
}

async fn dispatch_chat(
    state: &AppState,
    headers: &HeaderMap,
    request: ChatCompletionRequest,
    reply: ChatReply,
) -> Response {
    let (mut payload, names) = chat_to_responses(request);
    // The upstream backend only speaks SSE on /responses; non-stream
    // callers get the captured stream folded back into one object.
    payload.stream = Some(true);
    let body = match serde_json::to_vec(&payload) {
        Ok(body) => Bytes::from(body),
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response();
        }
    };
    let call = ProxyCall {
        method: Method::POST,
        path: "/responses".to_string(),
        headers: headers_to_vec(headers),
        body,
        stream: true,
    };

    let dispatched = match state.engine.dispatch(call, DispatchPolicy::quick()).await {
        Ok(dispatched) => dispatched,
        Err(err) => return error_response(err),
    };

    match dispatched {
        // Upstream failure bodies pass through untouched.
        Dispatched::Buffered {
            status,
            headers,
            body,
        } => buffered_response(status, headers, body),
        Dispatched::Stream { body, .. } if reply.client_streams => {
            let mut rewriter = ChatStreamState::new(names);
            let completions_dialect = reply.completions_dialect;
            let rewritten = rewrite_sse(body, move |data| {
                let Ok(event) = serde_json::from_str(data) else {
                    return Vec::new();
                };
                rewriter
                    .on_event(event)
                    .into_iter()
                    .filter_map(|chunk| {
                        let payload = if completions_dialect {
                            serde_json::to_string(&chunk_to_text_completion(chunk))
                        } else {
                            serde_json::to_string(&chunk)
                        };
                        payload.ok().map(|json| frame_data(&json))
                    })
                    .collect()
            });
            sse_response(Body::from_stream(rewritten.map(Ok::<_, std::convert::Infallible>)))
        }
        Dispatched::Stream { body, .. } => {
            buffer_and_translate(body, &names, reply.completions_dialect).await
        }
    }
}

async fn buffer_and_translate(
    mut body: futures_util::stream::BoxStream<'static, Result<Bytes, codexd_core::UpstreamError>>,
    names: &ToolNameMap,
    completions_dialect: bool,
) -> Response {
    let mut blob = String::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => blob.push_str(&String::from_utf8_lossy(&chunk)),
            Err(_) => break,
        }
    }
    match responses_blob_to_chat(&blob, names) {
        Ok(chat) if completions_dialect => Json(chat_to_text_completion(chat)).into_response(),
        Ok(chat) => Json(chat).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) fn completion_to_chat_request(request: CompletionRequest) -> ChatCompletionRequest {
    let prompt = request
        .prompt
        .map(|prompt| prompt.into_text())
        .unwrap_or_default();
    ChatCompletionRequest {
        model: request.model,
        messages: vec![ChatMessage {
            role: ChatRole::User,
            content: Some(ChatContent::Text(prompt)),
            tool_calls: None,
            tool_call_id: None,
        }],
        stream: request.stream,
        reasoning_effort: None,
        response_format: None,
        text: None,
        tools: None,
    }
}

fn forward(dispatched: Dispatched) -> Response {
    match dispatched {
        Dispatched::Buffered {
            status,
            headers,
            body,
        } => buffered_response(status, headers, body),
        Dispatched::Stream { body, .. } => {
            sse_response(Body::from_stream(body))
        }
    }
}

fn buffered_response(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    if let Some(out) = builder.headers_mut() {
        for (name, value) in headers {
            if is_hop_by_hop_header(&name) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                out.append(name, value);
            }
        }
        out.entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub(crate) fn error_response(err: ProxyError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match &err {
        ProxyError::NoUsableAccount => NO_USABLE_ACCOUNTS.to_string(),
        other => other.to_string(),
    };
    (status, Json(json!({ "error": message }))).into_response()
}

fn wants_stream(headers: &HeaderMap, body: &Bytes) -> bool {
    let accept_sse = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false);
    accept_sse || body_asks_for_stream(body)
}

fn body_asks_for_stream(body: &Bytes) -> bool {
    if body.is_empty() {
        return false;
    }
    serde_json::from_slice::<JsonValue>(body)
        .ok()
        .and_then(|value| value.get("stream").and_then(JsonValue::as_bool))
        .unwrap_or(false)
}

fn headers_to_vec(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn is_hop_by_hop_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailer")
        || name.eq_ignore_ascii_case("upgrade")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn model_list_is_static() {
        let Json(value) = list_models().await;
        assert_eq!(value["object"], "list");
        let data = value["data"].as_array().unwrap();
        assert_eq!(data.len(), 6);
        assert_eq!(data[0]["id"], "gpt-5");
        assert!(data.iter().all(|m| m["object"] == "model"));
        assert!(data.iter().any(|m| m["id"] == "codex-mini-latest"));
    }

    #[test]
    fn prompt_wraps_into_single_user_message() {
        let request: CompletionRequest = serde_json::from_value(json!({
            "model": "gpt-5-low",
            "prompt": ["line one", "line two"],
            "stream": true,
        }))
        .unwrap();
        let chat = completion_to_chat_request(request);
        assert_eq!(chat.model, "gpt-5-low");
        assert_eq!(chat.stream, Some(true));
        assert_eq!(chat.messages.len(), 1);
        assert!(matches!(chat.messages[0].role, ChatRole::User));
        match chat.messages[0].content.as_ref().unwrap() {
            ChatContent::Text(text) => assert_eq!(text, "line one\nline two"),
            _ => panic!("expected text content"),
        }
    }

    #[test]
    fn stream_detection_reads_body_and_accept_header() {
        let streaming = Bytes::from_static(b"{\"stream\":true,\"model\":\"gpt-5\"}");
        let buffered = Bytes::from_static(b"{\"model\":\"gpt-5\"}");
        let nested = Bytes::from_static(b"{\"options\":{\"stream\":true}}");
        assert!(body_asks_for_stream(&streaming));
        assert!(!body_asks_for_stream(&buffered));
        assert!(!body_asks_for_stream(&nested));
        assert!(!body_asks_for_stream(&Bytes::new()));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        assert!(wants_stream(&headers, &buffered));
        assert!(!wants_stream(&HeaderMap::new(), &buffered));
    }
}
