//! Chat relay endpoint
//!
//! Validates the request, persists the user's prompt, then either streams the
//! relay into the response body or, with `stream: false`, answers with a
//! single `finalMessage` event.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chatrelay_shared::{Message, StreamEvent, WireFormat};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::ConversationPath;
use crate::{
    error::{ApiError, ApiResult, FieldErrors},
    extract::{Validate, ValidatedJson},
    relay::{ChannelSink, ChatTurn, RelayOptions},
    state::AppState,
};

/// Frames buffered between the relay task and the response body
const FRAME_BUFFER: usize = 32;

const DEFAULT_PROFILE: &str = "Guest";

// =============================================================================
// Request Types
// =============================================================================

fn default_stream() -> bool {
    true
}

/// Message form of the prompt
#[derive(Debug, Deserialize)]
pub struct ChatMessageInput {
    pub id: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: Option<String>,
    pub message: Option<ChatMessageInput>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    pub model: Option<String>,
    pub config_name: Option<String>,
    pub profile: Option<Value>,
    pub upn: Option<String>,
    pub wire_format: Option<String>,
}

impl ChatRequest {
    /// Prompt text, from `prompt` or else the message content
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .or_else(|| self.message.as_ref().map(|m| m.content.as_str()))
    }

    /// Label for the active profile named in the system instruction
    pub fn profile_label(&self) -> String {
        let from_profile = match &self.profile {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(Value::Object(fields)) => fields.get("name").and_then(Value::as_str),
            _ => None,
        };
        from_profile
            .or(self.upn.as_deref())
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(DEFAULT_PROFILE)
            .to_string()
    }
}

impl Validate for ChatRequest {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.prompt_text().map_or(true, |p| p.trim().is_empty()) {
            errors.add("prompt", "String must contain at least 1 character(s)");
        }
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            errors.add("model", "String must contain at least 1 character(s)");
        }
        if let Some(format) = &self.wire_format {
            if format.parse::<WireFormat>().is_err() {
                errors.add("wireFormat", "Expected 'ndjson' | 'sse'");
            }
        }

        errors.into_result()
    }
}

fn system_prompt(profile: &str, conversation_id: &str) -> String {
    format!(
        "You are a helpful assistant. Provide thoughtful, well-structured answers that use the available context.\n\
         Active user profile: {}.\n\
         Conversation context id: {}.",
        profile, conversation_id
    )
}

/// Framing from the body, then the `Accept` header, then configuration
fn negotiate_format(request: &ChatRequest, headers: &HeaderMap, default: WireFormat) -> WireFormat {
    request
        .wire_format
        .as_deref()
        .and_then(|f| f.parse().ok())
        .or_else(|| {
            headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .and_then(WireFormat::from_media_type)
        })
        .unwrap_or(default)
}

// =============================================================================
// Handler
// =============================================================================

pub async fn chat(
    State(state): State<AppState>,
    Path(path): Path<ConversationPath>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ChatRequest>,
) -> ApiResult<Response> {
    let conversation = state.store.get_conversation(&path.conversation_id).await?;

    let guard = state.in_flight.try_acquire(&conversation.id).ok_or_else(|| {
        tracing::warn!(conversation_id = %conversation.id, "Rejected send while streaming");
        ApiError::Conflict("A response is already streaming for this conversation".to_string())
    })?;

    let prompt = request.prompt_text().unwrap_or_default().to_string();
    state
        .store
        .append_message(&conversation.id, Message::user(prompt.as_str()))
        .await?;

    let format = negotiate_format(&request, &headers, state.config.wire_format);
    let turn = ChatTurn {
        conversation_id: conversation.id.clone(),
        model: request
            .model
            .clone()
            .unwrap_or_else(|| state.config.default_model.clone()),
        system: system_prompt(&request.profile_label(), &conversation.id),
        prompt,
        tools: Vec::new(),
        sources: state.catalog.sources().to_vec(),
    };

    tracing::info!(
        tenant_id = %path.tenant_id,
        user_id = %path.user_id,
        conversation_id = %conversation.id,
        model = %turn.model,
        config_name = ?request.config_name,
        stream = request.stream,
        format = %format,
        "Chat request accepted"
    );

    let relay = state.relay(RelayOptions::new(state.config.status_interval(), format));

    if !request.stream {
        let message = relay.complete(turn).await?;
        drop(guard);
        return Ok(Json(StreamEvent::final_message(message)).into_response());
    }

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx, format);
        let outcome = relay.run(turn, &mut sink).await;
        tracing::debug!(conversation_id = %guard.conversation_id(), outcome = ?outcome, "Relay finished");
        // Release before the body closes so the client can send again right away
        drop(guard);
    });

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::{Method, StatusCode};
    use chatrelay_shared::FrameSplitter;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::llm::ScriptedProvider;
    use crate::routes::{create_router, testing::body_json, testing::json_request};

    const CHAT: &str = "/api/v1/tenant/tenant-a/user/guest-user/conversation/seed-2/chat";

    fn state_with(provider: ScriptedProvider) -> (AppState, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let state = AppState::with_provider(Config::for_local(), provider.clone());
        (state, provider)
    }

    async fn frames(response: Response, format: WireFormat) -> Vec<StreamEvent> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut splitter = FrameSplitter::new(format);
        splitter.push(&bytes);
        splitter
            .finish()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    #[test]
    fn test_profile_label() {
        let request: ChatRequest = serde_json::from_str(r#"{"prompt":"Hi"}"#).unwrap();
        assert_eq!(request.profile_label(), "Guest");
        assert!(request.stream);

        let request: ChatRequest =
            serde_json::from_str(r#"{"prompt":"Hi","profile":{"name":"Analyst"}}"#).unwrap();
        assert_eq!(request.profile_label(), "Analyst");

        let request: ChatRequest =
            serde_json::from_str(r#"{"prompt":"Hi","upn":"ada@example.com"}"#).unwrap();
        assert_eq!(request.profile_label(), "ada@example.com");
    }

    #[test]
    fn test_prompt_from_message_content() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message":{"role":"user","content":"From message"}}"#)
                .unwrap();
        assert_eq!(request.prompt_text(), Some("From message"));
        assert!(request.validate().is_ok());
    }

    #[tokio::test]
    async fn test_ndjson_stream() {
        let (state, provider) = state_with(ScriptedProvider::from_chunks(&["Hel", "lo"]));
        let store = state.store.clone();
        let response = create_router(state)
            .oneshot(json_request(Method::POST, CHAT, r#"{"prompt":"Hi","profile":"Analyst"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-ndjson"
        );

        let events = frames(response, WireFormat::Ndjson).await;
        let types: Vec<&str> = events.iter().map(StreamEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "statusUpdate",
                "statusUpdate",
                "statusUpdate",
                "messageChunk",
                "messageChunk",
                "documents",
                "finalMessage",
            ]
        );

        let messages = store.list_messages("seed-2").await.unwrap();
        let persisted: Vec<String> = messages.iter().rev().take(2).map(Message::text).collect();
        assert_eq!(persisted, vec!["Hello".to_string(), "Hi".to_string()]);

        let request = &provider.requests()[0];
        assert!(request.system.contains("Active user profile: Analyst."));
        assert!(request.system.contains("Conversation context id: seed-2."));
    }

    #[tokio::test]
    async fn test_sse_selected_by_accept_header() {
        let (state, _) = state_with(ScriptedProvider::from_chunks(&["ok"]));
        let mut request = json_request(Method::POST, CHAT, r#"{"prompt":"Hi"}"#);
        request
            .headers_mut()
            .insert(header::ACCEPT, "text/event-stream".parse().unwrap());

        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-transform"
        );

        let events = frames(response, WireFormat::Sse).await;
        assert!(events.last().is_some_and(StreamEvent::is_terminal));
    }

    #[tokio::test]
    async fn test_non_streaming_returns_final_message() {
        let (state, _) = state_with(ScriptedProvider::from_chunks(&["Hel", "lo"]));
        let response = create_router(state)
            .oneshot(json_request(Method::POST, CHAT, r#"{"prompt":"Hi","stream":false}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["type"], "finalMessage");
        assert_eq!(json["message"]["content"], "Hello");
        assert_eq!(json["message"]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_validation_error_opens_no_stream() {
        let (state, provider) = state_with(ScriptedProvider::from_chunks(&["x"]));
        let response = create_router(state)
            .oneshot(json_request(
                Method::POST,
                CHAT,
                r#"{"prompt":"  ","wireFormat":"xml"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert!(json["error"]["details"]["fieldErrors"]["prompt"].is_array());
        assert!(json["error"]["details"]["fieldErrors"]["wireFormat"].is_array());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_mistyped_body_is_validation_error() {
        let (state, provider) = state_with(ScriptedProvider::from_chunks(&["x"]));
        let response = create_router(state)
            .oneshot(json_request(Method::POST, CHAT, r#"{"prompt":5}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["message"], "Invalid request body");
        assert!(json["error"]["details"]["fieldErrors"]["prompt"][0]
            .as_str()
            .unwrap()
            .starts_with("invalid type"));
        assert_eq!(json["error"]["details"]["formErrors"].as_array().unwrap().len(), 1);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let (state, _) = state_with(ScriptedProvider::from_chunks(&["x"]));
        let response = create_router(state)
            .oneshot(json_request(
                Method::POST,
                "/api/v1/tenant/t/user/u/conversation/missing/chat",
                r#"{"prompt":"Hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_concurrent_send_rejected() {
        let (state, _) = state_with(
            ScriptedProvider::from_chunks(&["slow", "answer"])
                .with_step_delay(Duration::from_millis(200)),
        );
        let app = create_router(state);

        let first = app
            .clone()
            .oneshot(json_request(Method::POST, CHAT, r#"{"prompt":"Hi"}"#))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(json_request(Method::POST, CHAT, r#"{"prompt":"Again"}"#))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        // Draining the first stream releases the conversation
        let events = frames(first, WireFormat::Ndjson).await;
        assert!(events.last().is_some_and(StreamEvent::is_terminal));

        let third = app
            .oneshot(json_request(Method::POST, CHAT, r#"{"prompt":"Again"}"#))
            .await
            .unwrap();
        assert_eq!(third.status(), StatusCode::OK);
    }
}
