//! Downstream relay encoder
//!
//! Drives one chat turn from the upstream provider to a downstream frame sink:
//!
//! 1. three synthetic `statusUpdate` frames at a fixed cadence
//! 2. one `messageChunk` per text delta, appended to an accumulator
//! 3. provider errors as a non-fatal notice, after which the stream continues
//! 4. an optional `documents` frame, the persisted assistant message, then
//!    exactly one `finalMessage`
//!
//! A terminal upstream failure produces a notice and no `finalMessage`. A
//! closed sink stops the loop at the next write and nothing is persisted.

pub mod guard;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chatrelay_shared::{Message, Source, StreamEvent, WireFormat};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::{ApiError, ApiResult};
use crate::llm::{CompletionProvider, CompletionRequest, ToolDefinition, UpstreamEvent};
use crate::store::ConversationRepository;

pub use guard::{InFlight, InFlightGuard};

/// Status frames sent before the upstream stream is consumed
pub const STATUS_MESSAGES: [&str; 3] = [
    "Preparing request…",
    "Gathering context…",
    "Warming up the model…",
];

/// Notice for a provider error without its own text
pub const PROVIDER_ERROR_FALLBACK: &str = "Model stream encountered an error.";

/// Notice sent when the relay fails before completing
pub const STREAM_FAILURE_MESSAGE: &str = "Internal server error while streaming chat response.";

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub status_messages: Vec<String>,
    pub status_interval: Duration,
    pub format: WireFormat,
}

impl RelayOptions {
    pub fn new(status_interval: Duration, format: WireFormat) -> Self {
        Self {
            status_messages: STATUS_MESSAGES.iter().map(|s| s.to_string()).collect(),
            status_interval,
            format,
        }
    }

    /// Non-fatal notice in the framing's vocabulary: `error` frames exist only in SSE
    fn notice(&self, content: impl Into<String>) -> StreamEvent {
        match self.format {
            WireFormat::Ndjson => StreamEvent::status(content),
            WireFormat::Sse => StreamEvent::error(content),
        }
    }
}

/// Everything the relay needs to answer one prompt
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub conversation_id: String,
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub tools: Vec<ToolDefinition>,
    pub sources: Vec<Source>,
}

impl ChatTurn {
    fn completion_request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: self.system.clone(),
            prompt: self.prompt.clone(),
            tools: self.tools.clone(),
            max_tokens: None,
        }
    }
}

/// How a relay run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// `finalMessage` was written with the persisted message
    Completed(Message),
    /// A failure notice was written instead of `finalMessage`
    Failed(String),
    /// The downstream connection went away
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
#[error("Downstream connection closed")]
pub struct SinkClosed;

/// Destination for encoded frames
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed>;
}

/// Sink feeding a streaming response body
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
    format: WireFormat,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, Infallible>>, format: WireFormat) -> Self {
        Self { tx, format }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        let frame = match self.format.encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, event = event.event_type(), "Failed to encode frame");
                return Ok(());
            }
        };
        self.tx
            .send(Ok(Bytes::from(frame)))
            .await
            .map_err(|_| SinkClosed)
    }
}

/// Relays completions for chat turns
pub struct Relay {
    store: Arc<dyn ConversationRepository>,
    provider: Arc<dyn CompletionProvider>,
    options: RelayOptions,
}

impl Relay {
    pub fn new(
        store: Arc<dyn ConversationRepository>,
        provider: Arc<dyn CompletionProvider>,
        options: RelayOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Stream one turn into `sink`
    pub async fn run<S: FrameSink + ?Sized>(&self, turn: ChatTurn, sink: &mut S) -> RelayOutcome {
        let conversation_id = turn.conversation_id.clone();

        for status in &self.options.status_messages {
            if sink.send(StreamEvent::status(status.as_str())).await.is_err() {
                return disconnected(&conversation_id);
            }
            if !self.options.status_interval.is_zero() {
                tokio::time::sleep(self.options.status_interval).await;
            }
        }

        let mut stream = match self.provider.stream_completion(turn.completion_request()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "Failed to open upstream stream");
                return self.fail(sink, &conversation_id).await;
            }
        };

        let mut accumulated = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(UpstreamEvent::TextDelta(text)) => {
                    accumulated.push_str(&text);
                    if sink.send(StreamEvent::chunk(text)).await.is_err() {
                        return disconnected(&conversation_id);
                    }
                }
                Ok(UpstreamEvent::ToolCallDelta { id, name, arguments }) => {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        tool_call_id = ?id,
                        tool = ?name,
                        arguments_len = arguments.len(),
                        "Upstream tool call delta"
                    );
                }
                Ok(UpstreamEvent::Error(message)) => {
                    tracing::warn!(conversation_id = %conversation_id, error = %message, "Upstream provider error");
                    let text = if message.trim().is_empty() {
                        PROVIDER_ERROR_FALLBACK.to_string()
                    } else {
                        message
                    };
                    if sink.send(self.options.notice(text)).await.is_err() {
                        return disconnected(&conversation_id);
                    }
                }
                Ok(UpstreamEvent::Finished { reason }) => {
                    tracing::debug!(conversation_id = %conversation_id, reason = ?reason, "Upstream finished");
                }
                Err(e) => {
                    tracing::error!(
                        conversation_id = %conversation_id,
                        error = %e,
                        received = accumulated.len(),
                        "Upstream stream failed"
                    );
                    return self.fail(sink, &conversation_id).await;
                }
            }
        }
        drop(stream);

        if !turn.sources.is_empty()
            && sink
                .send(StreamEvent::documents(turn.sources.clone()))
                .await
                .is_err()
        {
            return disconnected(&conversation_id);
        }

        let message = Message::assistant(accumulated).with_sources(turn.sources);
        let message = match self.store.append_message(&conversation_id, message).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "Failed to persist assistant message");
                return self.fail(sink, &conversation_id).await;
            }
        };

        if sink
            .send(StreamEvent::final_message(message.clone()))
            .await
            .is_err()
        {
            tracing::debug!(conversation_id = %conversation_id, "Client left before the final message");
        }

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            "Chat stream completed"
        );
        RelayOutcome::Completed(message)
    }

    /// Answer one turn without streaming: consume upstream and persist the result
    pub async fn complete(&self, turn: ChatTurn) -> ApiResult<Message> {
        let mut stream = self.provider.stream_completion(turn.completion_request()).await?;

        let mut accumulated = String::new();
        while let Some(item) = stream.next().await {
            match item? {
                UpstreamEvent::TextDelta(text) => accumulated.push_str(&text),
                UpstreamEvent::Error(message) => {
                    tracing::warn!(conversation_id = %turn.conversation_id, error = %message, "Upstream provider error");
                }
                UpstreamEvent::ToolCallDelta { .. } | UpstreamEvent::Finished { .. } => {}
            }
        }

        let message = Message::assistant(accumulated).with_sources(turn.sources);
        self.store
            .append_message(&turn.conversation_id, message)
            .await
            .map_err(ApiError::from)
    }

    async fn fail<S: FrameSink + ?Sized>(&self, sink: &mut S, conversation_id: &str) -> RelayOutcome {
        if sink.send(self.options.notice(STREAM_FAILURE_MESSAGE)).await.is_err() {
            return disconnected(conversation_id);
        }
        RelayOutcome::Failed(STREAM_FAILURE_MESSAGE.to_string())
    }
}

fn disconnected(conversation_id: &str) -> RelayOutcome {
    tracing::info!(conversation_id = %conversation_id, "Client disconnected, relay stopped");
    RelayOutcome::Disconnected
}
