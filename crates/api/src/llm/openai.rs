//! OpenAI-compatible chat completions provider
//!
//! Posts to `{base}/chat/completions` with `stream: true` and decodes the
//! server-sent event body into [`UpstreamEvent`]s as bytes arrive.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chatrelay_shared::{FrameSplitter, WireFormat};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{CompletionProvider, CompletionRequest, UpstreamError, UpstreamEvent, UpstreamStream};
use crate::config::Config;

/// Initial backoff duration for retries (100ms)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Maximum backoff duration for retries (5 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    max_retries: usize,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
            max_retries,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        Self::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.upstream_timeout(),
            config.upstream_max_retries,
        )
    }

    fn request_body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| json!({ "type": "function", "function": tool }))
                .collect();
        }
        body
    }

    /// Send the request once and check the status line
    async fn open(&self, body: &Value) -> Result<reqwest::Response, UpstreamError> {
        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| UpstreamError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Open the stream, retrying transient failures with exponential backoff.
    ///
    /// Only the request that opens the stream is retried. Once bytes have
    /// been handed to the caller a failure is terminal.
    async fn open_with_retry(&self, body: &Value) -> Result<reqwest::Response, UpstreamError> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(self.max_retries)
            .map(jitter);

        Retry::spawn(retry_strategy, move || async move {
            let result = self.open(body).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(error = %e, "Transient upstream error - will retry");
                    Err(result)
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Permanent upstream error - will not retry");
                    Ok(result)
                }
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<UpstreamStream, UpstreamError> {
        let body = Self::request_body(&request);

        tracing::debug!(
            model = %request.model,
            tools = request.tools.len(),
            "Opening upstream completion stream"
        );

        let response = self.open_with_retry(&body).await?;
        Ok(decode_sse_body(response.bytes_stream()))
    }
}

// =============================================================================
// Body decoding
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallChunk>,
}

#[derive(Debug, Deserialize)]
struct ToolCallChunk {
    id: Option<String>,
    function: Option<FunctionChunk>,
}

#[derive(Debug, Deserialize)]
struct FunctionChunk {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: Option<String>,
}

/// Map one `data:` payload to the events it carries
fn parse_chunk(data: &str) -> Vec<UpstreamEvent> {
    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed upstream chunk");
            return vec![UpstreamEvent::Error(format!("Malformed upstream chunk: {}", e))];
        }
    };

    if let Some(error) = payload.error {
        return vec![UpstreamEvent::Error(
            error
                .message
                .unwrap_or_else(|| "Model stream encountered an error.".to_string()),
        )];
    }

    let mut events = Vec::new();
    for choice in payload.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(UpstreamEvent::TextDelta(content));
        }
        for call in choice.delta.tool_calls {
            let (name, arguments) = match call.function {
                Some(function) => (function.name, function.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            events.push(UpstreamEvent::ToolCallDelta {
                id: call.id,
                name,
                arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            events.push(UpstreamEvent::Finished {
                reason: Some(reason),
            });
        }
    }
    events
}

struct BodyState {
    body: BoxStream<'static, Result<Bytes, String>>,
    splitter: FrameSplitter,
    pending: VecDeque<Result<UpstreamEvent, UpstreamError>>,
    finished: bool,
    done: bool,
}

impl BodyState {
    fn handle_payload(&mut self, payload: &str) {
        if self.done {
            return;
        }
        if payload == DONE_MARKER {
            if !self.finished {
                self.pending
                    .push_back(Ok(UpstreamEvent::Finished { reason: None }));
            }
            self.finished = true;
            self.done = true;
            return;
        }
        for event in parse_chunk(payload) {
            if matches!(event, UpstreamEvent::Finished { .. }) {
                if self.finished {
                    continue;
                }
                self.finished = true;
            }
            self.pending.push_back(Ok(event));
        }
    }
}

/// Decode an SSE completion body into upstream events
pub(crate) fn decode_sse_body<S, E>(body: S) -> UpstreamStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display,
{
    let state = BodyState {
        body: body.map_err(|e| e.to_string()).boxed(),
        splitter: FrameSplitter::new(WireFormat::Sse),
        pending: VecDeque::new(),
        finished: false,
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            if let Some(payload) = state.splitter.next_frame() {
                state.handle_payload(&payload);
                continue;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => state.splitter.push(&bytes),
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(UpstreamError::Transport(e)));
                }
                None => {
                    for payload in state.splitter.finish() {
                        state.handle_payload(&payload);
                    }
                    if !state.finished {
                        state.pending.push_back(Err(UpstreamError::Truncated));
                    }
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
