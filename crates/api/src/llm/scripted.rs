//! Deterministic providers: a scripted one for tests and an echo one for
//! running without upstream credentials.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;

use super::{CompletionProvider, CompletionRequest, UpstreamError, UpstreamEvent, UpstreamStream};

/// One step of a scripted completion
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Text(String),
    ToolCall { name: String, arguments: String },
    /// Non-fatal provider error
    ProviderError(String),
    /// Terminal transport failure; nothing after it is played
    Fail(String),
    /// End without a completion marker
    Truncate,
}

#[derive(Debug, Clone)]
enum Mode {
    Script(Vec<ScriptStep>),
    Echo,
}

/// Provider that replays a fixed script, or streams the prompt back word by word
#[derive(Debug)]
pub struct ScriptedProvider {
    mode: Mode,
    open_error: Option<(u16, String)>,
    step_delay: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self::with_mode(Mode::Script(steps))
    }

    /// Script made only of text deltas
    pub fn from_chunks(chunks: &[&str]) -> Self {
        Self::new(
            chunks
                .iter()
                .map(|chunk| ScriptStep::Text(chunk.to_string()))
                .collect(),
        )
    }

    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    /// Provider whose stream never opens
    pub fn failing_open(status: u16, body: impl Into<String>) -> Self {
        Self {
            open_error: Some((status, body.into())),
            ..Self::new(Vec::new())
        }
    }

    /// Pause between events
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            open_error: None,
            step_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn events_for(&self, request: &CompletionRequest) -> Vec<Result<UpstreamEvent, UpstreamError>> {
        let steps = match &self.mode {
            Mode::Script(steps) => steps.clone(),
            Mode::Echo => request
                .prompt
                .split_inclusive(' ')
                .map(|word| ScriptStep::Text(word.to_string()))
                .collect(),
        };

        let mut events = Vec::with_capacity(steps.len() + 1);
        for step in steps {
            match step {
                ScriptStep::Text(text) => events.push(Ok(UpstreamEvent::TextDelta(text))),
                ScriptStep::ToolCall { name, arguments } => {
                    events.push(Ok(UpstreamEvent::ToolCallDelta {
                        id: Some(format!("call-{}", events.len())),
                        name: Some(name),
                        arguments,
                    }))
                }
                ScriptStep::ProviderError(message) => {
                    events.push(Ok(UpstreamEvent::Error(message)))
                }
                ScriptStep::Fail(message) => {
                    events.push(Err(UpstreamError::Transport(message)));
                    return events;
                }
                ScriptStep::Truncate => {
                    events.push(Err(UpstreamError::Truncated));
                    return events;
                }
            }
        }
        events.push(Ok(UpstreamEvent::Finished {
            reason: Some("stop".to_string()),
        }));
        events
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Script(_) => "scripted",
            Mode::Echo => "echo",
        }
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<UpstreamStream, UpstreamError> {
        let events = self.events_for(&request);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        if let Some((status, body)) = &self.open_error {
            return Err(UpstreamError::Status {
                status: *status,
                body: body.clone(),
            });
        }

        let delay = self.step_delay;
        Ok(futures::stream::iter(events)
            .then(move |event| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                event
            })
            .boxed())
    }
}
