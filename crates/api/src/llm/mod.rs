//! Upstream completion providers
//!
//! A provider opens one streamed completion and hands back a lazy,
//! single-pass sequence of [`UpstreamEvent`]s. Items are `Result`s:
//!
//! - `Ok(UpstreamEvent::Error(..))` is a provider-reported problem; the
//!   stream may still produce more text afterwards.
//! - `Err(UpstreamError)` is terminal. Nothing follows it, and the caller
//!   keeps whatever text it already received.
//!
//! A stream that stops without a completion marker ends with
//! `Err(UpstreamError::Truncated)` instead of silently finishing.

pub mod openai;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Config, ProviderKind};

pub use openai::OpenAiProvider;
pub use scripted::{ScriptStep, ScriptedProvider};

/// A function the model may call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One streamed completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Provider-neutral event in a completion stream
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Next fragment of generated text
    TextDelta(String),
    /// Fragment of a tool call; `arguments` is partial JSON text
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Non-fatal error reported by the provider
    Error(String),
    /// Generation finished
    Finished { reason: Option<String> },
}

/// Error type for upstream operations
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timeout waiting for upstream response")]
    Timeout,

    #[error("Stream transport failed: {0}")]
    Transport(String),

    #[error("Stream ended before completion")]
    Truncated,
}

impl UpstreamError {
    /// Returns true if opening the stream again may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Http(e) => e.is_connect() || e.is_timeout(),
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Timeout => true,

            UpstreamError::Transport(_) => false,
            UpstreamError::Truncated => false,
        }
    }
}

/// Lazy sequence of upstream events
pub type UpstreamStream = BoxStream<'static, Result<UpstreamEvent, UpstreamError>>;

/// Source of streamed completions
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Open a streamed completion
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<UpstreamStream, UpstreamError>;
}

/// Build the provider selected by configuration
pub fn build_provider(config: &Config) -> Result<Arc<dyn CompletionProvider>, UpstreamError> {
    let provider: Arc<dyn CompletionProvider> = match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(config)?),
        ProviderKind::Echo => Arc::new(ScriptedProvider::echo()),
    };
    tracing::info!(provider = provider.name(), "Completion provider ready");
    Ok(provider)
}
