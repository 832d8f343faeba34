//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chatrelay_shared::WireFormat;

/// Which upstream completion provider serves chat requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions API
    OpenAi,
    /// Local provider that streams the prompt back, for development without credentials
    Echo,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub max_request_body_bytes: usize,
    pub cors_allow_any: bool,

    // Upstream
    pub provider: ProviderKind,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub default_model: String,
    pub upstream_timeout_ms: u64,
    pub upstream_max_retries: usize,

    // Relay
    pub status_interval_ms: u64,
    pub wire_format: WireFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match env::var("UPSTREAM_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "openai" => ProviderKind::OpenAi,
            "echo" => ProviderKind::Echo,
            _ => {
                return Err(ConfigError::Invalid(
                    "UPSTREAM_PROVIDER must be one of: openai, echo",
                ))
            }
        };

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8787".to_string()),
            max_request_body_bytes: parse_var(
                "MAX_REQUEST_BODY_BYTES",
                1048576, // 1MB default
                "MAX_REQUEST_BODY_BYTES must be a positive integer",
            )?,
            cors_allow_any: parse_var(
                "CORS_ALLOW_ANY",
                true,
                "CORS_ALLOW_ANY must be true or false",
            )?,

            // Upstream
            provider,
            openai_api_key: match provider {
                ProviderKind::OpenAi => {
                    let key = env::var("OPENAI_API_KEY")
                        .map_err(|_| ConfigError::Missing("OPENAI_API_KEY"))?;
                    if key.trim().is_empty() {
                        return Err(ConfigError::Missing("OPENAI_API_KEY"));
                    }
                    key
                }
                ProviderKind::Echo => env::var("OPENAI_API_KEY").unwrap_or_default(),
            },
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            default_model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            upstream_timeout_ms: parse_var(
                "UPSTREAM_TIMEOUT_MS",
                60000,
                "UPSTREAM_TIMEOUT_MS must be a whole number of milliseconds",
            )?,
            upstream_max_retries: parse_var(
                "UPSTREAM_MAX_RETRIES",
                2,
                "UPSTREAM_MAX_RETRIES must be a non-negative integer",
            )?,

            // Relay
            status_interval_ms: parse_var(
                "STATUS_INTERVAL_MS",
                400,
                "STATUS_INTERVAL_MS must be a whole number of milliseconds",
            )?,
            wire_format: env::var("WIRE_FORMAT")
                .unwrap_or_else(|_| "ndjson".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("WIRE_FORMAT must be one of: ndjson, sse"))?,
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Configuration for tests and local runs: echo provider, no pacing delay
    pub fn for_local() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            max_request_body_bytes: 1048576,
            cors_allow_any: true,
            provider: ProviderKind::Echo,
            openai_api_key: String::new(),
            openai_base_url: "http://localhost".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            upstream_timeout_ms: 5000,
            upstream_max_retries: 0,
            status_interval_ms: 0,
            wire_format: WireFormat::Ndjson,
        }
    }
}

/// Parse an optional variable, falling back to `default` only when it is unset
fn parse_var<T: FromStr>(name: &str, default: T, invalid: &'static str) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(invalid)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
