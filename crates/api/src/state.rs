//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::llm::{build_provider, CompletionProvider, UpstreamError};
use crate::relay::{InFlight, Relay, RelayOptions};
use crate::store::{Catalog, ConversationRepository, InMemoryStore};

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConversationRepository>,
    pub provider: Arc<dyn CompletionProvider>,
    pub catalog: Arc<Catalog>,
    pub in_flight: InFlight,
}

impl AppState {
    /// State backed by the seeded in-memory store and the configured provider
    pub fn from_config(config: Config) -> Result<Self, UpstreamError> {
        let provider = build_provider(&config)?;
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: Config, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(InMemoryStore::seeded()),
            provider,
            catalog: Arc::new(Catalog::default()),
            in_flight: InFlight::new(),
        }
    }

    /// Relay for one chat turn, framed as requested
    pub fn relay(&self, options: RelayOptions) -> Relay {
        Relay::new(self.store.clone(), self.provider.clone(), options)
    }
}
