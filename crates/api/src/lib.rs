//! chatrelay API library
//!
//! Backend for the chat relay: configuration, the conversation store, the
//! upstream completion consumer, the downstream relay encoder and the HTTP
//! routes that tie them together.

pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod relay;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
