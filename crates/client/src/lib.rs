//! chatrelay client
//!
//! Decodes streamed chat responses and keeps per-conversation state in step
//! with them. [`ChatSession`] ties the HTTP client to the store.

pub mod decoder;
pub mod error;
pub mod http;
pub mod session;
pub mod store;

pub use decoder::{decode_stream, ChatCompletion, StreamDecoder, StreamSink};
pub use error::{ClientError, ClientResult};
pub use http::{ChatClient, ChatOptions};
pub use session::ChatSession;
pub use store::{ActiveStreamState, ConversationStore, StreamTicket};
