//! chatrelay shared types and wire protocol
//!
//! This crate contains the message model, the stream event union and the
//! frame codec shared by the relay backend and its clients.

pub mod error;
pub mod events;
pub mod framing;
pub mod types;

pub use error::*;
pub use events::*;
pub use framing::{FrameSplitter, WireFormat};
pub use types::*;
