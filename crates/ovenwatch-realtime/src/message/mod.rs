//! Wire messages: outbound envelope, inbound schema, validation.

pub mod types;
pub mod validator;

pub use types::{Decoded, InboundMessage, OutboundMessage};
