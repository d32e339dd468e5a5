//! Protocol module containing the event types and the wire codec.

pub mod codec;
pub mod events;

pub use codec::{decode_event, encode_event, ProtocolError};
pub use events::*;
