//! # satellite-core
//!
//! Shared library for the voice bridge containing the satellite-protocol
//! event model and its wire codec.
//!
//! It has zero dependencies on sockets, async runtimes, or the browser side
//! of the bridge.
//!
//! # Architecture overview (for beginners)
//!
//! A home-automation hub drives remote microphones/speakers ("satellites")
//! with a small event protocol.  Every event is a `type` string, a JSON
//! `data` object, and an optional binary `payload` (usually PCM audio).
//!
//! This crate defines:
//!
//! - **`protocol::events`** – the generic [`Event`] envelope plus the typed
//!   [`SatelliteMessage`] enum the bridge actually matches on.
//!
//! - **`protocol::codec`** – how events travel over TCP: one JSON header
//!   line, then the data bytes, then the payload bytes.  Decoding works on a
//!   growing receive buffer and reports "need more bytes" as a distinct error
//!   so a reader loop knows when to go back to the socket.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `satellite_core::SatelliteMessage` instead of the full module path.
pub use protocol::codec::{decode_event, encode_event, ProtocolError};
pub use protocol::events::{Event, SatelliteMessage};
