//! Application layer for voice-bridge.
//!
//! The application layer knows *what* the bridge does with each message; the
//! infrastructure layer knows *how* bytes reach a socket.
//!
//! # Responsibilities
//!
//! - Rechunking browser microphone audio into fixed-size frames
//! - Tracking browser sessions and hub sessions, and fanning messages out
//! - Translating between browser JSON, hub events and [`BridgeEvent`](crate::domain::BridgeEvent)
//! - The wake-word handshake and per-session hub replies
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections
//! - WebSocket framing (handled by tokio-tungstenite)
//! - Satellite-protocol framing (handled by satellite-core)

pub mod audio_rechunker;
pub mod bridge_service;
pub mod client_registry;
pub mod handler_registry;
pub mod translator;
pub mod transport;

pub use audio_rechunker::{AudioFrame, AudioRechunker};
pub use bridge_service::{BridgeService, BridgeWorkers, UpstreamEvents};
pub use client_registry::{BrowserSession, ClientRegistry};
pub use handler_registry::{HandlerRegistry, HubSession};
pub use transport::{InboundFrame, OutboundFrame, SessionSink, SinkError};
