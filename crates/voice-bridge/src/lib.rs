//! voice-bridge library crate.
//!
//! This crate lets a web browser act as a voice satellite for a
//! home-automation hub.  The browser speaks JSON + raw PCM over WebSocket;
//! the hub speaks the satellite event protocol over TCP.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON + binary PCM over WebSocket)
//!         ↕
//! [voice-bridge]
//!   ├── domain/           Pure types: browser messages, BridgeEvent, BridgeConfig
//!   ├── application/      Rechunker, both session registries, translator, BridgeService
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── hub_server/ Satellite-protocol TCP listener (satellite-core codec)
//!         └── config_file/ Optional TOML configuration
//!         ↕
//! Hub (satellite protocol over TCP, port 10400)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `satellite-core`; it talks to
//!   connections only through the [`application::SessionSink`] trait.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: audio rechunking, registries, translation, coordination.
pub mod application;

/// Infrastructure layer: WebSocket server, hub TCP server, config file.
pub mod infrastructure;
