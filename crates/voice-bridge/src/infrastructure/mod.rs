//! Infrastructure layer for voice-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from browsers and satellite-protocol connections from the hub, and reading
//! the optional configuration file.
//!
//! # Responsibilities
//!
//! - Binding both TCP listeners and running their accept loops
//! - Performing the WebSocket upgrade handshake and keepalive pings
//! - Framing satellite-protocol events on hub connections
//! - Spawning per-session Tokio tasks and unregistering them on exit
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Translation and fan-out logic (application layer)
//! - Message type definitions (domain layer)

pub mod config_file;
pub mod hub_server;
pub mod server;
pub mod ws_server;

pub use server::{run_server, BridgeServer};
