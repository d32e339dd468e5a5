//! Domain layer for voice-bridge.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes.
//!
//! # What belongs in the domain layer?
//!
//! - Message types (the JSON "language" between browser and bridge)
//! - The canonical [`BridgeEvent`] that crosses the bridge in either direction
//! - Configuration structures
//! - Session identity types
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod events;
pub mod messages;
pub mod session;

pub use config::{AudioSettings, BridgeConfig};
pub use events::BridgeEvent;
pub use messages::{BridgeToBrowserMsg, BrowserToBridgeMsg, VoiceEventData, VoiceEventType};
pub use session::SessionId;
