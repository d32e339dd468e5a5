//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from CLI arguments, environment variables and
//! an optional TOML file (see `infrastructure::config_file`), or from
//! [`BridgeConfig::default`] in tests.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the bridge easy to embed in tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde_json::Value;

/// Default port for browser WebSocket connections.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Default port the hub connects to (satellite-protocol convention).
pub const DEFAULT_HUB_PORT: u16 = 10400;

/// Bytes per sample for the 16-bit PCM the browser sends.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Microphone audio settings used to size outgoing hub chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    /// Sample rate of the browser's PCM stream in Hz.
    pub sample_rate: u32,
    /// Duration of one chunk sent to the hub, in milliseconds.
    pub chunk_duration_ms: u32,
}

impl AudioSettings {
    /// Number of bytes in one outgoing chunk.
    ///
    /// `sample_rate * chunk_duration_ms / 1000` samples (integer division),
    /// two bytes each.  16 kHz at 30 ms gives 960 bytes.
    pub fn chunk_size(&self) -> usize {
        let samples = self.sample_rate as usize * self.chunk_duration_ms as usize / 1000;
        samples * BYTES_PER_SAMPLE
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_duration_ms: 30,
        }
    }
}

/// All runtime configuration for the voice bridge.
///
/// Wrap it in an `Arc` after startup so it can be shared across session tasks.
///
/// # Example
///
/// ```rust
/// use voice_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8765);
/// assert_eq!(cfg.audio.chunk_size(), 960);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the browser-facing WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Address the hub-facing satellite-protocol listener binds to.
    pub hub_bind_addr: SocketAddr,

    /// Shared secret browsers must present in their first message.
    ///
    /// `None` disables authentication entirely.
    pub auth_token: Option<String>,

    /// How long a new browser session may take to send its `auth` message.
    pub auth_timeout: Duration,

    /// Interval between WebSocket protocol pings sent to each browser.
    pub ws_ping_interval: Duration,

    /// Microphone stream parameters.
    pub audio: AudioSettings,

    /// Opaque block handed to browsers verbatim in `status` replies.
    pub client_config: Value,
}

impl Default for BridgeConfig {
    /// | Field            | Default          |
    /// |------------------|------------------|
    /// | ws_bind_addr     | `0.0.0.0:8765`   |
    /// | hub_bind_addr    | `0.0.0.0:10400`  |
    /// | auth_token       | none             |
    /// | auth_timeout     | 5 seconds        |
    /// | ws_ping_interval | 20 seconds       |
    /// | audio            | 16 kHz, 30 ms    |
    /// | client_config    | `{}`             |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_WS_PORT)),
            hub_bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HUB_PORT)),
            auth_token: None,
            auth_timeout: Duration::from_secs(5),
            ws_ping_interval: Duration::from_secs(20),
            audio: AudioSettings::default(),
            client_config: Value::Object(Default::default()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
