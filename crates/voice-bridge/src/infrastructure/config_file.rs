//! Optional TOML configuration file.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8765
//! hub_host = "0.0.0.0"
//! hub_port = 10400
//! auth_token = "change-me"
//! ws_ping_interval_secs = 20
//!
//! [audio]
//! sample_rate = 16000
//! chunk_duration_ms = 30
//!
//! [logging]
//! level = "info"
//!
//! # Handed to browsers verbatim in `status` replies.
//! [client]
//! wake_word = "ok_nabu"
//! vad_threshold = 0.5
//! ```
//!
//! Every field is optional; absent fields take the same defaults as
//! [`BridgeConfig::default`].  Command-line flags override file values (see
//! `main.rs`).

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{AudioSettings, BridgeConfig, DEFAULT_HUB_PORT, DEFAULT_WS_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A host value is not an IP address.
    #[error("invalid {field} address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    /// The `[client]` table cannot be represented as JSON.
    #[error("client config block is not JSON-compatible: {0}")]
    ClientBlock(#[from] serde_json::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Opaque block for the browser client.
    #[serde(default)]
    pub client: toml::Table,
}

/// Listener and authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Interface for the browser WebSocket listener.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
    /// Interface for the hub listener.
    #[serde(default = "default_host")]
    pub hub_host: String,
    #[serde(default = "default_hub_port")]
    pub hub_port: u16,
    /// Shared secret browsers must send first.  Absent disables auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Seconds between WebSocket keepalive pings; 0 disables them.
    #[serde(default = "default_ws_ping_interval_secs")]
    pub ws_ping_interval_secs: u64,
}

/// Microphone stream parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSection {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_chunk_duration_ms")]
    pub chunk_duration_ms: u32,
}

/// `tracing` filter used when `RUST_LOG` is not set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ws_port() -> u16 {
    DEFAULT_WS_PORT
}

fn default_hub_port() -> u16 {
    DEFAULT_HUB_PORT
}

fn default_ws_ping_interval_secs() -> u64 {
    20
}

fn default_sample_rate() -> u32 {
    AudioSettings::default().sample_rate
}

fn default_chunk_duration_ms() -> u32 {
    AudioSettings::default().chunk_duration_ms
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_ws_port(),
            hub_host: default_host(),
            hub_port: default_hub_port(),
            auth_token: None,
            ws_ping_interval_secs: default_ws_ping_interval_secs(),
        }
    }
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunk_duration_ms: default_chunk_duration_ms(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Loading and conversion ────────────────────────────────────────────────────

/// Reads and parses the file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read (including when it
/// does not exist; an explicitly named file is required) and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

impl FileConfig {
    /// Builds the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for a host that is not an IP
    /// address and [`ConfigError::ClientBlock`] if the `[client]` table
    /// cannot be converted to JSON.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let ws_ip = parse_ip("server.host", &self.server.host)?;
        let hub_ip = parse_ip("server.hub_host", &self.server.hub_host)?;

        Ok(BridgeConfig {
            ws_bind_addr: SocketAddr::new(ws_ip, self.server.port),
            hub_bind_addr: SocketAddr::new(hub_ip, self.server.hub_port),
            auth_token: self.server.auth_token.clone().filter(|t| !t.is_empty()),
            ws_ping_interval: Duration::from_secs(self.server.ws_ping_interval_secs),
            audio: AudioSettings {
                sample_rate: self.audio.sample_rate,
                chunk_duration_ms: self.audio.chunk_duration_ms,
            },
            client_config: serde_json::to_value(&self.client)?,
            ..BridgeConfig::default()
        })
    }
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
