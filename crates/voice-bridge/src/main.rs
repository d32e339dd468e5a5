//! Voice satellite bridge: entry point.
//!
//! This binary lets a web page act as a voice satellite for a home-automation
//! hub.  Browsers connect over WebSocket (JSON control messages plus binary
//! PCM audio); the hub connects over TCP and speaks the satellite protocol.
//!
//! # Usage
//!
//! ```text
//! voice-bridge [OPTIONS]
//!
//! Options:
//!   --ws-bind <IP>              WebSocket listener interface [default: 0.0.0.0]
//!   --ws-port <PORT>            WebSocket listener port [default: 8765]
//!   --hub-bind <IP>             Hub listener interface [default: 0.0.0.0]
//!   --hub-port <PORT>           Hub listener port [default: 10400]
//!   --auth-token <TOKEN>        Shared secret browsers must send first
//!   --sample-rate <HZ>          Microphone sample rate [default: 16000]
//!   --chunk-duration-ms <MS>    Audio chunk length sent to the hub [default: 30]
//!   --ws-ping-interval <SECS>   WebSocket keepalive interval, 0 disables [default: 20]
//!   --config <PATH>             Optional TOML configuration file
//!   --log-level <FILTER>        Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! Precedence: command line (or its `VOICE_BRIDGE_*` environment variable),
//! then the config file, then built-in defaults.
//!
//! # Architecture overview
//!
//! ```text
//! Web Browser  (JSON + PCM over WebSocket, port 8765)
//!       ↕
//! voice-bridge  ← this process
//!   domain/          message types, BridgeEvent, BridgeConfig
//!   application/     rechunking, registries, translation
//!   infrastructure/  WebSocket server, hub server, config file
//!       ↕
//! Home-automation hub  (satellite protocol over TCP, port 10400)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_bridge::domain::BridgeConfig;
use voice_bridge::infrastructure::config_file::{load_config_file, FileConfig};
use voice_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Browser voice satellite bridge.
///
/// Every option is optional so that a value left unset on the command line
/// falls through to the config file.
#[derive(Debug, Default, Parser)]
#[command(
    name = "voice-bridge",
    about = "Bridges browser voice clients to a home-automation hub's satellite protocol",
    version
)]
struct Cli {
    /// IP address to bind the browser WebSocket listener to.
    #[arg(long, env = "VOICE_BRIDGE_WS_BIND")]
    ws_bind: Option<String>,

    /// TCP port for the browser WebSocket listener.
    #[arg(long, env = "VOICE_BRIDGE_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address to bind the hub listener to.
    #[arg(long, env = "VOICE_BRIDGE_HUB_BIND")]
    hub_bind: Option<String>,

    /// TCP port the hub connects to.
    #[arg(long, env = "VOICE_BRIDGE_HUB_PORT")]
    hub_port: Option<u16>,

    /// Shared secret browsers must present before anything else.
    ///
    /// An empty value disables authentication.
    #[arg(long, env = "VOICE_BRIDGE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Sample rate of the browser's microphone stream in Hz.
    #[arg(long, env = "VOICE_BRIDGE_SAMPLE_RATE")]
    sample_rate: Option<u32>,

    /// Duration of each audio chunk forwarded to the hub, in milliseconds.
    #[arg(long, env = "VOICE_BRIDGE_CHUNK_DURATION_MS")]
    chunk_duration_ms: Option<u32>,

    /// Seconds between WebSocket keepalive pings.  0 disables pings.
    #[arg(long, env = "VOICE_BRIDGE_WS_PING_INTERVAL")]
    ws_ping_interval: Option<u64>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "VOICE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, env = "VOICE_BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file named by `--config`, or the defaults when none
    /// is given.
    fn load_file(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// Overwrites every `file` value that was also given on the command line.
    fn apply_to(&self, file: &mut FileConfig) {
        if let Some(ws_bind) = &self.ws_bind {
            file.server.host = ws_bind.clone();
        }
        if let Some(port) = self.ws_port {
            file.server.port = port;
        }
        if let Some(hub_bind) = &self.hub_bind {
            file.server.hub_host = hub_bind.clone();
        }
        if let Some(port) = self.hub_port {
            file.server.hub_port = port;
        }
        if let Some(token) = &self.auth_token {
            file.server.auth_token = Some(token.clone());
        }
        if let Some(rate) = self.sample_rate {
            file.audio.sample_rate = rate;
        }
        if let Some(ms) = self.chunk_duration_ms {
            file.audio.chunk_duration_ms = ms;
        }
        if let Some(secs) = self.ws_ping_interval {
            file.server.ws_ping_interval_secs = secs;
        }
        if let Some(level) = &self.log_level {
            file.logging.level = level.clone();
        }
    }

    /// Merges the command line over `file` and builds a [`BridgeConfig`].
    ///
    /// Returns the merged file view too, so the caller can read settings that
    /// are not part of the runtime config (the log level).
    fn into_bridge_config(self, mut file: FileConfig) -> anyhow::Result<(BridgeConfig, FileConfig)> {
        self.apply_to(&mut file);
        let config = file.to_bridge_config().context("invalid configuration")?;
        Ok((config, file))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Parses the command line and loads the optional config file.
/// 2. Initialises `tracing_subscriber`; `RUST_LOG` wins over the configured
///    level.
/// 3. Spawns a Ctrl+C handler that clears the shared `running` flag.
/// 4. Calls [`run_server`], which serves both listeners until the flag is
///    cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.load_file()?;
    let (config, file) = cli.into_bridge_config(file)?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&file.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        "voice bridge starting: ws={}, hub={}, audio={} Hz / {} ms",
        config.ws_bind_addr, config.hub_bind_addr, config.audio.sample_rate, config.audio.chunk_duration_ms
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("voice bridge exited cleanly");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
