//! Listener setup and accept loops for both sides of the bridge.
//!
//! [`BridgeServer::bind`] opens the browser WebSocket listener and the hub
//! listener up front, so bind failures surface before anything runs and
//! callers (tests in particular) can read the actual ports.
//! [`BridgeServer::run`] then accepts on both until the shared `running`
//! flag is cleared.
//!
//! Every accepted connection gets its own Tokio task.  The accept loops
//! use a short accept timeout so they notice shutdown even when idle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::application::BridgeService;
use crate::domain::{BridgeConfig, SessionId};
use crate::infrastructure::{hub_server, ws_server};

/// How long one `accept()` may block before the `running` flag is rechecked.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Both bound listeners plus the configuration they serve.
pub struct BridgeServer {
    config: BridgeConfig,
    ws_listener: TcpListener,
    hub_listener: TcpListener,
}

impl BridgeServer {
    /// Binds the WebSocket and hub listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if either address cannot be bound (port in use,
    /// missing permission).
    pub async fn bind(config: BridgeConfig) -> anyhow::Result<Self> {
        let ws_listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;
        let hub_listener = TcpListener::bind(config.hub_bind_addr)
            .await
            .with_context(|| format!("failed to bind hub listener on {}", config.hub_bind_addr))?;

        Ok(Self {
            config,
            ws_listener,
            hub_listener,
        })
    }

    /// Actual address of the WebSocket listener.
    pub fn ws_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.ws_listener.local_addr()
    }

    /// Actual address of the hub listener.
    pub fn hub_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.hub_listener.local_addr()
    }

    /// Serves both listeners until `running` is set to `false`.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let Self {
            config,
            ws_listener,
            hub_listener,
        } = self;

        let (bridge, upstream) = BridgeService::new(&config);
        let workers = bridge.spawn_workers(upstream);

        info!("WebSocket server listening on {}", ws_listener.local_addr()?);
        info!("satellite server listening on {}", hub_listener.local_addr()?);
        if config.auth_token.is_some() {
            info!("browser authentication enabled");
        }

        let ping_interval = config.ws_ping_interval;
        let browsers = {
            let bridge = Arc::clone(&bridge);
            accept_loop(ws_listener, "browser", Arc::clone(&running), move |stream, peer_addr| {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(ws_server::handle_browser_connection(stream, peer_addr, bridge, ping_interval));
            })
        };
        let hubs = {
            let bridge = Arc::clone(&bridge);
            accept_loop(hub_listener, "hub", running, move |stream, peer_addr| {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(hub_server::handle_hub_connection(stream, peer_addr, bridge));
            })
        };

        tokio::join!(browsers, hubs);
        workers.shutdown();
        info!("bridge stopped");
        Ok(())
    }
}

/// Binds and serves until `running` is cleared.
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    BridgeServer::bind(config).await?.run(running).await
}

async fn accept_loop<F>(listener: TcpListener, side: &'static str, running: Arc<AtomicBool>, on_accept: F)
where
    F: Fn(TcpStream, SocketAddr),
{
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping {side} accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new {side} connection from {peer_addr}");
                on_accept(stream, peer_addr);
            }
            Ok(Err(e)) => error!("{side} accept error: {e}"),
            Err(_) => {}
        }
    }
}

// ── Registration guard ────────────────────────────────────────────────────────

enum Side {
    Browser,
    Hub,
}

/// Unregisters a session from the bridge when dropped.
///
/// Held by each session task so unregistration also happens when the task is
/// aborted.
pub(crate) struct Registration {
    bridge: Arc<BridgeService>,
    id: SessionId,
    side: Side,
}

impl Registration {
    pub(crate) fn browser(bridge: Arc<BridgeService>, id: SessionId) -> Self {
        Self {
            bridge,
            id,
            side: Side::Browser,
        }
    }

    pub(crate) fn hub(bridge: Arc<BridgeService>, id: SessionId) -> Self {
        Self {
            bridge,
            id,
            side: Side::Hub,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        match self.side {
            Side::Browser => self.bridge.browser_disconnected(self.id),
            Side::Hub => self.bridge.hub_disconnected(self.id),
        }
    }
}
