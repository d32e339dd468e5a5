//! Browser-facing WebSocket sessions.
//!
//! For each accepted TCP connection this module:
//!
//! 1. Upgrades the connection to a WebSocket.
//! 2. Runs the authentication handshake (when a token is configured) and
//!    closes with code 1008 (policy violation) on failure.
//! 3. Registers the session with the bridge.
//! 4. Sends a WebSocket ping every `ws_ping_interval` so idle browsers and
//!    proxies keep the connection open, and ends the session when nothing
//!    (not even a pong) arrives within one interval of a ping.
//! 5. Feeds text frames to the control-message handler and binary frames to
//!    the audio rechunker, strictly in arrival order.
//! 6. Unregisters the session when the browser goes away.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{BoxStream, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};

use crate::application::{BridgeService, BrowserSession, InboundFrame, OutboundFrame, SessionSink, SinkError};
use crate::infrastructure::server::Registration;

type WsStream = WebSocketStream<TcpStream>;

// ── Outbound half ─────────────────────────────────────────────────────────────

/// [`SessionSink`] over the write half of a browser WebSocket.
///
/// Shared by the registry (broadcasts), the session's own replies and the
/// keepalive task, so writes go through an async mutex.
pub struct WsSink {
    writer: tokio::sync::Mutex<SplitSink<WsStream, WsMessage>>,
}

impl WsSink {
    fn new(writer: SplitSink<WsStream, WsMessage>) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    async fn send_message(&self, msg: WsMessage) -> Result<(), SinkError> {
        self.writer.lock().await.send(msg).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SinkError::Closed,
            other => SinkError::Transport(other.to_string()),
        })
    }

    /// Sends a WebSocket protocol ping.
    async fn ping(&self) -> Result<(), SinkError> {
        self.send_message(WsMessage::Ping(Vec::new())).await
    }

    /// Sends a close frame with `code` and `reason`.
    async fn close(&self, code: CloseCode, reason: &'static str) -> Result<(), SinkError> {
        self.send_message(WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
    }
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send(&self, frame: OutboundFrame) -> Result<(), SinkError> {
        let msg = match frame {
            OutboundFrame::Text(text) => WsMessage::Text(text),
            OutboundFrame::Binary(bytes) => WsMessage::Binary(bytes),
        };
        self.send_message(msg).await
    }
}

// ── Inbound half ──────────────────────────────────────────────────────────────

/// When the browser was last heard from.
///
/// Every inbound WebSocket message counts, pongs included.
struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn seen_since(&self, instant: Instant) -> bool {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) >= instant
    }
}

/// Turns the WebSocket read half into a stream of application frames.
///
/// The stream ends at the first close frame or transport error.  Ping and
/// pong frames are answered by tungstenite and filtered out here, after
/// they have refreshed `liveness`.
fn inbound_frames(
    ws_rx: SplitStream<WsStream>,
    peer_addr: SocketAddr,
    liveness: Arc<Liveness>,
) -> BoxStream<'static, InboundFrame> {
    ws_rx
        .take_while(move |item| {
            if item.is_ok() {
                liveness.touch();
            }
            let keep = match item {
                Ok(WsMessage::Close(frame)) => {
                    debug!("browser {peer_addr} sent close: {frame:?}");
                    false
                }
                Ok(_) => true,
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                    debug!("browser {peer_addr} connection closed");
                    false
                }
                Err(e) => {
                    warn!("browser {peer_addr} WebSocket error: {e}");
                    false
                }
            };
            future::ready(keep)
        })
        .filter_map(|item| {
            future::ready(match item {
                Ok(WsMessage::Text(text)) => Some(InboundFrame::Text(text)),
                Ok(WsMessage::Binary(bytes)) => Some(InboundFrame::Binary(bytes)),
                _ => None,
            })
        })
        .boxed()
}

// ── Keepalive ─────────────────────────────────────────────────────────────────

/// Why the keepalive loop stopped.
#[derive(Debug)]
enum KeepaliveEnd {
    /// The ping could not be written.
    PingFailed(SinkError),
    /// Nothing arrived within one interval of the last ping.
    NoPong,
}

/// Calls `ping` every `ping_interval` until a ping fails or the browser stays
/// silent for a whole interval after a ping.
async fn keepalive<F, Fut>(ping_interval: Duration, liveness: &Liveness, mut ping: F) -> KeepaliveEnd
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), SinkError>>,
{
    let mut ticker = interval(ping_interval);
    ticker.tick().await; // the first tick fires immediately
    let mut last_ping: Option<Instant> = None;

    loop {
        ticker.tick().await;
        if let Some(sent) = last_ping {
            if !liveness.seen_since(sent) {
                return KeepaliveEnd::NoPong;
            }
        }
        let sent = Instant::now();
        if let Err(e) = ping().await {
            return KeepaliveEnd::PingFailed(e);
        }
        last_ping = Some(sent);
    }
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

/// Entry point for one accepted browser TCP connection.
pub(crate) async fn handle_browser_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: Arc<BridgeService>,
    ping_interval: Duration,
) {
    match run_browser_session(raw_stream, peer_addr, bridge, ping_interval).await {
        Ok(()) => info!("browser session {peer_addr} closed"),
        Err(e) => warn!("browser session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_browser_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: Arc<BridgeService>,
    ping_interval: Duration,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    debug!("WebSocket session established: {peer_addr}");

    let (ws_tx, ws_rx) = ws_stream.split();
    let sink = Arc::new(WsSink::new(ws_tx));
    let liveness = Arc::new(Liveness::new());
    let mut inbound = inbound_frames(ws_rx, peer_addr, Arc::clone(&liveness));

    if !bridge.authenticate_browser(&mut inbound, sink.as_ref()).await {
        warn!("browser {peer_addr} failed authentication; closing");
        if let Err(e) = sink.close(CloseCode::Policy, "authentication failed").await {
            debug!("browser {peer_addr}: close frame not sent: {e}");
        }
        return Ok(());
    }

    let session = BrowserSession::new(peer_addr, bridge.requires_auth(), sink.clone());
    let id = bridge.browser_connected(session);
    let _registration = Registration::browser(Arc::clone(&bridge), id);

    let read_loop = async {
        while let Some(frame) = inbound.next().await {
            match frame {
                InboundFrame::Text(text) => bridge.handle_browser_text(id, &text, sink.as_ref()).await,
                InboundFrame::Binary(bytes) => bridge.handle_browser_audio(&bytes),
            }
        }
    };

    // A zero interval disables keepalive pings.
    if ping_interval.is_zero() {
        read_loop.await;
        return Ok(());
    }

    tokio::select! {
        _ = read_loop => {}
        end = keepalive(ping_interval, &liveness, || sink.ping()) => match end {
            KeepaliveEnd::NoPong => warn!(session = %id, "browser {peer_addr} stopped answering pings; closing"),
            KeepaliveEnd::PingFailed(e) => debug!(session = %id, "keepalive ping failed: {e}"),
        },
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
