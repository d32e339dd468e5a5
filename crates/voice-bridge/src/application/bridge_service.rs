//! The bridge coordinator.
//!
//! [`BridgeService`] owns both registries and the audio rechunker and is the
//! only path from one side of the bridge to the other.  The infrastructure
//! layer calls it for every connection event and inbound frame; it never
//! reaches into the registries directly.
//!
//! Two background workers run for the lifetime of the service:
//!
//! - the **upstream pump** turns registry notifications (hub connectivity)
//!   into browser broadcasts;
//! - the **audio forwarder** takes rechunked microphone frames and sends them
//!   to every hub.

use std::sync::Arc;

use futures_util::Stream;
use satellite_core::SatelliteMessage;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::audio_rechunker::AudioRechunker;
use crate::application::client_registry::{send_reply, BrowserSession, ClientRegistry};
use crate::application::handler_registry::{HandlerRegistry, HubSession};
use crate::application::transport::{InboundFrame, SessionSink};
use crate::application::translator::{self, BrowserDelivery};
use crate::domain::{BridgeConfig, BridgeEvent, BrowserToBridgeMsg, SessionId};

/// Receiving end of the registries' upstream notifications.
///
/// Returned by [`BridgeService::new`] and handed back to
/// [`BridgeService::spawn_workers`].
pub struct UpstreamEvents(mpsc::UnboundedReceiver<BridgeEvent>);

/// Handles of the service's background tasks.
pub struct BridgeWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl BridgeWorkers {
    /// Stops both workers.  Frames still queued in the rechunker are dropped.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Coordinates browsers, hubs and the audio path.
pub struct BridgeService {
    clients: ClientRegistry,
    handlers: HandlerRegistry,
    rechunker: AudioRechunker,
    client_config: Value,
}

impl BridgeService {
    /// Builds the service and its registries from `config`.
    pub fn new(config: &BridgeConfig) -> (Arc<Self>, UpstreamEvents) {
        let (upstream_tx, upstream_rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            clients: ClientRegistry::new(config.auth_token.clone(), config.auth_timeout),
            handlers: HandlerRegistry::new(upstream_tx),
            rechunker: AudioRechunker::new(config.audio),
            client_config: config.client_config.clone(),
        });
        (service, UpstreamEvents(upstream_rx))
    }

    /// Starts the upstream pump and the audio forwarder.
    pub fn spawn_workers(self: &Arc<Self>, upstream: UpstreamEvents) -> BridgeWorkers {
        let pump = {
            let service = Arc::clone(self);
            let UpstreamEvents(mut rx) = upstream;
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    service.deliver_to_browsers(event).await;
                }
                debug!("upstream pump stopped");
            })
        };

        let forwarder = {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let frame = service.rechunker.next_frame().await;
                    service.handlers.forward_audio(frame).await;
                }
            })
        };

        info!(
            chunk_size = self.rechunker.chunk_size(),
            "bridge workers started"
        );
        BridgeWorkers {
            handles: vec![pump, forwarder],
        }
    }

    // ── Browser side ──────────────────────────────────────────────────────────

    /// Authenticates a fresh browser connection.  See [`ClientRegistry::authenticate`].
    pub async fn authenticate_browser<S>(&self, incoming: &mut S, sink: &dyn SessionSink) -> bool
    where
        S: Stream<Item = InboundFrame> + Unpin + Send,
    {
        self.clients.authenticate(incoming, sink).await
    }

    /// Whether browsers must send `auth` first.
    pub fn requires_auth(&self) -> bool {
        self.clients.requires_auth()
    }

    pub fn browser_connected(&self, session: BrowserSession) -> SessionId {
        self.clients.add(session)
    }

    pub fn browser_disconnected(&self, id: SessionId) {
        self.clients.remove(id);
    }

    /// Handles one JSON control message from a registered browser.
    ///
    /// Replies (`pong`, `status`) go to `reply` only.
    pub async fn handle_browser_text(&self, session: SessionId, text: &str, reply: &dyn SessionSink) {
        let msg = match serde_json::from_str::<BrowserToBridgeMsg>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %session, "invalid browser message: {e}");
                return;
            }
        };

        let Some(event) = translator::browser_to_bridge_event(msg) else {
            debug!(session = %session, "ignoring browser message: {text}");
            return;
        };

        match event {
            BridgeEvent::WakeDetected { wake_word } => {
                info!(session = %session, wake_word = %wake_word, "wake word detected");
                // Audio captured before the wake word belongs to no pipeline run.
                self.rechunker.clear();
                self.handlers.trigger_wake_word(&wake_word).await;
            }
            BridgeEvent::Ping => self.reply_to_browser(reply, BridgeEvent::Pong).await,
            BridgeEvent::StatusRequest => self.reply_to_browser(reply, self.status()).await,
            other => debug!(session = %session, "unexpected browser event: {other:?}"),
        }
    }

    /// Feeds raw microphone bytes from a browser into the rechunker.
    pub fn handle_browser_audio(&self, bytes: &[u8]) {
        self.rechunker.append(bytes);
    }

    /// Current status as a [`BridgeEvent::Status`].
    pub fn status(&self) -> BridgeEvent {
        BridgeEvent::Status {
            client_count: self.clients.len(),
            hub_connected: !self.handlers.is_empty(),
            config: self.client_config.clone(),
        }
    }

    /// Sends an event to every browser.
    pub async fn deliver_to_browsers(&self, event: BridgeEvent) {
        match translator::bridge_event_to_browser(event) {
            Some(BrowserDelivery::Json(msg)) => {
                self.clients.broadcast_text(&msg).await;
            }
            Some(BrowserDelivery::Binary(bytes)) => {
                self.clients.broadcast_binary(bytes).await;
            }
            None => {}
        }
    }

    async fn reply_to_browser(&self, reply: &dyn SessionSink, event: BridgeEvent) {
        if let Some(BrowserDelivery::Json(msg)) = translator::bridge_event_to_browser(event) {
            send_reply(reply, &msg).await;
        }
    }

    // ── Hub side ──────────────────────────────────────────────────────────────

    pub fn hub_connected(&self, session: HubSession) -> SessionId {
        self.handlers.add(session)
    }

    pub fn hub_disconnected(&self, id: SessionId) {
        self.handlers.remove(id);
    }

    /// Handles one event from a hub session and returns the reply the session
    /// must write back, if any.
    ///
    /// Bridged events are broadcast to browsers before this returns, so an
    /// `audio-stop` reaches browsers before the hub sees `played`.
    pub async fn handle_hub_message(&self, session: SessionId, msg: SatelliteMessage) -> Option<SatelliteMessage> {
        let reply = translator::hub_session_reply(&msg);
        let kind = msg.event_type().to_string();

        match translator::hub_to_bridge_event(msg) {
            Some(event) => self.deliver_to_browsers(event).await,
            None if reply.is_none() => debug!(session = %session, "ignoring hub event {kind}"),
            None => {}
        }
        reply
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
