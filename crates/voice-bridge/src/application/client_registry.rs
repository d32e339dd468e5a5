//! Registry of connected browser sessions.
//!
//! The registry is the only owner of browser session membership.  Callers can
//! add and remove sessions, read the count, and fan a message out to all of
//! them; they never get at an individual session.
//!
//! Broadcasts snapshot the membership before sending so a session that
//! disconnects mid-broadcast cannot invalidate the iteration, and so the lock
//! is never held across an `.await`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::application::transport::{InboundFrame, OutboundFrame, SessionSink};
use crate::domain::{BridgeToBrowserMsg, BrowserToBridgeMsg, SessionId};

/// One accepted browser connection.
pub struct BrowserSession {
    id: SessionId,
    remote_addr: SocketAddr,
    authenticated: bool,
    sink: Arc<dyn SessionSink>,
}

impl BrowserSession {
    /// Creates a session with a fresh id.
    pub fn new(remote_addr: SocketAddr, authenticated: bool, sink: Arc<dyn SessionSink>) -> Self {
        Self {
            id: SessionId::new(),
            remote_addr,
            authenticated,
            sink,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// `true` if the session presented the shared secret.  Always `false`
    /// when no secret is configured.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Tracks live browser sessions and fans messages out to them.
pub struct ClientRegistry {
    sessions: Mutex<HashMap<SessionId, BrowserSession>>,
    auth_token: Option<String>,
    auth_timeout: Duration,
}

impl ClientRegistry {
    /// Creates an empty registry.
    ///
    /// `auth_token = None` disables authentication.
    pub fn new(auth_token: Option<String>, auth_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            auth_token,
            auth_timeout,
        }
    }

    /// Whether new sessions must authenticate.
    pub fn requires_auth(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Registers a session and returns its id.
    pub fn add(&self, session: BrowserSession) -> SessionId {
        let id = session.id;
        let remote = session.remote_addr;
        let authenticated = session.authenticated;
        let count = {
            let mut sessions = self.lock();
            sessions.insert(id, session);
            sessions.len()
        };
        info!(session = %id, %remote, authenticated, clients = count, "browser connected");
        id
    }

    /// Unregisters a session.  No-op if it is not registered.
    pub fn remove(&self, id: SessionId) {
        let (removed, count) = {
            let mut sessions = self.lock();
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        if let Some(session) = removed {
            info!(session = %id, remote = %session.remote_addr, clients = count, "browser disconnected");
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Serializes `msg` once and delivers it to every session concurrently.
    ///
    /// Returns the number of sessions that accepted the frame.  Per-session
    /// failures are logged; the failing session stays registered until its
    /// own connection task removes it.
    pub async fn broadcast_text(&self, msg: &BridgeToBrowserMsg) -> usize {
        match serde_json::to_string(msg) {
            Ok(json) => self.fan_out(OutboundFrame::Text(json)).await,
            Err(e) => {
                error!("failed to serialize browser message: {e}");
                0
            }
        }
    }

    /// Delivers raw bytes to every session as a binary frame.
    pub async fn broadcast_binary(&self, bytes: Vec<u8>) -> usize {
        self.fan_out(OutboundFrame::Binary(bytes)).await
    }

    /// Runs the authentication handshake on a fresh connection.
    ///
    /// Without a configured token this returns `true` immediately and reads
    /// nothing.  Otherwise the first inbound frame must arrive within the
    /// auth timeout and be `{"type":"auth","token":<token>}`; the reply is
    /// `auth_ok` on success and a best-effort `auth_failed` otherwise.  The
    /// caller closes the connection when this returns `false`.
    pub async fn authenticate<S>(&self, incoming: &mut S, sink: &dyn SessionSink) -> bool
    where
        S: Stream<Item = InboundFrame> + Unpin + Send,
    {
        let Some(expected) = self.auth_token.as_deref() else {
            return true;
        };

        let first = match tokio::time::timeout(self.auth_timeout, incoming.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("connection closed before authenticating");
                return false;
            }
            Err(_) => {
                warn!("no auth message within {:?}", self.auth_timeout);
                send_reply(sink, &BridgeToBrowserMsg::AuthFailed).await;
                return false;
            }
        };

        let accepted = match &first {
            InboundFrame::Text(text) => matches!(
                serde_json::from_str::<BrowserToBridgeMsg>(text),
                Ok(BrowserToBridgeMsg::Auth { token }) if token == expected
            ),
            InboundFrame::Binary(_) => false,
        };

        if accepted {
            // A client that cannot receive auth_ok is not usable either.
            return send_reply(sink, &BridgeToBrowserMsg::AuthOk).await;
        }

        warn!("authentication failed");
        send_reply(sink, &BridgeToBrowserMsg::AuthFailed).await;
        false
    }

    async fn fan_out(&self, frame: OutboundFrame) -> usize {
        let targets: Vec<(SessionId, Arc<dyn SessionSink>)> = self
            .lock()
            .values()
            .map(|s| (s.id, Arc::clone(&s.sink)))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let results = join_all(targets.iter().map(|(id, sink)| {
            let frame = frame.clone();
            async move { (*id, sink.send(frame).await) }
        }))
        .await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(session = %id, "browser delivery failed: {e}"),
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, BrowserSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializes and sends one reply; returns whether it was delivered.
pub(crate) async fn send_reply(sink: &dyn SessionSink, msg: &BridgeToBrowserMsg) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize browser reply: {e}");
            return false;
        }
    };
    match sink.send(OutboundFrame::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            debug!("browser reply not delivered: {e}");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
