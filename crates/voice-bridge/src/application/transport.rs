//! The seam between the application layer and live connections.
//!
//! Registries and the coordinator never touch sockets.  Each accepted
//! connection is represented by an `Arc<dyn SessionSink>` the infrastructure
//! layer provides; tests substitute a recording implementation.

use async_trait::async_trait;
use thiserror::Error;

/// One outbound frame for a connection.
///
/// Browser sessions map `Text` to a WebSocket text frame and `Binary` to a
/// binary frame.  Hub sessions only ever receive `Binary` (already-encoded
/// satellite-protocol events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// One inbound application frame from a browser.
///
/// Protocol-level frames (ping, pong, close) are handled by the transport and
/// never reach the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Failure to deliver a frame to one session.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The peer already closed the connection.
    #[error("connection closed")]
    Closed,

    /// The transport reported an I/O or framing error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound half of one connection.
///
/// Implementations must serialize concurrent `send` calls so frames are never
/// interleaved on the wire.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Delivers one frame to the peer.
    async fn send(&self, frame: OutboundFrame) -> Result<(), SinkError>;
}

// ── Test support ──────────────────────────────────────────────────────────────
