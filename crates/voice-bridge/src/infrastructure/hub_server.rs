//! Hub-facing satellite-protocol sessions.
//!
//! The hub dials the bridge (the bridge is the satellite's *server*), so every
//! accepted TCP connection becomes one [`HubSession`].  Each session runs a
//! read loop in its own task and writes through a [`StreamSink`] shared with
//! the handler registry, so replies and broadcast events never interleave
//! mid-event on the wire.
//!
//! # Binary streaming protocol
//!
//! A single `read()` may return part of an event or several events.  Bytes are
//! accumulated in `recv_buf` and drained with
//! [`satellite_core::decode_event`] until it reports `InsufficientData`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use satellite_core::protocol::events::{event_type, AudioStop};
use satellite_core::{decode_event, ProtocolError, SatelliteMessage};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::application::handler_registry::encode;
use crate::application::{BridgeService, HubSession, OutboundFrame, SessionSink, SinkError};
use crate::domain::SessionId;
use crate::infrastructure::server::Registration;

/// Size of each individual socket read.
const READ_CHUNK: usize = 4096;

// ── Outbound half ─────────────────────────────────────────────────────────────

/// [`SessionSink`] over any byte stream writer.
///
/// Frames are written whole under an async mutex, one after another.
pub struct StreamSink<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W> SessionSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, frame: OutboundFrame) -> Result<(), SinkError> {
        let bytes = match frame {
            OutboundFrame::Binary(bytes) => bytes,
            OutboundFrame::Text(text) => text.into_bytes(),
        };
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await.map_err(io_to_sink_error)?;
        writer.flush().await.map_err(io_to_sink_error)
    }
}

fn io_to_sink_error(e: io::Error) -> SinkError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => SinkError::Closed,
        _ => SinkError::Transport(e.to_string()),
    }
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

/// Entry point for one accepted hub TCP connection.
pub(crate) async fn handle_hub_connection(stream: TcpStream, peer_addr: SocketAddr, bridge: Arc<BridgeService>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("hub {peer_addr}: could not disable Nagle: {e}");
    }
    let (read_half, write_half) = stream.into_split();
    run_hub_session(read_half, write_half, peer_addr, bridge).await;
}

/// Registers a hub session, serves it until EOF or error, then unregisters it.
///
/// Generic over the stream halves so it can be driven by in-memory pipes.
pub async fn run_hub_session<R, W>(reader: R, writer: W, peer_addr: SocketAddr, bridge: Arc<BridgeService>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let sink = Arc::new(StreamSink::new(writer));
    let id = bridge.hub_connected(HubSession::new(peer_addr, sink.clone()));
    // Unregisters on every exit path, including task cancellation.
    let _registration = Registration::hub(Arc::clone(&bridge), id);

    read_hub_events(reader, id, &bridge, sink.as_ref()).await;
    info!(session = %id, "hub {peer_addr} session ended");
}

/// Decodes events from `reader` and hands each to the bridge, writing any
/// direct reply back through `sink`.
///
/// Returns on EOF, on a read or write error, or when the stream cannot be
/// framed any more.  A well-framed event with invalid data is skipped, except
/// `audio-stop`, which is still acknowledged so the hub's player is released.
async fn read_hub_events<R>(mut reader: R, id: SessionId, bridge: &BridgeService, sink: &dyn SessionSink)
where
    R: AsyncRead + Unpin,
{
    let mut recv_buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut read_tmp = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut read_tmp).await {
            Ok(0) => {
                debug!(session = %id, "hub closed the connection (EOF)");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(session = %id, "read from hub failed: {e}");
                return;
            }
        };
        recv_buf.extend_from_slice(&read_tmp[..n]);

        loop {
            let event = match decode_event(&recv_buf) {
                Ok((event, consumed)) => {
                    recv_buf.drain(..consumed);
                    event
                }
                Err(ProtocolError::InsufficientData { .. }) => break,
                Err(e) => {
                    warn!(session = %id, "undecodable data from hub, closing: {e}");
                    return;
                }
            };

            let is_audio_stop = event.event_type == event_type::AUDIO_STOP;
            let msg = match SatelliteMessage::from_event(event) {
                Ok(msg) => msg,
                Err(e) if is_audio_stop => {
                    warn!(session = %id, "audio-stop with malformed data, acknowledging anyway: {e}");
                    SatelliteMessage::AudioStop(AudioStop::default())
                }
                Err(e) => {
                    warn!(session = %id, "skipping malformed hub event: {e}");
                    continue;
                }
            };
            debug!(session = %id, "hub → bridge: {}", msg.event_type());

            let Some(reply) = bridge.handle_hub_message(id, msg).await else {
                continue;
            };
            let bytes = match encode(&reply) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(session = %id, "failed to encode {} reply: {e}", reply.event_type());
                    continue;
                }
            };
            if let Err(e) = sink.send(OutboundFrame::Binary(bytes)).await {
                warn!(session = %id, "failed to reply {} to hub: {e}", reply.event_type());
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BridgeConfig, BridgeEvent};
    use satellite_core::encode_event;
    use satellite_core::protocol::events::{AudioStop, PingText};
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 20000))
    }

    /// Test-side view of an in-memory hub connection.
    struct FakeHub {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        buf: Vec<u8>,
    }

    impl FakeHub {
        async fn send(&mut self, msg: SatelliteMessage) {
            let bytes = encode_event(&msg.to_event().unwrap()).unwrap();
            self.writer.write_all(&bytes).await.unwrap();
        }

        async fn recv(&mut self) -> SatelliteMessage {
            let mut tmp = [0u8; 1024];
            loop {
                match decode_event(&self.buf) {
                    Ok((event, used)) => {
                        self.buf.drain(..used);
                        return SatelliteMessage::from_event(event).unwrap();
                    }
                    Err(ProtocolError::InsufficientData { .. }) => {}
                    Err(e) => panic!("bad bytes from bridge: {e}"),
                }
                let n = tokio::time::timeout(Duration::from_secs(1), self.reader.read(&mut tmp))
                    .await
                    .expect("bridge did not reply in time")
                    .unwrap();
                assert!(n > 0, "bridge closed the connection");
                self.buf.extend_from_slice(&tmp[..n]);
            }
        }
    }

    fn start_session(bridge: &Arc<BridgeService>) -> (FakeHub, tokio::task::JoinHandle<()>) {
        let (hub_side, bridge_side) = tokio::io::duplex(64 * 1024);
        let (r, w) = tokio::io::split(bridge_side);
        let task = tokio::spawn(run_hub_session(r, w, addr(), Arc::clone(bridge)));
        let (reader, writer) = tokio::io::split(hub_side);
        (
            FakeHub {
                reader,
                writer,
                buf: Vec::new(),
            },
            task,
        )
    }

    #[tokio::test]
    async fn test_describe_is_answered_with_info() {
        // Arrange
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (mut hub, _task) = start_session(&bridge);

        // Act
        hub.send(SatelliteMessage::Describe).await;

        // Assert
        match hub.recv().await {
            SatelliteMessage::Info(info) => {
                assert_eq!(info.satellite.unwrap().name, "PWA Voice Assist");
            }
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ping_and_audio_stop_replies_arrive_in_order() {
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (mut hub, _task) = start_session(&bridge);

        hub.send(SatelliteMessage::Ping(PingText {
            text: Some("1".to_string()),
        }))
        .await;
        hub.send(SatelliteMessage::AudioStop(AudioStop::default())).await;

        assert_eq!(
            hub.recv().await,
            SatelliteMessage::Pong(PingText {
                text: Some("1".to_string())
            })
        );
        assert_eq!(hub.recv().await, SatelliteMessage::Played);
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped_and_session_continues() {
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (mut hub, _task) = start_session(&bridge);

        // Well framed, but `start_stage` is not a known stage.
        hub.writer
            .write_all(b"{\"type\":\"run-pipeline\",\"data\":{\"start_stage\":\"x\",\"end_stage\":\"tts\"}}\n")
            .await
            .unwrap();
        hub.send(SatelliteMessage::Describe).await;

        assert!(matches!(hub.recv().await, SatelliteMessage::Info(_)));
    }

    #[tokio::test]
    async fn test_malformed_audio_stop_is_still_acknowledged() {
        // Arrange
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (mut hub, _task) = start_session(&bridge);

        // Act: `timestamp` must be an integer.
        hub.writer
            .write_all(b"{\"type\":\"audio-stop\",\"data\":{\"timestamp\":\"soon\"}}\n")
            .await
            .unwrap();

        // Assert
        assert_eq!(hub.recv().await, SatelliteMessage::Played);
    }

    #[tokio::test]
    async fn test_oversized_frame_ends_session() {
        // Arrange
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (mut hub, task) = start_session(&bridge);

        // Act: declares far more payload than the bridge will buffer.
        let header = format!("{{\"type\":\"audio-chunk\",\"payload_length\":{}}}\n", u64::MAX);
        hub.writer.write_all(header.as_bytes()).await.unwrap();

        // Assert
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session kept reading")
            .unwrap();
        assert!(matches!(bridge.status(), BridgeEvent::Status { hub_connected: false, .. }));
    }

    #[tokio::test]
    async fn test_session_unregisters_on_eof() {
        // Arrange
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (hub, task) = start_session(&bridge);
        tokio::task::yield_now().await;

        // Act: the hub goes away.
        drop(hub);
        task.await.unwrap();

        // Assert
        assert!(matches!(bridge.status(), BridgeEvent::Status { hub_connected: false, .. }));
    }

    #[tokio::test]
    async fn test_session_unregisters_when_task_is_cancelled() {
        let (bridge, _upstream) = BridgeService::new(&BridgeConfig::default());
        let (_hub, task) = start_session(&bridge);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(bridge.status(), BridgeEvent::Status { hub_connected: true, .. }));

        task.abort();
        let _ = task.await;

        assert!(matches!(bridge.status(), BridgeEvent::Status { hub_connected: false, .. }));
    }
}
