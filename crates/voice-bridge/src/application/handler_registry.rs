//! Registry of connected hub sessions and the wake-word handshake.
//!
//! Every add or remove reports the new hub connectivity upstream as a
//! [`BridgeEvent::HaConnectivity`] on the channel wired in at construction,
//! so browsers learn about hub reachability without polling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use satellite_core::{encode_event, ProtocolError, SatelliteMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::audio_rechunker::AudioFrame;
use crate::application::transport::{OutboundFrame, SessionSink};
use crate::application::translator;
use crate::domain::{BridgeEvent, SessionId};

/// Log one line per this many forwarded audio chunks.
const AUDIO_LOG_EVERY: u64 = 50;

/// One accepted hub connection.
pub struct HubSession {
    id: SessionId,
    remote_addr: SocketAddr,
    sink: Arc<dyn SessionSink>,
}

impl HubSession {
    /// Creates a session with a fresh id.
    pub fn new(remote_addr: SocketAddr, sink: Arc<dyn SessionSink>) -> Self {
        Self {
            id: SessionId::new(),
            remote_addr,
            sink,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Tracks live hub sessions and delivers satellite-protocol events to them.
pub struct HandlerRegistry {
    sessions: Mutex<HashMap<SessionId, HubSession>>,
    upstream: mpsc::UnboundedSender<BridgeEvent>,
    audio_chunks_sent: AtomicU64,
}

impl HandlerRegistry {
    /// Creates an empty registry reporting connectivity changes to `upstream`.
    pub fn new(upstream: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            upstream,
            audio_chunks_sent: AtomicU64::new(0),
        }
    }

    /// Registers a session and returns its id.
    pub fn add(&self, session: HubSession) -> SessionId {
        let id = session.id;
        let remote = session.remote_addr;
        let count = {
            let mut sessions = self.lock();
            sessions.insert(id, session);
            sessions.len()
        };
        info!(session = %id, %remote, handlers = count, "hub connected");
        self.report_connectivity(count);
        id
    }

    /// Unregisters a session.  No-op if it is not registered.
    pub fn remove(&self, id: SessionId) {
        let (removed, count) = {
            let mut sessions = self.lock();
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        if removed.is_some() {
            info!(session = %id, handlers = count, "hub disconnected");
            self.report_connectivity(count);
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Encodes `msg` once and delivers it to every session independently.
    ///
    /// Returns the number of sessions that accepted it.
    pub async fn send_event(&self, msg: &SatelliteMessage) -> usize {
        let bytes = match encode(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode {} event: {e}", msg.event_type());
                return 0;
            }
        };

        let targets = self.snapshot();
        let results = join_all(targets.iter().map(|(id, sink)| {
            let frame = OutboundFrame::Binary(bytes.clone());
            async move { (*id, sink.send(frame).await) }
        }))
        .await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(session = %id, "failed to send {} to hub: {e}", msg.event_type()),
            }
        }
        delivered
    }

    /// Starts a pipeline run on every connected hub.
    ///
    /// Each session receives `run-pipeline` (asr → tts) followed by
    /// `audio-start` (16 kHz, 16-bit, mono) before the next session is
    /// addressed.  With no hub connected this only logs a warning.
    pub async fn trigger_wake_word(&self, wake_word: &str) {
        let targets = self.snapshot();
        if targets.is_empty() {
            warn!(wake_word, "wake word detected but no hub is connected");
            return;
        }

        let [run_pipeline, audio_start] = translator::wake_word_handshake();
        let (run_pipeline, audio_start) = match (encode(&run_pipeline), encode(&audio_start)) {
            (Ok(run), Ok(start)) => (run, start),
            (Err(e), _) | (_, Err(e)) => {
                warn!("failed to encode wake-word handshake: {e}");
                return;
            }
        };

        info!(wake_word, handlers = targets.len(), "triggering pipeline");
        for (id, sink) in targets {
            if let Err(e) = sink.send(OutboundFrame::Binary(run_pipeline.clone())).await {
                warn!(session = %id, "failed to send run-pipeline: {e}");
                continue;
            }
            if let Err(e) = sink.send(OutboundFrame::Binary(audio_start.clone())).await {
                warn!(session = %id, "failed to send audio-start: {e}");
            }
        }
    }

    /// Sends one microphone frame to every hub as an `audio-chunk` event.
    ///
    /// Silently dropped when no hub is connected.
    pub async fn forward_audio(&self, frame: AudioFrame) {
        if self.is_empty() {
            return;
        }

        let sent = self.audio_chunks_sent.fetch_add(1, Ordering::Relaxed) + 1;
        if sent % AUDIO_LOG_EVERY == 0 {
            info!(chunks = sent, bytes = frame.len(), "forwarding audio to hub");
        }

        self.send_event(&translator::audio_chunk_message(frame)).await;
    }

    fn snapshot(&self) -> Vec<(SessionId, Arc<dyn SessionSink>)> {
        self.lock()
            .values()
            .map(|s| (s.id, Arc::clone(&s.sink)))
            .collect()
    }

    fn report_connectivity(&self, count: usize) {
        let event = BridgeEvent::HaConnectivity {
            connected: count > 0,
        };
        if self.upstream.send(event).is_err() {
            debug!("connectivity change not reported: upstream receiver dropped");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, HubSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Encodes a typed message into its wire bytes.
pub(crate) fn encode(msg: &SatelliteMessage) -> Result<Vec<u8>, ProtocolError> {
    encode_event(&msg.to_event()?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transport::test_support::RecordingSink;
    use crate::domain::AudioSettings;
    use crate::application::AudioRechunker;
    use satellite_core::decode_event;
    use satellite_core::protocol::events::{AudioFormat, PipelineStage};

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn registry() -> (HandlerRegistry, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HandlerRegistry::new(tx), rx)
    }

    /// Decodes every binary frame a sink received back into typed messages.
    fn received(sink: &RecordingSink) -> Vec<SatelliteMessage> {
        sink.frames()
            .into_iter()
            .map(|frame| match frame {
                OutboundFrame::Binary(bytes) => {
                    let (event, used) = decode_event(&bytes).unwrap();
                    assert_eq!(used, bytes.len(), "one frame must carry one event");
                    SatelliteMessage::from_event(event).unwrap()
                }
                OutboundFrame::Text(t) => panic!("hub got a text frame: {t}"),
            })
            .collect()
    }

    fn one_frame() -> AudioFrame {
        let rechunker = AudioRechunker::new(AudioSettings {
            sample_rate: 1000,
            chunk_duration_ms: 2,
        });
        rechunker.append(&[1, 2, 3, 4]);
        futures_util::FutureExt::now_or_never(rechunker.next_frame()).unwrap()
    }

    // ── Connectivity ──────────────────────────────────────────────────────────

    #[test]
    fn test_add_and_remove_report_connectivity() {
        // Arrange
        let (registry, mut rx) = registry();

        // Act
        let a = registry.add(HubSession::new(addr(), Arc::new(RecordingSink::default())));
        let b = registry.add(HubSession::new(addr(), Arc::new(RecordingSink::default())));
        registry.remove(a);
        registry.remove(b);

        // Assert
        let seen: Vec<BridgeEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            seen,
            vec![
                BridgeEvent::HaConnectivity { connected: true },
                BridgeEvent::HaConnectivity { connected: true },
                BridgeEvent::HaConnectivity { connected: true },
                BridgeEvent::HaConnectivity { connected: false },
            ]
        );
    }

    #[test]
    fn test_remove_unknown_session_reports_nothing() {
        let (registry, mut rx) = registry();

        registry.remove(SessionId::new());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_upstream_does_not_break_membership() {
        let (registry, rx) = registry();
        drop(rx);

        registry.add(HubSession::new(addr(), Arc::new(RecordingSink::default())));

        assert_eq!(registry.len(), 1);
    }

    // ── send_event ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_send_event_isolates_failing_session() {
        // Arrange
        let (registry, _rx) = registry();
        let healthy = Arc::new(RecordingSink::default());
        registry.add(HubSession::new(addr(), healthy.clone()));
        registry.add(HubSession::new(addr(), Arc::new(RecordingSink::failing())));

        // Act
        let delivered = registry.send_event(&SatelliteMessage::Played).await;

        // Assert
        assert_eq!(delivered, 1);
        assert_eq!(received(&healthy), vec![SatelliteMessage::Played]);
        assert_eq!(registry.len(), 2);
    }

    // ── trigger_wake_word ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_wake_word_without_hub_sends_nothing() {
        let (registry, _rx) = registry();
        registry.trigger_wake_word("hey").await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wake_word_sends_run_pipeline_then_audio_start_to_each_hub() {
        // Arrange
        let (registry, _rx) = registry();
        let sinks: Vec<Arc<RecordingSink>> = (0..3).map(|_| Arc::new(RecordingSink::default())).collect();
        for sink in &sinks {
            registry.add(HubSession::new(addr(), sink.clone()));
        }

        // Act
        registry.trigger_wake_word("hey").await;

        // Assert
        for sink in &sinks {
            match &received(sink)[..] {
                [SatelliteMessage::RunPipeline(run), SatelliteMessage::AudioStart(start)] => {
                    assert_eq!(run.start_stage, PipelineStage::Asr);
                    assert_eq!(run.end_stage, PipelineStage::Tts);
                    assert!(!run.restart_on_end);
                    assert_eq!(start.format, AudioFormat::MIC_16K_MONO);
                }
                other => panic!("unexpected handshake: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_wake_word_failure_on_one_hub_does_not_stop_others() {
        let (registry, _rx) = registry();
        registry.add(HubSession::new(addr(), Arc::new(RecordingSink::failing())));
        let healthy = Arc::new(RecordingSink::default());
        registry.add(HubSession::new(addr(), healthy.clone()));

        registry.trigger_wake_word("default").await;

        assert_eq!(received(&healthy).len(), 2);
    }

    // ── forward_audio ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_forward_audio_without_hub_is_dropped() {
        let (registry, _rx) = registry();

        registry.forward_audio(one_frame()).await;

        assert_eq!(registry.audio_chunks_sent.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_forward_audio_wraps_frame_as_16k_audio_chunk() {
        // Arrange
        let (registry, _rx) = registry();
        let sink = Arc::new(RecordingSink::default());
        registry.add(HubSession::new(addr(), sink.clone()));

        // Act
        registry.forward_audio(one_frame()).await;

        // Assert
        match &received(&sink)[..] {
            [SatelliteMessage::AudioChunk(chunk)] => {
                assert_eq!(chunk.format, AudioFormat::MIC_16K_MONO);
                assert_eq!(chunk.audio, vec![1, 2, 3, 4]);
            }
            other => panic!("expected one audio-chunk, got {other:?}"),
        }
    }
}
