//! Rechunks the browser's microphone stream into fixed-size frames.
//!
//! Browsers deliver PCM in whatever block size their audio worklet produces.
//! The hub expects a steady stream of equally sized `audio-chunk` events, so
//! incoming bytes are accumulated here and released in `chunk_size` frames.
//!
//! # Producer / consumer
//!
//! ```text
//! browser sessions ── append() ──► [pending bytes] ──► mpsc ──► next_frame() ── audio forwarder
//! ```
//!
//! `append` never blocks.  A single consumer awaits `next_frame`.  `clear`
//! discards pending bytes and invalidates frames already in the channel by
//! advancing a generation counter; the consumer skips stale frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::AudioSettings;

/// One fixed-size block of 16-bit little-endian PCM.
///
/// Frames are produced only by [`AudioRechunker`] and are never split or
/// merged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(Vec<u8>);

impl AudioFrame {
    /// Raw sample bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the frame, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` only for a zero-length frame, which the rechunker never emits.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accumulates arbitrary writes and emits `chunk_size`-byte [`AudioFrame`]s.
pub struct AudioRechunker {
    chunk_size: usize,
    pending: Mutex<Vec<u8>>,
    generation: AtomicU64,
    ready_tx: mpsc::UnboundedSender<(u64, AudioFrame)>,
    ready_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(u64, AudioFrame)>>,
}

impl AudioRechunker {
    /// Creates a rechunker sized for `settings`.
    ///
    /// The chunk size is fixed for the rechunker's lifetime.  A zero chunk
    /// size (zero rate or duration) never emits a frame.
    pub fn new(settings: AudioSettings) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            chunk_size: settings.chunk_size(),
            pending: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
        }
    }

    /// Size in bytes of every emitted frame.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Appends raw bytes and queues every complete frame.  Never blocks.
    pub fn append(&self, bytes: &[u8]) {
        if self.chunk_size == 0 || bytes.is_empty() {
            return;
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.extend_from_slice(bytes);

        let whole = pending.len() / self.chunk_size * self.chunk_size;
        if whole == 0 {
            return;
        }

        // Read under the pending lock so a concurrent clear() cannot slip
        // between tagging and draining.
        let generation = self.generation.load(Ordering::Acquire);
        for chunk in pending.drain(..whole).as_slice().chunks_exact(self.chunk_size) {
            // The receiver lives as long as `self`; send only fails after drop.
            let _ = self.ready_tx.send((generation, AudioFrame(chunk.to_vec())));
        }
    }

    /// Waits for the next frame, oldest first.
    ///
    /// Frames queued before the most recent [`clear`](Self::clear) are skipped.
    pub async fn next_frame(&self) -> AudioFrame {
        let mut rx = self.ready_rx.lock().await;
        loop {
            // `self` holds a sender, so the channel never reports closed.
            let Some((generation, frame)) = rx.recv().await else {
                return std::future::pending().await;
            };
            if generation == self.generation.load(Ordering::Acquire) {
                return frame;
            }
        }
    }

    /// Discards buffered bytes and every frame not yet returned by `next_frame`.
    pub fn clear(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = pending.len();
        pending.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!(dropped_bytes = dropped, "audio rechunker cleared");
    }

    /// Bytes waiting for enough input to complete a frame.
    pub fn buffered_bytes(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
