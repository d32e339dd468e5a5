//! The canonical event that crosses the bridge.
//!
//! Each side's wire format is parsed into a [`BridgeEvent`] once, at the
//! boundary, and rendered back out of it by the translator.  Downstream code
//! matches on the variant instead of inspecting type strings.

use serde_json::Value;

/// A unit of information crossing the bridge in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Hub: speech recognition result.
    Transcript { text: String },
    /// Hub: text about to be spoken.
    Synthesize { text: String },
    /// Hub: format of the TTS audio stream that follows.
    AudioConfig { rate: u32 },
    /// Hub: one block of TTS audio.
    AudioPayload { bytes: Vec<u8> },
    /// Hub: the TTS audio stream ended.
    RunEnd,
    /// Browser: local wake-word detection fired.
    WakeDetected { wake_word: String },
    /// Browser: liveness check.
    Ping,
    /// Bridge: reply to [`BridgeEvent::Ping`].
    Pong,
    /// Browser: asks for current status.
    StatusRequest,
    /// Bridge: reply to [`BridgeEvent::StatusRequest`].
    Status {
        client_count: usize,
        hub_connected: bool,
        config: Value,
    },
    /// Bridge: a hub connection was added or removed.
    HaConnectivity { connected: bool },
}
