//! JSON message types for the browser-facing WebSocket protocol.
//!
//! The hub speaks a framed event protocol with binary payloads.  The browser
//! client only needs a handful of control messages, so the bridge exposes a
//! small JSON vocabulary on text frames and carries raw PCM on binary frames.
//!
//! # Message flow
//!
//! ```text
//! Browser → Bridge:  JSON text frame  →  BrowserToBridgeMsg
//! Bridge  → Browser: BridgeEvent      →  BridgeToBrowserMsg  →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a snake_case `"type"` field:
//!
//! ```json
//! {"type":"wake_detected","wake_word":"hey_jarvis"}
//! {"type":"voice_event","event_type":4,"data":{"text":"hello"}}
//! ```
//!
//! Two enums are used, one per direction, so a browser-only message can never
//! be sent back to the browser by accident.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wake word used when the browser omits `wake_word`.
pub const DEFAULT_WAKE_WORD: &str = "default";

fn default_wake_word() -> String {
    DEFAULT_WAKE_WORD.to_string()
}

// ── Browser → Bridge messages ─────────────────────────────────────────────────

/// All control messages a browser can send over the WebSocket text channel.
///
/// ```json
/// {"type":"auth","token":"secret"}
/// {"type":"wake_detected","wake_word":"ok_nabu"}
/// {"type":"ping"}
/// {"type":"status_request"}
/// ```
///
/// Any other `"type"` value deserializes to [`BrowserToBridgeMsg::Unknown`]
/// so newer clients do not break an older bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserToBridgeMsg {
    /// First message of a session when a shared secret is configured.
    Auth {
        #[serde(default)]
        token: String,
    },

    /// The browser's local wake-word engine fired.
    WakeDetected {
        #[serde(default = "default_wake_word")]
        wake_word: String,
    },

    /// Application-level liveness check; answered with `pong`.
    Ping,

    /// Asks for the bridge's current status.
    StatusRequest,

    /// Any message type this bridge does not know.
    #[serde(other)]
    Unknown,
}

// ── Bridge → Browser messages ─────────────────────────────────────────────────

/// Voice-pipeline event codes understood by the browser client.
///
/// The numeric values are part of the browser client's contract and must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceEventType {
    /// The hub finished streaming audio for this run.
    RunEnd = 2,
    /// Speech recognition produced a transcript.
    SttEnd = 4,
    /// The hub is about to speak a response.
    TtsStart = 7,
}

impl VoiceEventType {
    /// Wire value of this event code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Body of a `voice_event` message.  `text` is omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// All JSON messages the bridge sends to browsers.
///
/// ```json
/// {"type":"auth_ok"}
/// {"type":"status","clients":1,"ha_connected":false,"config":{}}
/// {"type":"config_audio","rate":22050}
/// {"type":"ha_status","connected":true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeToBrowserMsg {
    /// The `auth` message carried the configured token.
    AuthOk,

    /// Authentication failed; the bridge closes the connection next.
    AuthFailed,

    /// Reply to a browser `ping`.
    Pong,

    /// Reply to `status_request`.
    Status {
        /// Number of registered browser sessions, including the requester.
        clients: usize,
        /// Whether at least one hub connection is open.
        ha_connected: bool,
        /// Client-facing configuration block, passed through unchanged.
        config: Value,
    },

    /// Progress of the hub's voice pipeline.
    VoiceEvent {
        /// One of the [`VoiceEventType`] codes.
        event_type: u8,
        data: VoiceEventData,
    },

    /// Format of the TTS audio that follows as binary frames.
    ConfigAudio {
        /// Sample rate in Hz.
        rate: u32,
    },

    /// Unsolicited notice that hub connectivity changed.
    HaStatus { connected: bool },
}

impl BridgeToBrowserMsg {
    /// Builds a `voice_event` message.
    pub fn voice_event(kind: VoiceEventType, text: Option<String>) -> Self {
        BridgeToBrowserMsg::VoiceEvent {
            event_type: kind.code(),
            data: VoiceEventData { text },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
