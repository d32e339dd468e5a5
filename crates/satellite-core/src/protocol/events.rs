//! All satellite-protocol event types.
//!
//! On the wire every event is a generic [`Event`]: a `type` string, a JSON
//! `data` object and an optional binary payload.  The bridge never matches
//! on raw type strings; it converts each [`Event`] into a [`SatelliteMessage`]
//! once at the boundary and works with the typed variant from then on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::codec::ProtocolError;

// ── Event type names ──────────────────────────────────────────────────────────

/// Wire names of every event type the bridge understands.
pub mod event_type {
    pub const DESCRIBE: &str = "describe";
    pub const INFO: &str = "info";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const RUN_PIPELINE: &str = "run-pipeline";
    pub const AUDIO_START: &str = "audio-start";
    pub const AUDIO_CHUNK: &str = "audio-chunk";
    pub const AUDIO_STOP: &str = "audio-stop";
    pub const TRANSCRIPT: &str = "transcript";
    pub const SYNTHESIZE: &str = "synthesize";
    pub const PLAYED: &str = "played";
}

// ── Generic envelope ──────────────────────────────────────────────────────────

/// A single event as it appears on the wire, before typed interpretation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    /// Event type string, e.g. `"audio-chunk"`.
    pub event_type: String,
    /// Event data object.  Empty for events that carry no fields.
    pub data: Map<String, Value>,
    /// Raw binary payload (PCM audio for `audio-chunk`).
    pub payload: Option<Vec<u8>>,
}

impl Event {
    /// Creates an event with no data and no payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
            payload: None,
        }
    }
}

// ── Audio ─────────────────────────────────────────────────────────────────────

/// Sample format shared by `audio-start` and `audio-chunk`.
///
/// Missing fields take the values a TTS service most commonly emits
/// (22050 Hz, 16-bit, mono).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Bytes per sample.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Channel count.
    #[serde(default = "default_channels")]
    pub channels: u32,
}

fn default_rate() -> u32 {
    22050
}

fn default_width() -> u32 {
    2
}

fn default_channels() -> u32 {
    1
}

impl AudioFormat {
    /// 16 kHz, 16-bit, mono: the format the browser microphone stream uses.
    pub const MIC_16K_MONO: AudioFormat = AudioFormat {
        rate: 16000,
        width: 2,
        channels: 1,
    };
}

/// `audio-start`: announces a new audio stream and its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStart {
    #[serde(flatten)]
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// `audio-chunk`: one block of PCM audio.
///
/// The samples travel in the event payload, not in the JSON data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    #[serde(flatten)]
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip)]
    pub audio: Vec<u8>,
}

/// `audio-stop`: end of the current audio stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioStop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Named phase of the hub's voice pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    /// Wake-word detection.
    Wake,
    /// Speech recognition.
    Asr,
    /// Intent handling.
    Handle,
    /// Speech synthesis.
    Tts,
}

/// `run-pipeline`: asks the hub to run its pipeline between two stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPipeline {
    pub start_stage: PipelineStage,
    pub end_stage: PipelineStage,
    #[serde(default)]
    pub restart_on_end: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ── Text events ───────────────────────────────────────────────────────────────

/// `transcript`: speech-recognition result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
}

/// `synthesize`: text the hub is about to speak.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Synthesize {
    #[serde(default)]
    pub text: String,
}

/// `ping` / `pong` body.  The pong echoes the ping's text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ── Service description ───────────────────────────────────────────────────────

/// Who built the satellite software.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

/// Self-description of a satellite device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Satellite {
    pub name: String,
    pub attribution: Attribution,
    pub installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

/// `info`: answer to `describe`.
///
/// The service lists stay empty for a pure satellite; the hub discovers the
/// device through the `satellite` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub asr: Vec<Value>,
    #[serde(default)]
    pub tts: Vec<Value>,
    #[serde(default)]
    pub handle: Vec<Value>,
    #[serde(default)]
    pub intent: Vec<Value>,
    #[serde(default)]
    pub wake: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite: Option<Satellite>,
}

// ── Top-level typed message ───────────────────────────────────────────────────

/// Every satellite-protocol event the bridge sends or reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatelliteMessage {
    Describe,
    Info(Info),
    Ping(PingText),
    Pong(PingText),
    RunPipeline(RunPipeline),
    AudioStart(AudioStart),
    AudioChunk(AudioChunk),
    AudioStop(AudioStop),
    Transcript(Transcript),
    Synthesize(Synthesize),
    Played,
    /// Any event type this crate does not model.  Carries the type string.
    Unknown(String),
}

impl SatelliteMessage {
    /// Returns the wire type string of this message.
    pub fn event_type(&self) -> &str {
        match self {
            SatelliteMessage::Describe => event_type::DESCRIBE,
            SatelliteMessage::Info(_) => event_type::INFO,
            SatelliteMessage::Ping(_) => event_type::PING,
            SatelliteMessage::Pong(_) => event_type::PONG,
            SatelliteMessage::RunPipeline(_) => event_type::RUN_PIPELINE,
            SatelliteMessage::AudioStart(_) => event_type::AUDIO_START,
            SatelliteMessage::AudioChunk(_) => event_type::AUDIO_CHUNK,
            SatelliteMessage::AudioStop(_) => event_type::AUDIO_STOP,
            SatelliteMessage::Transcript(_) => event_type::TRANSCRIPT,
            SatelliteMessage::Synthesize(_) => event_type::SYNTHESIZE,
            SatelliteMessage::Played => event_type::PLAYED,
            SatelliteMessage::Unknown(name) => name.as_str(),
        }
    }

    /// Interprets a wire [`Event`] as a typed message.
    ///
    /// Unrecognised types become [`SatelliteMessage::Unknown`] rather than an
    /// error so newer hubs can add events without breaking the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedData`] if a known event type carries
    /// data that does not match its schema.
    pub fn from_event(event: Event) -> Result<Self, ProtocolError> {
        let Event {
            event_type: kind,
            data,
            payload,
        } = event;

        let msg = match kind.as_str() {
            event_type::DESCRIBE => SatelliteMessage::Describe,
            event_type::INFO => SatelliteMessage::Info(from_data(&kind, data)?),
            event_type::PING => SatelliteMessage::Ping(from_data(&kind, data)?),
            event_type::PONG => SatelliteMessage::Pong(from_data(&kind, data)?),
            event_type::RUN_PIPELINE => SatelliteMessage::RunPipeline(from_data(&kind, data)?),
            event_type::AUDIO_START => SatelliteMessage::AudioStart(from_data(&kind, data)?),
            event_type::AUDIO_CHUNK => {
                let mut chunk: AudioChunk = from_data(&kind, data)?;
                chunk.audio = payload.unwrap_or_default();
                SatelliteMessage::AudioChunk(chunk)
            }
            event_type::AUDIO_STOP => SatelliteMessage::AudioStop(from_data(&kind, data)?),
            event_type::TRANSCRIPT => SatelliteMessage::Transcript(from_data(&kind, data)?),
            event_type::SYNTHESIZE => SatelliteMessage::Synthesize(from_data(&kind, data)?),
            event_type::PLAYED => SatelliteMessage::Played,
            _ => SatelliteMessage::Unknown(kind),
        };
        Ok(msg)
    }

    /// Builds the wire [`Event`] for this message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedData`] if the data cannot be
    /// represented as a JSON object.
    pub fn to_event(&self) -> Result<Event, ProtocolError> {
        let kind = self.event_type().to_string();
        let (data, payload) = match self {
            SatelliteMessage::Describe | SatelliteMessage::Played | SatelliteMessage::Unknown(_) => {
                (Map::new(), None)
            }
            SatelliteMessage::Info(m) => (to_data(&kind, m)?, None),
            SatelliteMessage::Ping(m) | SatelliteMessage::Pong(m) => (to_data(&kind, m)?, None),
            SatelliteMessage::RunPipeline(m) => (to_data(&kind, m)?, None),
            SatelliteMessage::AudioStart(m) => (to_data(&kind, m)?, None),
            SatelliteMessage::AudioChunk(m) => (to_data(&kind, m)?, Some(m.audio.clone())),
            SatelliteMessage::AudioStop(m) => (to_data(&kind, m)?, None),
            SatelliteMessage::Transcript(m) => (to_data(&kind, m)?, None),
            SatelliteMessage::Synthesize(m) => (to_data(&kind, m)?, None),
        };
        Ok(Event {
            event_type: kind,
            data,
            payload,
        })
    }
}

fn from_data<T: DeserializeOwned>(kind: &str, data: Map<String, Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(data))
        .map_err(|e| ProtocolError::MalformedData(format!("{kind}: {e}")))
}

fn to_data<T: Serialize>(kind: &str, body: &T) -> Result<Map<String, Value>, ProtocolError> {
    match serde_json::to_value(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProtocolError::MalformedData(format!(
            "{kind}: data must be a JSON object, got {other}"
        ))),
        Err(e) => Err(ProtocolError::MalformedData(format!("{kind}: {e}"))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
