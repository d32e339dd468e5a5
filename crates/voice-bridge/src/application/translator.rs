//! Pure mapping between the two wire vocabularies and [`BridgeEvent`].
//!
//! ```text
//! Hub → Browser:   SatelliteMessage ─hub_to_bridge_event()──► BridgeEvent ─bridge_event_to_browser()──► JSON / binary
//! Browser → Hub:   BrowserToBridgeMsg ─browser_to_bridge_event()──► BridgeEvent
//!                  wake word ─wake_word_handshake()──► run-pipeline + audio-start
//!                  AudioFrame ─audio_chunk_message()──► audio-chunk
//! ```
//!
//! Nothing here performs I/O or holds state, so every mapping is unit tested
//! directly.  Kinds that have no counterpart on the other side map to `None`
//! and are dropped by the caller.

use satellite_core::protocol::events::{
    Attribution, AudioChunk, AudioFormat, AudioStart, Info, PingText, PipelineStage, RunPipeline,
    Satellite,
};
use satellite_core::SatelliteMessage;

use crate::application::audio_rechunker::AudioFrame;
use crate::domain::{BridgeEvent, BridgeToBrowserMsg, BrowserToBridgeMsg, VoiceEventType};

/// Name the bridge reports to the hub in its `info` reply.
pub const SATELLITE_NAME: &str = "PWA Voice Assist";
/// Area the hub assigns the satellite to by default.
pub const SATELLITE_AREA: &str = "Browser";
pub const SATELLITE_DESCRIPTION: &str = "Browser-based Voice Satellite";
pub const SATELLITE_URL: &str = "https://github.com/emme99/pwa-voice-assist";
pub const SATELLITE_VERSION: &str = "1.0.0";

/// What to send to browsers for one [`BridgeEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserDelivery {
    /// A JSON text frame.
    Json(BridgeToBrowserMsg),
    /// Raw bytes in a binary frame, no envelope.
    Binary(Vec<u8>),
}

// ── Hub → Browser ─────────────────────────────────────────────────────────────

/// Interprets a hub event as a [`BridgeEvent`], if browsers care about it.
pub fn hub_to_bridge_event(msg: SatelliteMessage) -> Option<BridgeEvent> {
    match msg {
        SatelliteMessage::Transcript(t) => Some(BridgeEvent::Transcript { text: t.text }),
        SatelliteMessage::Synthesize(s) => Some(BridgeEvent::Synthesize { text: s.text }),
        SatelliteMessage::AudioStart(start) => Some(BridgeEvent::AudioConfig {
            rate: start.format.rate,
        }),
        SatelliteMessage::AudioChunk(chunk) => Some(BridgeEvent::AudioPayload { bytes: chunk.audio }),
        SatelliteMessage::AudioStop(_) => Some(BridgeEvent::RunEnd),
        _ => None,
    }
}

/// Renders a [`BridgeEvent`] for browsers.
///
/// Browser-originated requests (`WakeDetected`, `Ping`, `StatusRequest`)
/// have no browser rendering and map to `None`.
pub fn bridge_event_to_browser(event: BridgeEvent) -> Option<BrowserDelivery> {
    let msg = match event {
        BridgeEvent::Transcript { text } => {
            BridgeToBrowserMsg::voice_event(VoiceEventType::SttEnd, Some(text))
        }
        BridgeEvent::Synthesize { text } => {
            BridgeToBrowserMsg::voice_event(VoiceEventType::TtsStart, Some(text))
        }
        BridgeEvent::RunEnd => BridgeToBrowserMsg::voice_event(VoiceEventType::RunEnd, None),
        BridgeEvent::AudioConfig { rate } => BridgeToBrowserMsg::ConfigAudio { rate },
        BridgeEvent::AudioPayload { bytes } => return Some(BrowserDelivery::Binary(bytes)),
        BridgeEvent::HaConnectivity { connected } => BridgeToBrowserMsg::HaStatus { connected },
        BridgeEvent::Pong => BridgeToBrowserMsg::Pong,
        BridgeEvent::Status {
            client_count,
            hub_connected,
            config,
        } => BridgeToBrowserMsg::Status {
            clients: client_count,
            ha_connected: hub_connected,
            config,
        },
        BridgeEvent::WakeDetected { .. } | BridgeEvent::Ping | BridgeEvent::StatusRequest => {
            return None
        }
    };
    Some(BrowserDelivery::Json(msg))
}

// ── Browser → Hub ─────────────────────────────────────────────────────────────

/// Interprets a browser control message.  `auth` and unknown kinds map to
/// `None`; authentication is handled before a session is registered.
pub fn browser_to_bridge_event(msg: BrowserToBridgeMsg) -> Option<BridgeEvent> {
    match msg {
        BrowserToBridgeMsg::WakeDetected { wake_word } => Some(BridgeEvent::WakeDetected { wake_word }),
        BrowserToBridgeMsg::Ping => Some(BridgeEvent::Ping),
        BrowserToBridgeMsg::StatusRequest => Some(BridgeEvent::StatusRequest),
        BrowserToBridgeMsg::Auth { .. } | BrowserToBridgeMsg::Unknown => None,
    }
}

/// The two events that start a pipeline run on a hub, in send order.
pub fn wake_word_handshake() -> [SatelliteMessage; 2] {
    [
        SatelliteMessage::RunPipeline(RunPipeline {
            start_stage: PipelineStage::Asr,
            end_stage: PipelineStage::Tts,
            restart_on_end: false,
            name: None,
        }),
        SatelliteMessage::AudioStart(AudioStart {
            format: AudioFormat::MIC_16K_MONO,
            timestamp: None,
        }),
    ]
}

/// Wraps one microphone frame as an `audio-chunk` event.
pub fn audio_chunk_message(frame: AudioFrame) -> SatelliteMessage {
    SatelliteMessage::AudioChunk(AudioChunk {
        format: AudioFormat::MIC_16K_MONO,
        timestamp: None,
        audio: frame.into_bytes(),
    })
}

// ── Hub session replies ───────────────────────────────────────────────────────

/// The bridge's self-description, sent in answer to `describe`.
pub fn satellite_info() -> SatelliteMessage {
    SatelliteMessage::Info(Info {
        satellite: Some(Satellite {
            name: SATELLITE_NAME.to_string(),
            attribution: Attribution {
                name: SATELLITE_NAME.to_string(),
                url: SATELLITE_URL.to_string(),
            },
            installed: true,
            description: Some(SATELLITE_DESCRIPTION.to_string()),
            version: Some(SATELLITE_VERSION.to_string()),
            area: Some(SATELLITE_AREA.to_string()),
        }),
        ..Info::default()
    })
}

/// The direct reply a hub session owes for `msg`, if any.
///
/// `describe` → `info`, `ping` → `pong` with the same text, and
/// `audio-stop` → `played`.  The hub holds its media player until it sees
/// `played`.
pub fn hub_session_reply(msg: &SatelliteMessage) -> Option<SatelliteMessage> {
    match msg {
        SatelliteMessage::Describe => Some(satellite_info()),
        SatelliteMessage::Ping(ping) => Some(SatelliteMessage::Pong(PingText {
            text: ping.text.clone(),
        })),
        SatelliteMessage::AudioStop(_) => Some(SatelliteMessage::Played),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use satellite_core::protocol::events::{AudioStop, Synthesize, Transcript};
    use serde_json::json;

    fn to_json(delivery: Option<BrowserDelivery>) -> String {
        match delivery {
            Some(BrowserDelivery::Json(msg)) => serde_json::to_string(&msg).unwrap(),
            other => panic!("expected JSON delivery, got {other:?}"),
        }
    }

    fn hub_to_browser(msg: SatelliteMessage) -> Option<BrowserDelivery> {
        hub_to_bridge_event(msg).and_then(bridge_event_to_browser)
    }

    // ── Hub → Browser ─────────────────────────────────────────────────────────

    #[test]
    fn test_transcript_becomes_stt_end_voice_event() {
        // Arrange
        let msg = SatelliteMessage::Transcript(Transcript {
            text: "hello".to_string(),
        });

        // Act
        let json = to_json(hub_to_browser(msg));

        // Assert
        assert_eq!(json, r#"{"type":"voice_event","event_type":4,"data":{"text":"hello"}}"#);
    }

    #[test]
    fn test_synthesize_becomes_tts_start_voice_event() {
        let msg = SatelliteMessage::Synthesize(Synthesize {
            text: "It is noon".to_string(),
        });

        let json = to_json(hub_to_browser(msg));

        assert_eq!(json, r#"{"type":"voice_event","event_type":7,"data":{"text":"It is noon"}}"#);
    }

    #[test]
    fn test_audio_start_becomes_config_audio() {
        let msg = SatelliteMessage::AudioStart(AudioStart {
            format: AudioFormat {
                rate: 24000,
                width: 2,
                channels: 1,
            },
            timestamp: None,
        });

        let value: serde_json::Value = serde_json::from_str(&to_json(hub_to_browser(msg))).unwrap();

        assert_eq!(value, json!({"type": "config_audio", "rate": 24000}));
    }

    #[test]
    fn test_audio_chunk_payload_forwarded_unmodified_as_binary() {
        let audio: Vec<u8> = (0..=255).collect();
        let msg = SatelliteMessage::AudioChunk(AudioChunk {
            format: AudioFormat::MIC_16K_MONO,
            timestamp: Some(10),
            audio: audio.clone(),
        });

        assert_eq!(hub_to_browser(msg), Some(BrowserDelivery::Binary(audio)));
    }

    #[test]
    fn test_audio_stop_becomes_run_end_voice_event() {
        let json = to_json(hub_to_browser(SatelliteMessage::AudioStop(AudioStop::default())));
        assert_eq!(json, r#"{"type":"voice_event","event_type":2,"data":{}}"#);
    }

    #[test]
    fn test_unbridged_hub_events_are_ignored() {
        for msg in [
            SatelliteMessage::Describe,
            SatelliteMessage::Played,
            SatelliteMessage::Ping(PingText::default()),
            SatelliteMessage::Unknown("timer-started".to_string()),
        ] {
            assert_eq!(hub_to_bridge_event(msg), None);
        }
    }

    #[test]
    fn test_connectivity_and_status_render_for_browsers() {
        let ha = to_json(bridge_event_to_browser(BridgeEvent::HaConnectivity { connected: false }));
        let status = bridge_event_to_browser(BridgeEvent::Status {
            client_count: 2,
            hub_connected: true,
            config: json!({"k": "v"}),
        });

        assert_eq!(ha, r#"{"type":"ha_status","connected":false}"#);
        assert_eq!(
            status,
            Some(BrowserDelivery::Json(BridgeToBrowserMsg::Status {
                clients: 2,
                ha_connected: true,
                config: json!({"k": "v"}),
            }))
        );
    }

    #[test]
    fn test_browser_requests_have_no_browser_rendering() {
        assert_eq!(bridge_event_to_browser(BridgeEvent::Ping), None);
        assert_eq!(bridge_event_to_browser(BridgeEvent::StatusRequest), None);
    }

    // ── Browser → Hub ─────────────────────────────────────────────────────────

    #[test]
    fn test_browser_control_messages_map_to_bridge_events() {
        assert_eq!(
            browser_to_bridge_event(BrowserToBridgeMsg::WakeDetected {
                wake_word: "hey".to_string()
            }),
            Some(BridgeEvent::WakeDetected {
                wake_word: "hey".to_string()
            })
        );
        assert_eq!(browser_to_bridge_event(BrowserToBridgeMsg::Ping), Some(BridgeEvent::Ping));
        assert_eq!(browser_to_bridge_event(BrowserToBridgeMsg::Unknown), None);
        assert_eq!(
            browser_to_bridge_event(BrowserToBridgeMsg::Auth {
                token: "late".to_string()
            }),
            None
        );
    }

    #[test]
    fn test_wake_word_handshake_order_and_parameters() {
        let [first, second] = wake_word_handshake();

        assert_eq!(first.event_type(), "run-pipeline");
        assert_eq!(second.event_type(), "audio-start");
        assert_eq!(
            second,
            SatelliteMessage::AudioStart(AudioStart {
                format: AudioFormat {
                    rate: 16000,
                    width: 2,
                    channels: 1
                },
                timestamp: None,
            })
        );
    }

    // ── Hub session replies ───────────────────────────────────────────────────

    #[test]
    fn test_describe_is_answered_with_satellite_info() {
        let reply = hub_session_reply(&SatelliteMessage::Describe);

        let Some(SatelliteMessage::Info(info)) = reply else {
            panic!("expected info, got {reply:?}");
        };
        let satellite = info.satellite.unwrap();
        assert_eq!(satellite.name, "PWA Voice Assist");
        assert_eq!(satellite.area.as_deref(), Some("Browser"));
        assert!(satellite.installed);
        assert!(info.asr.is_empty());
    }

    #[test]
    fn test_ping_is_answered_with_pong_echoing_text() {
        let reply = hub_session_reply(&SatelliteMessage::Ping(PingText {
            text: Some("42".to_string()),
        }));

        assert_eq!(
            reply,
            Some(SatelliteMessage::Pong(PingText {
                text: Some("42".to_string())
            }))
        );
    }

    #[test]
    fn test_audio_stop_is_acknowledged_with_played() {
        let reply = hub_session_reply(&SatelliteMessage::AudioStop(AudioStop::default()));
        assert_eq!(reply, Some(SatelliteMessage::Played));
    }

    #[test]
    fn test_other_hub_events_need_no_reply() {
        let transcript = SatelliteMessage::Transcript(Transcript::default());
        assert_eq!(hub_session_reply(&transcript), None);
    }
}
