//! Codec for encoding and decoding satellite-protocol events.
//!
//! Wire format:
//! ```text
//! {"type":"audio-chunk","version":"1.5.4","data_length":47,"payload_length":960}\n
//! {"rate":16000,"width":2,"channels":1}           <- data_length bytes of JSON
//! <960 bytes of PCM>                               <- payload_length bytes
//! ```
//! The header line is JSON terminated by `\n`.  Both lengths are optional and
//! omitted when zero.  Older peers put small `data` objects inline in the
//! header; the decoder accepts that form and merges it with any trailing data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::events::Event;

/// Protocol version string written into every header.
pub const PROTOCOL_VERSION: &str = "1.5.4";

/// Longest header line the decoder will buffer before giving up.
pub const MAX_HEADER_LENGTH: usize = 64 * 1024;

/// Largest JSON data section a header may declare.
pub const MAX_DATA_LENGTH: usize = 1024 * 1024;

/// Largest binary payload a header may declare (several seconds of TTS audio).
pub const MAX_PAYLOAD_LENGTH: usize = 16 * 1024 * 1024;

/// Errors that can occur during event encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The buffer does not yet hold a complete event.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// No header terminator within [`MAX_HEADER_LENGTH`] bytes.
    #[error("header line exceeds {MAX_HEADER_LENGTH} bytes")]
    HeaderTooLong,

    /// The header declares a data or payload section above its cap.
    #[error("{section} length {length} exceeds limit of {max} bytes")]
    LengthTooLarge {
        section: &'static str,
        length: usize,
        max: usize,
    },

    /// The header line is not a valid JSON header object.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The data section is not a JSON object, or does not match its event schema.
    #[error("malformed data: {0}")]
    MalformedData(String),
}

/// Header line as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing)]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`Event`] into header line + data + payload bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedHeader`] if the header cannot be
/// serialized.
///
/// # Examples
///
/// ```rust
/// use satellite_core::{decode_event, encode_event, Event};
///
/// let event = Event::new("describe");
/// let bytes = encode_event(&event).unwrap();
/// let (decoded, consumed) = decode_event(&bytes).unwrap();
/// assert_eq!(decoded, event);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_event(event: &Event) -> Result<Vec<u8>, ProtocolError> {
    let data_bytes = if event.data.is_empty() {
        Vec::new()
    } else {
        serde_json::to_vec(&event.data).map_err(|e| ProtocolError::MalformedData(e.to_string()))?
    };
    let payload = event.payload.as_deref().unwrap_or_default();

    let header = Header {
        event_type: event.event_type.clone(),
        version: Some(PROTOCOL_VERSION.to_string()),
        data: None,
        data_length: (!data_bytes.is_empty()).then_some(data_bytes.len()),
        payload_length: (!payload.is_empty()).then_some(payload.len()),
    };
    let header_bytes =
        serde_json::to_vec(&header).map_err(|e| ProtocolError::MalformedHeader(e.to_string()))?;

    let mut buf = Vec::with_capacity(header_bytes.len() + 1 + data_bytes.len() + payload.len());
    buf.extend_from_slice(&header_bytes);
    buf.push(b'\n');
    buf.extend_from_slice(&data_bytes);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one [`Event`] from the beginning of `bytes`.
///
/// Returns the decoded event and the total number of bytes consumed
/// (header line + data + payload), so the caller can drain its buffer.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if the event is incomplete; read
///   more bytes and call again.
/// - [`ProtocolError::HeaderTooLong`], [`ProtocolError::MalformedHeader`],
///   [`ProtocolError::MalformedData`] if the stream is corrupt.
pub fn decode_event(bytes: &[u8]) -> Result<(Event, usize), ProtocolError> {
    let Some(newline) = bytes.iter().position(|&b| b == b'\n') else {
        if bytes.len() > MAX_HEADER_LENGTH {
            return Err(ProtocolError::HeaderTooLong);
        }
        return Err(ProtocolError::InsufficientData {
            needed: bytes.len() + 1,
            available: bytes.len(),
        });
    };
    if newline > MAX_HEADER_LENGTH {
        return Err(ProtocolError::HeaderTooLong);
    }

    let header: Header = serde_json::from_slice(&bytes[..newline])
        .map_err(|e| ProtocolError::MalformedHeader(e.to_string()))?;

    let data_len = check_length("data", header.data_length.unwrap_or(0), MAX_DATA_LENGTH)?;
    let payload_len = check_length("payload", header.payload_length.unwrap_or(0), MAX_PAYLOAD_LENGTH)?;
    let data_start = newline + 1;
    let (payload_start, total_needed) = data_start
        .checked_add(data_len)
        .and_then(|start| Some((start, start.checked_add(payload_len)?)))
        .ok_or_else(|| ProtocolError::MalformedHeader("declared lengths overflow".to_string()))?;

    if bytes.len() < total_needed {
        return Err(ProtocolError::InsufficientData {
            needed: total_needed,
            available: bytes.len(),
        });
    }

    let mut data = header.data.unwrap_or_default();
    if data_len > 0 {
        let trailing: Map<String, Value> = serde_json::from_slice(&bytes[data_start..payload_start])
            .map_err(|e| ProtocolError::MalformedData(e.to_string()))?;
        data.extend(trailing);
    }

    let payload = (payload_len > 0).then(|| bytes[payload_start..total_needed].to_vec());

    Ok((
        Event {
            event_type: header.event_type,
            data,
            payload,
        },
        total_needed,
    ))
}

fn check_length(section: &'static str, length: usize, max: usize) -> Result<usize, ProtocolError> {
    if length > max {
        return Err(ProtocolError::LengthTooLarge { section, length, max });
    }
    Ok(length)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk_event() -> Event {
        let Value::Object(data) = json!({"rate": 16000, "width": 2, "channels": 1}) else {
            unreachable!()
        };
        Event {
            event_type: "audio-chunk".to_string(),
            data,
            payload: Some(vec![0xAB; 960]),
        }
    }

    #[test]
    fn test_encode_header_declares_data_and_payload_lengths() {
        // Arrange
        let event = chunk_event();

        // Act
        let bytes = encode_event(&event).unwrap();
        let newline = bytes.iter().position(|&b| b == b'\n').unwrap();
        let header: Value = serde_json::from_slice(&bytes[..newline]).unwrap();

        // Assert
        assert_eq!(header["type"], json!("audio-chunk"));
        assert_eq!(header["version"], json!(PROTOCOL_VERSION));
        assert_eq!(header["payload_length"], json!(960));
        let data_len = header["data_length"].as_u64().unwrap() as usize;
        assert_eq!(bytes.len(), newline + 1 + data_len + 960);
    }

    #[test]
    fn test_encode_event_without_data_omits_lengths() {
        let bytes = encode_event(&Event::new("describe")).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.ends_with('\n'));
        assert!(!text.contains("data_length"));
        assert!(!text.contains("payload_length"));
    }

    #[test]
    fn test_decode_consumes_exactly_one_event() {
        let event = chunk_event();
        let mut buf = encode_event(&event).unwrap();
        let first_len = buf.len();
        buf.extend_from_slice(&encode_event(&Event::new("audio-stop")).unwrap());

        let (decoded, consumed) = decode_event(&buf).unwrap();

        assert_eq!(decoded, event);
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_decode_partial_header_returns_insufficient_data() {
        let bytes = encode_event(&chunk_event()).unwrap();

        let result = decode_event(&bytes[..10]);

        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_partial_payload_returns_insufficient_data() {
        let bytes = encode_event(&chunk_event()).unwrap();

        let result = decode_event(&bytes[..bytes.len() - 1]);

        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: bytes.len(),
                available: bytes.len() - 1,
            })
        );
    }

    #[test]
    fn test_decode_accepts_inline_data_in_header() {
        let bytes = b"{\"type\":\"transcript\",\"data\":{\"text\":\"hi\"}}\n";

        let (event, consumed) = decode_event(bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(event.event_type, "transcript");
        assert_eq!(event.data.get("text"), Some(&json!("hi")));
    }

    #[test]
    fn test_decode_merges_inline_and_trailing_data() {
        let trailing = br#"{"width":2}"#;
        let mut bytes = format!(
            "{{\"type\":\"audio-start\",\"data\":{{\"rate\":22050}},\"data_length\":{}}}\n",
            trailing.len()
        )
        .into_bytes();
        bytes.extend_from_slice(trailing);

        let (event, _) = decode_event(&bytes).unwrap();

        assert_eq!(event.data.get("rate"), Some(&json!(22050)));
        assert_eq!(event.data.get("width"), Some(&json!(2)));
    }

    #[test]
    fn test_decode_invalid_header_json_returns_malformed_header() {
        let result = decode_event(b"not json\n");
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn test_decode_non_object_data_returns_malformed_data() {
        let bytes = b"{\"type\":\"transcript\",\"data_length\":3}\n[1]";
        let result = decode_event(bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedData(_))));
    }

    #[test]
    fn test_decode_huge_data_length_is_rejected_without_waiting() {
        // Arrange: a length that would overflow once added to the offset.
        let bytes = format!("{{\"type\":\"transcript\",\"data_length\":{}}}\n", usize::MAX);

        // Act
        let result = decode_event(bytes.as_bytes());

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::LengthTooLarge {
                section: "data",
                length: usize::MAX,
                max: MAX_DATA_LENGTH,
            })
        );
    }

    #[test]
    fn test_decode_huge_payload_length_is_rejected_without_waiting() {
        let bytes = format!(
            "{{\"type\":\"audio-chunk\",\"data_length\":2,\"payload_length\":{}}}\n{{}}",
            usize::MAX
        );

        let result = decode_event(bytes.as_bytes());

        assert!(matches!(
            result,
            Err(ProtocolError::LengthTooLarge { section: "payload", .. })
        ));
    }

    #[test]
    fn test_decode_payload_just_over_cap_is_rejected() {
        let bytes = format!(
            "{{\"type\":\"audio-chunk\",\"payload_length\":{}}}\n",
            MAX_PAYLOAD_LENGTH + 1
        );

        assert!(matches!(
            decode_event(bytes.as_bytes()),
            Err(ProtocolError::LengthTooLarge { section: "payload", .. })
        ));
    }

    #[test]
    fn test_decode_payload_at_cap_waits_for_more_bytes() {
        let bytes = format!(
            "{{\"type\":\"audio-chunk\",\"payload_length\":{MAX_PAYLOAD_LENGTH}}}\n"
        );

        assert!(matches!(
            decode_event(bytes.as_bytes()),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_unterminated_oversized_header_is_rejected() {
        let bytes = vec![b'{'; MAX_HEADER_LENGTH + 1];
        assert_eq!(decode_event(&bytes), Err(ProtocolError::HeaderTooLong));
    }
}
