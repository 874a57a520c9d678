//! Payload codec for plugin events.
//!
//! A payload is a 4-byte little-endian version header followed by the bincode
//! encoding of [`EventData`]. Bincode runs with an explicit config (fixint
//! lengths and enum tags) so sources and workers always agree on the layout
//! regardless of build or bincode defaults.

use crate::types::events::EventData;
use bincode::Options;

/// Payload format version
pub const PAYLOAD_VERSION: u32 = 1;

/// Size of the version header in bytes
pub const HEADER_LEN: usize = 4;

/// Upper bound for a decoded payload, guards against bogus length prefixes.
pub const MAX_PAYLOAD_BYTES: u64 = 1024 * 1024;

/// Errors produced while encoding or decoding a payload
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("payload truncated: {0} bytes")]
    Truncated(usize),

    #[error("unsupported payload version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("payload encode failed: {0}")]
    Encode(#[source] bincode::Error),

    #[error("payload decode failed: {0}")]
    Decode(#[source] bincode::Error),
}

fn payload_bincode() -> impl bincode::config::Options {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_PAYLOAD_BYTES)
}

/// Encode event data into a versioned payload.
pub fn encode_payload(data: &EventData) -> Result<Vec<u8>, WireError> {
    let body = payload_bincode()
        .serialize(data)
        .map_err(WireError::Encode)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&PAYLOAD_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a versioned payload.
pub fn decode_payload(bytes: &[u8]) -> Result<EventData, WireError> {
    if bytes.len() < HEADER_LEN {
        return Err(WireError::Truncated(bytes.len()));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    let version = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if version != PAYLOAD_VERSION {
        return Err(WireError::Version {
            found: version,
            expected: PAYLOAD_VERSION,
        });
    }
    payload_bincode()
        .deserialize(body)
        .map_err(WireError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventData {
        EventData {
            name: "open".to_string(),
            pid: 1000,
            tid: 1001,
            comm: "bash".to_string(),
            ..Default::default()
        }
        .with_field("fd", 5i64)
        .with_field("path", "/etc/passwd")
    }

    #[test]
    fn test_payload_header_layout() {
        let bytes = encode_payload(&sample()).unwrap();
        assert_eq!(bytes[0..4], [1, 0, 0, 0]);

        let decoded = decode_payload(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_short_payload_is_truncated() {
        assert!(matches!(decode_payload(&[1, 0]), Err(WireError::Truncated(2))));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = encode_payload(&sample()).unwrap();
        bytes[0] = 9;
        match decode_payload(&bytes) {
            Err(WireError::Version { found, expected }) => {
                assert_eq!(found, 9);
                assert_eq!(expected, PAYLOAD_VERSION);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_body_fails_to_decode() {
        let mut bytes = PAYLOAD_VERSION.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff; 3]);
        assert!(matches!(decode_payload(&bytes), Err(WireError::Decode(_))));
    }

    #[test]
    fn test_oversized_payload_fails_to_encode() {
        let data = EventData::default()
            .with_field("blob", "x".repeat(MAX_PAYLOAD_BYTES as usize + 1));
        match encode_payload(&data) {
            Err(e @ WireError::Encode(_)) => {
                assert!(e.to_string().starts_with("payload encode failed"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
