//! Size check and the fallback decode chain.
//!
//! Payloads arrive as opaque bytes of unknown encoding. Decoding walks a fixed list of text
//! encodings and tries to parse each text it gets as JSON. Latin-1 maps every byte string to
//! some text, so it only counts when that text is JSON. Valid UTF-8 that isn't JSON is
//! archived raw, anything else that isn't JSON is archived as base64. A record is never lost
//! to a bad byte; the only way for a payload to fail here is to be too large.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use tracing::trace;

use crate::error::RecordError;
use crate::message::{BinaryEncoding, RecordBody};

/// Text encodings tried in order.
pub const DECODE_CHAIN: [TextEncoding; 3] =
    [TextEncoding::Utf8, TextEncoding::Latin1, TextEncoding::Ascii];

/// Rejects payloads strictly larger than `max_payload_size`. Must run before [decode].
pub fn check_size(payload: &[u8], max_payload_size: usize) -> Result<(), RecordError> {
    if payload.len() > max_payload_size {
        return Err(RecordError::PayloadTooLarge {
            size: payload.len(),
            limit: max_payload_size,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1. Never fails to decode, so its text is only kept when it parses as JSON.
    Latin1,
    Ascii,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Ascii => "ascii",
        }
    }

    /// Decodes `bytes` strictly, returning a description of the first offending byte.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, String> {
        match self {
            TextEncoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(text) => Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string()),
                Err(e) => Err(format!("'{}' codec can't decode: {e}", self.name())),
            },
            TextEncoding::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            TextEncoding::Ascii => {
                if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                    let byte = bytes.get(pos).copied().unwrap_or_default();
                    return Err(format!(
                        "'{}' codec can't decode byte {byte:#04x} in position {pos}: ordinal not in range(128)",
                        self.name()
                    ));
                }
                // all bytes are ASCII, so this is the identity mapping
                Ok(bytes.iter().map(|b| char::from(*b)).collect())
            }
        }
    }

    /// Whether text decoded with this encoding may be archived raw when it isn't JSON.
    pub fn keeps_raw_text(&self) -> bool {
        matches!(self, TextEncoding::Utf8 | TextEncoding::Ascii)
    }
}

/// Decodes a payload that passed [check_size]. Never fails.
pub fn decode(payload: &[u8]) -> RecordBody {
    decode_with(&DECODE_CHAIN, payload)
}

pub(crate) fn decode_with(encodings: &[TextEncoding], payload: &[u8]) -> RecordBody {
    let mut raw_text: Option<String> = None;
    let mut last_parse_error = String::new();
    let mut last_error = String::from("no text encoding attempted");

    for encoding in encodings {
        let text = match encoding.decode(payload) {
            Ok(text) => text,
            Err(e) => {
                trace!(encoding = encoding.name(), error = %e, "Payload is not valid text");
                last_error = e;
                continue;
            }
        };

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => return RecordBody::Parsed(value),
            Err(e) => {
                trace!(encoding = encoding.name(), error = %e, "Decoded text is not JSON");
                last_parse_error = e.to_string();
                last_error.clone_from(&last_parse_error);
                if raw_text.is_none() && encoding.keeps_raw_text() {
                    raw_text = Some(text);
                }
            }
        }
    }

    match raw_text {
        Some(raw) => RecordBody::Unparsed {
            raw,
            parse_error: last_parse_error,
        },
        None => RecordBody::Opaque {
            raw: BASE64_STANDARD.encode(payload),
            encoding: BinaryEncoding::Base64,
            parse_error: last_error,
        },
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_size_guard_boundary() {
        let limit = 16;
        assert!(check_size(&[b'a'; 16], limit).is_ok());
        assert_eq!(
            check_size(&[b'a'; 17], limit),
            Err(RecordError::PayloadTooLarge {
                size: 17,
                limit: 16
            })
        );
        assert!(check_size(&[], limit).is_ok());
    }

    #[test]
    fn test_decode_utf8_json() {
        let body = decode(br#"{"msg":"ok","level":3}"#);
        assert_eq!(body, RecordBody::Parsed(json!({"msg": "ok", "level": 3})));
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let mut payload = vec![0xef, 0xbb, 0xbf];
        payload.extend_from_slice(br#"{"a":1}"#);
        assert_eq!(decode(&payload), RecordBody::Parsed(json!({"a": 1})));
    }

    #[test]
    fn test_decode_latin1_json() {
        // "café" in Latin-1 is not valid UTF-8
        let payload = b"{\"name\":\"caf\xe9\"}";
        assert_eq!(decode(payload), RecordBody::Parsed(json!({"name": "café"})));
    }

    #[test]
    fn test_decode_plain_text_falls_back_to_raw() {
        let body = decode(b"GET /index.html 200");
        match body {
            RecordBody::Unparsed { raw, parse_error } => {
                assert_eq!(raw, "GET /index.html 200");
                assert!(!parse_error.is_empty());
            }
            other => panic!("expected unparsed body, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_invalid_utf8_text_falls_back_to_base64() {
        // printable Latin-1 but not UTF-8 and not JSON
        let payload = b"na\xefve log line";
        match decode(payload) {
            RecordBody::Opaque { raw, .. } => {
                assert_eq!(BASE64_STANDARD.decode(raw).unwrap(), payload.to_vec())
            }
            other => panic!("expected opaque body, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_truncated_utf8_sequence() {
        match decode(&[0xc3, 0x28]) {
            RecordBody::Opaque { raw, parse_error, .. } => {
                assert_eq!(raw, "wyg=");
                assert!(parse_error.contains("ascii"), "{parse_error}");
            }
            other => panic!("expected opaque body, got {other:?}"),
        }
    }

    #[test]
    fn test_latin1_text_is_only_kept_as_json() {
        match decode_with(&[TextEncoding::Latin1], b"plain text") {
            RecordBody::Opaque { parse_error, .. } => {
                assert!(parse_error.contains("expected value"), "{parse_error}")
            }
            other => panic!("expected opaque body, got {other:?}"),
        }
        assert_eq!(
            decode_with(&[TextEncoding::Latin1], br#"{"a":1}"#),
            RecordBody::Parsed(json!({"a": 1}))
        );
    }

    #[test]
    fn test_decode_binary_falls_back_to_base64() {
        let payload = [0xc3, 0x28, 0x80, 0x9f, 0x00, 0xff];
        match decode(&payload) {
            RecordBody::Opaque {
                raw,
                encoding,
                parse_error,
            } => {
                assert_eq!(encoding, BinaryEncoding::Base64);
                assert_eq!(BASE64_STANDARD.decode(raw).unwrap(), payload.to_vec());
                // the last encoding in the chain produced the error
                assert!(parse_error.contains("ascii"), "{parse_error}");
            }
            other => panic!("expected opaque body, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(matches!(
            decode(b""),
            RecordBody::Unparsed { ref raw, .. } if raw.is_empty()
        ));
    }

    #[test]
    fn test_decode_with_no_encodings() {
        assert!(matches!(
            decode_with(&[], b"{}"),
            RecordBody::Opaque { .. }
        ));
    }

    #[test]
    fn test_decode_never_fails_on_arbitrary_bytes() {
        for b in 0..=u8::MAX {
            let _ = decode(&[b]);
        }

        let mut rng = rand::rng();
        for _ in 0..500 {
            let len = rng.random_range(0..256);
            let payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            match decode(&payload) {
                RecordBody::Parsed(_) | RecordBody::Unparsed { .. } => {}
                RecordBody::Opaque { raw, .. } => {
                    assert_eq!(BASE64_STANDARD.decode(raw).unwrap(), payload)
                }
            }
        }
    }

    #[test]
    fn test_text_encoding_errors() {
        assert!(TextEncoding::Utf8.decode(&[0xff]).is_err());
        assert!(TextEncoding::Ascii.decode(&[0x80]).unwrap_err().contains("0x80"));
        assert_eq!(TextEncoding::Latin1.decode(&[0x41, 0xe9, 0x85]).unwrap(), "Aé\u{85}");
        assert!(TextEncoding::Utf8.keeps_raw_text());
        assert!(!TextEncoding::Latin1.keeps_raw_text());
    }
}
