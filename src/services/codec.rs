//! Signed scan payload encoding and verification
//!
//! A payload embeds the ticket and event identity plus a truncated keyed
//! SHA-256 tag computed with a server-held secret. The tag is verified with
//! a constant-time comparison before any store lookup, so a forged payload
//! is rejected without revealing whether the guessed ticket id exists.
//!
//! Format (stable across scanner versions via the version prefix):
//!
//! ```text
//! GTK1.<b64url(ticket_id)>.<b64url(event_id)>.<hex tag>
//! ```

use crate::domain::ticket::{EventId, TicketId};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Version prefix embedded in every payload
pub const PAYLOAD_VERSION: &str = "GTK1";

/// Truncated tag length in bytes (128-bit)
const TAG_LEN: usize = 16;

/// Minimum accepted secret length in bytes
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Structure unparsable or integrity tag does not verify
    #[error("malformed payload")]
    MalformedPayload,
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes")]
    SecretTooShort,
}

/// Encoder/decoder for scannable ticket payloads
#[derive(Debug)]
pub struct QrCodec {
    secret: Vec<u8>,
}

impl QrCodec {
    pub fn new(secret: &[u8]) -> Result<Self, CodecError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CodecError::SecretTooShort);
        }
        Ok(Self { secret: secret.to_vec() })
    }

    /// Encode a ticket identity into a scannable payload.
    ///
    /// Deterministic and reversible: `decode(encode(t, e)) == (t, e)`.
    pub fn encode(&self, ticket_id: &TicketId, event_id: &EventId) -> String {
        let t = URL_SAFE_NO_PAD.encode(ticket_id.0.as_bytes());
        let e = URL_SAFE_NO_PAD.encode(event_id.0.as_bytes());
        let tag = self.tag(ticket_id.0.as_bytes(), event_id.0.as_bytes());
        format!("{PAYLOAD_VERSION}.{t}.{e}.{}", hex::encode(tag))
    }

    /// Decode and verify a presented payload.
    ///
    /// The tag comparison is constant-time and happens before the caller
    /// can do any store lookup; every failure mode collapses to
    /// `MalformedPayload`.
    pub fn decode(&self, payload: &str) -> Result<(TicketId, EventId), CodecError> {
        let mut parts = payload.split('.');
        let (version, t, e, tag_hex) =
            match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(v), Some(t), Some(e), Some(tag), None) => (v, t, e, tag),
                _ => return Err(CodecError::MalformedPayload),
            };

        if version != PAYLOAD_VERSION {
            return Err(CodecError::MalformedPayload);
        }

        let ticket_raw =
            URL_SAFE_NO_PAD.decode(t).map_err(|_| CodecError::MalformedPayload)?;
        let event_raw =
            URL_SAFE_NO_PAD.decode(e).map_err(|_| CodecError::MalformedPayload)?;
        let presented = hex::decode(tag_hex).map_err(|_| CodecError::MalformedPayload)?;

        let expected = self.tag(&ticket_raw, &event_raw);
        if presented.len() != TAG_LEN || !constant_time_eq(&presented, &expected) {
            return Err(CodecError::MalformedPayload);
        }

        let ticket_id =
            String::from_utf8(ticket_raw).map_err(|_| CodecError::MalformedPayload)?;
        let event_id =
            String::from_utf8(event_raw).map_err(|_| CodecError::MalformedPayload)?;

        Ok((TicketId(ticket_id), EventId(event_id)))
    }

    /// Keyed SHA-256 over length-delimited fields, truncated to TAG_LEN.
    ///
    /// Fixed framing (secret first, 8-byte big-endian length before each
    /// field) keeps distinct (ticket, event) pairs from colliding.
    fn tag(&self, ticket: &[u8], event: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(PAYLOAD_VERSION.as_bytes());
        hasher.update((ticket.len() as u64).to_be_bytes());
        hasher.update(ticket);
        hasher.update((event.len() as u64).to_be_bytes());
        hasher.update(event);
        let digest = hasher.finalize();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret-0123456789abcdef";

    fn codec() -> QrCodec {
        QrCodec::new(SECRET).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let pairs = [
            ("TKT-001-2024", "EVT-001"),
            ("TKT-999-2024", "EVT-042"),
            ("a", "b"),
            ("ticket.with.dots", "event/with/slashes"),
        ];

        for (t, e) in pairs {
            let payload = codec.encode(&TicketId::from(t), &EventId::from(e));
            let (ticket_id, event_id) = codec.decode(&payload).unwrap();
            assert_eq!(ticket_id.0, t);
            assert_eq!(event_id.0, e);
        }
    }

    #[test]
    fn test_encode_deterministic() {
        let codec = codec();
        let a = codec.encode(&TicketId::from("TKT-001-2024"), &EventId::from("EVT-001"));
        let b = codec.encode(&TicketId::from("TKT-001-2024"), &EventId::from("EVT-001"));
        assert_eq!(a, b);
        assert!(a.starts_with("GTK1."));
    }

    #[test]
    fn test_single_byte_corruption_rejected() {
        let codec = codec();
        let payload = codec.encode(&TicketId::from("TKT-001-2024"), &EventId::from("EVT-001"));

        // Flip one character at every position; every mutation must fail
        // (or, if it only touched base64 padding bits, decode to the same
        // identity - it must never map to a different ticket).
        let bytes = payload.as_bytes();
        for i in 0..bytes.len() {
            let mut mutated = bytes.to_vec();
            mutated[i] = if mutated[i] == b'A' { b'B' } else { b'A' };
            let Ok(mutated) = String::from_utf8(mutated) else { continue };
            if mutated == payload {
                continue;
            }
            match codec.decode(&mutated) {
                Err(CodecError::MalformedPayload) => {}
                Ok((t, e)) => {
                    assert_eq!(t.0, "TKT-001-2024");
                    assert_eq!(e.0, "EVT-001");
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_truncated_tag_rejected() {
        let codec = codec();
        let payload = codec.encode(&TicketId::from("TKT-001-2024"), &EventId::from("EVT-001"));
        let truncated = &payload[..payload.len() - 2];
        assert_eq!(codec.decode(truncated), Err(CodecError::MalformedPayload));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec_a = codec();
        let codec_b = QrCodec::new(b"another-secret-fedcba9876543210").unwrap();

        let payload = codec_a.encode(&TicketId::from("TKT-001-2024"), &EventId::from("EVT-001"));
        assert_eq!(codec_b.decode(&payload), Err(CodecError::MalformedPayload));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let codec = codec();
        let payload = codec.encode(&TicketId::from("TKT-001-2024"), &EventId::from("EVT-001"));
        let downgraded = payload.replacen("GTK1", "GTK9", 1);
        assert_eq!(codec.decode(&downgraded), Err(CodecError::MalformedPayload));
    }

    #[test]
    fn test_garbage_inputs_rejected() {
        let codec = codec();
        for garbage in ["", "TKT-001-2024", "GTK1", "GTK1..", "GTK1.a.b", "GTK1.a.b.c.d"] {
            assert_eq!(codec.decode(garbage), Err(CodecError::MalformedPayload));
        }
    }

    #[test]
    fn test_swapped_fields_rejected() {
        // Tag binds field order; swapping ticket and event must not verify
        let codec = codec();
        let payload = codec.encode(&TicketId::from("AAA"), &EventId::from("BBB"));
        let mut parts: Vec<&str> = payload.split('.').collect();
        parts.swap(1, 2);
        let swapped = parts.join(".");
        assert_eq!(codec.decode(&swapped), Err(CodecError::MalformedPayload));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert_eq!(QrCodec::new(b"too-short").unwrap_err(), CodecError::SecretTooShort);
    }
}
