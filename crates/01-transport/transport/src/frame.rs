//! Envelope framing applied to every buffer crossing the transport.
//!
//! Layout:
//!
//! ```text
//! +------------------+--------+--------+-------------+----------------------+
//! | u32 payload_len  | u8 tag | u8 ver | u16 flags   | payload (payload_len) |
//! +------------------+--------+--------+-------------+----------------------+
//! ```
//!
//! All multi-byte fields are little-endian. The length prefix must account for
//! the whole remainder of the buffer; anything else is rejected.

use crate::error::{TransportError, TransportResult};

/// Size of the header preceding every payload.
pub const ENVELOPE_LEN: usize = 8;

/// Header fields carried in front of every payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Discriminant selecting how the payload is interpreted.
    pub tag: u8,
    /// Control schema version the payload was written with.
    pub ver: u8,
    /// Unused by the applicator; carried through untouched.
    pub flags: u16,
}

impl Envelope {
    pub const fn new(tag: u8, ver: u8) -> Self {
        Self { tag, ver, flags: 0 }
    }
}

/// Borrowed view of a decoded frame.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub envelope: Envelope,
    pub payload: &'a [u8],
}

/// Prefixes `payload` with its envelope header.
pub fn encode_frame(envelope: Envelope, payload: &[u8]) -> TransportResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        TransportError::frame(format!(
            "payload of {} bytes exceeds the u32 length prefix",
            payload.len()
        ))
    })?;
    let mut out = Vec::with_capacity(ENVELOPE_LEN + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.push(envelope.tag);
    out.push(envelope.ver);
    out.extend_from_slice(&envelope.flags.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Splits a buffer into its envelope and payload, validating the length prefix.
pub fn decode_frame(bytes: &[u8]) -> TransportResult<Frame<'_>> {
    if bytes.len() < ENVELOPE_LEN {
        return Err(TransportError::frame(format!(
            "buffer of {} bytes is shorter than the {ENVELOPE_LEN}-byte envelope",
            bytes.len()
        )));
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = &bytes[ENVELOPE_LEN..];
    if payload.len() != declared {
        return Err(TransportError::frame(format!(
            "length prefix declares {declared} payload bytes, buffer carries {}",
            payload.len()
        )));
    }
    let envelope = Envelope {
        tag: bytes[4],
        ver: bytes[5],
        flags: u16::from_le_bytes([bytes[6], bytes[7]]),
    };
    Ok(Frame { envelope, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_preserves_envelope_and_payload() {
        let envelope = Envelope {
            tag: 0x2A,
            ver: 3,
            flags: 0xBEEF,
        };
        let bytes = encode_frame(envelope, b"payload").expect("encode");
        assert_eq!(bytes.len(), ENVELOPE_LEN + 7);

        let frame = decode_frame(&bytes).expect("decode");
        assert_eq!(frame.envelope, envelope);
        assert_eq!(frame.payload, b"payload");
    }

    #[test]
    fn empty_payload_is_header_only() {
        let bytes = encode_frame(Envelope::new(1, 1), &[]).expect("encode");
        assert_eq!(bytes.len(), ENVELOPE_LEN);
        assert!(decode_frame(&bytes).expect("decode").payload.is_empty());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = decode_frame(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, TransportError::Frame(_)));
    }

    #[test]
    fn length_prefix_must_match() {
        let mut bytes = encode_frame(Envelope::new(1, 1), b"abcd").expect("encode");
        bytes.pop();
        let err = decode_frame(&bytes).unwrap_err();
        assert!(err.to_string().contains("declares 4"));
    }
}
