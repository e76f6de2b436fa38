//! Payload checksums for end-to-end data validation
//!
//! Clients that want to verify values survived the round trip through the
//! store can write [`append_checksum`]ed payloads and check what they read
//! back with [`is_checksum_valid`]. The format is the payload bytes followed
//! by the big-endian CRC32 of those bytes widened to eight bytes, all
//! base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const CHECKSUM_LEN: usize = 8;

fn crc_bytes(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    u64::from(crc32fast::hash(payload)).to_be_bytes()
}

/// Produce a base64 value carrying `input` plus its checksum
///
/// With `append` set the whole of `input` becomes the payload. Without it
/// the last [`CHECKSUM_LEN`] bytes of `input` are dropped first, so the
/// encoded value keeps the input's length; inputs shorter than that encode
/// an empty payload.
pub fn append_checksum(input: &str, append: bool) -> String {
    let bytes = input.as_bytes();
    let payload = if append {
        bytes
    } else {
        &bytes[..bytes.len().saturating_sub(CHECKSUM_LEN)]
    };
    let mut out = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc_bytes(payload));
    STANDARD.encode(out)
}

/// Check a value produced by [`append_checksum`]
///
/// Returns `false` for anything that is not valid base64, is too short to
/// carry a checksum, or whose checksum does not match the payload.
pub fn is_checksum_valid(encoded: &str) -> bool {
    let Ok(decoded) = STANDARD.decode(encoded) else {
        return false;
    };
    if decoded.len() < CHECKSUM_LEN {
        return false;
    }
    let (payload, checksum) = decoded.split_at(decoded.len() - CHECKSUM_LEN);
    checksum == crc_bytes(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_checksum_validates() {
        let value = append_checksum("hello world", true);
        assert!(is_checksum_valid(&value));
    }

    #[test]
    fn replaced_checksum_keeps_length_and_validates() {
        let input = "a".repeat(64);
        let value = append_checksum(&input, false);
        assert!(is_checksum_valid(&value));
        let decoded = STANDARD.decode(&value).unwrap();
        assert_eq!(decoded.len(), input.len());
    }

    #[test]
    fn empty_payload_still_validates() {
        assert!(is_checksum_valid(&append_checksum("", true)));
        assert!(is_checksum_valid(&append_checksum("short", false)));
    }

    #[test]
    fn tampered_payload_fails_validation() {
        let value = append_checksum("hello world", true);
        let mut decoded = STANDARD.decode(&value).unwrap();
        decoded[0] ^= 0xFF;
        let tampered = STANDARD.encode(decoded);
        assert!(!is_checksum_valid(&tampered));
    }

    #[test]
    fn garbage_inputs_are_rejected() {
        assert!(!is_checksum_valid("not base64 !!!"));
        assert!(!is_checksum_valid(""));
        // valid base64, too short for a checksum
        assert!(!is_checksum_valid(&STANDARD.encode("abc")));
    }
}
