//! HMAC-SHA256 request signatures.
//!
//! The signed message is `timestamp || '\n' || body`, where `timestamp` is
//! the decimal Unix time sent in `X-Probe-Timestamp`. The tag travels
//! lowercase-hex encoded in `X-Probe-Signature`. Replay-window checks belong
//! to the collector.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &[u8], timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC takes keys of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(body);
    mac
}

/// Computes the lowercase-hex signature of a report.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    hex::encode(keyed(secret, timestamp, body).finalize().into_bytes())
}

/// Checks a signature the way the collector does.
///
/// The timestamp must be 1-20 ASCII digits. The signature may carry
/// surrounding whitespace, a `0x` prefix and either letter case, but must be
/// exactly 64 hex digits. The comparison is constant time. An empty secret
/// never verifies.
pub fn verify(secret: &[u8], timestamp: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(timestamp) = normalize_timestamp(timestamp) else {
        return false;
    };
    let Some(tag) = decode_signature(signature) else {
        return false;
    };
    keyed(secret, timestamp, body).verify_slice(&tag).is_ok()
}

fn normalize_timestamp(raw: &str) -> Option<&str> {
    let ts = raw.trim();
    let valid = (1..=20).contains(&ts.len()) && ts.bytes().all(|b| b.is_ascii_digit());
    valid.then_some(ts)
}

fn decode_signature(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_part.len() != 64 {
        return None;
    }
    hex::decode(hex_part).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"s3cr3t";
    const BODY: &[u8] = br#"{"nodeId":"n1"}"#;

    #[test]
    fn test_sign_covers_timestamp_newline_body() {
        let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want\nfor nothing?");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(sign(b"Jefe", "what do ya want", b"for nothing?"), expected);
    }

    #[test]
    fn test_deterministic_lowercase_hex() {
        let a = sign(SECRET, "1700000000", BODY);
        let b = sign(SECRET, "1700000000", BODY);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_single_byte_changes_alter_signature() {
        let base = sign(SECRET, "1700000000", BODY);

        let mut body = BODY.to_vec();
        body[3] ^= 0x01;
        assert_ne!(sign(SECRET, "1700000000", &body), base);
        assert_ne!(sign(SECRET, "1700000001", BODY), base);
        assert_ne!(sign(b"s3cr3u", "1700000000", BODY), base);
    }

    #[test]
    fn test_newline_separator_is_part_of_message() {
        // Moving bytes across the separator must not collide.
        assert_ne!(sign(SECRET, "17", b"00"), sign(SECRET, "1700", b""));
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let sig = sign(SECRET, "1700000000", BODY);
        assert!(verify(SECRET, "1700000000", BODY, &sig));
        assert!(verify(SECRET, " 1700000000 ", BODY, &format!("  0x{}  ", sig)));
        assert!(verify(SECRET, "1700000000", BODY, &sig.to_uppercase()));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let sig = sign(SECRET, "1700000000", BODY);
        assert!(!verify(SECRET, "1700000001", BODY, &sig));
        assert!(!verify(SECRET, "1700000000", b"{}", &sig));
        assert!(!verify(b"other", "1700000000", BODY, &sig));
        assert!(!verify(b"", "1700000000", BODY, &sig));
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        let sig = sign(SECRET, "1700000000", BODY);
        assert!(!verify(SECRET, "", BODY, &sig));
        assert!(!verify(SECRET, "17e8", BODY, &sig));
        assert!(!verify(SECRET, "123456789012345678901", BODY, &sig));
        assert!(!verify(SECRET, "1700000000", BODY, &sig[..62]));
        assert!(!verify(SECRET, "1700000000", BODY, &format!("{}zz", &sig[..62])));
        assert!(!verify(SECRET, "1700000000", BODY, ""));
    }
}
