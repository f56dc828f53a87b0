//! HMAC-SHA256 helpers.
//!
//! Both the relay handshake signature and the webhook URL validation token
//! are `hex(HMAC-SHA256(key, message))`. They only differ in key and message,
//! so the primitive lives here and the callers own the message layout.

use ring::hmac;

/// Compute `HMAC-SHA256(key, message)` and render it as lowercase hex.
#[must_use]
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, message);
    hex::encode(tag.as_ref())
}

/// Verify a hex-encoded HMAC-SHA256 tag in constant time.
///
/// Returns `false` for tags that are not valid hex.
#[must_use]
pub fn verify_hmac_sha256_hex(key: &[u8], message: &[u8], tag_hex: &str) -> bool {
    let Ok(tag) = hex::decode(tag_hex) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, message, &tag).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4231_case_2() {
        // RFC 4231 test case 2
        let tag = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            tag,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_output_is_lowercase_hex_of_digest_length() {
        let tag = hmac_sha256_hex(b"key", b"message");
        assert_eq!(tag.len(), 64);
        assert!(tag
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_verify_roundtrip_and_tamper() {
        let tag = hmac_sha256_hex(b"key", b"message");
        assert!(verify_hmac_sha256_hex(b"key", b"message", &tag));
        assert!(!verify_hmac_sha256_hex(b"key", b"messagf", &tag));
        assert!(!verify_hmac_sha256_hex(b"other", b"message", &tag));
        assert!(!verify_hmac_sha256_hex(b"key", b"message", "not-hex"));
    }
}
