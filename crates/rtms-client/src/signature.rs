//! Handshake and webhook signatures.

use common::hmac::hmac_sha256_hex;
use common::secret::{ExposeSecret, SecretString};

/// Handshake signature: `hex(HMAC-SHA256(client_secret, "client_id,meeting_id,stream_id"))`.
///
/// Both channel handshakes send the same value.
#[must_use]
pub fn sign(client_id: &str, meeting_id: &str, stream_id: &str, client_secret: &SecretString) -> String {
    let message = format!("{client_id},{meeting_id},{stream_id}");
    hmac_sha256_hex(client_secret.expose_secret().as_bytes(), message.as_bytes())
}

/// Webhook URL validation token: `hex(HMAC-SHA256(secret_token, plain_token))`.
#[must_use]
pub fn url_validation_token(plain_token: &str, secret_token: &SecretString) -> String {
    hmac_sha256_hex(secret_token.expose_secret().as_bytes(), plain_token.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::hmac::verify_hmac_sha256_hex;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value)
    }

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("client", "m1", "s1", &secret("shh"));
        let b = sign("client", "m1", "s1", &secret("shh"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_sign_covers_comma_joined_tuple() {
        let tag = sign("client", "m1", "s1", &secret("shh"));
        assert!(verify_hmac_sha256_hex(b"shh", b"client,m1,s1", &tag));
    }

    #[test]
    fn test_sign_changes_with_every_input() {
        let base = sign("client", "m1", "s1", &secret("shh"));
        assert_ne!(base, sign("client2", "m1", "s1", &secret("shh")));
        assert_ne!(base, sign("client", "m2", "s1", &secret("shh")));
        assert_ne!(base, sign("client", "m1", "s2", &secret("shh")));
        assert_ne!(base, sign("client", "m1", "s1", &secret("other")));
    }

    #[test]
    fn test_url_validation_token() {
        let token = url_validation_token("plain-abc", &secret("webhook-secret"));
        assert!(verify_hmac_sha256_hex(
            b"webhook-secret",
            b"plain-abc",
            &token
        ));
        assert_ne!(token, url_validation_token("plain-abd", &secret("webhook-secret")));
    }
}
