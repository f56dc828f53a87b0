//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. The RTMS client
//! holds two long-lived secrets, the OAuth client secret that keys the relay
//! handshake signature and the webhook secret token that keys the URL
//! validation response. Both must stay out of logs and `Debug` output.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` and holds one is safe to hand to `tracing`:
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = Credentials {
//!     client_id: "client-abc".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//!
//! // Reading the value is always an explicit, greppable call.
//! let key: &str = creds.client_secret.expose_secret();
//! assert_eq!(key, "s3cr3t");
//! ```
//!
//! Secrets are zeroized when dropped.

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("client-secret-value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("client-secret-value"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("webhook-token");
        assert_eq!(secret.expose_secret(), "webhook-token");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Credentials {
            client_id: String,
            client_secret: SecretString,
        }

        let creds = Credentials {
            client_id: "client-abc".to_string(),
            client_secret: SecretString::from("super-secret"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("client-abc"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super-secret"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Credentials {
            client_id: String,
            client_secret: SecretString,
        }

        let json = r#"{"client_id": "client-abc", "client_secret": "my-secret-value"}"#;
        let creds: Credentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.client_secret.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
