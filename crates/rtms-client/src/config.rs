//! RTMS client configuration.
//!
//! Configuration is loaded from environment variables, with a `.env` file
//! in the working directory (or a parent) filling in anything the process
//! environment does not set. The client secret and the webhook secret token
//! are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default HTTP listen port for the webhook server.
pub const DEFAULT_PORT: u16 = 3000;

/// Default webhook route.
pub const DEFAULT_WEBHOOK_PATH: &str = "/";

/// Default bound on awaiting a channel task while stopping a session.
pub const DEFAULT_CHANNEL_CLOSE_TIMEOUT_MS: u64 = 5000;

/// RTMS client configuration.
#[derive(Clone)]
pub struct Config {
    /// OAuth client id, the first element of the handshake signature tuple.
    pub client_id: String,

    /// OAuth client secret, the handshake signature key.
    pub client_secret: SecretString,

    /// Webhook secret token, the key for URL validation responses.
    pub webhook_secret_token: SecretString,

    /// HTTP listen port (default: 3000).
    pub port: u16,

    /// Route the webhook is mounted on (default: "/").
    pub webhook_path: String,

    /// Event types subscribed after the signaling handshake (default: none).
    pub event_subscriptions: Vec<i64>,

    /// Bound on awaiting each channel task during a session stop.
    pub channel_close_timeout: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("webhook_secret_token", &"[REDACTED]")
            .field("port", &self.port)
            .field("webhook_path", &self.webhook_path)
            .field("event_subscriptions", &self.event_subscriptions)
            .field("channel_close_timeout", &self.channel_close_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to read env file: {0}")]
    EnvFile(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Optional variables treat an empty value as unset.
fn optional<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a String> {
    vars.get(name).filter(|value| !value.is_empty())
}

fn collect_env_file<R: Read>(entries: dotenvy::Iter<R>) -> Result<HashMap<String, String>, ConfigError> {
    entries
        .map(|entry| entry.map_err(|e| ConfigError::EnvFile(e.to_string())))
        .collect()
}

/// Read `KEY=value` pairs from a dotenv file without touching the process
/// environment.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let entries = dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::EnvFile(format!("{}: {e}", path.display())))?;
    collect_env_file(entries)
}

/// Layer process variables over file variables. A variable set in the
/// process environment wins, even when empty.
pub fn layered(
    file_vars: HashMap<String, String>,
    process_vars: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut vars = file_vars;
    vars.extend(process_vars);
    vars
}

impl Config {
    /// Load configuration from environment variables and an optional `.env`
    /// file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file_vars = match dotenvy::dotenv_iter() {
            Ok(entries) => {
                let vars = collect_env_file(entries)?;
                debug!(target: "rtms.config", count = vars.len(), "Loaded .env file");
                vars
            }
            Err(e) if e.not_found() => {
                debug!(target: "rtms.config", "No .env file found, using process environment only");
                HashMap::new()
            }
            Err(e) => return Err(ConfigError::EnvFile(e.to_string())),
        };

        Self::from_vars(&layered(file_vars, env::vars()))
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let client_id = required(vars, "ZM_CLIENT_ID")?;
        let client_secret = SecretString::from(required(vars, "ZM_CLIENT_SECRET")?);
        let webhook_secret_token = SecretString::from(required(vars, "ZOOM_SECRET_TOKEN")?);

        let port = match optional(vars, "PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue(format!("PORT={raw}: {e}")))?,
            None => DEFAULT_PORT,
        };

        let webhook_path = optional(vars, "WEBHOOK_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
        if !webhook_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "WEBHOOK_PATH must start with '/': {webhook_path}"
            )));
        }

        // Comma-separated event types, e.g. "2,3,4"
        let event_subscriptions = match optional(vars, "RTMS_EVENT_SUBSCRIPTIONS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    item.parse::<i64>().map_err(|e| {
                        ConfigError::InvalidValue(format!("RTMS_EVENT_SUBSCRIPTIONS={raw}: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let close_timeout_ms = match optional(vars, "RTMS_CHANNEL_CLOSE_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue(format!("RTMS_CHANNEL_CLOSE_TIMEOUT_MS={raw}: {e}"))
            })?,
            None => DEFAULT_CHANNEL_CLOSE_TIMEOUT_MS,
        };

        Ok(Config {
            client_id,
            client_secret,
            webhook_secret_token,
            port,
            webhook_path,
            event_subscriptions,
            channel_close_timeout: Duration::from_millis(close_timeout_ms),
        })
    }

    /// Address the webhook server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("ZM_CLIENT_ID".to_string(), "client-abc".to_string()),
            ("ZM_CLIENT_SECRET".to_string(), "client-secret-xyz".to_string()),
            ("ZOOM_SECRET_TOKEN".to_string(), "webhook-token-123".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.client_id, "client-abc");
        assert_eq!(config.client_secret.expose_secret(), "client-secret-xyz");
        assert_eq!(config.webhook_secret_token.expose_secret(), "webhook-token-123");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.webhook_path, DEFAULT_WEBHOOK_PATH);
        assert!(config.event_subscriptions.is_empty());
        assert_eq!(
            config.channel_close_timeout,
            Duration::from_millis(DEFAULT_CHANNEL_CLOSE_TIMEOUT_MS)
        );
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("PORT".to_string(), "8080".to_string());
        vars.insert("WEBHOOK_PATH".to_string(), "/webhook".to_string());
        vars.insert("RTMS_EVENT_SUBSCRIPTIONS".to_string(), "2, 3,4".to_string());
        vars.insert("RTMS_CHANNEL_CLOSE_TIMEOUT_MS".to_string(), "250".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.port, 8080);
        assert_eq!(config.webhook_path, "/webhook");
        assert_eq!(config.event_subscriptions, vec![2, 3, 4]);
        assert_eq!(config.channel_close_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_from_vars_missing_required() {
        for name in ["ZM_CLIENT_ID", "ZM_CLIENT_SECRET", "ZOOM_SECRET_TOKEN"] {
            let mut vars = base_vars();
            vars.remove(name);

            let result = Config::from_vars(&vars);
            assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == name));
        }
    }

    #[test]
    fn test_from_vars_empty_required_is_missing() {
        let mut vars = base_vars();
        vars.insert("ZM_CLIENT_SECRET".to_string(), String::new());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "ZM_CLIENT_SECRET"));
    }

    #[test]
    fn test_from_vars_empty_optional_uses_default() {
        let mut vars = base_vars();
        for name in [
            "PORT",
            "WEBHOOK_PATH",
            "RTMS_EVENT_SUBSCRIPTIONS",
            "RTMS_CHANNEL_CLOSE_TIMEOUT_MS",
        ] {
            vars.insert(name.to_string(), String::new());
        }

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.webhook_path, DEFAULT_WEBHOOK_PATH);
        assert!(config.event_subscriptions.is_empty());
        assert_eq!(
            config.channel_close_timeout,
            Duration::from_millis(DEFAULT_CHANNEL_CLOSE_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_env_file_supplies_missing_vars() {
        let path = env::temp_dir().join(format!("rtms-client-{}.env", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "# local setup\nZM_CLIENT_ID=file-client\nZM_CLIENT_SECRET=file-secret\n\
             ZOOM_SECRET_TOKEN=file-token\nPORT=4000\n",
        )
        .unwrap();

        let file_vars = read_env_file(&path);
        std::fs::remove_file(&path).unwrap();

        let vars = layered(
            file_vars.unwrap(),
            [("ZM_CLIENT_ID".to_string(), "process-client".to_string())],
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.client_id, "process-client");
        assert_eq!(config.client_secret.expose_secret(), "file-secret");
        assert_eq!(config.webhook_secret_token.expose_secret(), "file-token");
        assert_eq!(config.port, 4000);
    }

    #[test]
    fn test_missing_env_file_is_an_error_when_named() {
        let path = env::temp_dir().join(format!("rtms-client-{}.env", uuid::Uuid::new_v4()));

        assert!(matches!(read_env_file(&path), Err(ConfigError::EnvFile(_))));
    }

    #[test]
    fn test_from_vars_invalid_values() {
        for (name, value) in [
            ("PORT", "not-a-port"),
            ("PORT", "70000"),
            ("WEBHOOK_PATH", "webhook"),
            ("RTMS_EVENT_SUBSCRIPTIONS", "2,x"),
            ("RTMS_CHANNEL_CLOSE_TIMEOUT_MS", "-1"),
        ] {
            let mut vars = base_vars();
            vars.insert(name.to_string(), value.to_string());

            let result = Config::from_vars(&vars);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("client-abc"));
        assert!(!debug_output.contains("client-secret-xyz"));
        assert!(!debug_output.contains("webhook-token-123"));
    }
}
