//! HTTP request handlers for the RTMS client.

pub mod metrics;
pub mod webhook;

pub use metrics::metrics_handler;
pub use webhook::{webhook_handler, WebhookError};
