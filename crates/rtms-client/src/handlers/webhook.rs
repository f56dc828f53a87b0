//! Webhook handler for control-plane events.
//!
//! One `POST` route receives `{event, payload}` bodies:
//!
//! - `endpoint.url_validation` - answered with `{plainToken, encryptedToken}`
//! - `meeting.rtms_started` - [`SessionController::on_session_start`]
//! - `meeting.rtms_stopped` - [`SessionController::on_session_stop`]
//!
//! Any other event is acknowledged with 200 and ignored. Bodies that do not
//! parse or lack a required field get a 400 with a JSON error body. Session
//! starts during shutdown get a 503.
//!
//! [`SessionController::on_session_start`]: crate::controller::SessionController::on_session_start
//! [`SessionController::on_session_stop`]: crate::controller::SessionController::on_session_stop

use crate::errors::RtmsError;
use crate::routes::AppState;
use crate::signature;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

const EVENT_URL_VALIDATION: &str = "endpoint.url_validation";
const EVENT_RTMS_STARTED: &str = "meeting.rtms_started";
const EVENT_RTMS_STOPPED: &str = "meeting.rtms_stopped";

/// Webhook error type.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload { event: &'static str, reason: String },

    #[error("Session error: {0}")]
    Session(#[from] RtmsError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            WebhookError::InvalidBody(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                "Request body is not a valid event".to_string(),
            ),
            WebhookError::InvalidPayload { event, reason } => (
                StatusCode::BAD_REQUEST,
                "INVALID_PAYLOAD",
                format!("Invalid {event} payload: {reason}"),
            ),
            WebhookError::Session(RtmsError::ShuttingDown) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service is shutting down".to_string(),
            ),
            WebhookError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct UrlValidationPayload {
    #[serde(rename = "plainToken")]
    plain_token: String,
}

#[derive(Debug, Serialize)]
struct UrlValidationResponse {
    #[serde(rename = "plainToken")]
    plain_token: String,
    #[serde(rename = "encryptedToken")]
    encrypted_token: String,
}

#[derive(Debug, Deserialize)]
struct RtmsStartedPayload {
    meeting_uuid: String,
    rtms_stream_id: String,
    server_urls: String,
}

#[derive(Debug, Deserialize)]
struct RtmsStoppedPayload {
    meeting_uuid: String,
}

fn parse_payload<T: for<'de> Deserialize<'de>>(
    event: &'static str,
    payload: &Value,
) -> Result<T, WebhookError> {
    T::deserialize(payload).map_err(|e| WebhookError::InvalidPayload {
        event,
        reason: e.to_string(),
    })
}

/// Handler for POST {WEBHOOK_PATH}
#[instrument(skip_all, name = "rtms.webhook", fields(event = tracing::field::Empty))]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(target: "rtms.webhook", error = %e, "Rejecting malformed webhook body");
        WebhookError::InvalidBody(e.to_string())
    })?;

    tracing::Span::current().record("event", event.event.as_str());

    match event.event.as_str() {
        EVENT_URL_VALIDATION => {
            let payload: UrlValidationPayload = parse_payload(EVENT_URL_VALIDATION, &event.payload)?;
            let encrypted_token =
                signature::url_validation_token(&payload.plain_token, &state.webhook_secret);

            info!(target: "rtms.webhook", "Answered endpoint URL validation");

            Ok(Json(UrlValidationResponse {
                plain_token: payload.plain_token,
                encrypted_token,
            })
            .into_response())
        }

        EVENT_RTMS_STARTED => {
            let payload: RtmsStartedPayload = parse_payload(EVENT_RTMS_STARTED, &event.payload)?;

            state
                .controller
                .on_session_start(&payload.meeting_uuid, &payload.rtms_stream_id, &payload.server_urls)
                .await
                .map_err(|e| {
                    error!(
                        target: "rtms.webhook",
                        meeting_id = %payload.meeting_uuid,
                        error = %e,
                        "Session start failed"
                    );
                    WebhookError::from(e)
                })?;

            Ok(StatusCode::OK.into_response())
        }

        EVENT_RTMS_STOPPED => {
            let payload: RtmsStoppedPayload = parse_payload(EVENT_RTMS_STOPPED, &event.payload)?;

            state
                .controller
                .on_session_stop(&payload.meeting_uuid)
                .await
                .map_err(|e| {
                    error!(
                        target: "rtms.webhook",
                        meeting_id = %payload.meeting_uuid,
                        error = %e,
                        "Session stop failed"
                    );
                    WebhookError::from(e)
                })?;

            Ok(StatusCode::OK.into_response())
        }

        other => {
            debug!(target: "rtms.webhook", event = %other, "Ignoring webhook event");
            Ok(StatusCode::OK.into_response())
        }
    }
}
