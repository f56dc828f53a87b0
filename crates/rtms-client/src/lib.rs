//! RTMS Client Library
//!
//! Joins real-time media streaming sessions. For every session announced by
//! the control plane the client opens a signaling channel, authenticates
//! with an HMAC signature, opens a media channel on the URL the signaling
//! handshake advertises, and forwards media frames to a [`sink::FrameSink`].
//!
//! # Architecture
//!
//! ```text
//! routes.rs -> handlers/webhook.rs -> controller.rs -> actors/registry.rs
//!                                                      ├── actors/signaling.rs
//!                                                      └── actors/media.rs
//! ```
//!
//! # Modules
//!
//! - `actors` - Session registry and the two channel actors
//! - `config` - Configuration from environment
//! - `controller` - Session start/stop entry points
//! - `errors` - Error types
//! - `handlers` - Webhook and metrics HTTP handlers
//! - `observability` - Health endpoints and metrics
//! - `protocol` - Wire messages, decoding and status code names
//! - `routes` - Axum router setup
//! - `session` - Session identity, credentials, shared channel context
//! - `signature` - HMAC handshake signatures and URL validation tokens
//! - `sink` - Destination for media frames
//! - `transport` - WebSocket dial, send and close helpers

pub mod actors;
pub mod config;
pub mod controller;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod signature;
pub mod sink;
pub mod transport;
