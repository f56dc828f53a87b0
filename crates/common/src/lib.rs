//! Common utilities and types shared across the RTMS client crates.

#![warn(clippy::pedantic)]

/// Module for keyed-hash helpers (handshake signatures, webhook validation)
pub mod hmac;

/// Module for secret types that prevent accidental logging
pub mod secret;
