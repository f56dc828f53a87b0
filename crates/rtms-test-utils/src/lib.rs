//! # RTMS Test Utilities
//!
//! Shared test utilities for the RTMS client.
//!
//! - `mock_relay` - Scripted WebSocket relay for signaling and media tests
//! - `fixtures` - Relay frames, webhook bodies and signature checks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rtms_test_utils::{fixtures, MockRelay};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let mut relay = MockRelay::start().await.unwrap();
//!     // start a session against relay.url(), then:
//!     let mut signaling = relay.accept().await;
//!     let hello = signaling.recv_json().await;
//!     assert!(fixtures::signature_is_valid(
//!         &hello,
//!         fixtures::TEST_CLIENT_ID,
//!         fixtures::TEST_CLIENT_SECRET,
//!     ));
//! }
//! ```

pub mod fixtures;
pub mod mock_relay;

pub use mock_relay::{unused_local_url, MockRelay, RelayConnection, DEFAULT_WAIT};
