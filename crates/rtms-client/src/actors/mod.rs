//! Actor model for the RTMS client.
//!
//! ```text
//! SessionRegistry (singleton, owns meeting_id -> ManagedSession)
//! └── per session
//!     ├── SignalingChannel (task + mailbox)
//!     └── MediaChannel (task, spawned after the signaling handshake)
//! ```
//!
//! Each session owns a root `CancellationToken`; both channels run on child
//! tokens. Channels report to the registry fire-and-forget, and the media
//! channel reaches the signaling channel only through
//! [`StartStreamingRequester`].

pub mod media;
pub mod messages;
pub mod registry;
pub mod signaling;

pub use media::{MediaChannel, MediaChannelHandle, StartStreamingRequester};
pub use messages::{ChannelRole, MediaState, RegistryStatus, SessionInfo, SignalingState};
pub use registry::{ManagedSession, RegistryHandle, SessionRegistry};
pub use signaling::{SignalingChannel, SignalingChannelHandle};
