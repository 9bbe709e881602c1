//! Peer session management for small-group WebRTC calls
//!
//! This crate manages the client side of a mesh call: one local capture, one
//! peer connection per remote participant, and the offer/answer/candidate
//! exchange that binds them together over an injected signaling channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 PeerSessionManager                   │
//! │                                                      │
//! │  LocalMedia (one capture, shared tracks)             │
//! │      │                                               │
//! │      ├──► PeerSession "alice"  ◄──┐                  │
//! │      ├──► PeerSession "bob"    ◄──┤  SignalingChannel│
//! │      └──► PeerSession "carol"  ◄──┘  (injected)      │
//! │                                                      │
//! │  callbacks: on_remote_stream / on_peer_disconnected  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions are keyed by participant id and fully independent of each other.
//! Each wraps one `RTCPeerConnection`, tracks its negotiation role, and
//! buffers early ICE candidates until the remote description lands.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use studyroom_rtc::{PeerSessionManager, RtcConfig, SignalingChannel, SignalingMessage};
//!
//! # async fn example(channel: Arc<dyn SignalingChannel>) -> studyroom_rtc::Result<()> {
//! let manager = PeerSessionManager::new(RtcConfig::default(), channel)?;
//!
//! manager.initialize_local_media(true, true).await?;
//!
//! manager
//!     .on_remote_stream(|participant_id, stream| {
//!         println!("media from {}: audio={}", participant_id, stream.audio().is_some());
//!     })
//!     .await;
//!
//! // Call the participant who just joined
//! manager.create_session("alice", true).await?;
//!
//! // ... feed inbound messages via manager.handle_signaling_message(...)
//!
//! manager.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;

pub use config::RtcConfig;
pub use error::{Error, Result};
pub use media::{LocalMedia, LocalTrack, MediaConstraints, MediaKind};
pub use session::{
    NegotiationRole, PeerDisconnectedHandler, PeerSession, PeerSessionManager, RemoteStream,
    RemoteStreamHandler, SessionState,
};
pub use signaling::{SignalingChannel, SignalingMessage};

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
