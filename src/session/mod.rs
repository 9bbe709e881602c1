//! Peer sessions and their manager

mod connection;
mod manager;

pub use connection::{NegotiationRole, PeerSession, SessionState};
pub use manager::{PeerDisconnectedHandler, PeerSessionManager, RemoteStream, RemoteStreamHandler};
