//! Error types for peer session management

/// Result type alias using the crate's [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing peer sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local capture device unavailable or denied
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// A signaling message arrived for a session in a state that cannot
    /// accept it (e.g. an answer without a pending offer)
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// SDP description could not be created or applied
    #[error("SDP error: {0}")]
    Sdp(String),

    /// ICE candidate could not be parsed or applied
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// No session exists for the participant
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrack(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error is a media acquisition error
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::MediaAcquisition(_) | Error::MediaTrack(_))
    }

    /// Check if this error is a peer-related error
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::PeerConnection(_)
                | Error::Negotiation(_)
                | Error::IceCandidate(_)
                | Error::Sdp(_)
        )
    }
}
