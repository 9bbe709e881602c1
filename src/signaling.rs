//! Signaling message types and the channel seam
//!
//! The manager never talks to a signaling server directly; it depends on an
//! injected [`SignalingChannel`] that can deliver a payload to a named
//! participant. Routing (who a message is from and to) is the channel's
//! concern and is not embedded in the payload.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Negotiation messages exchanged between two peers
///
/// SDP descriptions and ICE candidates are opaque pass-through values as far
/// as the transport is concerned. Candidates travel as serialized
/// `RTCIceCandidateInit` JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// SDP offer starting a negotiation
    Offer {
        /// SDP offer string
        sdp: String,
    },

    /// SDP answer completing a negotiation
    Answer {
        /// SDP answer string
        sdp: String,
    },

    /// Locally discovered network candidate
    IceCandidate {
        /// Serialized `RTCIceCandidateInit` JSON
        candidate: String,
    },
}

impl SignalingMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::Serialization(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize signaling message: {}", e))
        })
    }

    /// Get the message kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::IceCandidate { .. } => "ice-candidate",
        }
    }
}

/// Outbound half of the signaling relay
///
/// Delivery guarantees are the channel's responsibility; the manager treats
/// `send` as fire-and-forget and only logs failures. The inbound half is the
/// adapter calling
/// [`PeerSessionManager::handle_signaling_message`](crate::PeerSessionManager::handle_signaling_message)
/// for each message addressed to this peer.
///
/// The channel must preserve per-participant message order; the manager never
/// reorders on its own, but tolerates candidates arriving before
/// descriptions.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Deliver `message` to the remote participant `participant_id`
    async fn send(&self, participant_id: &str, message: SignalingMessage) -> crate::Result<()>;
}
