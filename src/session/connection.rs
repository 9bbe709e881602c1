//! One negotiated connection to a single remote participant

use crate::config::RtcConfig;
use crate::media::LocalMedia;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

/// Which side of the handshake this session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// This side creates and sends the offer
    Initiator,
    /// This side answers an inbound offer
    Responder,
}

/// Observed connection state of a session
///
/// `Disconnected` and `Failed` are terminal: the manager tears the session
/// down when either is reached. No reconnection is attempted; the caller
/// re-creates the session to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, negotiation not yet started
    New,
    /// Negotiation or connectivity checks in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity lost
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Explicitly closed by this side
    Closed,
}

/// Wrapper around a webrtc-rs `RTCPeerConnection` for one remote participant
///
/// Candidates that arrive before the remote description are buffered and
/// flushed once it is applied, so channel-level reordering between ICE and
/// offer/answer never fails a session.
pub struct PeerSession {
    participant_id: String,
    role: NegotiationRole,
    peer_connection: Arc<RTCPeerConnection>,
    state: Arc<RwLock<SessionState>>,
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    torn_down: AtomicBool,
}

impl PeerSession {
    /// Create a new session for `participant_id`
    ///
    /// Configures the connection with the STUN servers from `config` only;
    /// there is no TURN fallback.
    pub async fn new(
        participant_id: String,
        role: NegotiationRole,
        config: &RtcConfig,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtc(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine)
                .map_err(|e| Error::WebRtc(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::PeerConnection(format!("Failed to create connection: {}", e)))?,
        );

        info!(
            "Created peer session: participant_id={}, role={:?}",
            participant_id, role
        );

        Ok(Self {
            participant_id,
            role,
            peer_connection,
            state: Arc::new(RwLock::new(SessionState::New)),
            pending_candidates: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Get the remote participant id
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Get the negotiation role
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Get the current observed state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub(crate) fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    pub(crate) fn state_cell(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.state)
    }

    /// Mark the session torn down; returns true the first time only
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }

    /// Attach every currently acquired local track
    ///
    /// Tracks are attached by reference, so this session sends the same
    /// capture as every other session and observes the same toggles.
    pub(crate) async fn attach_local_tracks(&self, media: &LocalMedia) -> Result<()> {
        for track in media.tracks() {
            self.peer_connection
                .add_track(track.rtp_track() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| Error::MediaTrack(format!("Failed to add local track: {}", e)))?;
        }
        Ok(())
    }

    /// Create an SDP offer and apply it as the local description
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::Sdp("No local description after setting offer".to_string()))?;

        debug!("Created SDP offer for participant {}", self.participant_id);

        Ok(local_desc.sdp)
    }

    /// Apply a remote offer and produce the answer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negotiation`] when the session is not in a state that
    /// can accept an offer (e.g. it already sent one and is awaiting the
    /// answer). The caller drops the message; the session is left as-is.
    pub async fn accept_offer(&self, offer_sdp: String) -> Result<String> {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::Stable | RTCSignalingState::HaveRemoteOffer => {}
            state => {
                return Err(Error::Negotiation(format!(
                    "Cannot accept offer from {} in signaling state {}",
                    self.participant_id, state
                )))
            }
        }

        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| Error::Sdp(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to apply remote offer: {}", e)))?;

        self.flush_pending_candidates().await;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::Sdp("No local description after setting answer".to_string()))?;

        debug!("Created SDP answer for participant {}", self.participant_id);

        Ok(local_desc.sdp)
    }

    /// Apply a remote answer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negotiation`] when no offer of ours is outstanding
    /// (e.g. the session is already connected). The caller drops the message.
    pub async fn accept_answer(&self, answer_sdp: String) -> Result<()> {
        if self.peer_connection.signaling_state() != RTCSignalingState::HaveLocalOffer {
            return Err(Error::Negotiation(format!(
                "Unexpected answer from {} in signaling state {}",
                self.participant_id,
                self.peer_connection.signaling_state()
            )));
        }

        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| Error::Sdp(format!("Failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to apply remote answer: {}", e)))?;

        self.flush_pending_candidates().await;

        debug!("Applied SDP answer from participant {}", self.participant_id);

        Ok(())
    }

    /// Apply a remote ICE candidate, buffering it if the remote description
    /// has not arrived yet
    ///
    /// `candidate_json` is serialized `RTCIceCandidateInit` JSON as produced
    /// by the remote side's candidate handler.
    pub async fn add_remote_candidate(&self, candidate_json: &str) -> Result<()> {
        let candidate: RTCIceCandidateInit = serde_json::from_str(candidate_json)
            .map_err(|e| Error::IceCandidate(format!("Failed to parse ICE candidate: {}", e)))?;

        if self.peer_connection.remote_description().await.is_none() {
            let mut pending = self.pending_candidates.lock().await;
            pending.push(candidate);
            debug!(
                "Buffered early ICE candidate from {} ({} pending)",
                self.participant_id,
                pending.len()
            );
            return Ok(());
        }

        self.peer_connection
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {}", e)))
    }

    /// Apply candidates that arrived before the remote description
    async fn flush_pending_candidates(&self) {
        let pending: Vec<_> = self.pending_candidates.lock().await.drain(..).collect();
        if pending.is_empty() {
            return;
        }

        debug!(
            "Flushing {} buffered ICE candidates for {}",
            pending.len(),
            self.participant_id
        );

        for candidate in pending {
            if let Err(e) = self.peer_connection.add_ice_candidate(candidate).await {
                // A stale candidate must not fail the whole session
                debug!(
                    "Dropping buffered candidate for {}: {}",
                    self.participant_id, e
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().await.len()
    }

    /// Close the underlying connection
    pub async fn close(&self) -> Result<()> {
        info!("Closing peer session for {}", self.participant_id);

        *self.state.write().await = SessionState::Closed;

        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to close connection: {}", e)))
    }
}
