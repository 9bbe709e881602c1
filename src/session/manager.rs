//! Multi-party session management
//!
//! [`PeerSessionManager`] owns one local capture and an independent
//! [`PeerSession`] per remote participant. It multiplexes the shared local
//! tracks across sessions, routes signaling, and surfaces remote media and
//! disconnect events to the caller.

use super::connection::{NegotiationRole, PeerSession, SessionState};
use crate::config::RtcConfig;
use crate::media::{LocalMedia, MediaConstraints};
use crate::signaling::{SignalingChannel, SignalingMessage};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Latest remote media received from one participant
///
/// Repeat track events for the same participant overwrite the entry for that
/// kind rather than accumulating.
#[derive(Clone, Default)]
pub struct RemoteStream {
    audio: Option<Arc<TrackRemote>>,
    video: Option<Arc<TrackRemote>>,
}

impl RemoteStream {
    /// Get the remote audio track (if received)
    pub fn audio(&self) -> Option<Arc<TrackRemote>> {
        self.audio.clone()
    }

    /// Get the remote video track (if received)
    pub fn video(&self) -> Option<Arc<TrackRemote>> {
        self.video.clone()
    }
}

/// Callback fired when a participant's remote media becomes available
/// (and again whenever it changes)
pub type RemoteStreamHandler = Arc<dyn Fn(&str, RemoteStream) + Send + Sync>;

/// Callback fired exactly once when a session terminates
pub type PeerDisconnectedHandler = Arc<dyn Fn(&str) + Send + Sync>;

struct ManagerInner {
    config: RtcConfig,
    signaling: Arc<dyn SignalingChannel>,
    sessions: RwLock<HashMap<String, Arc<PeerSession>>>,
    remote_streams: RwLock<HashMap<String, RemoteStream>>,
    local_media: RwLock<Option<Arc<LocalMedia>>>,
    on_remote_stream: RwLock<Option<RemoteStreamHandler>>,
    on_peer_disconnected: RwLock<Option<PeerDisconnectedHandler>>,
}

impl ManagerInner {
    /// Store the latest remote track and notify the caller
    async fn handle_remote_track(
        inner: &Arc<ManagerInner>,
        participant_id: &str,
        track: Arc<TrackRemote>,
    ) {
        let kind = track.kind();
        if !matches!(kind, RTPCodecType::Audio | RTPCodecType::Video) {
            return;
        }

        info!(
            "Remote track arrived from {}: kind={}",
            participant_id, kind
        );

        let stream = {
            let mut streams = inner.remote_streams.write().await;
            let entry = streams.entry(participant_id.to_string()).or_default();
            match kind {
                RTPCodecType::Audio => entry.audio = Some(track),
                RTPCodecType::Video => entry.video = Some(track),
                RTPCodecType::Unspecified => unreachable!(),
            }
            entry.clone()
        };

        // Clone the handler out so the slot is free while the callback runs
        let callback = inner.on_remote_stream.read().await.as_ref().cloned();
        if let Some(callback) = callback {
            callback(participant_id, stream);
        }
    }

    /// Destroy a session after its connection reached a terminal state
    ///
    /// The map-identity check plus the session's own teardown guard make this
    /// fire the disconnect callback exactly once per session, no matter how
    /// many terminal state transitions the connection reports.
    async fn teardown_session(
        inner: &Arc<ManagerInner>,
        participant_id: &str,
        session: &Arc<PeerSession>,
        reason: SessionState,
    ) {
        {
            let mut sessions = inner.sessions.write().await;
            match sessions.get(participant_id) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(participant_id);
                }
                // Already removed, or replaced by a newer session
                _ => return,
            }
        }

        if !session.begin_teardown() {
            return;
        }

        if let Err(e) = session.close().await {
            debug!("Error closing session for {}: {}", participant_id, e);
        }

        inner.remote_streams.write().await.remove(participant_id);

        info!("Peer session {} terminated ({:?})", participant_id, reason);

        let callback = inner.on_peer_disconnected.read().await.as_ref().cloned();
        if let Some(callback) = callback {
            callback(participant_id);
        }
    }
}

/// Manages local capture and one peer session per remote participant
///
/// Cheap to clone; clones share the same state. Sessions for different
/// participants are fully independent: no ordering is imposed between one
/// participant's negotiation and another's.
#[derive(Clone)]
pub struct PeerSessionManager {
    inner: Arc<ManagerInner>,
}

impl PeerSessionManager {
    /// Create a manager using `signaling` as the outbound message relay
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: RtcConfig, signaling: Arc<dyn SignalingChannel>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                signaling,
                sessions: RwLock::new(HashMap::new()),
                remote_streams: RwLock::new(HashMap::new()),
                local_media: RwLock::new(None),
                on_remote_stream: RwLock::new(None),
                on_peer_disconnected: RwLock::new(None),
            }),
        })
    }

    /// Register the remote-media callback
    pub async fn on_remote_stream<F>(&self, callback: F)
    where
        F: Fn(&str, RemoteStream) + Send + Sync + 'static,
    {
        *self.inner.on_remote_stream.write().await = Some(Arc::new(callback));
    }

    /// Register the disconnect callback
    pub async fn on_peer_disconnected<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.inner.on_peer_disconnected.write().await = Some(Arc::new(callback));
    }

    /// Acquire local capture, replacing (and releasing) any previous one
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAcquisition`] when the requested constraints
    /// cannot be satisfied. Not retried internally; the caller decides
    /// whether to retry with reduced constraints (e.g. audio-only).
    pub async fn initialize_local_media(
        &self,
        video: bool,
        audio: bool,
    ) -> Result<Arc<LocalMedia>> {
        let mut slot = self.inner.local_media.write().await;

        // Release the old capture before acquiring, so device handles are
        // never held twice
        if let Some(previous) = slot.take() {
            debug!("Releasing previously held local media");
            previous.release();
        }

        let media = Arc::new(LocalMedia::acquire(
            MediaConstraints { video, audio },
            &self.inner.config,
        )?);

        *slot = Some(Arc::clone(&media));

        Ok(media)
    }

    /// Get the current local capture (if initialized)
    pub async fn local_media(&self) -> Option<Arc<LocalMedia>> {
        self.inner.local_media.read().await.clone()
    }

    /// Enable or disable the local video track for all sessions at once
    pub async fn toggle_video(&self, enabled: bool) {
        if let Some(track) = self
            .inner
            .local_media
            .read()
            .await
            .as_ref()
            .and_then(|media| media.video())
        {
            track.set_enabled(enabled);
            debug!("Local video enabled={}", enabled);
        }
    }

    /// Enable or disable the local audio track for all sessions at once
    pub async fn toggle_audio(&self, enabled: bool) {
        if let Some(track) = self
            .inner
            .local_media
            .read()
            .await
            .as_ref()
            .and_then(|media| media.audio())
        {
            track.set_enabled(enabled);
            debug!("Local audio enabled={}", enabled);
        }
    }

    /// Create a session for `participant_id`, replacing any existing one
    ///
    /// An existing session for the same participant is closed and removed
    /// first — there is never more than one live session per participant.
    /// Replacement is caller-driven and does not fire the disconnect
    /// callback.
    ///
    /// When `initiator` is true the offer is created and sent immediately;
    /// otherwise the session waits for the remote offer.
    pub async fn create_session(&self, participant_id: &str, initiator: bool) -> Result<()> {
        let role = if initiator {
            NegotiationRole::Initiator
        } else {
            NegotiationRole::Responder
        };

        let session = Arc::new(
            PeerSession::new(participant_id.to_string(), role, &self.inner.config).await?,
        );

        if let Some(media) = self.inner.local_media.read().await.as_ref() {
            if let Err(e) = session.attach_local_tracks(media).await {
                let _ = session.close().await;
                return Err(e);
            }
        }

        self.wire_session(&session);

        // Replace and insert under one lock hold: a concurrent inbound
        // message for the same participant must never slip a second session
        // in between, and a displaced session is always closed, never
        // dropped live
        {
            let mut sessions = self.inner.sessions.write().await;
            if let Some(old) = sessions.remove(participant_id) {
                debug!("Replacing existing session for {}", participant_id);
                old.begin_teardown();
                if let Err(e) = old.close().await {
                    warn!("Error closing replaced session for {}: {}", participant_id, e);
                }
                self.inner.remote_streams.write().await.remove(participant_id);
            }
            sessions.insert(participant_id.to_string(), Arc::clone(&session));
        }

        if initiator {
            let offer = session.create_offer().await?;
            self.send_signaling(participant_id, SignalingMessage::Offer { sdp: offer })
                .await;
        }

        Ok(())
    }

    /// Dispatch an inbound signaling message for `participant_id`
    ///
    /// A message from an unknown participant first creates a responder-role
    /// session, so an unsolicited caller is tolerated. Negotiation mismatches
    /// and malformed candidates are logged and dropped; they never tear the
    /// session down or escape to the caller.
    pub async fn handle_signaling_message(
        &self,
        participant_id: &str,
        message: SignalingMessage,
    ) -> Result<()> {
        if !self.has_session(participant_id).await {
            debug!(
                "Inbound {} from unknown participant {}, creating responder session",
                message.kind(),
                participant_id
            );
            self.create_session(participant_id, false).await?;
        }

        let session = self
            .inner
            .sessions
            .read()
            .await
            .get(participant_id)
            .cloned()
            .ok_or_else(|| Error::PeerNotFound(participant_id.to_string()))?;

        match message {
            SignalingMessage::Offer { sdp } => match session.accept_offer(sdp).await {
                Ok(answer) => {
                    self.send_signaling(participant_id, SignalingMessage::Answer { sdp: answer })
                        .await;
                }
                Err(e) => warn!("Dropping offer from {}: {}", participant_id, e),
            },
            SignalingMessage::Answer { sdp } => {
                if let Err(e) = session.accept_answer(sdp).await {
                    warn!("Dropping answer from {}: {}", participant_id, e);
                }
            }
            SignalingMessage::IceCandidate { candidate } => {
                if let Err(e) = session.add_remote_candidate(&candidate).await {
                    warn!("Dropping ICE candidate from {}: {}", participant_id, e);
                }
            }
        }

        Ok(())
    }

    /// Tear down every session and release local capture
    ///
    /// Runs on every exit path and is idempotent: a second call finds both
    /// maps empty and does nothing. Errors while closing are logged, never
    /// raised.
    pub async fn cleanup(&self) {
        let sessions: Vec<_> = self.inner.sessions.write().await.drain().collect();
        for (participant_id, session) in sessions {
            session.begin_teardown();
            if let Err(e) = session.close().await {
                warn!("Error closing session for {}: {}", participant_id, e);
            }
        }

        self.inner.remote_streams.write().await.clear();

        if let Some(media) = self.inner.local_media.write().await.take() {
            media.release();
        }

        info!("Peer session manager cleaned up");
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Whether a live session exists for `participant_id`
    pub async fn has_session(&self, participant_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(participant_id)
    }

    /// Observed state of the session for `participant_id` (if any)
    pub async fn session_state(&self, participant_id: &str) -> Option<SessionState> {
        let session = self.inner.sessions.read().await.get(participant_id).cloned();
        match session {
            Some(session) => Some(session.state().await),
            None => None,
        }
    }

    /// Latest remote media for `participant_id` (if any has arrived)
    pub async fn remote_stream(&self, participant_id: &str) -> Option<RemoteStream> {
        self.inner
            .remote_streams
            .read()
            .await
            .get(participant_id)
            .cloned()
    }

    async fn send_signaling(&self, participant_id: &str, message: SignalingMessage) {
        // Fire-and-forget: delivery is the channel's responsibility
        if let Err(e) = self.inner.signaling.send(participant_id, message).await {
            warn!("Failed to send signaling to {}: {}", participant_id, e);
        }
    }

    /// Wire this session's connection events to the manager
    ///
    /// Handlers hold only weak references to the manager state, so a session
    /// never keeps a dropped manager alive.
    fn wire_session(&self, session: &Arc<PeerSession>) {
        let pc = Arc::clone(session.peer_connection());
        let participant_id = session.participant_id().to_string();
        let inner = Arc::downgrade(&self.inner);

        // Remote media
        {
            let inner = inner.clone();
            let participant_id = participant_id.clone();
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                let inner = inner.clone();
                let participant_id = participant_id.clone();
                Box::pin(async move {
                    if let Some(inner) = inner.upgrade() {
                        ManagerInner::handle_remote_track(&inner, &participant_id, track).await;
                    }
                })
            }));
        }

        // Local candidates out through the signaling channel; candidates are
        // forwarded as discovered, in order, for as long as the connection
        // lives
        {
            let inner = inner.clone();
            let participant_id = participant_id.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let inner = inner.clone();
                let participant_id = participant_id.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        // End of gathering
                        return;
                    };
                    let Some(inner) = inner.upgrade() else { return };

                    let init = match candidate.to_json() {
                        Ok(init) => init,
                        Err(e) => {
                            warn!(
                                "Failed to serialize ICE candidate for {}: {}",
                                participant_id, e
                            );
                            return;
                        }
                    };

                    let payload = match serde_json::to_string(&init) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(
                                "Failed to serialize ICE candidate for {}: {}",
                                participant_id, e
                            );
                            return;
                        }
                    };

                    if let Err(e) = inner
                        .signaling
                        .send(
                            &participant_id,
                            SignalingMessage::IceCandidate { candidate: payload },
                        )
                        .await
                    {
                        warn!("Failed to send ICE candidate to {}: {}", participant_id, e);
                    }
                })
            }));
        }

        // Connection state; terminal states destroy the session
        {
            let state_cell = session.state_cell();
            let weak_session = Arc::downgrade(session);
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let inner = inner.clone();
                let participant_id = participant_id.clone();
                let state_cell = Arc::clone(&state_cell);
                let weak_session = weak_session.clone();
                Box::pin(async move {
                    let new_state = match s {
                        RTCPeerConnectionState::New => SessionState::New,
                        RTCPeerConnectionState::Connecting => SessionState::Connecting,
                        RTCPeerConnectionState::Connected => SessionState::Connected,
                        RTCPeerConnectionState::Disconnected => SessionState::Disconnected,
                        RTCPeerConnectionState::Failed => SessionState::Failed,
                        RTCPeerConnectionState::Closed => SessionState::Closed,
                        _ => return,
                    };

                    {
                        let mut state = state_cell.write().await;
                        if *state != new_state {
                            debug!(
                                "Session {} state transition: {:?} -> {:?}",
                                participant_id, *state, new_state
                            );
                            *state = new_state;
                        }
                    }

                    if matches!(
                        new_state,
                        SessionState::Disconnected | SessionState::Failed
                    ) {
                        let (Some(inner), Some(session)) =
                            (inner.upgrade(), weak_session.upgrade())
                        else {
                            return;
                        };
                        // Teardown closes the connection, which must not run
                        // inside its own state-change callback
                        tokio::spawn(async move {
                            ManagerInner::teardown_session(
                                &inner,
                                &participant_id,
                                &session,
                                new_state,
                            )
                            .await;
                        });
                    }
                })
            }));
        }
    }
}
