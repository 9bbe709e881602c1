//! Local media capture shared across peer sessions
//!
//! A manager owns at most one [`LocalMedia`]. Its tracks are attached to
//! every peer connection by reference, so a toggle is visible to all remote
//! peers at once; there is no per-peer muting.

use crate::config::RtcConfig;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Which capture kinds the caller is requesting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Request a video track
    pub video: bool,

    /// Request an audio track
    pub audio: bool,
}

/// Kind of a local track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio (Opus)
    Audio,
    /// Video (VP8)
    Video,
}

/// One local capture track, shared by reference across all sessions
///
/// The `enabled` flag is the mute switch: a disabled track silently drops
/// written samples instead of sending them, which every attached peer
/// connection observes uniformly.
pub struct LocalTrack {
    kind: MediaKind,
    rtp_track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
}

impl LocalTrack {
    fn new(kind: MediaKind, rtp_track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            rtp_track,
            enabled: AtomicBool::new(true),
        }
    }

    /// Get the track kind
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Whether this track is currently sending
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable this track
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Get the underlying WebRTC track for attaching to a peer connection
    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtp_track)
    }

    /// Write one captured sample
    ///
    /// Samples written while the track is disabled are dropped, which is how
    /// toggling mutes the track for every connected peer simultaneously.
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.rtp_track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaTrack(format!("Failed to write sample: {}", e)))
    }
}

/// The manager's single local capture
///
/// Holds only the tracks the caller actually requested: an audio-only
/// acquisition has no video track, so sessions created afterwards never
/// attach a video sender.
pub struct LocalMedia {
    stream_id: String,
    audio: Option<Arc<LocalTrack>>,
    video: Option<Arc<LocalTrack>>,
    video_resolution: Option<(u32, u32)>,
}

impl LocalMedia {
    /// Acquire local capture with the requested constraints
    ///
    /// Video uses the fixed resolution from `config`; audio uses default
    /// Opus parameters (48kHz stereo clock).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAcquisition`] when neither audio nor video is
    /// requested. The error is surfaced to the caller and never retried
    /// internally; retrying with reduced constraints (e.g. audio-only) is a
    /// caller decision.
    pub fn acquire(constraints: MediaConstraints, config: &RtcConfig) -> Result<Self> {
        if !constraints.video && !constraints.audio {
            return Err(Error::MediaAcquisition(
                "At least one of audio or video must be requested".to_string(),
            ));
        }

        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());

        let audio = constraints.audio.then(|| {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "audio-capture".to_string(),
                stream_id.clone(),
            ));
            Arc::new(LocalTrack::new(MediaKind::Audio, track))
        });

        let video = constraints.video.then(|| {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "video-capture".to_string(),
                stream_id.clone(),
            ));
            Arc::new(LocalTrack::new(MediaKind::Video, track))
        });

        debug!(
            "Acquired local media: audio={}, video={}, stream_id={}",
            constraints.audio, constraints.video, stream_id
        );

        Ok(Self {
            stream_id,
            audio,
            video,
            video_resolution: constraints
                .video
                .then_some((config.video_width, config.video_height)),
        })
    }

    /// Get the capture stream id shared by both tracks
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Get the audio track (if acquired)
    pub fn audio(&self) -> Option<Arc<LocalTrack>> {
        self.audio.clone()
    }

    /// Get the video track (if acquired)
    pub fn video(&self) -> Option<Arc<LocalTrack>> {
        self.video.clone()
    }

    /// Capture resolution the video feeder must honor (if video was acquired)
    pub fn video_resolution(&self) -> Option<(u32, u32)> {
        self.video_resolution
    }

    /// All acquired tracks, for attaching to a new peer connection
    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.audio
            .iter()
            .chain(self.video.iter())
            .cloned()
            .collect()
    }

    /// Stop the capture
    ///
    /// Disables both tracks so a feeder still holding a reference stops
    /// transmitting. Called when the capture is replaced or on cleanup.
    pub fn release(&self) {
        if let Some(audio) = &self.audio {
            audio.set_enabled(false);
        }
        if let Some(video) = &self.video {
            video.set_enabled(false);
        }
        debug!("Released local media stream {}", self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn constraints(video: bool, audio: bool) -> MediaConstraints {
        MediaConstraints { video, audio }
    }

    #[test]
    fn test_acquire_audio_and_video() {
        let media = LocalMedia::acquire(constraints(true, true), &RtcConfig::default()).unwrap();
        assert!(media.audio().is_some());
        assert!(media.video().is_some());
        assert_eq!(media.tracks().len(), 2);
        assert_eq!(media.video_resolution(), Some((640, 480)));
        // Both tracks are grouped under one capture stream id
        assert!(media.stream_id().starts_with("stream-"));
    }

    #[test]
    fn test_acquire_audio_only_has_no_video_track() {
        let media = LocalMedia::acquire(constraints(false, true), &RtcConfig::default()).unwrap();
        assert!(media.audio().is_some());
        assert!(media.video().is_none());
        assert!(media.video_resolution().is_none());
        assert_eq!(media.tracks().len(), 1);
    }

    #[test]
    fn test_acquire_nothing_fails() {
        let result = LocalMedia::acquire(constraints(false, false), &RtcConfig::default());
        assert!(matches!(result, Err(Error::MediaAcquisition(_))));
    }

    #[test]
    fn test_tracks_start_enabled() {
        let media = LocalMedia::acquire(constraints(true, true), &RtcConfig::default()).unwrap();
        assert!(media.audio().unwrap().is_enabled());
        assert!(media.video().unwrap().is_enabled());
    }

    #[test]
    fn test_toggle_is_shared_by_reference() {
        let media = LocalMedia::acquire(constraints(false, true), &RtcConfig::default()).unwrap();

        // Two handles to the same track, as two sessions would hold
        let handle_a = media.audio().unwrap();
        let handle_b = media.audio().unwrap();
        assert!(Arc::ptr_eq(&handle_a, &handle_b));

        handle_a.set_enabled(false);
        assert!(!handle_b.is_enabled());
    }

    #[test]
    fn test_release_disables_tracks() {
        let media = LocalMedia::acquire(constraints(true, true), &RtcConfig::default()).unwrap();
        media.release();
        assert!(!media.audio().unwrap().is_enabled());
        assert!(!media.video().unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_track_drops_samples() {
        let media = LocalMedia::acquire(constraints(false, true), &RtcConfig::default()).unwrap();
        let audio = media.audio().unwrap();
        audio.set_enabled(false);

        // Dropped without touching the unbound RTP track
        let sample = Sample {
            data: vec![0u8; 960].into(),
            duration: Duration::from_millis(20),
            ..Default::default()
        };
        assert!(audio.write_sample(&sample).await.is_ok());
    }
}
