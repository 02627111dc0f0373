//! Local media source
//!
//! Holds the outbound tracks shared by every peer session. The source
//! is acquired once per room; sessions receive `Arc` clones and the
//! capture pipeline writes samples through [`LocalMediaSource`]
//! regardless of how many peers are attached.

use std::sync::Arc;

use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::{Error, Result};

/// Shared outbound media tracks
pub struct LocalMediaSource {
    stream_id: String,
    video_track: Arc<TrackLocalStaticSample>,
    audio_track: Option<Arc<TrackLocalStaticSample>>,
}

impl LocalMediaSource {
    /// Create a video-only media source
    pub fn new(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        let video_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("video-{}", stream_id),
            stream_id.clone(),
        ));

        Self {
            stream_id,
            video_track,
            audio_track: None,
        }
    }

    /// Add an Opus audio track to the source
    pub fn with_audio(mut self) -> Self {
        self.audio_track = Some(Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", self.stream_id),
            self.stream_id.clone(),
        )));
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn video_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.video_track)
    }

    pub fn audio_track(&self) -> Option<Arc<TrackLocalStaticSample>> {
        self.audio_track.as_ref().map(Arc::clone)
    }

    /// Write one encoded video sample to every attached peer
    pub async fn write_video_sample(&self, sample: &Sample) -> Result<()> {
        self.video_track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaError(format!("video sample write failed: {}", e)))
    }

    /// Write one encoded audio sample to every attached peer
    pub async fn write_audio_sample(&self, sample: &Sample) -> Result<()> {
        let track = self
            .audio_track
            .as_ref()
            .ok_or_else(|| Error::MediaError("no audio track configured".to_string()))?;
        track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaError(format!("audio sample write failed: {}", e)))
    }
}
