//! Per-peer connection sessions
//!
//! A [`PeerSession`] wraps one underlying peer connection and exposes
//! exactly the operations negotiation needs. Everything the connection
//! reports asynchronously (local candidates, remote tracks, transport
//! state) is delivered as [`SessionNotice`] messages over a channel
//! instead of callbacks, so the room loop stays the single writer of
//! negotiation state.

pub mod webrtc;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::signaling::ClientId;
use crate::Result;

pub use self::webrtc::{WebRtcSession, WebRtcSessionFactory};

/// Transport-level connection state, independent of negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Handle to a remote media stream
///
/// Cheap to clone. Carries the underlying remote track when one exists;
/// synthetic streams have only an id and are used by test doubles.
#[derive(Clone)]
pub struct RemoteStream {
    stream_id: String,
    track: Option<Arc<::webrtc::track::track_remote::TrackRemote>>,
}

impl RemoteStream {
    /// Wrap a remote track received from the transport
    pub fn from_track(track: Arc<::webrtc::track::track_remote::TrackRemote>) -> Self {
        Self {
            stream_id: track.id(),
            track: Some(track),
        }
    }

    /// Create a stream handle with no backing track
    pub fn synthetic(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            track: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.stream_id
    }

    pub fn track(&self) -> Option<&Arc<::webrtc::track::track_remote::TrackRemote>> {
        self.track.as_ref()
    }
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("stream_id", &self.stream_id)
            .field("has_track", &self.track.is_some())
            .finish()
    }
}

/// Asynchronous event from a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Local ICE candidate ready to forward to the peer
    /// (`RTCIceCandidateInit` JSON)
    LocalCandidate(Value),
    /// Local ICE gathering finished
    CandidateGatheringDone,
    /// Remote media arrived
    RemoteStream(RemoteStream),
    /// Transport state changed
    StateChanged(TransportState),
}

/// Session event tagged with the peer it belongs to
#[derive(Debug, Clone)]
pub struct SessionNotice {
    pub peer_id: ClientId,
    pub event: SessionEvent,
}

/// One peer connection
///
/// Negotiation methods are driven exclusively by the room loop; `close`
/// is idempotent and releases the underlying connection.
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Create a local offer and set it as the local description
    async fn create_offer(&self) -> Result<String>;

    /// Apply a remote offer and produce the local answer
    async fn create_answer(&self, remote_offer: String) -> Result<String>;

    /// Apply the remote answer to a previously created offer
    async fn apply_remote_answer(&self, sdp: String) -> Result<()>;

    /// Add a remote ICE candidate (`RTCIceCandidateInit` JSON)
    async fn add_remote_candidate(&self, candidate: Value) -> Result<()>;

    /// Close the connection and release its resources
    async fn close(&self) -> Result<()>;
}

/// Creates sessions wired to the room's event channel
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(
        &self,
        peer_id: ClientId,
        events: mpsc::UnboundedSender<SessionNotice>,
    ) -> Result<Arc<dyn PeerSession>>;
}
