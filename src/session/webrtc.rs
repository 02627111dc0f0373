//! webrtc-rs backed peer sessions
//!
//! Production [`PeerSession`] implementation. Connection callbacks are
//! forwarded straight into the room's session-event channel; nothing in
//! here mutates negotiation state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::MeshConfig;
use crate::media::LocalMediaSource;
use crate::session::{
    PeerSession, RemoteStream, SessionEvent, SessionFactory, SessionNotice, TransportState,
};
use crate::signaling::ClientId;
use crate::{Error, Result};

/// One webrtc-rs peer connection
pub struct WebRtcSession {
    peer_id: ClientId,
    peer_connection: Arc<RTCPeerConnection>,
    /// RTP senders retained so local tracks are not released early
    #[allow(dead_code)]
    senders: Vec<Arc<RTCRtpSender>>,
    closed: AtomicBool,
}

impl WebRtcSession {
    /// Create a peer connection wired to the session event channel
    ///
    /// # Arguments
    ///
    /// * `peer_id` - Relay-assigned id of the remote peer
    /// * `config` - STUN/TURN server configuration
    /// * `media` - Local tracks to attach, if capture is running
    /// * `events` - Channel the connection reports into
    pub async fn connect(
        peer_id: ClientId,
        config: &MeshConfig,
        media: Option<Arc<LocalMediaSource>>,
        events: mpsc::UnboundedSender<SessionNotice>,
    ) -> Result<Self> {
        info!("Creating peer connection for peer {}", peer_id);

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

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
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?);

        // Attach local tracks before negotiation so they appear in the SDP
        let mut senders = Vec::new();
        if let Some(media) = media {
            let video = media.video_track();
            let sender = peer_connection
                .add_track(video as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| {
                    Error::PeerConnectionError(format!("Failed to add video track: {}", e))
                })?;
            senders.push(sender);

            if let Some(audio) = media.audio_track() {
                let sender = peer_connection
                    .add_track(audio as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                    .map_err(|e| {
                        Error::PeerConnectionError(format!("Failed to add audio track: {}", e))
                    })?;
                senders.push(sender);
            }
        }

        // Transport state changes
        let events_clone = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = events_clone.clone();
                Box::pin(async move {
                    let state = match s {
                        RTCPeerConnectionState::New => TransportState::New,
                        RTCPeerConnectionState::Connecting => TransportState::Connecting,
                        RTCPeerConnectionState::Connected => TransportState::Connected,
                        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                        RTCPeerConnectionState::Failed => TransportState::Failed,
                        RTCPeerConnectionState::Closed => TransportState::Closed,
                        _ => return,
                    };
                    debug!("Peer {} transport state: {:?}", peer_id, state);
                    let _ = events.send(SessionNotice {
                        peer_id,
                        event: SessionEvent::StateChanged(state),
                    });
                })
            },
        ));

        // Local ICE candidates; None marks the end of gathering
        let events_clone = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events_clone.clone();
            Box::pin(async move {
                match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => match serde_json::to_value(&init) {
                            Ok(value) => {
                                let _ = events.send(SessionNotice {
                                    peer_id,
                                    event: SessionEvent::LocalCandidate(value),
                                });
                            }
                            Err(e) => {
                                warn!("Failed to serialize ICE candidate: {}", e);
                            }
                        },
                        Err(e) => {
                            warn!("Failed to convert ICE candidate: {}", e);
                        }
                    },
                    None => {
                        let _ = events.send(SessionNotice {
                            peer_id,
                            event: SessionEvent::CandidateGatheringDone,
                        });
                    }
                }
            })
        }));

        // Remote media
        let events_clone = events;
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let events = events_clone.clone();
            Box::pin(async move {
                debug!(
                    "Peer {} remote track: id={} kind={}",
                    peer_id,
                    track.id(),
                    track.kind()
                );
                let _ = events.send(SessionNotice {
                    peer_id,
                    event: SessionEvent::RemoteStream(RemoteStream::from_track(track)),
                });
            })
        }));

        Ok(Self {
            peer_id,
            peer_connection,
            senders,
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer_id(&self) -> ClientId {
        self.peer_id
    }
}

#[async_trait]
impl PeerSession for WebRtcSession {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::NegotiationFailed(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| {
                Error::NegotiationFailed(format!("Failed to set local description: {}", e))
            })?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::NegotiationFailed("No local description after setting offer".to_string())
            })?;

        debug!("Created SDP offer for peer {}", self.peer_id);
        Ok(local_desc.sdp)
    }

    async fn create_answer(&self, remote_offer: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(remote_offer)
            .map_err(|e| Error::NegotiationFailed(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| {
                Error::NegotiationFailed(format!("Failed to set remote description: {}", e))
            })?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::NegotiationFailed(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| {
                Error::NegotiationFailed(format!("Failed to set local description: {}", e))
            })?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::NegotiationFailed("No local description after setting answer".to_string())
            })?;

        debug!("Created SDP answer for peer {}", self.peer_id);
        Ok(local_desc.sdp)
    }

    async fn apply_remote_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| Error::NegotiationFailed(format!("Failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| {
                Error::NegotiationFailed(format!("Failed to set remote description: {}", e))
            })?;

        debug!("Applied remote answer for peer {}", self.peer_id);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_value(candidate)
            .map_err(|e| Error::NegotiationFailed(format!("Failed to parse ICE candidate: {}", e)))?;

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::NegotiationFailed(format!("Failed to add ICE candidate: {}", e)))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing peer connection for peer {}", self.peer_id);
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))
    }
}

/// Factory producing [`WebRtcSession`]s for the room loop
pub struct WebRtcSessionFactory {
    config: MeshConfig,
    media: RwLock<Option<Arc<LocalMediaSource>>>,
}

impl WebRtcSessionFactory {
    pub fn new(config: MeshConfig) -> Self {
        Self {
            config,
            media: RwLock::new(None),
        }
    }

    /// Install the local media source
    ///
    /// Sessions created afterwards attach its tracks. The room is told
    /// separately via `set_media_ready` so it can start offering.
    pub async fn set_media(&self, media: Arc<LocalMediaSource>) {
        *self.media.write().await = Some(media);
    }
}

#[async_trait]
impl SessionFactory for WebRtcSessionFactory {
    async fn create_session(
        &self,
        peer_id: ClientId,
        events: mpsc::UnboundedSender<SessionNotice>,
    ) -> Result<Arc<dyn PeerSession>> {
        let media = self.media.read().await.clone();
        let session = WebRtcSession::connect(peer_id, &self.config, media, events).await?;
        Ok(Arc::new(session))
    }
}
