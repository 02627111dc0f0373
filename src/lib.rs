//! Full-mesh WebRTC room client
//!
//! `meshrtc` joins a room on a signaling relay and maintains one peer
//! connection per remote participant: it reconciles room membership,
//! drives offer/answer/candidate negotiation with a deterministic
//! lower-id-offers tie-break, buffers candidates that outrun their
//! connection handle, retries failed negotiations with exponential
//! backoff, binds remote media to a render sink, and carries room chat
//! over the same socket.
//!
//! # Architecture
//!
//! ```text
//! +-----------------+     frames      +----------------------+
//! | SignalingChannel| --------------> |       MeshRoom       |
//! | (WebSocket)     | <-------------- |  single event loop   |
//! +-----------------+                 |  - PeerRegistry      |
//!                                     |  - negotiation       |
//! +-----------------+  SessionNotice  |  - chat              |
//! |  PeerSession(s) | --------------> |                      |
//! |  (webrtc-rs)    | <-- operations  +----------+-----------+
//! +-----------------+                            |
//!                                        RoomEvent / RenderSink
//! ```
//!
//! All registry mutations happen on the room loop; peer connections
//! report back through channels, never callbacks into shared state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use meshrtc::{MeshConfig, MeshRoom, NullRenderSink, RoomEvent, WebRtcSessionFactory};
//!
//! #[tokio::main]
//! async fn main() -> meshrtc::Result<()> {
//!     let config = MeshConfig {
//!         signaling_url: "ws://localhost:8080".to_string(),
//!         room_id: "standup".to_string(),
//!         display_name: "alice".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let factory = Arc::new(WebRtcSessionFactory::new(config.clone()));
//!     let (handle, mut events) = MeshRoom::connect(
//!         config,
//!         factory,
//!         Arc::new(NullRenderSink),
//!     )
//!     .await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let RoomEvent::SignalingClosed = event {
//!             break;
//!         }
//!     }
//!     drop(handle);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod registry;
pub mod render;
pub mod room;
pub mod session;
pub mod signaling;

pub use config::{MeshConfig, RetryPolicy, TurnServerConfig};
pub use error::{Error, Result};
pub use media::LocalMediaSource;
pub use registry::{NegotiationState, PeerRecord, PeerRegistry};
pub use render::{NullRenderSink, RenderSink};
pub use room::{initiates_offer, MeshRoom, RoomEvent, RoomHandle};
pub use session::{
    PeerSession, RemoteStream, SessionEvent, SessionFactory, SessionNotice, TransportState,
    WebRtcSession, WebRtcSessionFactory,
};
pub use signaling::{
    ClientId, RosterEntry, SdpPayload, SignalingChannel, SignalingMessage, WsSignalingChannel,
};
