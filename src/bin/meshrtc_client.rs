//! Mesh room client binary
//!
//! Joins a room on a signaling relay, negotiates with every other
//! participant and logs room activity. Lines typed on stdin are sent
//! as chat.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin meshrtc_client -- \
//!   --signaling-url ws://localhost:8080 \
//!   --room standup \
//!   --name alice
//!
//! # Advertise outbound media tracks in negotiation
//! cargo run --bin meshrtc_client -- --room standup --name alice --send-media
//! ```

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use meshrtc::{
    LocalMediaSource, MeshConfig, MeshRoom, NullRenderSink, RoomEvent, WebRtcSessionFactory,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Full-mesh WebRTC room client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling relay WebSocket URL
    #[arg(
        long,
        default_value = "ws://localhost:8080",
        env = "MESHRTC_SIGNALING_URL"
    )]
    signaling_url: String,

    /// Room to join
    #[arg(long, default_value = "default", env = "MESHRTC_ROOM")]
    room: String,

    /// Display name announced to other peers
    #[arg(long, default_value = "anonymous", env = "MESHRTC_NAME")]
    name: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// Maximum concurrent peer connections
    #[arg(long, default_value_t = 10, env = "MESHRTC_MAX_PEERS")]
    max_peers: u32,

    /// Attach outbound media tracks and start offering
    #[arg(long, default_value_t = false)]
    send_media: bool,
}

fn epoch_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> meshrtc::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = MeshConfig {
        signaling_url: args.signaling_url,
        room_id: args.room,
        display_name: args.name,
        stun_servers: args.stun_servers,
        max_peers: args.max_peers,
        ..Default::default()
    };
    config.validate()?;

    let factory = Arc::new(WebRtcSessionFactory::new(config.clone()));
    if args.send_media {
        factory
            .set_media(Arc::new(LocalMediaSource::new("local").with_audio()))
            .await;
    }

    let (handle, mut events) =
        MeshRoom::connect(config, factory, Arc::new(NullRenderSink)).await?;

    if args.send_media {
        handle.set_media_ready()?;
    }

    let chat_handle = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if let Err(e) = chat_handle.send_chat(line, epoch_timestamp()).await {
                warn!("Chat not sent: {}", e);
            }
        }
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(RoomEvent::Registered { client_id }) => {
                    info!("Joined room as client {}", client_id);
                }
                Some(RoomEvent::PeerJoined { peer_id, display_name }) => {
                    info!(
                        "Peer {} joined ({})",
                        peer_id,
                        display_name.as_deref().unwrap_or("unnamed")
                    );
                }
                Some(RoomEvent::PeerLeft { peer_id }) => {
                    info!("Peer {} left", peer_id);
                }
                Some(RoomEvent::PeerNegotiated { peer_id }) => {
                    info!("Negotiation with peer {} complete", peer_id);
                }
                Some(RoomEvent::MediaAttached { peer_id }) => {
                    info!("Receiving media from peer {}", peer_id);
                }
                Some(RoomEvent::NegotiationFailed { peer_id }) => {
                    warn!("Negotiation with peer {} failed for good", peer_id);
                }
                Some(RoomEvent::Chat { sender_name, text, own, .. }) => {
                    let who = if own {
                        "me".to_string()
                    } else {
                        sender_name.unwrap_or_else(|| "?".to_string())
                    };
                    info!("[chat] {}: {}", who, text);
                }
                Some(RoomEvent::PeerList { peers }) => {
                    info!("Peers in room: {:?}", peers);
                }
                Some(RoomEvent::SignalingClosed) => {
                    warn!("Signaling connection lost, exiting");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                let _ = handle.shutdown();
            }
        }
    }

    Ok(())
}
