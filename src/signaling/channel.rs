//! Signaling channel transport
//!
//! [`SignalingChannel`] is the seam between the room orchestrator and
//! the relay connection: an ordered inbound stream of parsed envelopes
//! and a non-blocking outbound send. [`WsSignalingChannel`] implements
//! it over a WebSocket with dedicated reader and writer tasks so
//! outbound frames are written by exactly one task and never
//! interleave.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::signaling::protocol::SignalingMessage;
use crate::{Error, Result};

/// Ordered message transport to the signaling relay
///
/// Implementations must preserve relay ordering on the inbound side and
/// fail `send` synchronously once the connection is gone.
#[async_trait]
pub trait SignalingChannel: Send {
    /// Queue an envelope for transmission
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotReady`] if the connection is closed.
    fn send(&self, message: &SignalingMessage) -> Result<()>;

    /// Receive the next inbound envelope
    ///
    /// Returns `None` when the relay connection has ended. The stream
    /// is finite; after `None` no further messages arrive.
    async fn recv(&mut self) -> Option<SignalingMessage>;
}

/// WebSocket-backed signaling channel
pub struct WsSignalingChannel {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: mpsc::UnboundedReceiver<SignalingMessage>,
}

impl WsSignalingChannel {
    /// Connect to the signaling relay
    ///
    /// Spawns the reader and writer tasks; both exit when the socket
    /// closes or the channel is dropped.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("connect to {} failed: {}", url, e)))?;
        debug!(url = %url, "Signaling WebSocket connected");

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<SignalingMessage>();

        // Writer task: sole owner of the sink
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                    warn!("Signaling send failed, closing writer: {}", e);
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader task: decode frames, skip garbage, stop on close
        tokio::spawn(async move {
            while let Some(frame) = ws_source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match SignalingMessage::from_json(&text) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Ignoring malformed signaling frame: {}", e);
                        }
                    },
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        debug!("Signaling relay closed the connection");
                        break;
                    }
                    Ok(_) => {
                        warn!("Ignoring non-text signaling frame");
                    }
                    Err(e) => {
                        warn!("Signaling receive error: {}", e);
                        break;
                    }
                }
            }
            // Dropping inbound_tx ends the inbound stream
        });

        Ok(Self {
            outbound_tx,
            inbound_rx,
        })
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    fn send(&self, message: &SignalingMessage) -> Result<()> {
        let frame = message.to_json()?;
        self.outbound_tx
            .send(frame)
            .map_err(|_| Error::ChannelNotReady("signaling connection closed".to_string()))
    }

    async fn recv(&mut self) -> Option<SignalingMessage> {
        self.inbound_rx.recv().await
    }
}
