//! Scripted signaling channel
//!
//! Lets a test play the relay side by hand: push inbound frames, read
//! everything the room sends, and close the connection at will.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use meshrtc::{Error, Result, SignalingChannel, SignalingMessage};
use tokio::sync::mpsc;

/// Channel handed to the room under test
pub struct ScriptedChannel {
    inbound_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    outbound_tx: mpsc::UnboundedSender<SignalingMessage>,
    open: Arc<AtomicBool>,
}

/// Test-side driver for a [`ScriptedChannel`]
pub struct ChannelDriver {
    inbound_tx: Option<mpsc::UnboundedSender<SignalingMessage>>,
    pub outbound_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    open: Arc<AtomicBool>,
}

impl ScriptedChannel {
    /// Create a connected channel/driver pair
    pub fn pair() -> (ScriptedChannel, ChannelDriver) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        (
            ScriptedChannel {
                inbound_rx,
                outbound_tx,
                open: Arc::clone(&open),
            },
            ChannelDriver {
                inbound_tx: Some(inbound_tx),
                outbound_rx,
                open,
            },
        )
    }
}

#[async_trait]
impl SignalingChannel for ScriptedChannel {
    fn send(&self, message: &SignalingMessage) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ChannelNotReady("scripted channel closed".to_string()));
        }
        self.outbound_tx
            .send(message.clone())
            .map_err(|_| Error::ChannelNotReady("scripted channel closed".to_string()))
    }

    async fn recv(&mut self) -> Option<SignalingMessage> {
        self.inbound_rx.recv().await
    }
}

impl ChannelDriver {
    /// Deliver a frame to the room
    pub fn push(&self, message: SignalingMessage) {
        self.inbound_tx
            .as_ref()
            .expect("channel already closed")
            .send(message)
            .expect("room dropped the channel");
    }

    /// End the connection; the room sees a finite inbound stream and
    /// synchronous send failures
    pub fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        self.inbound_tx = None;
    }

    /// Split into raw parts, for harness code that relays frames itself
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<SignalingMessage>,
        mpsc::UnboundedReceiver<SignalingMessage>,
        Arc<AtomicBool>,
    ) {
        (
            self.inbound_tx.expect("channel already closed"),
            self.outbound_rx,
            self.open,
        )
    }
}
