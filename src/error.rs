//! Error types for the mesh room client
//!
//! All fallible operations in this crate return [`Result`], with errors
//! grouped by the layer they originate from: configuration, signaling,
//! negotiation, or the underlying transport.

use thiserror::Error;

/// Mesh room client errors
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling channel is closed or not yet connected
    #[error("Signaling channel not ready: {0}")]
    ChannelNotReady(String),

    /// Operation attempted before the relay assigned a client id
    #[error("Not registered with the signaling relay")]
    NotRegistered,

    /// Signaling protocol error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Offer/answer negotiation failed
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Referenced peer has no registry record
    #[error("Peer not found: {0}")]
    PeerNotFound(u64),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Local media source error
    #[error("Media error: {0}")]
    MediaError(String),

    /// Peer connection error from the webrtc stack
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for mesh room operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if error is retryable
    ///
    /// Transport-level failures are usually transient and worth a
    /// backoff retry; configuration and protocol errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WebSocketError(_)
                | Error::NegotiationFailed(_)
                | Error::PeerConnectionError(_)
                | Error::IoError(_)
        )
    }

    /// Check if error is a configuration problem
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if error relates to a specific peer
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_) | Error::NegotiationFailed(_) | Error::PeerConnectionError(_)
        )
    }
}
