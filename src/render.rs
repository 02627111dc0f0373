//! Render/display binding
//!
//! The room does not render media itself; it tells a [`RenderSink`]
//! when a peer's remote stream is ready and when the surface should be
//! torn down. Attach happens at most once per peer record, detach
//! exactly once and only if attached.

use crate::session::RemoteStream;
use crate::signaling::ClientId;

/// External display surface manager
pub trait RenderSink: Send + Sync {
    /// Bind a peer's remote stream to a display surface
    fn attach(&self, peer_id: ClientId, display_name: &str, stream: RemoteStream);

    /// Tear down the peer's display surface
    fn detach(&self, peer_id: ClientId);
}

/// Sink that drops everything, for headless use
#[derive(Debug, Default)]
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn attach(&self, _peer_id: ClientId, _display_name: &str, _stream: RemoteStream) {}

    fn detach(&self, _peer_id: ClientId) {}
}
