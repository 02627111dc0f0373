//! Recording render sink

use std::sync::Mutex;

use meshrtc::session::RemoteStream;
use meshrtc::{ClientId, RenderSink};

/// One recorded render call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Attach { peer_id: ClientId, name: String },
    Detach { peer_id: ClientId },
}

/// Render sink that records every attach/detach
#[derive(Default)]
pub struct RecordingRenderSink {
    calls: Mutex<Vec<RenderCall>>,
}

impl RecordingRenderSink {
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attach_count(&self, peer_id: ClientId) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RenderCall::Attach { peer_id: p, .. } if *p == peer_id))
            .count()
    }

    pub fn detach_count(&self, peer_id: ClientId) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RenderCall::Detach { peer_id: p } if *p == peer_id))
            .count()
    }
}

impl RenderSink for RecordingRenderSink {
    fn attach(&self, peer_id: ClientId, display_name: &str, _stream: RemoteStream) {
        self.calls.lock().unwrap().push(RenderCall::Attach {
            peer_id,
            name: display_name.to_string(),
        });
    }

    fn detach(&self, peer_id: ClientId) {
        self.calls.lock().unwrap().push(RenderCall::Detach { peer_id });
    }
}
