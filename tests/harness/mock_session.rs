//! Scripted peer sessions
//!
//! [`MockSession`] records every negotiation call and lets the test
//! inject transport events; [`MockSessionFactory`] hands them out and
//! keeps every session it ever created for later inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshrtc::session::{PeerSession, SessionEvent, SessionFactory, SessionNotice};
use meshrtc::{ClientId, Error, Result};
use serde_json::Value;
use tokio::sync::mpsc;

/// One recorded negotiation call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateOffer,
    CreateAnswer(String),
    ApplyAnswer(String),
    AddCandidate(Value),
    Close,
}

/// Scripted session
pub struct MockSession {
    peer_id: ClientId,
    events: mpsc::UnboundedSender<SessionNotice>,
    calls: Mutex<Vec<MockCall>>,
    fail_offer: AtomicBool,
    closed: AtomicBool,
}

impl MockSession {
    fn new(peer_id: ClientId, events: mpsc::UnboundedSender<SessionNotice>) -> Self {
        Self {
            peer_id,
            events,
            calls: Mutex::new(Vec::new()),
            fail_offer: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Everything the room asked this session to do, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make the next `create_offer` fail
    pub fn fail_next_offer(&self) {
        self.fail_offer.store(true, Ordering::SeqCst);
    }

    /// Inject a transport event as if the connection reported it
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(SessionNotice {
            peer_id: self.peer_id,
            event,
        });
    }
}

#[async_trait]
impl PeerSession for MockSession {
    async fn create_offer(&self) -> Result<String> {
        self.record(MockCall::CreateOffer);
        if self.fail_offer.swap(false, Ordering::SeqCst) {
            return Err(Error::NegotiationFailed("scripted offer failure".to_string()));
        }
        Ok(format!("mock-offer-for-{}", self.peer_id))
    }

    async fn create_answer(&self, remote_offer: String) -> Result<String> {
        self.record(MockCall::CreateAnswer(remote_offer));
        Ok(format!("mock-answer-for-{}", self.peer_id))
    }

    async fn apply_remote_answer(&self, sdp: String) -> Result<()> {
        self.record(MockCall::ApplyAnswer(sdp));
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<()> {
        self.record(MockCall::AddCandidate(candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(MockCall::Close);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory producing [`MockSession`]s and remembering all of them
#[derive(Default)]
pub struct MockSessionFactory {
    sessions: Mutex<HashMap<ClientId, Vec<Arc<MockSession>>>>,
}

impl MockSessionFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Most recently created session for a peer
    pub fn latest(&self, peer_id: ClientId) -> Option<Arc<MockSession>> {
        self.sessions
            .lock()
            .unwrap()
            .get(&peer_id)
            .and_then(|v| v.last().map(Arc::clone))
    }

    /// How many sessions were ever created for a peer
    pub fn session_count(&self, peer_id: ClientId) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .get(&peer_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Ids of peers any session was created for
    pub fn peers(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.sessions.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create_session(
        &self,
        peer_id: ClientId,
        events: mpsc::UnboundedSender<SessionNotice>,
    ) -> Result<Arc<dyn PeerSession>> {
        let session = Arc::new(MockSession::new(peer_id, events));
        self.sessions
            .lock()
            .unwrap()
            .entry(peer_id)
            .or_default()
            .push(Arc::clone(&session));
        Ok(session)
    }
}
