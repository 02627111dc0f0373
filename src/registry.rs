//! Peer session registry
//!
//! One [`PeerRecord`] per remote peer, keyed by relay-assigned id. The
//! registry is owned by the room event loop, which is the only writer;
//! records hold the exclusive connection handle, the negotiation state
//! and the pending-candidate queue for that peer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::session::PeerSession;
use crate::signaling::ClientId;

/// Per-peer negotiation state
///
/// `Closed` is terminal. A peer that rejoins gets a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Known from membership, no negotiation yet
    Idle,
    /// Local offer being created
    Offering,
    /// Offer sent, waiting for the remote answer
    AwaitingAnswer,
    /// Remote offer received, local answer being created
    Answering,
    /// Offer/answer exchange complete
    Connected,
    /// Negotiation failed, retry may be pending
    Failed,
    /// Terminal; handle released
    Closed,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Closed)
    }
}

/// Registry record for one remote peer
pub struct PeerRecord {
    pub peer_id: ClientId,
    pub display_name: Option<String>,
    pub state: NegotiationState,
    /// Exclusive connection handle; zero or one per peer
    pub session: Option<Arc<dyn PeerSession>>,
    /// Candidates that arrived before the handle existed
    pending_candidates: VecDeque<Value>,
    /// Retry attempts consumed for this record
    pub retry_attempts: u32,
    /// Whether a render binding is currently attached
    pub render_attached: bool,
}

impl PeerRecord {
    pub fn new(peer_id: ClientId, display_name: Option<String>) -> Self {
        Self {
            peer_id,
            display_name,
            state: NegotiationState::Idle,
            session: None,
            pending_candidates: VecDeque::new(),
            retry_attempts: 0,
            render_attached: false,
        }
    }

    /// Record a state transition
    pub fn set_state(&mut self, new_state: NegotiationState) {
        if self.state != new_state {
            debug!(
                "Peer {} negotiation state: {:?} -> {:?}",
                self.peer_id, self.state, new_state
            );
            self.state = new_state;
        }
    }

    /// Buffer a candidate until the connection handle exists
    ///
    /// The queue is bounded; overflow drops the oldest entry.
    pub fn buffer_candidate(&mut self, candidate: Value, limit: usize) {
        if self.pending_candidates.len() >= limit {
            self.pending_candidates.pop_front();
            warn!(
                "Peer {} candidate queue full ({}), dropping oldest",
                self.peer_id, limit
            );
        }
        self.pending_candidates.push_back(candidate);
    }

    /// Drain buffered candidates in arrival order
    pub fn take_pending_candidates(&mut self) -> Vec<Value> {
        self.pending_candidates.drain(..).collect()
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }
}

/// Registry of all known peers in the room
///
/// Plain map; single-writer by construction since only the room loop
/// holds it. `remove` hands the record back so the caller can close
/// the session handle.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<ClientId, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Insert a record for a newly announced peer, or update the
    /// display name of an existing one
    pub fn upsert(&mut self, peer_id: ClientId, display_name: Option<String>) -> &mut PeerRecord {
        let record = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| PeerRecord::new(peer_id, None));
        if display_name.is_some() {
            record.display_name = display_name;
        }
        record
    }

    /// Replace any existing record with a fresh one
    pub fn replace(&mut self, peer_id: ClientId, display_name: Option<String>) -> &mut PeerRecord {
        let record = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| PeerRecord::new(peer_id, None));
        *record = PeerRecord::new(peer_id, display_name);
        record
    }

    pub fn get(&self, peer_id: ClientId) -> Option<&PeerRecord> {
        self.peers.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: ClientId) -> Option<&mut PeerRecord> {
        self.peers.get_mut(&peer_id)
    }

    /// Remove a record, returning it so its handle can be closed
    pub fn remove(&mut self, peer_id: ClientId) -> Option<PeerRecord> {
        self.peers.remove(&peer_id)
    }

    pub fn contains(&self, peer_id: ClientId) -> bool {
        self.peers.contains_key(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Known peer ids, sorted
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.peers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drain every record, for teardown
    pub fn drain(&mut self) -> Vec<PeerRecord> {
        self.peers.drain().map(|(_, record)| record).collect()
    }
}
