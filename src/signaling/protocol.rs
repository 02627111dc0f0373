//! Signaling wire protocol
//!
//! JSON envelope exchanged with the signaling relay. Every frame is an
//! object tagged by `type`; directed frames carry a `targetId` chosen by
//! the sender, and the relay splices the authoritative `senderId` into
//! forwarded frames. SDP payloads travel in browser
//! `RTCSessionDescription` shape, ICE candidates as opaque
//! `RTCIceCandidateInit` JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Relay-assigned numeric peer identifier
///
/// Ids increase monotonically over the relay's lifetime, which makes
/// them the ordering key for offer-initiation tie-breaking.
pub type ClientId = u64;

/// Session description payload (`{"type": ..., "sdp": ...}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdpPayload {
    /// "offer" or "answer"
    #[serde(rename = "type")]
    pub kind: String,
    /// Raw SDP text
    pub sdp: String,
}

impl SdpPayload {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_string(),
            sdp: sdp.into(),
        }
    }
}

/// Roster entry carried in a `welcome` frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub client_id: ClientId,
    #[serde(default)]
    pub peer_name: Option<String>,
}

/// Signaling envelope
///
/// Tag values and field names match the relay protocol exactly, so
/// these serialize to the frames the relay and browser clients expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// First frame sent by a client after connecting
    #[serde(rename_all = "camelCase")]
    Register { peer_name: String, room_id: String },

    /// Relay response assigning the local client id
    #[serde(rename_all = "camelCase")]
    Welcome {
        client_id: ClientId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_clients: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peers_in_room: Option<u32>,
        /// Current room roster, excluding the new client
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        peers: Vec<RosterEntry>,
    },

    /// Broadcast when a peer joins the room
    #[serde(rename_all = "camelCase")]
    PeerConnected {
        client_id: ClientId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_clients: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peers_in_room: Option<u32>,
    },

    /// Broadcast when a peer leaves the room
    #[serde(rename_all = "camelCase")]
    PeerDisconnected {
        client_id: ClientId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_clients: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peers_in_room: Option<u32>,
    },

    /// SDP offer directed at `target_id`
    #[serde(rename_all = "camelCase")]
    Offer {
        offer: SdpPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },

    /// SDP answer directed at `target_id`
    #[serde(rename_all = "camelCase")]
    Answer {
        answer: SdpPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_name: Option<String>,
    },

    /// ICE candidate directed at `target_id`
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        /// Opaque `RTCIceCandidateInit` JSON
        candidate: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<ClientId>,
    },

    /// Room-wide chat broadcast
    #[serde(rename_all = "camelCase")]
    Chat {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<ClientId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
        /// Caller-supplied ISO-8601 timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },

    /// Request the relay's current peer id list for the room
    GetPeers,

    /// Relay response to `get-peers`
    PeerList { peers: Vec<ClientId> },
}

impl SignalingMessage {
    /// Serialize to a JSON frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Parse from a JSON frame
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::SerializationError(e.to_string()))
    }
}
