//! Signaling relay adapter
//!
//! Wire protocol types and the channel transport. The adapter carries
//! envelopes; all interpretation happens in the room orchestrator.

pub mod channel;
pub mod protocol;

pub use channel::{SignalingChannel, WsSignalingChannel};
pub use protocol::{ClientId, RosterEntry, SdpPayload, SignalingMessage};
