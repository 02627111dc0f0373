//! In-process loopback relay
//!
//! Reproduces the observable behavior of the signaling relay: numeric
//! incrementing client ids, a `welcome` with the current room roster,
//! `peer-connected`/`peer-disconnected` broadcasts, targeted forwarding
//! of offers/answers/candidates with the authoritative `senderId`
//! spliced in, room-wide chat, and `get-peers` lookups.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use meshrtc::signaling::{ClientId, RosterEntry, SignalingMessage};
use tokio::sync::mpsc;

use super::channel::ScriptedChannel;

struct RelayClient {
    name: String,
    room: String,
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

struct RelayState {
    pending_ids: VecDeque<ClientId>,
    next_id: ClientId,
    clients: HashMap<ClientId, RelayClient>,
    log: Vec<(ClientId, SignalingMessage)>,
}

/// Loopback signaling relay
pub struct LoopbackRelay {
    state: Arc<Mutex<RelayState>>,
}

impl Default for LoopbackRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::with_ids([])
    }

    /// Relay that assigns the given ids first, then counts on from 1
    pub fn with_ids(ids: impl IntoIterator<Item = ClientId>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                pending_ids: ids.into_iter().collect(),
                next_id: 1,
                clients: HashMap::new(),
                log: Vec::new(),
            })),
        }
    }

    /// Every frame received from clients, in arrival order, keyed by
    /// the sending client
    pub fn log(&self) -> Vec<(ClientId, SignalingMessage)> {
        self.state.lock().unwrap().log.clone()
    }

    /// Offer frames received, keyed by the sending client
    pub fn offers(&self) -> Vec<(ClientId, SignalingMessage)> {
        self.log()
            .into_iter()
            .filter(|(_, frame)| matches!(frame, SignalingMessage::Offer { .. }))
            .collect()
    }

    /// Connect a new client; the returned channel goes into a room
    pub fn connect(&self) -> ScriptedChannel {
        let (channel, driver) = ScriptedChannel::pair();
        let (to_client, mut from_client, open) = driver.into_parts();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            // First frame must register the client
            let Some(first) = from_client.recv().await else {
                return;
            };
            let SignalingMessage::Register { peer_name, room_id } = first.clone() else {
                return;
            };

            let client_id = {
                let mut st = state.lock().unwrap();
                let client_id = st
                    .pending_ids
                    .pop_front()
                    .unwrap_or_else(|| {
                        let id = st.next_id;
                        st.next_id = id + 1;
                        id
                    });
                st.log.push((client_id, first));

                let roster: Vec<RosterEntry> = st
                    .clients
                    .iter()
                    .filter(|(_, c)| c.room == room_id)
                    .map(|(&id, c)| RosterEntry {
                        client_id: id,
                        peer_name: Some(c.name.clone()),
                    })
                    .collect();

                st.clients.insert(
                    client_id,
                    RelayClient {
                        name: peer_name.clone(),
                        room: room_id.clone(),
                        tx: to_client.clone(),
                    },
                );
                let total = st.clients.len() as u32;

                let _ = to_client.send(SignalingMessage::Welcome {
                    client_id,
                    total_clients: Some(total),
                    peers_in_room: Some(roster.len() as u32),
                    peers: roster,
                });

                for (&other_id, other) in st.clients.iter() {
                    if other_id != client_id && other.room == room_id {
                        let _ = other.tx.send(SignalingMessage::PeerConnected {
                            client_id,
                            peer_name: Some(peer_name.clone()),
                            total_clients: Some(total),
                            peers_in_room: None,
                        });
                    }
                }
                client_id
            };

            while let Some(frame) = from_client.recv().await {
                let mut st = state.lock().unwrap();
                st.log.push((client_id, frame.clone()));
                match frame {
                    SignalingMessage::Offer {
                        offer,
                        target_id,
                        peer_name: sender_name,
                        room_id: frame_room,
                        ..
                    } => {
                        st.route(
                            &room_id,
                            client_id,
                            target_id,
                            SignalingMessage::Offer {
                                offer,
                                target_id,
                                sender_id: Some(client_id),
                                peer_name: sender_name,
                                room_id: frame_room,
                            },
                        );
                    }
                    SignalingMessage::Answer {
                        answer,
                        target_id,
                        peer_name: sender_name,
                        ..
                    } => {
                        st.route(
                            &room_id,
                            client_id,
                            target_id,
                            SignalingMessage::Answer {
                                answer,
                                target_id,
                                sender_id: Some(client_id),
                                peer_name: sender_name,
                            },
                        );
                    }
                    SignalingMessage::IceCandidate {
                        candidate,
                        target_id,
                        ..
                    } => {
                        st.route(
                            &room_id,
                            client_id,
                            target_id,
                            SignalingMessage::IceCandidate {
                                candidate,
                                target_id,
                                sender_id: Some(client_id),
                            },
                        );
                    }
                    SignalingMessage::Chat {
                        text, timestamp, ..
                    } => {
                        let broadcast = SignalingMessage::Chat {
                            text,
                            sender_id: Some(client_id),
                            sender_name: Some(peer_name.clone()),
                            timestamp,
                            room_id: Some(room_id.clone()),
                        };
                        st.route(&room_id, client_id, None, broadcast);
                    }
                    SignalingMessage::GetPeers => {
                        let mut peers: Vec<ClientId> = st
                            .clients
                            .iter()
                            .filter(|(&id, c)| id != client_id && c.room == room_id)
                            .map(|(&id, _)| id)
                            .collect();
                        peers.sort_unstable();
                        if let Some(client) = st.clients.get(&client_id) {
                            let _ = client.tx.send(SignalingMessage::PeerList { peers });
                        }
                    }
                    _ => {}
                }
            }

            // Client gone: drop it and tell the room
            let mut st = state.lock().unwrap();
            st.clients.remove(&client_id);
            open.store(false, Ordering::SeqCst);
            let total = st.clients.len() as u32;
            for (_, other) in st.clients.iter().filter(|(_, c)| c.room == room_id) {
                let _ = other.tx.send(SignalingMessage::PeerDisconnected {
                    client_id,
                    total_clients: Some(total),
                    peers_in_room: None,
                });
            }
        });

        channel
    }
}

impl RelayState {
    /// Deliver a frame: targeted if `target_id` is set and in the same
    /// room, otherwise broadcast to everyone else in the room
    fn route(
        &self,
        room: &str,
        sender: ClientId,
        target_id: Option<ClientId>,
        frame: SignalingMessage,
    ) {
        match target_id {
            Some(target) => {
                if let Some(client) = self.clients.get(&target) {
                    if client.room == room {
                        let _ = client.tx.send(frame);
                    }
                }
            }
            None => {
                for (&id, client) in self.clients.iter() {
                    if id != sender && client.room == room {
                        let _ = client.tx.send(frame.clone());
                    }
                }
            }
        }
    }
}
