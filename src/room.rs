//! Room orchestration
//!
//! [`MeshRoom`] owns the registry and runs the single event loop that
//! serializes every negotiation step: signaling frames, session events
//! and user commands are all funneled through one `select!` so registry
//! mutations never interleave. Only the connection-internal work (ICE,
//! DTLS, media) runs concurrently inside the transport.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::registry::{NegotiationState, PeerRegistry};
use crate::render::RenderSink;
use crate::session::{
    PeerSession, RemoteStream, SessionEvent, SessionFactory, SessionNotice, TransportState,
};
use crate::signaling::{ClientId, SdpPayload, SignalingChannel, SignalingMessage};
use crate::{Error, Result};

/// Whether the local side initiates the offer toward `peer`
///
/// Deterministic tie-break for the simultaneous-join race: the lower
/// numeric id offers, the higher side waits for the incoming offer.
pub fn initiates_offer(local: ClientId, peer: ClientId) -> bool {
    local < peer
}

/// Observable room activity, delivered to the embedding application
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Relay assigned the local client id
    Registered { client_id: ClientId },
    /// A peer entered the room (announcement or roster)
    PeerJoined {
        peer_id: ClientId,
        display_name: Option<String>,
    },
    /// A peer left the room; its record and handle are gone
    PeerLeft { peer_id: ClientId },
    /// Offer/answer exchange with the peer completed
    PeerNegotiated { peer_id: ClientId },
    /// Remote media bound to the render sink
    MediaAttached { peer_id: ClientId },
    /// Negotiation gave up after exhausting the retry budget
    NegotiationFailed { peer_id: ClientId },
    /// Chat line, either received or the local echo (`own`)
    Chat {
        sender_id: Option<ClientId>,
        sender_name: Option<String>,
        text: String,
        timestamp: Option<String>,
        own: bool,
    },
    /// Relay answered a peer-list request
    PeerList { peers: Vec<ClientId> },
    /// Signaling connection ended; the room is torn down
    SignalingClosed,
}

enum RoomCommand {
    SendChat {
        text: String,
        timestamp: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetMediaReady,
    RequestPeerList,
    Retry { peer_id: ClientId },
    Shutdown,
}

/// Handle for driving a running room loop
#[derive(Clone)]
pub struct RoomHandle {
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Send a chat line to the room
    ///
    /// # Arguments
    ///
    /// * `text` - Message body
    /// * `timestamp` - Caller-supplied ISO-8601 timestamp
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] before the relay's `welcome`,
    /// or [`Error::ChannelNotReady`] if the room has stopped.
    pub async fn send_chat(&self, text: impl Into<String>, timestamp: impl Into<String>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::SendChat {
                text: text.into(),
                timestamp: timestamp.into(),
                reply,
            })
            .map_err(|_| Error::ChannelNotReady("room loop stopped".to_string()))?;
        response
            .await
            .map_err(|_| Error::ChannelNotReady("room loop stopped".to_string()))?
    }

    /// Mark local media as ready; eligible idle peers get offers
    pub fn set_media_ready(&self) -> Result<()> {
        self.cmd_tx
            .send(RoomCommand::SetMediaReady)
            .map_err(|_| Error::ChannelNotReady("room loop stopped".to_string()))
    }

    /// Ask the relay for the current peer id list
    pub fn request_peer_list(&self) -> Result<()> {
        self.cmd_tx
            .send(RoomCommand::RequestPeerList)
            .map_err(|_| Error::ChannelNotReady("room loop stopped".to_string()))
    }

    /// Stop the room loop and release every connection
    pub fn shutdown(&self) -> Result<()> {
        self.cmd_tx
            .send(RoomCommand::Shutdown)
            .map_err(|_| Error::ChannelNotReady("room loop stopped".to_string()))
    }
}

/// Full-mesh room client
pub struct MeshRoom {
    config: MeshConfig,
    local_id: Option<ClientId>,
    media_ready: bool,
    registry: PeerRegistry,
    channel: Box<dyn SignalingChannel>,
    factory: Arc<dyn SessionFactory>,
    render: Arc<dyn RenderSink>,
    session_tx: mpsc::UnboundedSender<SessionNotice>,
    session_rx: mpsc::UnboundedReceiver<SessionNotice>,
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
    cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
    events_tx: mpsc::UnboundedSender<RoomEvent>,
}

impl MeshRoom {
    /// Build a room over an already connected signaling channel
    ///
    /// Returns the room (to be driven with [`MeshRoom::run`]), the
    /// command handle and the event stream.
    pub fn new(
        config: MeshConfig,
        channel: Box<dyn SignalingChannel>,
        factory: Arc<dyn SessionFactory>,
        render: Arc<dyn RenderSink>,
    ) -> Result<(Self, RoomHandle, mpsc::UnboundedReceiver<RoomEvent>)> {
        config.validate()?;

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handle = RoomHandle {
            cmd_tx: cmd_tx.clone(),
        };

        let room = Self {
            config,
            local_id: None,
            media_ready: false,
            registry: PeerRegistry::new(),
            channel,
            factory,
            render,
            session_tx,
            session_rx,
            cmd_tx,
            cmd_rx,
            events_tx,
        };

        Ok((room, handle, events_rx))
    }

    /// Connect to the relay and spawn the room loop
    pub async fn connect(
        config: MeshConfig,
        factory: Arc<dyn SessionFactory>,
        render: Arc<dyn RenderSink>,
    ) -> Result<(RoomHandle, mpsc::UnboundedReceiver<RoomEvent>)> {
        config.validate()?;
        let channel = crate::signaling::WsSignalingChannel::connect(&config.signaling_url).await?;
        let (room, handle, events) = Self::new(config, Box::new(channel), factory, render)?;
        tokio::spawn(room.run());
        Ok((handle, events))
    }

    /// Run the room loop until shutdown or signaling loss
    pub async fn run(mut self) {
        let register = SignalingMessage::Register {
            peer_name: self.config.display_name.clone(),
            room_id: self.config.room_id.clone(),
        };
        if let Err(e) = self.channel.send(&register) {
            warn!("Failed to register with relay: {}", e);
            self.emit(RoomEvent::SignalingClosed);
            return;
        }
        info!(
            room = %self.config.room_id,
            name = %self.config.display_name,
            "Joining room"
        );

        loop {
            tokio::select! {
                frame = self.channel.recv() => match frame {
                    Some(message) => self.handle_signaling(message).await,
                    None => {
                        info!("Signaling connection ended, leaving room");
                        self.teardown().await;
                        self.emit(RoomEvent::SignalingClosed);
                        break;
                    }
                },
                Some(notice) = self.session_rx.recv() => {
                    self.handle_session_event(notice).await;
                }
                command = self.cmd_rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            self.teardown().await;
                            break;
                        }
                    }
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
            }
        }
    }

    fn emit(&self, event: RoomEvent) {
        let _ = self.events_tx.send(event);
    }

    // ------------------------------------------------------------------
    // Signaling frames
    // ------------------------------------------------------------------

    async fn handle_signaling(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::Welcome {
                client_id, peers, ..
            } => self.handle_welcome(client_id, peers).await,
            SignalingMessage::PeerConnected {
                client_id,
                peer_name,
                ..
            } => self.handle_peer_joined(client_id, peer_name).await,
            SignalingMessage::PeerDisconnected { client_id, .. } => {
                self.handle_peer_left(client_id).await;
            }
            SignalingMessage::Offer {
                offer,
                sender_id,
                peer_name,
                ..
            } => match sender_id {
                Some(sender_id) => self.handle_offer(sender_id, offer, peer_name).await,
                None => warn!("Dropping offer without senderId"),
            },
            SignalingMessage::Answer {
                answer, sender_id, ..
            } => match sender_id {
                Some(sender_id) => self.handle_answer(sender_id, answer).await,
                None => warn!("Dropping answer without senderId"),
            },
            SignalingMessage::IceCandidate {
                candidate,
                sender_id,
                ..
            } => match sender_id {
                Some(sender_id) => self.handle_candidate(sender_id, candidate).await,
                None => warn!("Dropping ICE candidate without senderId"),
            },
            SignalingMessage::Chat {
                text,
                sender_id,
                sender_name,
                timestamp,
                ..
            } => {
                if sender_id.is_some() && sender_id == self.local_id {
                    return;
                }
                self.emit(RoomEvent::Chat {
                    sender_id,
                    sender_name,
                    text,
                    timestamp,
                    own: false,
                });
            }
            SignalingMessage::PeerList { peers } => {
                self.emit(RoomEvent::PeerList { peers });
            }
            SignalingMessage::Register { .. } | SignalingMessage::GetPeers => {
                // Client-to-relay frames; a relay never sends these
                warn!("Ignoring unexpected relay frame");
            }
        }
    }

    async fn handle_welcome(&mut self, client_id: ClientId, roster: Vec<crate::signaling::RosterEntry>) {
        info!("Registered with relay as client {}", client_id);
        self.local_id = Some(client_id);
        self.emit(RoomEvent::Registered { client_id });

        for entry in roster {
            if entry.client_id == client_id || self.registry.contains(entry.client_id) {
                continue;
            }
            if self.registry.len() >= self.config.max_peers as usize {
                warn!(
                    "Ignoring roster peer {}: room at max_peers ({})",
                    entry.client_id, self.config.max_peers
                );
                continue;
            }
            self.registry.upsert(entry.client_id, entry.peer_name.clone());
            self.emit(RoomEvent::PeerJoined {
                peer_id: entry.client_id,
                display_name: entry.peer_name,
            });
        }

        if self.media_ready {
            self.offer_to_idle_peers().await;
        }
    }

    async fn handle_peer_joined(&mut self, peer_id: ClientId, peer_name: Option<String>) {
        if Some(peer_id) == self.local_id {
            return;
        }

        if self.registry.contains(peer_id) {
            // Duplicate announcement: refresh the name, keep the state
            self.registry.upsert(peer_id, peer_name);
            return;
        }

        if self.registry.len() >= self.config.max_peers as usize {
            warn!(
                "Ignoring peer {}: room at max_peers ({})",
                peer_id, self.config.max_peers
            );
            return;
        }

        self.registry.upsert(peer_id, peer_name.clone());
        self.emit(RoomEvent::PeerJoined {
            peer_id,
            display_name: peer_name,
        });

        if self.media_ready {
            if let Some(local_id) = self.local_id {
                if initiates_offer(local_id, peer_id) {
                    self.start_offer(peer_id).await;
                }
            }
        }
    }

    async fn handle_peer_left(&mut self, peer_id: ClientId) {
        let Some(record) = self.registry.remove(peer_id) else {
            debug!("peer-disconnected for unknown peer {}", peer_id);
            return;
        };

        if record.render_attached {
            self.render.detach(peer_id);
        }
        if let Some(session) = record.session {
            if let Err(e) = session.close().await {
                warn!("Closing session for departed peer {} failed: {}", peer_id, e);
            }
        }

        info!("Peer {} left the room", peer_id);
        self.emit(RoomEvent::PeerLeft { peer_id });
    }

    async fn handle_offer(
        &mut self,
        sender_id: ClientId,
        offer: SdpPayload,
        peer_name: Option<String>,
    ) {
        match self.registry.get(sender_id) {
            Some(record) if record.state.is_terminal() => {
                // Rejoin after a closed negotiation starts over
                self.registry.replace(sender_id, peer_name);
            }
            Some(_) => {
                self.registry.upsert(sender_id, peer_name);
            }
            None => {
                // Offer raced ahead of the join announcement
                if self.registry.len() >= self.config.max_peers as usize {
                    warn!(
                        "Dropping offer from peer {}: room at max_peers ({})",
                        sender_id, self.config.max_peers
                    );
                    return;
                }
                self.registry.upsert(sender_id, peer_name.clone());
                self.emit(RoomEvent::PeerJoined {
                    peer_id: sender_id,
                    display_name: peer_name,
                });
            }
        }

        if let Err(e) = self.answer_offer(sender_id, offer).await {
            warn!("Answering offer from peer {} failed: {}", sender_id, e);
            self.fail_peer(sender_id).await;
        }
    }

    async fn answer_offer(&mut self, peer_id: ClientId, offer: SdpPayload) -> Result<()> {
        let session = self.ensure_session(peer_id).await?;
        if let Some(record) = self.registry.get_mut(peer_id) {
            record.set_state(NegotiationState::Answering);
        }

        let answer_sdp = session.create_answer(offer.sdp).await?;

        // Remote description is set now, buffered candidates can land
        self.replay_candidates(peer_id, &session).await;

        self.channel.send(&SignalingMessage::Answer {
            answer: SdpPayload::answer(answer_sdp),
            target_id: Some(peer_id),
            sender_id: None,
            peer_name: Some(self.config.display_name.clone()),
        })?;

        if let Some(record) = self.registry.get_mut(peer_id) {
            record.set_state(NegotiationState::Connected);
            record.retry_attempts = 0;
        }
        self.emit(RoomEvent::PeerNegotiated { peer_id });
        Ok(())
    }

    async fn handle_answer(&mut self, sender_id: ClientId, answer: SdpPayload) {
        let accept = matches!(
            self.registry.get(sender_id).map(|r| r.state),
            Some(NegotiationState::AwaitingAnswer)
        );
        if !accept {
            warn!(
                "Ignoring stale or duplicate answer from peer {}",
                sender_id
            );
            return;
        }

        let Some(session) = self
            .registry
            .get(sender_id)
            .and_then(|r| r.session.as_ref().map(Arc::clone))
        else {
            warn!("Answer from peer {} but no connection handle", sender_id);
            return;
        };

        if let Err(e) = session.apply_remote_answer(answer.sdp).await {
            warn!("Applying answer from peer {} failed: {}", sender_id, e);
            self.fail_peer(sender_id).await;
            return;
        }

        self.replay_candidates(sender_id, &session).await;

        if let Some(record) = self.registry.get_mut(sender_id) {
            record.set_state(NegotiationState::Connected);
            record.retry_attempts = 0;
        }
        self.emit(RoomEvent::PeerNegotiated { peer_id: sender_id });
    }

    async fn handle_candidate(&mut self, sender_id: ClientId, candidate: Value) {
        let Some(record) = self.registry.get_mut(sender_id) else {
            warn!("Dropping ICE candidate for unknown peer {}", sender_id);
            return;
        };

        // Candidates are only applied once the remote description is
        // in place, which is exactly the Connected transition here
        if record.state == NegotiationState::Connected {
            if let Some(session) = record.session.as_ref().map(Arc::clone) {
                if let Err(e) = session.add_remote_candidate(candidate).await {
                    warn!("ICE candidate from peer {} rejected: {}", sender_id, e);
                }
                return;
            }
        }

        record.buffer_candidate(candidate, self.config.candidate_queue_limit);
        debug!(
            "Buffered ICE candidate for peer {} ({} pending)",
            sender_id,
            record.pending_candidate_count()
        );
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    async fn ensure_session(&mut self, peer_id: ClientId) -> Result<Arc<dyn PeerSession>> {
        match self.registry.get(peer_id) {
            Some(record) => {
                if let Some(session) = &record.session {
                    return Ok(Arc::clone(session));
                }
            }
            None => return Err(Error::PeerNotFound(peer_id)),
        }

        let session = self
            .factory
            .create_session(peer_id, self.session_tx.clone())
            .await?;
        let record = self
            .registry
            .get_mut(peer_id)
            .ok_or(Error::PeerNotFound(peer_id))?;
        record.session = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn start_offer(&mut self, peer_id: ClientId) {
        if let Err(e) = self.try_offer(peer_id).await {
            warn!("Offering to peer {} failed: {}", peer_id, e);
            self.fail_peer(peer_id).await;
        }
    }

    async fn try_offer(&mut self, peer_id: ClientId) -> Result<()> {
        let session = self.ensure_session(peer_id).await?;
        if let Some(record) = self.registry.get_mut(peer_id) {
            record.set_state(NegotiationState::Offering);
        }

        let offer_sdp = session.create_offer().await?;

        self.channel.send(&SignalingMessage::Offer {
            offer: SdpPayload::offer(offer_sdp),
            target_id: Some(peer_id),
            sender_id: None,
            peer_name: Some(self.config.display_name.clone()),
            room_id: Some(self.config.room_id.clone()),
        })?;

        if let Some(record) = self.registry.get_mut(peer_id) {
            record.set_state(NegotiationState::AwaitingAnswer);
        }
        Ok(())
    }

    async fn replay_candidates(&mut self, peer_id: ClientId, session: &Arc<dyn PeerSession>) {
        let pending = match self.registry.get_mut(peer_id) {
            Some(record) => record.take_pending_candidates(),
            None => return,
        };
        for candidate in pending {
            if let Err(e) = session.add_remote_candidate(candidate).await {
                warn!("Replayed candidate for peer {} rejected: {}", peer_id, e);
            }
        }
    }

    async fn offer_to_idle_peers(&mut self) {
        let Some(local_id) = self.local_id else {
            return;
        };
        let idle: Vec<ClientId> = self
            .registry
            .ids()
            .into_iter()
            .filter(|&id| {
                initiates_offer(local_id, id)
                    && self.registry.get(id).map(|r| r.state) == Some(NegotiationState::Idle)
            })
            .collect();
        for peer_id in idle {
            self.start_offer(peer_id).await;
        }
    }

    async fn fail_peer(&mut self, peer_id: ClientId) {
        let (session, attached, attempt) = match self.registry.get_mut(peer_id) {
            Some(record) if !record.state.is_terminal() => {
                record.set_state(NegotiationState::Failed);
                let attached = record.render_attached;
                record.render_attached = false;
                (record.session.take(), attached, record.retry_attempts)
            }
            _ => return,
        };

        if attached {
            self.render.detach(peer_id);
        }
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!("Closing failed session for peer {}: {}", peer_id, e);
            }
        }

        if self.config.retry.should_retry(attempt) {
            let delay = self.config.retry.calculate_backoff(attempt);
            if let Some(record) = self.registry.get_mut(peer_id) {
                record.retry_attempts = attempt + 1;
            }
            info!(
                "Retrying negotiation with peer {} in {:?} (attempt {})",
                peer_id,
                delay,
                attempt + 1
            );
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = cmd_tx.send(RoomCommand::Retry { peer_id });
            });
        } else {
            warn!(
                "Negotiation with peer {} exhausted {} retries, closing",
                peer_id, attempt
            );
            if let Some(record) = self.registry.get_mut(peer_id) {
                record.set_state(NegotiationState::Closed);
            }
            self.emit(RoomEvent::NegotiationFailed { peer_id });
        }
    }

    async fn retry_peer(&mut self, peer_id: ClientId) {
        let state = self.registry.get(peer_id).map(|r| r.state);
        if state != Some(NegotiationState::Failed) {
            debug!("Skipping retry for peer {}: state {:?}", peer_id, state);
            return;
        }

        match self.local_id {
            Some(local_id) if initiates_offer(local_id, peer_id) && self.media_ready => {
                self.start_offer(peer_id).await;
            }
            _ => {
                // The lower-id side re-offers; we go back to waiting
                if let Some(record) = self.registry.get_mut(peer_id) {
                    record.set_state(NegotiationState::Idle);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Session events
    // ------------------------------------------------------------------

    async fn handle_session_event(&mut self, notice: SessionNotice) {
        let SessionNotice { peer_id, event } = notice;
        match event {
            SessionEvent::LocalCandidate(candidate) => {
                if !self.registry.contains(peer_id) {
                    return;
                }
                let message = SignalingMessage::IceCandidate {
                    candidate,
                    target_id: Some(peer_id),
                    sender_id: None,
                };
                if let Err(e) = self.channel.send(&message) {
                    debug!("Dropping local candidate for peer {}: {}", peer_id, e);
                }
            }
            SessionEvent::CandidateGatheringDone => {
                debug!("ICE gathering complete for peer {}", peer_id);
            }
            SessionEvent::RemoteStream(stream) => {
                self.attach_stream(peer_id, stream);
            }
            SessionEvent::StateChanged(state) => match state {
                TransportState::Failed | TransportState::Disconnected => {
                    warn!("Transport to peer {} reported {:?}", peer_id, state);
                    self.fail_peer(peer_id).await;
                }
                other => {
                    debug!("Transport to peer {} now {:?}", peer_id, other);
                }
            },
        }
    }

    fn attach_stream(&mut self, peer_id: ClientId, stream: RemoteStream) {
        let Some(record) = self.registry.get_mut(peer_id) else {
            debug!("Remote stream for unknown peer {}", peer_id);
            return;
        };
        // Streams from an already-failed or closed handle must not bind
        let negotiating = matches!(
            record.state,
            NegotiationState::Offering
                | NegotiationState::AwaitingAnswer
                | NegotiationState::Answering
                | NegotiationState::Connected
        );
        if record.render_attached || !negotiating {
            return;
        }
        record.render_attached = true;
        let name = record
            .display_name
            .clone()
            .unwrap_or_else(|| format!("peer-{}", peer_id));
        self.render.attach(peer_id, &name, stream);
        self.emit(RoomEvent::MediaAttached { peer_id });
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::SendChat {
                text,
                timestamp,
                reply,
            } => {
                let result = self.send_chat(text, timestamp);
                let _ = reply.send(result);
                false
            }
            RoomCommand::SetMediaReady => {
                if !self.media_ready {
                    info!("Local media ready");
                    self.media_ready = true;
                    self.offer_to_idle_peers().await;
                }
                false
            }
            RoomCommand::RequestPeerList => {
                if let Err(e) = self.channel.send(&SignalingMessage::GetPeers) {
                    warn!("Peer list request failed: {}", e);
                }
                false
            }
            RoomCommand::Retry { peer_id } => {
                self.retry_peer(peer_id).await;
                false
            }
            RoomCommand::Shutdown => {
                info!("Room shutdown requested");
                true
            }
        }
    }

    fn send_chat(&mut self, text: String, timestamp: String) -> Result<()> {
        let local_id = self.local_id.ok_or(Error::NotRegistered)?;

        self.channel.send(&SignalingMessage::Chat {
            text: text.clone(),
            sender_id: Some(local_id),
            sender_name: Some(self.config.display_name.clone()),
            timestamp: Some(timestamp.clone()),
            room_id: Some(self.config.room_id.clone()),
        })?;

        // Optimistic local echo
        self.emit(RoomEvent::Chat {
            sender_id: Some(local_id),
            sender_name: Some(self.config.display_name.clone()),
            text,
            timestamp: Some(timestamp),
            own: true,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    async fn teardown(&mut self) {
        for record in self.registry.drain() {
            if record.render_attached {
                self.render.detach(record.peer_id);
            }
            if let Some(session) = record.session {
                if let Err(e) = session.close().await {
                    warn!("Closing session for peer {}: {}", record.peer_id, e);
                }
            }
        }
    }
}
