//! `RoomActor` - per-room actor that owns all room state.
//!
//! Each `RoomActor`:
//! - Owns all mutable state for one room (peers, producers, streamer)
//! - Dispatches RPC frames through a per-kind handler table
//! - Broadcasts lifecycle and media events to member connections
//!
//! The actor is the single writer of its room: a handler runs to completion
//! per mailbox message, so check-then-set invariants (such as "at most one
//! streamer") never interleave with other frames for the same room.

use crate::errors::ScError;
use crate::status::StatusFeed;
use crate::upstream::{
    Collaborators, ConsumerHandle, MediaKind, ProducerHandle, RoomKind, RoomRecord,
    TransportHandle,
};

use super::connection::ConnectionActorHandle;
use super::livestream::LivestreamState;
use super::meeting::MeetingState;
use super::messages::{
    PeerIdentity, RoomMessage, RoomStateSnapshot, RoomStateView, RpcAck, RpcFrame,
};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Per-room limits taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct RoomLimits {
    pub max_peers: usize,
    pub chat_max_length: usize,
}

/// RPC methods known to some room kind. The handler table maps wire method
/// names to these; the variant supplies the bound implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RpcMethod {
    Join,
    CreateWebRtcTransport,
    Produce,
    Chat,
    StopLivestream,
}

/// Handler table shared by every room kind. Variants extend or re-bind
/// entries at construction; an entry absent from a room's table is a
/// `METHOD_NOT_FOUND` for that room.
pub(crate) fn base_handler_table() -> HashMap<&'static str, RpcMethod> {
    HashMap::from([
        ("join", RpcMethod::Join),
        ("createWebRtcTransport", RpcMethod::CreateWebRtcTransport),
        ("produce", RpcMethod::Produce),
        ("chat", RpcMethod::Chat),
    ])
}

/// Capabilities and flags carried by a `join` frame.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct JoinData {
    pub device: Option<Value>,
    pub rtp_capabilities: Option<Value>,
    pub sctp_capabilities: Option<Value>,
    pub is_streamer: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct TransportData {
    pub producing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProduceData {
    transport_id: String,
    kind: MediaKind,
    #[serde(default)]
    rtp_parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatData {
    content: String,
}

/// Decode a frame payload, mapping malformed input to a validation error.
pub(crate) fn parse_data<T: DeserializeOwned>(data: &Value) -> Result<T, ScError> {
    serde_json::from_value(data.clone())
        .map_err(|e| ScError::Validation(format!("Malformed request payload: {e}")))
}

/// Server-side representative of one connected participant.
pub struct Peer {
    pub id: String,
    pub identity: PeerIdentity,
    pub device: Option<Value>,
    pub rtp_capabilities: Option<Value>,
    pub sctp_capabilities: Option<Value>,
    /// Attached to the room object but not yet media-ready.
    pub is_waiting: bool,
    pub transports: HashMap<String, TransportHandle>,
    pub producers: HashMap<String, ProducerHandle>,
    pub consumers: Vec<ConsumerHandle>,
    pub connection: ConnectionActorHandle,
}

/// Shared room behavior: the peer collection, producer/consumer
/// bookkeeping and broadcast primitives reused by every room kind.
/// Variants compose with this and specialize only what they must.
pub(crate) struct RoomCore {
    pub room_id: String,
    pub kind: RoomKind,
    pub thumbnail: Option<String>,
    pub peers: HashMap<String, Peer>,
    pub collaborators: Collaborators,
    pub status_feed: StatusFeed,
    pub limits: RoomLimits,
}

impl RoomCore {
    fn new(
        record: &RoomRecord,
        collaborators: Collaborators,
        status_feed: StatusFeed,
        limits: RoomLimits,
    ) -> Self {
        Self {
            room_id: record.id.clone(),
            kind: record.kind,
            thumbnail: record.thumbnail.clone(),
            peers: HashMap::new(),
            collaborators,
            status_feed,
            limits,
        }
    }

    /// Attach a peer in the waiting state. Admission proper happens on
    /// `join`.
    pub(crate) fn attach_peer(
        &mut self,
        peer_id: String,
        identity: PeerIdentity,
        connection: ConnectionActorHandle,
    ) -> Result<(), ScError> {
        if self.peers.contains_key(&peer_id) {
            return Err(ScError::Conflict("Peer already attached".to_string()));
        }
        if self.peers.len() >= self.limits.max_peers {
            return Err(ScError::Capacity("The room is full".to_string()));
        }

        self.peers.insert(
            peer_id.clone(),
            Peer {
                id: peer_id,
                identity,
                device: None,
                rtp_capabilities: None,
                sctp_capabilities: None,
                is_waiting: true,
                transports: HashMap::new(),
                producers: HashMap::new(),
                consumers: Vec::new(),
                connection,
            },
        );
        Ok(())
    }

    /// Remove a peer and release its media handles. Engine-side release is
    /// best-effort: teardown keeps going when the engine is down.
    ///
    /// Connection teardown is left to the caller: some removal paths still
    /// owe the peer an ack through that connection.
    pub(crate) async fn remove_peer(&mut self, peer_id: &str) -> Option<Peer> {
        let peer = self.peers.remove(peer_id)?;

        if let Err(e) = self
            .collaborators
            .media
            .release_peer(&self.room_id, peer_id)
            .await
        {
            warn!(
                target: "sc.actor.room",
                room_id = %self.room_id,
                peer_id = %peer_id,
                error = %e,
                "Media engine release failed during peer removal"
            );
        }

        Some(peer)
    }

    /// Parse a join frame, merge negotiated capabilities into the peer and
    /// clear its waiting flag. Kind-specific admission runs after this.
    pub(crate) fn prepare_join(&mut self, frame: &RpcFrame) -> Result<JoinData, ScError> {
        let data: JoinData = parse_data(&frame.data)?;

        let peer = self
            .peers
            .get_mut(&frame.peer_id)
            .ok_or_else(|| ScError::PeerNotFound(frame.peer_id.clone()))?;

        if let Some(device) = &data.device {
            peer.device = Some(device.clone());
        }
        if let Some(caps) = &data.rtp_capabilities {
            peer.rtp_capabilities = Some(caps.clone());
        }
        if let Some(caps) = &data.sctp_capabilities {
            peer.sctp_capabilities = Some(caps.clone());
        }
        peer.is_waiting = false;

        Ok(data)
    }

    /// Put a peer back in the waiting state after a failed admission; the
    /// client must retry or leave.
    pub(crate) fn mark_waiting(&mut self, peer_id: &str) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.is_waiting = true;
        }
    }

    /// Non-waiting member count; variants adjust for role accounting.
    pub(crate) fn joined_peers(&self) -> usize {
        self.peers.values().filter(|p| !p.is_waiting).count()
    }

    /// Request a transport from the media engine scoped to (room, peer)
    /// and record ownership on the peer.
    pub(crate) async fn create_transport(&mut self, frame: &RpcFrame) -> Result<Value, ScError> {
        let data: TransportData = parse_data(&frame.data)?;

        if !self.peers.contains_key(&frame.peer_id) {
            return Err(ScError::PeerNotFound(frame.peer_id.clone()));
        }

        let transport = self
            .collaborators
            .media
            .create_transport(&self.room_id, &frame.peer_id, data.producing)
            .await?;

        let reply = json!({ "id": transport.id, "parameters": transport.parameters });
        if let Some(peer) = self.peers.get_mut(&frame.peer_id) {
            peer.transports.insert(transport.id.clone(), transport);
        }
        Ok(reply)
    }

    /// Register the sender as owner of a new producer, then create a
    /// consumer for every other non-waiting peer before acknowledging.
    /// Per-recipient consumer failures are logged and skipped; the
    /// producer itself stands.
    pub(crate) async fn produce(&mut self, frame: &RpcFrame) -> Result<Value, ScError> {
        let data: ProduceData = parse_data(&frame.data)?;

        let peer = self
            .peers
            .get(&frame.peer_id)
            .ok_or_else(|| ScError::PeerNotFound(frame.peer_id.clone()))?;
        if !peer.transports.contains_key(&data.transport_id) {
            return Err(ScError::Validation(
                "Unknown transport for this peer".to_string(),
            ));
        }

        let producer = self
            .collaborators
            .media
            .create_producer(
                &self.room_id,
                &frame.peer_id,
                &data.transport_id,
                data.kind,
                data.rtp_parameters,
            )
            .await?;

        if let Some(owner) = self.peers.get_mut(&frame.peer_id) {
            owner
                .producers
                .insert(producer.id.clone(), producer.clone());
        }

        let consumer_peers: Vec<String> = self
            .peers
            .values()
            .filter(|p| !p.is_waiting && p.id != frame.peer_id)
            .map(|p| p.id.clone())
            .collect();
        for consumer_peer_id in consumer_peers {
            if let Err(error) = self
                .create_consumer(&consumer_peer_id, &frame.peer_id, &producer)
                .await
            {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    consumer_peer_id = %consumer_peer_id,
                    producer_id = %producer.id,
                    error = %error,
                    "Consumer creation failed, skipping recipient"
                );
            }
        }

        Ok(json!({ "id": producer.id, "kind": producer.kind }))
    }

    /// Pair a consumer peer with an existing producer and notify its
    /// connection of the new inbound media.
    pub(crate) async fn create_consumer(
        &mut self,
        consumer_peer_id: &str,
        producer_peer_id: &str,
        producer: &ProducerHandle,
    ) -> Result<(), ScError> {
        let consumer = self
            .collaborators
            .media
            .create_consumer(&self.room_id, consumer_peer_id, &producer.id)
            .await?;

        // The peer may have left while the engine call was in flight.
        let Some(peer) = self.peers.get_mut(consumer_peer_id) else {
            return Ok(());
        };

        let payload = json!({
            "peerId": producer_peer_id,
            "producerId": producer.id.clone(),
            "id": consumer.id.clone(),
            "kind": consumer.kind,
            "parameters": consumer.parameters.clone(),
        });
        let connection = peer.connection.clone();
        peer.consumers.push(consumer);

        let _ = connection.notify("newConsumer", payload).await;
        Ok(())
    }

    /// Relay a chat message. Requires a resolved (non-guest) identity;
    /// reported inside a success ack, matching the wire contract.
    pub(crate) async fn chat(&mut self, frame: &RpcFrame) -> Result<Value, ScError> {
        let data: ChatData = parse_data(&frame.data)?;
        if data.content.chars().count() > self.limits.chat_max_length {
            return Err(ScError::Validation("Chat message too long".to_string()));
        }

        let peer = self
            .peers
            .get(&frame.peer_id)
            .ok_or_else(|| ScError::PeerNotFound(frame.peer_id.clone()))?;
        if peer.identity.user_id.is_none() {
            return Ok(json!({ "done": false, "error": "Login required!" }));
        }

        let payload = json!({
            "peerId": frame.peer_id,
            "displayName": peer.identity.display_name,
            "avatarUrl": peer.identity.avatar_url,
            "content": data.content,
            "sentAt": chrono::Utc::now(),
        });
        self.broadcast_except(&frame.peer_id, "chat", payload).await;

        Ok(json!({ "done": true }))
    }

    /// Deliver a notification to every member's connection.
    /// Fire-and-forget: no per-recipient acknowledgment.
    pub(crate) async fn broadcast(&self, method: &str, data: Value) {
        for peer in self.peers.values() {
            let _ = peer.connection.notify(method, data.clone()).await;
        }
    }

    /// Deliver a notification to every member except one.
    pub(crate) async fn broadcast_except(&self, except_peer_id: &str, method: &str, data: Value) {
        for peer in self.peers.values() {
            if peer.id != except_peer_id {
                let _ = peer.connection.notify(method, data.clone()).await;
            }
        }
    }

    pub(crate) fn snapshot(&self, status: &str, viewers: usize) -> RoomStateSnapshot {
        RoomStateSnapshot {
            id: self.room_id.clone(),
            number_of_viewers: viewers,
            status: status.to_string(),
            thumbnail: self.thumbnail.clone(),
        }
    }

    /// Broadcast the room-state snapshot to the in-room audience and the
    /// status-subscriber audience.
    pub(crate) async fn broadcast_room_state(&self, status: &str, viewers: usize) {
        let snapshot = self.snapshot(status, viewers);
        let payload = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
        self.broadcast("roomStatusUpdated", payload).await;
        self.status_feed.publish(&snapshot);
    }
}

/// Room kind specialization, composed with [`RoomCore`].
pub(crate) enum RoomVariant {
    Meeting(MeetingState),
    Livestream(LivestreamState),
}

impl RoomVariant {
    fn from_record(record: &RoomRecord) -> Self {
        match record.kind {
            RoomKind::Meeting => RoomVariant::Meeting(MeetingState::from_record(record)),
            RoomKind::Livestream => RoomVariant::Livestream(LivestreamState::from_record(record)),
        }
    }

    fn handler_table(&self) -> HashMap<&'static str, RpcMethod> {
        match self {
            RoomVariant::Meeting(_) => MeetingState::handler_table(),
            RoomVariant::Livestream(_) => LivestreamState::handler_table(),
        }
    }

    async fn handle(
        &mut self,
        core: &mut RoomCore,
        method: RpcMethod,
        frame: &RpcFrame,
    ) -> Result<Value, ScError> {
        match self {
            RoomVariant::Meeting(meeting) => meeting.handle(core, method, frame).await,
            RoomVariant::Livestream(livestream) => livestream.handle(core, method, frame).await,
        }
    }

    async fn attach_peer(
        &mut self,
        core: &mut RoomCore,
        peer_id: String,
        identity: PeerIdentity,
        connection: ConnectionActorHandle,
    ) -> Result<(), ScError> {
        match self {
            RoomVariant::Meeting(meeting) => meeting.attach_peer(core, peer_id, identity, connection),
            RoomVariant::Livestream(livestream) => {
                livestream.attach_peer(core, peer_id, identity, connection)
            }
        }
    }

    async fn peer_disconnected(&mut self, core: &mut RoomCore, peer_id: &str) {
        match self {
            RoomVariant::Meeting(meeting) => meeting.peer_disconnected(core, peer_id).await,
            RoomVariant::Livestream(livestream) => {
                livestream.peer_disconnected(core, peer_id).await;
            }
        }
    }

    fn state_view(&self, core: &RoomCore) -> RoomStateView {
        match self {
            RoomVariant::Meeting(meeting) => meeting.state_view(core),
            RoomVariant::Livestream(livestream) => livestream.state_view(core),
        }
    }

    fn is_terminal(&self) -> bool {
        match self {
            RoomVariant::Meeting(meeting) => meeting.is_terminal(),
            RoomVariant::Livestream(livestream) => livestream.is_terminal(),
        }
    }
}

/// Handle to a `RoomActor`.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
    kind: RoomKind,
}

impl RoomActorHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Get the room kind.
    #[must_use]
    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    /// Dispatch one RPC frame; resolves to exactly one ack.
    pub async fn rpc(&self, frame: RpcFrame) -> Result<RpcAck, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Rpc {
                frame,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Attach a freshly authenticated connection as a waiting peer.
    pub async fn attach_peer(
        &self,
        peer_id: String,
        identity: PeerIdentity,
        connection: ConnectionActorHandle,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::AttachPeer {
                peer_id,
                identity,
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Report a dropped connection. Cleanup runs unconditionally.
    pub async fn peer_disconnected(&self, peer_id: String) -> Result<(), ScError> {
        self.sender
            .send(RoomMessage::PeerDisconnected { peer_id })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Get current room state.
    pub async fn get_state(&self) -> Result<RoomStateView, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for connection actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    core: RoomCore,
    variant: RoomVariant,
    /// Method-name registry built once at construction.
    handlers: HashMap<&'static str, RpcMethod>,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
}

impl RoomActor {
    /// Spawn a room actor for a persisted room record.
    ///
    /// Returns a handle and the task join handle.
    pub(crate) fn spawn(
        record: &RoomRecord,
        collaborators: Collaborators,
        status_feed: StatusFeed,
        limits: RoomLimits,
        cancel_token: CancellationToken,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let variant = RoomVariant::from_record(record);
        let actor = Self {
            core: RoomCore::new(record, collaborators, status_feed, limits),
            handlers: variant.handler_table(),
            variant,
            receiver,
            cancel_token: cancel_token.clone(),
        };

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id: record.id.clone(),
            kind: record.kind,
        };

        let task_handle = tokio::spawn(actor.run());

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.room", fields(room_id = %self.core.room_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.room",
            room_id = %self.core.room_id,
            kind = %self.core.kind.as_str(),
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.room",
                        room_id = %self.core.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            // Retirement policy: a room lives until it is
                            // terminal AND empty. An emptied non-terminal
                            // room stays resident (idle actor) so late
                            // joiners land in the same instance.
                            if self.variant.is_terminal() && self.core.peers.is_empty() {
                                info!(
                                    target: "sc.actor.room",
                                    room_id = %self.core.room_id,
                                    "Room terminal and empty, retiring"
                                );
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "sc.actor.room",
                                room_id = %self.core.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.core.status_feed.retire(&self.core.room_id);

        info!(
            target: "sc.actor.room",
            room_id = %self.core.room_id,
            peers = self.core.peers.len(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Rpc { frame, respond_to } => {
                let ack = self.dispatch(frame).await;
                let _ = respond_to.send(ack);
            }

            RoomMessage::AttachPeer {
                peer_id,
                identity,
                connection,
                respond_to,
            } => {
                let result = self
                    .variant
                    .attach_peer(&mut self.core, peer_id, identity, connection)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::PeerDisconnected { peer_id } => {
                self.variant.peer_disconnected(&mut self.core, &peer_id).await;
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.variant.state_view(&self.core));
            }
        }
    }

    /// Dispatch one frame through the handler table. Every handler fault
    /// becomes a structured error ack; the room and connection live on.
    async fn dispatch(&mut self, frame: RpcFrame) -> RpcAck {
        let Some(&method) = self.handlers.get(frame.method.as_str()) else {
            debug!(
                target: "sc.actor.room",
                room_id = %self.core.room_id,
                method = %frame.method,
                "Unknown RPC method"
            );
            return RpcAck::method_not_found(&frame.method);
        };

        match self.variant.handle(&mut self.core, method, &frame).await {
            Ok(result) => RpcAck::success(result),
            Err(error) => {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.core.room_id,
                    peer_id = %frame.peer_id,
                    method = %frame.method,
                    error = %error,
                    "RPC handler failed"
                );
                RpcAck::failure(&error)
            }
        }
    }
}
