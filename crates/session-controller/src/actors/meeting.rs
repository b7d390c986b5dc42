//! Meeting room behavior.
//!
//! A meeting is a many-to-many room: every admitted member may produce and
//! consume. There is no streamer slot and no staged lifecycle, a meeting is
//! open until it is closed.

use crate::errors::ScError;
use crate::upstream::{RoomKind, RoomRecord};

use super::messages::{JoinSummary, PeerIdentity, RoomStateView, RpcFrame, StreamerSummary};
use super::room::{base_handler_table, RoomCore, RpcMethod};

use crate::actors::connection::ConnectionActorHandle;

use serde_json::Value;
use std::collections::HashMap;

/// Meeting lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingStatus {
    Open,
    Closed,
}

impl MeetingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingStatus::Open => "open",
            MeetingStatus::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "closed" | "ended" | "end" => MeetingStatus::Closed,
            _ => MeetingStatus::Open,
        }
    }
}

/// Kind-specific state for a meeting room.
pub(crate) struct MeetingState {
    status: MeetingStatus,
}

impl MeetingState {
    pub(crate) fn from_record(record: &RoomRecord) -> Self {
        Self {
            status: MeetingStatus::parse(&record.status),
        }
    }

    /// Meetings expose exactly the shared method set.
    pub(crate) fn handler_table() -> HashMap<&'static str, RpcMethod> {
        base_handler_table()
    }

    pub(crate) async fn handle(
        &mut self,
        core: &mut RoomCore,
        method: RpcMethod,
        frame: &RpcFrame,
    ) -> Result<Value, ScError> {
        match method {
            RpcMethod::Join => self.join(core, frame).await,
            RpcMethod::CreateWebRtcTransport => core.create_transport(frame).await,
            RpcMethod::Produce => core.produce(frame).await,
            RpcMethod::Chat => core.chat(frame).await,
            // Not in the meeting handler table; unreachable via dispatch.
            RpcMethod::StopLivestream => Err(ScError::Validation(
                "Unsupported method for this room kind".to_string(),
            )),
        }
    }

    pub(crate) fn attach_peer(
        &mut self,
        core: &mut RoomCore,
        peer_id: String,
        identity: PeerIdentity,
        connection: ConnectionActorHandle,
    ) -> Result<(), ScError> {
        if self.status == MeetingStatus::Closed {
            return Err(ScError::RoomNotFound(core.room_id.clone()));
        }
        core.attach_peer(peer_id, identity, connection)
    }

    async fn join(&mut self, core: &mut RoomCore, frame: &RpcFrame) -> Result<Value, ScError> {
        if self.status == MeetingStatus::Closed {
            return Err(ScError::RoomNotFound(core.room_id.clone()));
        }
        // The ack reports the membership the requester found; a joiner is
        // not part of its own count.
        let peers_at_join = core.joined_peers();
        core.prepare_join(frame)?;
        self.broadcast_state(core).await;

        let summary = JoinSummary {
            peers: peers_at_join,
            status: self.status.as_str().to_string(),
            streamer: StreamerSummary::default(),
        };
        Ok(serde_json::to_value(summary).unwrap_or(Value::Null))
    }

    pub(crate) async fn peer_disconnected(&mut self, core: &mut RoomCore, peer_id: &str) {
        if let Some(peer) = core.remove_peer(peer_id).await {
            peer.connection.cancel();
            self.broadcast_state(core).await;
        }
    }

    async fn broadcast_state(&self, core: &RoomCore) {
        core.broadcast_room_state(self.status.as_str(), core.joined_peers())
            .await;
    }

    pub(crate) fn state_view(&self, core: &RoomCore) -> RoomStateView {
        RoomStateView {
            room_id: core.room_id.clone(),
            kind: RoomKind::Meeting,
            status: self.status.as_str().to_string(),
            peers_count: core.joined_peers(),
            member_count: core.peers.len(),
            streamer_peer_id: None,
            is_terminal: self.status == MeetingStatus::Closed,
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.status == MeetingStatus::Closed
    }
}
