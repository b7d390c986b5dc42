//! Livestream room behavior.
//!
//! A livestream is a one-to-many room: at most one streamer produces media
//! and every other member only consumes. Lifecycle:
//!
//! ```text
//! coming_soon --> live --> end
//!      |
//!      v
//! cancelled (set by an external sweep, terminal)
//! ```
//!
//! The streamer assignment is checked and written inside a single handler
//! invocation, with no await between check and set, so two concurrent
//! `join(isStreamer)` frames can never both win.

use crate::errors::ScError;
use crate::upstream::{NotificationContext, ProducerHandle, RoomKind, RoomRecord, StatusUpdate};

use super::messages::{JoinSummary, PeerIdentity, RoomStateView, RpcFrame, StreamerSummary};
use super::room::{base_handler_table, parse_data, RoomCore, RpcMethod, TransportData};

use crate::actors::connection::ConnectionActorHandle;

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

/// Livestream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivestreamStatus {
    ComingSoon,
    Live,
    End,
    Cancelled,
}

impl LivestreamStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LivestreamStatus::ComingSoon => "coming_soon",
            LivestreamStatus::Live => "live",
            LivestreamStatus::End => "end",
            LivestreamStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status string. Unknown strings fall back to
    /// `ComingSoon`, the pre-live resting state.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "live" => LivestreamStatus::Live,
            "end" | "ended" => LivestreamStatus::End,
            "cancelled" | "canceled" => LivestreamStatus::Cancelled,
            _ => LivestreamStatus::ComingSoon,
        }
    }

    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, LivestreamStatus::End | LivestreamStatus::Cancelled)
    }
}

/// Kind-specific state for a livestream room.
pub(crate) struct LivestreamState {
    status: LivestreamStatus,
    /// Peer id of the active streamer. `Some` implies status is `Live`.
    streamer_peer_id: Option<String>,
}

impl LivestreamState {
    pub(crate) fn from_record(record: &RoomRecord) -> Self {
        Self {
            status: LivestreamStatus::parse(&record.status),
            streamer_peer_id: None,
        }
    }

    pub(crate) fn handler_table() -> HashMap<&'static str, RpcMethod> {
        let mut table = base_handler_table();
        table.insert("stopLivestream", RpcMethod::StopLivestream);
        table
    }

    pub(crate) async fn handle(
        &mut self,
        core: &mut RoomCore,
        method: RpcMethod,
        frame: &RpcFrame,
    ) -> Result<Value, ScError> {
        match method {
            RpcMethod::Join => self.join(core, frame).await,
            RpcMethod::CreateWebRtcTransport => self.create_transport(core, frame).await,
            RpcMethod::Produce => core.produce(frame).await,
            RpcMethod::Chat => core.chat(frame).await,
            RpcMethod::StopLivestream => self.stop(core, &frame.peer_id).await,
        }
    }

    /// Attachment gate: an ended or cancelled livestream is indistinguishable
    /// from an absent one.
    pub(crate) fn attach_peer(
        &mut self,
        core: &mut RoomCore,
        peer_id: String,
        identity: PeerIdentity,
        connection: ConnectionActorHandle,
    ) -> Result<(), ScError> {
        if self.status.is_terminal() {
            return Err(ScError::RoomNotFound(core.room_id.clone()));
        }
        core.attach_peer(peer_id, identity, connection)
    }

    /// Admit a waiting peer, routed by the `isStreamer` flag. A failed
    /// admission puts the peer back in the waiting state.
    async fn join(&mut self, core: &mut RoomCore, frame: &RpcFrame) -> Result<Value, ScError> {
        // The ack reports the audience the requester found; a joiner is
        // not part of its own count.
        let peers_at_join = self.peers_count(core);
        let data = core.prepare_join(frame)?;
        let peer_id = frame.peer_id.clone();

        let admission = if data.is_streamer {
            self.setup_streamer(core, &peer_id).await
        } else {
            self.admit_viewer(core, &peer_id).await
        };
        if let Err(error) = admission {
            core.mark_waiting(&peer_id);
            return Err(error);
        }

        let summary = self.join_summary(core, peers_at_join);
        Ok(serde_json::to_value(summary).unwrap_or(Value::Null))
    }

    /// Claim the streamer slot and take the room live.
    ///
    /// The slot check and assignment are synchronous; persistence runs
    /// after, and a persistence failure rolls the assignment back so the
    /// slot is claimable again.
    async fn setup_streamer(&mut self, core: &mut RoomCore, peer_id: &str) -> Result<(), ScError> {
        if self.status.is_terminal() {
            return Err(ScError::RoomNotFound(core.room_id.clone()));
        }

        let is_host = core
            .peers
            .get(peer_id)
            .is_some_and(|p| p.identity.is_host);
        if !is_host {
            return Err(ScError::Unauthorized(
                "Only the room creator can stream".to_string(),
            ));
        }
        if self.streamer_peer_id.is_some() {
            return Err(ScError::Conflict(
                "A streamer is already connected".to_string(),
            ));
        }
        if self.status != LivestreamStatus::ComingSoon {
            return Err(ScError::Conflict(
                "The livestream is not awaiting a streamer".to_string(),
            ));
        }

        self.streamer_peer_id = Some(peer_id.to_string());
        self.status = LivestreamStatus::Live;
        let real_start_time = Utc::now();

        if let Err(error) = core
            .collaborators
            .store
            .update_room_status(
                &core.room_id,
                RoomKind::Livestream,
                StatusUpdate {
                    status: LivestreamStatus::Live.as_str().to_string(),
                    real_start_time: Some(real_start_time),
                },
            )
            .await
        {
            self.streamer_peer_id = None;
            self.status = LivestreamStatus::ComingSoon;
            return Err(error);
        }

        // Audience notification is fire-and-forget; going live never fails
        // because a notification did.
        let context = NotificationContext {
            recipients: Vec::new(),
            template: "stream-started",
            subject: "A livestream you follow just started".to_string(),
            fields: json!({ "roomId": core.room_id }),
        };
        if let Err(error) = core.collaborators.notifier.notify(context).await {
            warn!(
                target: "sc.actor.livestream",
                room_id = %core.room_id,
                error = %error,
                "Stream-started notification failed"
            );
        }

        info!(
            target: "sc.actor.livestream",
            room_id = %core.room_id,
            streamer_peer_id = %peer_id,
            "Livestream went live"
        );
        self.broadcast_state(core).await;
        Ok(())
    }

    /// Admit a viewer. An already-live stream hands the viewer a consumer
    /// for every streamer producer before the join is acknowledged, so the
    /// client never observes a live room with no inbound media. A failed
    /// consumer is logged and skipped; the admission stands.
    async fn admit_viewer(&mut self, core: &mut RoomCore, peer_id: &str) -> Result<(), ScError> {
        if self.status.is_terminal() {
            return Err(ScError::RoomNotFound(core.room_id.clone()));
        }

        if let Some(streamer_id) = self.streamer_peer_id.clone() {
            let producers: Vec<ProducerHandle> = core
                .peers
                .get(&streamer_id)
                .map(|p| p.producers.values().cloned().collect())
                .unwrap_or_default();
            for producer in &producers {
                if let Err(error) = core.create_consumer(peer_id, &streamer_id, producer).await {
                    warn!(
                        target: "sc.actor.livestream",
                        room_id = %core.room_id,
                        peer_id = %peer_id,
                        producer_id = %producer.id,
                        error = %error,
                        "Consumer creation failed, skipping producer"
                    );
                }
            }
        }

        self.broadcast_state(core).await;
        Ok(())
    }

    /// Producing transports are opened by the host while the room still
    /// awaits its streamer; once the slot is claimed or the stream has
    /// ended, no further producing transports are handed out.
    async fn create_transport(
        &mut self,
        core: &mut RoomCore,
        frame: &RpcFrame,
    ) -> Result<Value, ScError> {
        let data: TransportData = parse_data(&frame.data)?;
        if data.producing {
            let is_host = core
                .peers
                .get(&frame.peer_id)
                .is_some_and(|p| p.identity.is_host);
            if !is_host {
                return Err(ScError::Unauthorized(
                    "Only the room creator can produce media".to_string(),
                ));
            }
            if self.streamer_peer_id.is_some() {
                return Err(ScError::Conflict(
                    "A streamer is already connected".to_string(),
                ));
            }
            if matches!(self.status, LivestreamStatus::Live | LivestreamStatus::End) {
                return Err(ScError::Conflict(
                    "The livestream is not accepting producers".to_string(),
                ));
            }
        }
        core.create_transport(frame).await
    }

    /// Explicit stop request. Only the streamer may stop its own stream.
    /// The stopper's connection stays open: its ack still has to travel
    /// through it. The session tears the connection down afterwards.
    async fn stop(&mut self, core: &mut RoomCore, peer_id: &str) -> Result<Value, ScError> {
        match self.streamer_peer_id.as_deref() {
            Some(streamer_id) if streamer_id == peer_id => {
                self.finish_stream(core, false).await;
                Ok(json!({ "done": true }))
            }
            Some(_) => Err(ScError::Unauthorized(
                "Only the streamer can stop the stream".to_string(),
            )),
            None => Err(ScError::Conflict("No active stream to stop".to_string())),
        }
    }

    /// End the stream. Shared by the explicit stop RPC and the
    /// streamer-disconnect path; taking the streamer slot first makes a
    /// second invocation a no-op, so `endstream` goes out exactly once.
    ///
    /// Teardown is not abandoned on downstream failure: a failed status
    /// write is logged and the broadcasts still go out.
    async fn finish_stream(&mut self, core: &mut RoomCore, cancel_streamer_connection: bool) {
        let Some(streamer_id) = self.streamer_peer_id.take() else {
            return;
        };
        self.status = LivestreamStatus::End;

        if let Some(peer) = core.remove_peer(&streamer_id).await {
            if cancel_streamer_connection {
                peer.connection.cancel();
            }
        }

        if let Err(error) = core
            .collaborators
            .store
            .update_room_status(
                &core.room_id,
                RoomKind::Livestream,
                StatusUpdate {
                    status: LivestreamStatus::End.as_str().to_string(),
                    real_start_time: None,
                },
            )
            .await
        {
            warn!(
                target: "sc.actor.livestream",
                room_id = %core.room_id,
                error = %error,
                "Status write failed while ending stream, continuing teardown"
            );
        }

        info!(
            target: "sc.actor.livestream",
            room_id = %core.room_id,
            streamer_peer_id = %streamer_id,
            remaining_peers = core.peers.len(),
            "Livestream ended"
        );
        self.broadcast_state(core).await;
        core.broadcast("endstream", json!({})).await;
    }

    /// Connection loss cleanup. A lost streamer ends the stream; a lost
    /// viewer just leaves. Runs unconditionally, a second report for the
    /// same peer is a no-op.
    pub(crate) async fn peer_disconnected(&mut self, core: &mut RoomCore, peer_id: &str) {
        if self.streamer_peer_id.as_deref() == Some(peer_id) {
            info!(
                target: "sc.actor.livestream",
                room_id = %core.room_id,
                streamer_peer_id = %peer_id,
                "Streamer disconnected, ending stream"
            );
            self.finish_stream(core, true).await;
        } else if let Some(peer) = core.remove_peer(peer_id).await {
            peer.connection.cancel();
            self.broadcast_state(core).await;
        }
    }

    /// Viewer count: non-waiting members, minus the streamer when present.
    pub(crate) fn peers_count(&self, core: &RoomCore) -> usize {
        let joined = core.joined_peers();
        if self.streamer_peer_id.is_some() {
            joined.saturating_sub(1)
        } else {
            joined
        }
    }

    fn join_summary(&self, core: &RoomCore, peers: usize) -> JoinSummary {
        let streamer = self
            .streamer_peer_id
            .as_ref()
            .and_then(|id| core.peers.get(id))
            .map(|peer| StreamerSummary {
                display_name: peer.identity.display_name.clone(),
                avatar_url: peer.identity.avatar_url.clone(),
            })
            .unwrap_or_default();

        JoinSummary {
            peers,
            status: self.status.as_str().to_string(),
            streamer,
        }
    }

    async fn broadcast_state(&self, core: &RoomCore) {
        core.broadcast_room_state(self.status.as_str(), self.peers_count(core))
            .await;
    }

    pub(crate) fn state_view(&self, core: &RoomCore) -> RoomStateView {
        RoomStateView {
            room_id: core.room_id.clone(),
            kind: RoomKind::Livestream,
            status: self.status.as_str().to_string(),
            peers_count: self.peers_count(core),
            member_count: core.peers.len(),
            streamer_peer_id: self.streamer_peer_id.clone(),
            is_terminal: self.status.is_terminal(),
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
