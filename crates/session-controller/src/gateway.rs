//! Connection gateway.
//!
//! The gateway sits between the wire and the actor hierarchy. For each new
//! connection it verifies the room exists and is joinable, resolves the
//! caller's identity (credential or guest), spawns the connection actor and
//! attaches the peer to its room.
//!
//! Identity is resolved once, at connection time; RPC frames carry no
//! credentials and the gateway stamps each frame with the server-assigned
//! peer id before dispatch.

use crate::actors::connection::{ConnectionActor, ConnectionActorHandle};
use crate::actors::livestream::LivestreamStatus;
use crate::actors::meeting::MeetingStatus;
use crate::actors::messages::{OutboundFrame, PeerIdentity, RpcAck, RpcFrame};
use crate::actors::registry::RoomRegistryHandle;
use crate::actors::room::RoomActorHandle;
use crate::errors::ScError;
use crate::upstream::{AuthIssuer, PersistenceStore, RoomKind, RoomRecord};

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connection request parameters, taken from the connection URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    /// Bearer credential. Absent for guest connections.
    #[serde(default)]
    pub access_token: Option<String>,
    pub room_id: String,
    pub kind: RoomKind,
}

/// Admission gateway for new connections.
#[derive(Clone)]
pub struct ConnectionGateway {
    auth: Arc<dyn AuthIssuer>,
    store: Arc<dyn PersistenceStore>,
    registry: RoomRegistryHandle,
}

impl ConnectionGateway {
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthIssuer>,
        store: Arc<dyn PersistenceStore>,
        registry: RoomRegistryHandle,
    ) -> Self {
        Self {
            auth,
            store,
            registry,
        }
    }

    /// Verify a connection request: the room must exist and be joinable,
    /// and a presented credential must verify. No credential means guest.
    ///
    /// Host privilege is derived here, by matching the verified user id
    /// against the room creator; it is never client-asserted.
    pub async fn verify_client(
        &self,
        query: &ConnectQuery,
    ) -> Result<(RoomRecord, PeerIdentity), ScError> {
        let record = self
            .store
            .find_room(&query.room_id, query.kind)
            .await?
            .ok_or_else(|| ScError::RoomNotFound(query.room_id.clone()))?;

        let joinable = match record.kind {
            RoomKind::Livestream => !LivestreamStatus::parse(&record.status).is_terminal(),
            RoomKind::Meeting => MeetingStatus::parse(&record.status) == MeetingStatus::Open,
        };
        if !joinable {
            // A finished room is indistinguishable from an absent one.
            return Err(ScError::RoomNotFound(query.room_id.clone()));
        }

        let identity = match &query.access_token {
            None => PeerIdentity::guest(),
            Some(token) => {
                let verified = self.auth.verify(token).await?;
                let is_host = record.creator_id.as_deref() == Some(verified.user_id.as_str());
                PeerIdentity {
                    user_id: Some(verified.user_id),
                    display_name: Some(verified.display_name),
                    avatar_url: verified.avatar_url,
                    is_host,
                    is_guest: false,
                }
            }
        };

        Ok((record, identity))
    }

    /// Admit a connection: verify, resolve the room actor, spawn the
    /// connection actor and attach the peer in the waiting state.
    ///
    /// `outbound` is the write half of the wire; acks and notification
    /// pushes for this connection flow through it.
    pub async fn accept(
        &self,
        query: ConnectQuery,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<ConnectionSession, ScError> {
        let (record, identity) = self.verify_client(&query).await?;

        let room = self.registry.get_or_create(record).await?;

        let peer_id = Uuid::new_v4().to_string();
        let connection_id = Uuid::new_v4().to_string();
        let (connection, _task) = ConnectionActor::spawn(
            connection_id,
            peer_id.clone(),
            room.room_id().to_string(),
            room.child_token(),
            outbound,
        );

        if let Err(error) = room
            .attach_peer(peer_id.clone(), identity.clone(), connection.clone())
            .await
        {
            connection.cancel();
            return Err(error);
        }

        info!(
            target: "sc.gateway",
            room_id = %room.room_id(),
            peer_id = %peer_id,
            is_host = identity.is_host,
            is_guest = identity.is_guest,
            "Connection admitted"
        );

        Ok(ConnectionSession {
            peer_id,
            room,
            connection,
        })
    }
}

/// One admitted connection, bound to its peer id and room.
pub struct ConnectionSession {
    peer_id: String,
    room: RoomActorHandle,
    connection: ConnectionActorHandle,
}

impl ConnectionSession {
    /// Get the server-assigned peer id.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Get the room this session is attached to.
    #[must_use]
    pub fn room(&self) -> &RoomActorHandle {
        &self.room
    }

    /// Get this session's connection actor handle.
    #[must_use]
    pub fn connection(&self) -> &ConnectionActorHandle {
        &self.connection
    }

    /// Dispatch one frame to the room. The frame's peer id is overwritten
    /// with this session's id; clients cannot speak for each other.
    pub async fn dispatch(&self, mut frame: RpcFrame) -> Result<RpcAck, ScError> {
        frame.peer_id = self.peer_id.clone();
        self.room.rpc(frame).await
    }

    /// Pump inbound frames until the wire closes, then run disconnect
    /// cleanup. Each frame gets exactly one ack on the outbound wire.
    pub async fn run(self, mut frames: mpsc::Receiver<RpcFrame>) {
        while let Some(frame) = frames.recv().await {
            let method = frame.method.clone();
            match self.dispatch(frame).await {
                Ok(ack) => {
                    if self.connection.deliver_ack(ack).await.is_err() {
                        debug!(
                            target: "sc.gateway",
                            peer_id = %self.peer_id,
                            "Connection actor gone, stopping frame pump"
                        );
                        break;
                    }
                }
                Err(error) => {
                    // The room actor is gone; nothing left to serve.
                    warn!(
                        target: "sc.gateway",
                        peer_id = %self.peer_id,
                        method = %method,
                        error = %error,
                        "Room unreachable, stopping frame pump"
                    );
                    break;
                }
            }
        }

        self.disconnect().await;
    }

    /// Disconnect cleanup. Reported to the room unconditionally; the room
    /// tolerates cleanup failures and a repeated report is a no-op.
    pub async fn disconnect(&self) {
        if let Err(error) = self.room.peer_disconnected(self.peer_id.clone()).await {
            debug!(
                target: "sc.gateway",
                peer_id = %self.peer_id,
                error = %error,
                "Room already gone during disconnect"
            );
        }
        self.connection.cancel();
    }
}
