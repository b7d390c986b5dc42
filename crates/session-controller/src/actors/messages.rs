//! Message and wire types for the actor hierarchy.
//!
//! The wire contract is one RPC frame in, exactly one acknowledgment out,
//! plus zero or more asynchronous `notification` event pushes. Actor
//! mailboxes carry these types together with oneshot reply channels.

use crate::errors::ScError;
use crate::upstream::{RoomKind, RoomRecord};

use super::connection::ConnectionActorHandle;
use super::room::RoomActorHandle;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Inbound RPC frame: `{method, peerId, data}`.
///
/// The gateway overwrites `peer_id` with the server-assigned id of the
/// sending connection before dispatch; clients cannot speak for each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFrame {
    pub method: String,
    #[serde(rename = "peerId", default)]
    pub peer_id: String,
    #[serde(default)]
    pub data: Value,
}

impl RpcFrame {
    #[must_use]
    pub fn new(method: impl Into<String>, peer_id: impl Into<String>, data: Value) -> Self {
        Self {
            method: method.into(),
            peer_id: peer_id.into(),
            data,
        }
    }
}

/// Structured error body inside a failed ack.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AckError {
    pub code: &'static str,
    pub reason: String,
}

/// Acknowledgment for one RPC frame: `{ok, result}` or `{ok:false, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

impl RpcAck {
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: &ScError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(AckError {
                code: error.code(),
                reason: error.client_message(),
            }),
        }
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(AckError {
                code: "METHOD_NOT_FOUND",
                reason: format!("Unknown method: {method}"),
            }),
        }
    }
}

/// Frame written to a client connection.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// The single acknowledgment for an inbound frame.
    Ack(RpcAck),
    /// Asynchronous event push: `{event:"notification", method, data}`.
    Event {
        event: &'static str,
        method: String,
        data: Value,
    },
}

impl OutboundFrame {
    #[must_use]
    pub fn notification(method: impl Into<String>, data: Value) -> Self {
        OutboundFrame::Event {
            event: "notification",
            method: method.into(),
            data,
        }
    }
}

/// Identity of a connected participant, resolved by the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct PeerIdentity {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "avatarUrl", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(rename = "isHost")]
    pub is_host: bool,
    #[serde(rename = "isGuest")]
    pub is_guest: bool,
}

impl PeerIdentity {
    /// Guest identity for a connection without a credential.
    #[must_use]
    pub fn guest() -> Self {
        Self {
            user_id: None,
            display_name: None,
            avatar_url: None,
            is_host: false,
            is_guest: true,
        }
    }
}

/// Room-state payload broadcast on lifecycle change, to the in-room
/// audience (`roomStatusUpdated`) and to the status-subscriber feed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoomStateSnapshot {
    pub id: String,
    #[serde(rename = "numberOfViewers")]
    pub number_of_viewers: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Streamer fields inside a join summary. All fields are null until a
/// streamer is assigned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamerSummary {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "avatarUrl")]
    pub avatar_url: Option<String>,
}

/// Snapshot returned by a successful `join`.
#[derive(Debug, Clone, Serialize)]
pub struct JoinSummary {
    pub peers: usize,
    pub status: String,
    pub streamer: StreamerSummary,
}

/// Messages handled by a `RoomActor`.
pub enum RoomMessage {
    /// Dispatch one RPC frame; always answered with exactly one ack.
    Rpc {
        frame: RpcFrame,
        respond_to: oneshot::Sender<RpcAck>,
    },
    /// Attach a freshly authenticated connection as a waiting peer.
    AttachPeer {
        peer_id: String,
        identity: PeerIdentity,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
    /// The peer's connection dropped; cleanup is unconditional.
    PeerDisconnected { peer_id: String },
    /// Observe current room state.
    GetState {
        respond_to: oneshot::Sender<RoomStateView>,
    },
}

/// Observable room state, for the registry and for tests.
#[derive(Debug, Clone)]
pub struct RoomStateView {
    pub room_id: String,
    pub kind: RoomKind,
    pub status: String,
    /// Kind-specific viewer accounting (`peersCount`).
    pub peers_count: usize,
    /// Raw member count, waiting peers included.
    pub member_count: usize,
    pub streamer_peer_id: Option<String>,
    pub is_terminal: bool,
}

/// Messages handled by the `RoomRegistryActor`.
pub enum RegistryMessage {
    /// Resolve the live room for a record, creating it if absent.
    /// Atomic: the registry actor is the single writer of the table.
    GetOrCreate {
        record: RoomRecord,
        respond_to: oneshot::Sender<Result<RoomActorHandle, ScError>>,
    },
    /// Drop a room and cancel its actor.
    Remove {
        room_id: String,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
    /// Observe registry state.
    Status {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
}

/// Observable registry state.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    pub room_count: usize,
    pub is_draining: bool,
}

/// Messages handled by a `ConnectionActor`.
pub enum ConnectionMessage {
    /// Deliver the ack for a frame this connection sent.
    DeliverAck { ack: RpcAck },
    /// Push an asynchronous notification event.
    Notify { method: String, data: Value },
    /// Close the connection with a reason.
    Close { reason: String },
}
