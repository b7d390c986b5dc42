//! External collaborator interfaces.
//!
//! The session controller consumes, but does not implement, four
//! collaborators: persistence for room records, a notifier for outbound
//! notifications, a credential verifier, and the media engine that actually
//! moves packets. Only their coordination surfaces are defined here;
//! implementations are wired in by the embedding service (mocks live in
//! `sc-test-utils`).

use crate::errors::ScError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Room kind flag carried by connection requests and room records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Meeting,
    Livestream,
}

impl RoomKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RoomKind::Meeting => "meeting",
            RoomKind::Livestream => "livestream",
        }
    }
}

/// Persistence view of a room, looked up before admission.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: String,
    pub kind: RoomKind,
    /// Status string as stored ("coming_soon", "live", "end", "cancelled",
    /// "open", "closed").
    pub status: String,
    /// User id of the room creator; the creator holds host privilege.
    pub creator_id: Option<String>,
    pub thumbnail: Option<String>,
    /// Scheduled start time, if the room was scheduled in advance.
    pub start_time: Option<DateTime<Utc>>,
}

/// Status transition written back to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: String,
    /// Set when the room actually goes live.
    pub real_start_time: Option<DateTime<Utc>>,
}

/// Async room-record store. Failures surface as [`ScError::Upstream`] and
/// are not retried by this layer.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn find_room(&self, id: &str, kind: RoomKind) -> Result<Option<RoomRecord>, ScError>;

    async fn update_room_status(
        &self,
        id: &str,
        kind: RoomKind,
        update: StatusUpdate,
    ) -> Result<(), ScError>;
}

/// Resolved identity returned by the credential verifier.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Verifies a bearer credential. Invalid or expired credentials fail with
/// [`ScError::Unauthorized`].
#[async_trait]
pub trait AuthIssuer: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, ScError>;
}

/// Structured notification context handed to the notifier. Composition and
/// delivery are out of scope here.
#[derive(Debug, Clone)]
pub struct NotificationContext {
    pub recipients: Vec<String>,
    /// Template selector understood by the notifier.
    pub template: &'static str,
    pub subject: String,
    pub fields: Value,
}

/// Fire-and-forget notification sink. Delivery failures are logged by the
/// caller, never retried here.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, context: NotificationContext) -> Result<(), ScError>;
}

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Engine-issued transport handle, scoped to (room, peer).
#[derive(Debug, Clone)]
pub struct TransportHandle {
    pub id: String,
    /// Opaque connection parameters relayed to the client.
    pub parameters: Value,
}

/// Engine-issued producer handle.
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    pub id: String,
    pub kind: MediaKind,
    pub parameters: Value,
}

/// Engine-issued consumer handle.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub parameters: Value,
}

/// Coordination surface of the packet-forwarding engine. Internals
/// (congestion control, NAT traversal, codec negotiation) are out of scope.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_transport(
        &self,
        room_id: &str,
        peer_id: &str,
        producing: bool,
    ) -> Result<TransportHandle, ScError>;

    async fn create_producer(
        &self,
        room_id: &str,
        peer_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerHandle, ScError>;

    async fn create_consumer(
        &self,
        room_id: &str,
        consumer_peer_id: &str,
        producer_id: &str,
    ) -> Result<ConsumerHandle, ScError>;

    /// Releases every transport/producer/consumer the engine holds for a
    /// peer. Best-effort during teardown.
    async fn release_peer(&self, room_id: &str, peer_id: &str) -> Result<(), ScError>;
}

/// Shared collaborator handles injected into every room.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn PersistenceStore>,
    pub notifier: Arc<dyn Notifier>,
    pub media: Arc<dyn MediaEngine>,
}
