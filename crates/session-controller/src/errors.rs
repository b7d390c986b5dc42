//! Session Controller error types.
//!
//! Error types map to wire error codes for RPC acknowledgments. Internal
//! details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Session Controller error type.
///
/// Maps to RPC ack error codes:
/// - `Validation`: `VALIDATION`
/// - `RoomNotFound`, `PeerNotFound`: `NOT_FOUND`
/// - `Unauthorized`: `UNAUTHORIZED`
/// - `Conflict`: `CONFLICT`
/// - `Upstream`: `UPSTREAM_ERROR`
/// - `Capacity`: `CAPACITY_EXCEEDED`
/// - `Internal`: `INTERNAL_ERROR`
#[derive(Debug, Error)]
pub enum ScError {
    /// Malformed or out-of-range client input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown room, or a room in a terminal state treated as live.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Unknown peer within a room.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Role or ownership violation (non-host producing, wrong streamer
    /// stopping, bad credential).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid state transition (duplicate streamer, acting on an ended
    /// room, duplicate peer).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator call failed (persistence, media engine, notifier).
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Registry or room is full, or the process is draining.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Internal error (channel failures and other bugs).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the wire error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ScError::Validation(_) => "VALIDATION",
            ScError::RoomNotFound(_) | ScError::PeerNotFound(_) => "NOT_FOUND",
            ScError::Unauthorized(_) => "UNAUTHORIZED",
            ScError::Conflict(_) => "CONFLICT",
            ScError::Upstream(_) => "UPSTREAM_ERROR",
            ScError::Capacity(_) => "CAPACITY_EXCEEDED",
            ScError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe reason string (no internal fault detail).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::Validation(msg)
            | ScError::Unauthorized(msg)
            | ScError::Conflict(msg)
            | ScError::Capacity(msg) => msg.clone(),
            ScError::RoomNotFound(_) => "Room not found".to_string(),
            ScError::PeerNotFound(_) => "Peer not found".to_string(),
            ScError::Upstream(_) => "A backing service failed, please retry".to_string(),
            ScError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
