//! Session Controller Library
//!
//! This library provides the core functionality of the Castline session
//! controller - a stateful signaling control plane responsible for:
//!
//! - Real-time room coordination and peer state management
//! - Livestream lifecycle (coming_soon -> live -> end, cancelled)
//! - Meeting rooms where every member produces and consumes
//! - RPC dispatch with a one-frame, one-ack wire contract
//! - Room-state fan-out to members and to status subscribers
//!
//! # Architecture
//!
//! The controller uses an actor model hierarchy:
//!
//! ```text
//! RoomRegistryActor (singleton per instance)
//! └── supervises N RoomActors
//!     └── RoomActor (one per active room)
//!         └── supervises N ConnectionActors (one per client connection)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer per room**: every room mutation runs on the room's
//!   actor loop, so invariants like "at most one streamer" hold without
//!   locks
//! - **Identity at the door**: credentials are verified once per
//!   connection by the gateway; frames carry no credentials and host
//!   privilege is derived from the room record, never client-asserted
//! - **Errors stay in-band**: a failing handler produces a structured
//!   error ack, it never tears down the connection or the room
//! - **Collaborators are traits**: persistence, credential verification,
//!   notifications and the media engine are injected seams; mocks live in
//!   `sc-test-utils`
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with appropriate error codes
//! - [`gateway`] - Connection admission and frame pumping
//! - [`status`] - Status-subscriber feed
//! - [`upstream`] - External collaborator interfaces

pub mod actors;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod status;
pub mod upstream;
