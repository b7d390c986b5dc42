//! Actor model implementation.
//!
//! Three actor layers, supervised top-down via cancellation token trees:
//!
//! ```text
//! RoomRegistryActor (singleton per instance)
//! └── supervises N RoomActors
//!     └── RoomActor (one per active room, meeting or livestream)
//!         ├── owns all room state
//!         └── supervises N ConnectionActors
//!             └── ConnectionActor (one per client connection)
//! ```
//!
//! Every mutation of a room flows through its `RoomActor` mailbox, so room
//! invariants hold without locks; the registry mailbox plays the same role
//! for the room table itself.

pub mod connection;
pub mod livestream;
pub mod meeting;
pub mod messages;
pub mod registry;
pub mod room;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use livestream::LivestreamStatus;
pub use meeting::MeetingStatus;
pub use messages::{
    JoinSummary, OutboundFrame, PeerIdentity, RegistryStatus, RoomStateSnapshot, RoomStateView,
    RpcAck, RpcFrame, StreamerSummary,
};
pub use registry::{RoomFactory, RoomRegistryActor, RoomRegistryHandle};
pub use room::{RoomActorHandle, RoomLimits};
