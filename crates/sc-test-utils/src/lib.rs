//! # SC Test Utilities
//!
//! Shared test utilities for the session controller.
//!
//! This crate provides in-memory collaborator implementations and test
//! fixtures for isolated controller testing without real infrastructure.
//!
//! ## Modules
//!
//! - `store` - In-memory room-record store with a status-update log
//! - `auth` - Static token-to-identity credential verifier
//! - `notifier` - Notification sink that records what it was asked to send
//! - `media` - Fake media engine issuing deterministic handles
//! - `fixtures` - Pre-configured room records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::TestWorld;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let world = TestWorld::new();
//!     world.store.insert(sc_test_utils::livestream_record("room-1", "user-host"));
//!     world.auth.register("token-host", "user-host", "Hosty");
//!
//!     // Spawn actors against world.collaborators()...
//! }
//! ```

pub mod auth;
pub mod fixtures;
pub mod media;
pub mod notifier;
pub mod store;

pub use auth::StaticAuth;
pub use fixtures::{livestream_record, meeting_record};
pub use media::FakeMediaEngine;
pub use notifier::RecordingNotifier;
pub use store::MemoryStore;

use session_controller::status::StatusFeed;
use session_controller::upstream::Collaborators;
use std::sync::Arc;

/// One shared set of collaborator mocks plus a status feed, enough to
/// spawn any actor in the hierarchy.
pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub auth: Arc<StaticAuth>,
    pub notifier: Arc<RecordingNotifier>,
    pub media: Arc<FakeMediaEngine>,
    pub status_feed: StatusFeed,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            auth: Arc::new(StaticAuth::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            media: Arc::new(FakeMediaEngine::new()),
            status_feed: StatusFeed::new(16),
        }
    }

    /// Collaborator handles pointing at this world's mocks.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            media: self.media.clone(),
        }
    }
}
