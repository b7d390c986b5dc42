//! Status-subscriber feed.
//!
//! Livestream rooms publish lifecycle snapshots to a second audience that
//! never joins the room (listing/dashboard viewers). Each room id owns a
//! lazily created broadcast channel; publishing is fire-and-forget and a
//! publish with no subscribers is not an error.

use crate::actors::messages::RoomStateSnapshot;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Per-room-id fan-out of [`RoomStateSnapshot`] to status subscribers.
#[derive(Clone)]
pub struct StatusFeed {
    capacity: usize,
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<RoomStateSnapshot>>>>,
}

impl StatusFeed {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to lifecycle snapshots for one room id.
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<RoomStateSnapshot> {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish a snapshot to the room's status subscribers.
    pub fn publish(&self, snapshot: &RoomStateSnapshot) {
        let channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = channels.get(&snapshot.id) {
            // Err only means nobody is listening right now.
            let _ = sender.send(snapshot.clone());
        } else {
            debug!(
                target: "sc.status",
                room_id = %snapshot.id,
                "Snapshot published with no status subscribers"
            );
        }
    }

    /// Drop the channel for a retired room.
    pub fn retire(&self, room_id: &str) {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.remove(room_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn snapshot(id: &str, viewers: usize, status: &str) -> RoomStateSnapshot {
        RoomStateSnapshot {
            id: id.to_string(),
            number_of_viewers: viewers,
            status: status.to_string(),
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_snapshot() {
        let feed = StatusFeed::new(8);
        let mut rx = feed.subscribe("room-1");

        feed.publish(&snapshot("room-1", 2, "live"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.number_of_viewers, 2);
        assert_eq!(received.status, "live");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let feed = StatusFeed::new(8);
        feed.publish(&snapshot("room-ghost", 0, "coming_soon"));
    }

    #[tokio::test]
    async fn test_subscribers_are_scoped_by_room_id() {
        let feed = StatusFeed::new(8);
        let mut rx_a = feed.subscribe("room-a");
        let _rx_b = feed.subscribe("room-b");

        feed.publish(&snapshot("room-a", 1, "live"));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.id, "room-a");
        // room-b saw nothing.
        let mut rx_b2 = feed.subscribe("room-b");
        assert!(matches!(
            rx_b2.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_retire_drops_channel() {
        let feed = StatusFeed::new(8);
        let mut rx = feed.subscribe("room-1");
        feed.retire("room-1");
        feed.publish(&snapshot("room-1", 0, "end"));

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }
}
