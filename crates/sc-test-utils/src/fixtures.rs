//! Pre-configured room records.

use session_controller::upstream::{RoomKind, RoomRecord};

/// A livestream record awaiting its streamer.
#[must_use]
pub fn livestream_record(id: &str, creator_id: &str) -> RoomRecord {
    RoomRecord {
        id: id.to_string(),
        kind: RoomKind::Livestream,
        status: "coming_soon".to_string(),
        creator_id: Some(creator_id.to_string()),
        thumbnail: Some(format!("https://cdn.castline.test/{id}.jpg")),
        start_time: None,
    }
}

/// An open meeting record.
#[must_use]
pub fn meeting_record(id: &str, creator_id: &str) -> RoomRecord {
    RoomRecord {
        id: id.to_string(),
        kind: RoomKind::Meeting,
        status: "open".to_string(),
        creator_id: Some(creator_id.to_string()),
        thumbnail: None,
        start_time: None,
    }
}
