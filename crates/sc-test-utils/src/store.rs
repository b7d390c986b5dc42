//! In-memory room-record store.

use async_trait::async_trait;
use session_controller::errors::ScError;
use session_controller::upstream::{PersistenceStore, RoomKind, RoomRecord, StatusUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory [`PersistenceStore`] that records every status write.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, RoomRecord>>,
    updates: Mutex<Vec<(String, StatusUpdate)>>,
    fail_updates: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a room record.
    pub fn insert(&self, record: RoomRecord) {
        lock(&self.records).insert(record.id.clone(), record);
    }

    /// Get the current record for a room id.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<RoomRecord> {
        lock(&self.records).get(id).cloned()
    }

    /// All status updates written so far, in order, as (room id, update).
    #[must_use]
    pub fn updates(&self) -> Vec<(String, StatusUpdate)> {
        lock(&self.updates).clone()
    }

    /// Make subsequent status writes fail with an upstream error.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn find_room(&self, id: &str, kind: RoomKind) -> Result<Option<RoomRecord>, ScError> {
        Ok(lock(&self.records)
            .get(id)
            .filter(|record| record.kind == kind)
            .cloned())
    }

    async fn update_room_status(
        &self,
        id: &str,
        _kind: RoomKind,
        update: StatusUpdate,
    ) -> Result<(), ScError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ScError::Upstream("simulated store failure".to_string()));
        }

        if let Some(record) = lock(&self.records).get_mut(id) {
            record.status = update.status.clone();
        }
        lock(&self.updates).push((id.to_string(), update));
        Ok(())
    }
}
