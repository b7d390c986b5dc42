//! Fake media engine.

use async_trait::async_trait;
use serde_json::json;
use session_controller::errors::ScError;
use session_controller::upstream::{
    ConsumerHandle, MediaEngine, MediaKind, ProducerHandle, TransportHandle,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A consumer pairing the fake engine was asked to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerPairing {
    pub room_id: String,
    pub consumer_peer_id: String,
    pub producer_id: String,
}

/// [`MediaEngine`] issuing deterministic handles and recording calls.
#[derive(Default)]
pub struct FakeMediaEngine {
    next_id: AtomicU64,
    pairings: Mutex<Vec<ConsumerPairing>>,
    released: Mutex<Vec<(String, String)>>,
    fail_consumers: AtomicBool,
}

impl FakeMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    /// Consumer pairings created so far, in order.
    #[must_use]
    pub fn pairings(&self) -> Vec<ConsumerPairing> {
        lock(&self.pairings).clone()
    }

    /// Peers released so far, as (room id, peer id).
    #[must_use]
    pub fn released(&self) -> Vec<(String, String)> {
        lock(&self.released).clone()
    }

    /// Make subsequent consumer creation fail with an upstream error.
    pub fn set_fail_consumers(&self, fail: bool) {
        self.fail_consumers.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaEngine for FakeMediaEngine {
    async fn create_transport(
        &self,
        _room_id: &str,
        _peer_id: &str,
        _producing: bool,
    ) -> Result<TransportHandle, ScError> {
        Ok(TransportHandle {
            id: self.next_id("transport"),
            parameters: json!({ "iceParameters": {}, "dtlsParameters": {} }),
        })
    }

    async fn create_producer(
        &self,
        _room_id: &str,
        _peer_id: &str,
        _transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<ProducerHandle, ScError> {
        Ok(ProducerHandle {
            id: self.next_id("producer"),
            kind,
            parameters: rtp_parameters,
        })
    }

    async fn create_consumer(
        &self,
        room_id: &str,
        consumer_peer_id: &str,
        producer_id: &str,
    ) -> Result<ConsumerHandle, ScError> {
        if self.fail_consumers.load(Ordering::SeqCst) {
            return Err(ScError::Upstream(
                "simulated media engine failure".to_string(),
            ));
        }

        lock(&self.pairings).push(ConsumerPairing {
            room_id: room_id.to_string(),
            consumer_peer_id: consumer_peer_id.to_string(),
            producer_id: producer_id.to_string(),
        });

        Ok(ConsumerHandle {
            id: self.next_id("consumer"),
            producer_id: producer_id.to_string(),
            kind: MediaKind::Video,
            parameters: json!({ "rtpParameters": {} }),
        })
    }

    async fn release_peer(&self, room_id: &str, peer_id: &str) -> Result<(), ScError> {
        lock(&self.released).push((room_id.to_string(), peer_id.to_string()));
        Ok(())
    }
}
