//! `RoomRegistryActor` - owns the room table for one controller instance.
//!
//! The registry is the single writer of the room-id to room-actor table:
//! every lookup-or-create goes through its mailbox, so two connections
//! racing for the same room id always converge on one `RoomActor`.

use crate::errors::ScError;
use crate::status::StatusFeed;
use crate::upstream::{Collaborators, RoomRecord};

use super::messages::{RegistryMessage, RegistryStatus};
use super::room::{RoomActor, RoomActorHandle, RoomLimits};

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 100;

/// Interval between sweeps for retired room tasks.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period for room tasks to exit during shutdown.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Spawns room actors with shared collaborators and limits.
#[derive(Clone)]
pub struct RoomFactory {
    collaborators: Collaborators,
    status_feed: StatusFeed,
    limits: RoomLimits,
}

impl RoomFactory {
    #[must_use]
    pub fn new(collaborators: Collaborators, status_feed: StatusFeed, limits: RoomLimits) -> Self {
        Self {
            collaborators,
            status_feed,
            limits,
        }
    }

    /// Spawn a room actor for a persisted record.
    fn spawn_room(
        &self,
        record: &RoomRecord,
        cancel_token: CancellationToken,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        RoomActor::spawn(
            record,
            self.collaborators.clone(),
            self.status_feed.clone(),
            self.limits,
            cancel_token,
        )
    }
}

/// Handle to the `RoomRegistryActor`.
#[derive(Clone)]
pub struct RoomRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryHandle {
    /// Resolve the live room actor for a record, creating it if absent.
    pub async fn get_or_create(&self, record: RoomRecord) -> Result<RoomActorHandle, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetOrCreate {
                record,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Drop a room from the table and cancel its actor.
    pub async fn remove(&self, room_id: String) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Remove {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Observe registry state.
    pub async fn status(&self) -> Result<RegistryStatus, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Status { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the registry and every room under it.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the registry is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A room actor under registry management.
struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
}

/// The `RoomRegistryActor` implementation.
pub struct RoomRegistryActor {
    factory: RoomFactory,
    rooms: HashMap<String, ManagedRoom>,
    receiver: mpsc::Receiver<RegistryMessage>,
    cancel_token: CancellationToken,
    /// Cleared while draining; no new rooms are admitted.
    accepting_new: bool,
    max_rooms: usize,
}

impl RoomRegistryActor {
    /// Spawn the registry actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        factory: RoomFactory,
        max_rooms: usize,
        cancel_token: CancellationToken,
    ) -> (RoomRegistryHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);

        let actor = Self {
            factory,
            rooms: HashMap::new(),
            receiver,
            cancel_token: cancel_token.clone(),
            accepting_new: true,
            max_rooms,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomRegistryHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.registry")]
    async fn run(mut self) {
        info!(
            target: "sc.actor.registry",
            max_rooms = self.max_rooms,
            "RoomRegistryActor started"
        );

        let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.registry",
                        "RoomRegistryActor received cancellation signal"
                    );
                    break;
                }

                _ = health_check.tick() => {
                    self.sweep_retired_rooms();
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(
                                target: "sc.actor.registry",
                                "RoomRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.graceful_shutdown().await;

        info!(target: "sc.actor.registry", "RoomRegistryActor stopped");
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::GetOrCreate { record, respond_to } => {
                let result = self.get_or_create(&record);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Remove {
                room_id,
                respond_to,
            } => {
                let result = self.remove(&room_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Status { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    room_count: self.rooms.len(),
                    is_draining: !self.accepting_new,
                });
            }
        }
    }

    /// Resolve or create the room for a record. Runs on the actor loop, so
    /// concurrent requests for the same id serialize here and get the same
    /// actor back.
    fn get_or_create(&mut self, record: &RoomRecord) -> Result<RoomActorHandle, ScError> {
        // A retired actor may still occupy the slot until the next sweep.
        if let Some(managed) = self.rooms.get(&record.id) {
            if managed.task_handle.is_finished() {
                debug!(
                    target: "sc.actor.registry",
                    room_id = %record.id,
                    "Dropping retired room before re-create"
                );
                self.rooms.remove(&record.id);
            } else {
                return Ok(managed.handle.clone());
            }
        }

        if !self.accepting_new {
            return Err(ScError::Capacity(
                "Not accepting new rooms (draining)".to_string(),
            ));
        }
        if self.rooms.len() >= self.max_rooms {
            return Err(ScError::Capacity(format!(
                "Room capacity reached ({})",
                self.max_rooms
            )));
        }

        let (handle, task_handle) = self
            .factory
            .spawn_room(record, self.cancel_token.child_token());

        info!(
            target: "sc.actor.registry",
            room_id = %record.id,
            kind = %record.kind.as_str(),
            room_count = self.rooms.len() + 1,
            "Created room"
        );

        self.rooms.insert(
            record.id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );

        Ok(handle)
    }

    fn remove(&mut self, room_id: &str) -> Result<(), ScError> {
        match self.rooms.remove(room_id) {
            Some(managed) => {
                managed.handle.cancel();
                info!(
                    target: "sc.actor.registry",
                    room_id = %room_id,
                    room_count = self.rooms.len(),
                    "Removed room"
                );
                Ok(())
            }
            None => Err(ScError::RoomNotFound(room_id.to_string())),
        }
    }

    /// Drop table entries whose actors have retired (terminal and empty
    /// rooms exit on their own).
    fn sweep_retired_rooms(&mut self) {
        let before = self.rooms.len();
        self.rooms.retain(|room_id, managed| {
            let alive = !managed.task_handle.is_finished();
            if !alive {
                debug!(
                    target: "sc.actor.registry",
                    room_id = %room_id,
                    "Swept retired room"
                );
            }
            alive
        });

        let swept = before - self.rooms.len();
        if swept > 0 {
            info!(
                target: "sc.actor.registry",
                swept,
                room_count = self.rooms.len(),
                "Health sweep removed retired rooms"
            );
        }
    }

    /// Stop accepting rooms, cancel children and wait for them to exit.
    async fn graceful_shutdown(&mut self) {
        self.accepting_new = false;

        info!(
            target: "sc.actor.registry",
            room_count = self.rooms.len(),
            "Shutting down rooms"
        );

        for (room_id, managed) in self.rooms.drain() {
            managed.handle.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, managed.task_handle)
                .await
                .is_err()
            {
                warn!(
                    target: "sc.actor.registry",
                    room_id = %room_id,
                    "Room task did not exit within grace period"
                );
            }
        }
    }
}
