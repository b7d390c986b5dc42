//! `ConnectionActor` - per-connection outbound actor.
//!
//! Each `ConnectionActor`:
//! - Serves exactly one client connection (one connection = one peer)
//! - Delivers RPC acknowledgments for frames that connection sent
//! - Pushes asynchronous `notification` events from the room
//!
//! The wire itself is modeled as an `mpsc::Sender<OutboundFrame>`; framing
//! and transport internals are owned by the embedding server.
//!
//! # Lifecycle
//!
//! 1. Spawned by the gateway once the connection is authenticated
//! 2. Runs until the connection closes or the room cancels it
//! 3. Cancellation via child token propagates from the room actor

use crate::errors::ScError;

use super::messages::{ConnectionMessage, OutboundFrame, RpcAck};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default channel buffer size for the connection mailbox.
const CONNECTION_CHANNEL_BUFFER: usize = 200;

/// Handle to a `ConnectionActor`.
#[derive(Clone)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: String,
    peer_id: String,
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Get the peer ID this connection represents.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Deliver the acknowledgment for a frame this connection sent.
    pub async fn deliver_ack(&self, ack: RpcAck) -> Result<(), ScError> {
        self.sender
            .send(ConnectionMessage::DeliverAck { ack })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Push an asynchronous notification event to the client.
    pub async fn notify(&self, method: impl Into<String>, data: Value) -> Result<(), ScError> {
        self.sender
            .send(ConnectionMessage::Notify {
                method: method.into(),
                data,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Close the connection with a reason.
    pub async fn close(&self, reason: String) -> Result<(), ScError> {
        self.sender
            .send(ConnectionMessage::Close { reason })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    connection_id: String,
    peer_id: String,
    room_id: String,
    receiver: mpsc::Receiver<ConnectionMessage>,
    cancel_token: CancellationToken,
    /// Outbound half of the wire.
    outbound: mpsc::Sender<OutboundFrame>,
    is_closing: bool,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: String,
        peer_id: String,
        room_id: String,
        cancel_token: CancellationToken,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);

        let actor = Self {
            connection_id: connection_id.clone(),
            peer_id: peer_id.clone(),
            room_id,
            receiver,
            cancel_token: cancel_token.clone(),
            outbound,
            is_closing: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
            peer_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    async fn run(mut self) {
        debug!(
            target: "sc.actor.connection",
            connection_id = %self.connection_id,
            peer_id = %self.peer_id,
            room_id = %self.room_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    // Stop accepting new messages, but frames already queued
                    // (an ack racing the cancellation) still reach the wire.
                    self.receiver.close();
                    while let Some(message) = self.receiver.recv().await {
                        if self.handle_message(message).await {
                            break;
                        }
                    }
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            let should_exit = self.handle_message(message).await;
                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "sc.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sc.actor.connection",
            connection_id = %self.connection_id,
            peer_id = %self.peer_id,
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::DeliverAck { ack } => {
                self.write(OutboundFrame::Ack(ack)).await;
                false
            }

            ConnectionMessage::Notify { method, data } => {
                self.write(OutboundFrame::notification(method, data)).await;
                false
            }

            ConnectionMessage::Close { reason } => {
                debug!(
                    target: "sc.actor.connection",
                    connection_id = %self.connection_id,
                    reason = %reason,
                    "Closing connection"
                );
                self.is_closing = true;
                true
            }
        }
    }

    /// Write one frame to the wire. A full or gone wire is logged, never
    /// propagated: pushes are fire-and-forget per recipient.
    async fn write(&mut self, frame: OutboundFrame) {
        if self.is_closing {
            return;
        }

        if self.outbound.send(frame).await.is_err() {
            warn!(
                target: "sc.actor.connection",
                connection_id = %self.connection_id,
                peer_id = %self.peer_id,
                "Outbound wire gone, dropping frame"
            );
            self.is_closing = true;
        }
    }
}
