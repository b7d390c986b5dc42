//! End-to-end livestream lifecycle tests.
//!
//! Exercises the full stack (gateway -> registry -> room actor ->
//! connection actors) against mock collaborators:
//! - Viewer admission before and after the stream goes live
//! - Streamer assignment, including the at-most-one-streamer guarantee
//! - Stream teardown via explicit stop and via streamer disconnect
//! - Persistence and notification side effects of lifecycle transitions

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use sc_test_utils::TestWorld;
use session_controller::actors::{
    OutboundFrame, RoomFactory, RoomLimits, RoomRegistryActor, RoomRegistryHandle, RpcFrame,
};
use session_controller::errors::ScError;
use session_controller::gateway::{ConnectQuery, ConnectionGateway, ConnectionSession};
use session_controller::upstream::RoomKind;

const ROOM: &str = "stream-1";
const HOST: &str = "user-host";

struct Harness {
    world: TestWorld,
    gateway: ConnectionGateway,
    registry: RoomRegistryHandle,
}

fn harness() -> Harness {
    let world = TestWorld::new();
    world
        .store
        .insert(sc_test_utils::livestream_record(ROOM, HOST));
    world.auth.register("token-host", HOST, "Hosty");
    world.auth.register("token-viewer", "user-viewer", "Vera");

    let factory = RoomFactory::new(
        world.collaborators(),
        world.status_feed.clone(),
        RoomLimits {
            max_peers: 32,
            chat_max_length: 256,
        },
    );
    let (registry, _task) = RoomRegistryActor::spawn(factory, 16, CancellationToken::new());
    let gateway = ConnectionGateway::new(world.auth.clone(), world.store.clone(), registry.clone());

    Harness {
        world,
        gateway,
        registry,
    }
}

async fn connect(
    harness: &Harness,
    token: Option<&str>,
) -> (ConnectionSession, mpsc::Receiver<OutboundFrame>) {
    let (wire_tx, wire_rx) = mpsc::channel(64);
    let session = harness
        .gateway
        .accept(
            ConnectQuery {
                access_token: token.map(str::to_string),
                room_id: ROOM.to_string(),
                kind: RoomKind::Livestream,
            },
            wire_tx,
        )
        .await
        .unwrap();
    (session, wire_rx)
}

async fn join(session: &ConnectionSession, is_streamer: bool) -> Value {
    let ack = session
        .dispatch(RpcFrame::new(
            "join",
            "",
            json!({ "isStreamer": is_streamer }),
        ))
        .await
        .unwrap();
    assert!(ack.ok, "join failed: {:?}", ack.error);
    ack.result.unwrap()
}

/// Collect notification pushes until the wire goes quiet.
async fn drain_events(wire: &mut mpsc::Receiver<OutboundFrame>) -> Vec<(String, Value)> {
    let mut events = Vec::new();
    while let Ok(Some(frame)) = timeout(Duration::from_millis(100), wire.recv()).await {
        if let OutboundFrame::Event { method, data, .. } = frame {
            events.push((method, data));
        }
    }
    events
}

// ============================================================================
// Viewer admission
// ============================================================================

#[tokio::test]
async fn test_viewer_before_streamer_sees_coming_soon() {
    let harness = harness();
    let (viewer, _wire) = connect(&harness, None).await;

    let summary = join(&viewer, false).await;

    assert_eq!(summary["peers"], json!(0));
    assert_eq!(summary["status"], json!("coming_soon"));
    assert_eq!(summary["streamer"]["displayName"], json!(null));
    assert_eq!(summary["streamer"]["avatarUrl"], json!(null));
}

#[tokio::test]
async fn test_viewer_count_excludes_streamer_and_self() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let (viewer_a, _wire_a) = connect(&harness, None).await;
    let (viewer_b, _wire_b) = connect(&harness, None).await;

    join(&host, true).await;

    // The first viewer finds a live room with no other viewers: the
    // streamer never counts, and neither does the joiner itself.
    let first = join(&viewer_a, false).await;
    assert_eq!(first["peers"], json!(0));
    assert_eq!(first["status"], json!("live"));
    assert_eq!(first["streamer"]["displayName"], json!("Hosty"));

    // The second viewer finds exactly one.
    let second = join(&viewer_b, false).await;
    assert_eq!(second["peers"], json!(1));
}

#[tokio::test]
async fn test_late_viewer_receives_consumers_before_ack() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;

    // Producing transports are handed out before the streamer slot is
    // claimed; the host then joins as streamer and produces on it.
    let transport_ack = host
        .dispatch(RpcFrame::new(
            "createWebRtcTransport",
            "",
            json!({ "producing": true }),
        ))
        .await
        .unwrap();
    assert!(transport_ack.ok);
    let transport_id = transport_ack.result.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    join(&host, true).await;

    let produce_ack = host
        .dispatch(RpcFrame::new(
            "produce",
            "",
            json!({ "transportId": transport_id, "kind": "video" }),
        ))
        .await
        .unwrap();
    assert!(produce_ack.ok);

    let (viewer, mut viewer_wire) = connect(&harness, Some("token-viewer")).await;
    join(&viewer, false).await;

    // The pairing exists by the time the join ack resolved.
    let pairings = harness.world.media.pairings();
    assert!(pairings
        .iter()
        .any(|p| p.consumer_peer_id == viewer.peer_id()));

    let events = drain_events(&mut viewer_wire).await;
    assert!(events.iter().any(|(method, data)| {
        method == "newConsumer" && data["peerId"] == json!(host.peer_id())
    }));
}

#[tokio::test]
async fn test_viewer_join_survives_consumer_failure() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;

    let transport_ack = host
        .dispatch(RpcFrame::new(
            "createWebRtcTransport",
            "",
            json!({ "producing": true }),
        ))
        .await
        .unwrap();
    let transport_id = transport_ack.result.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    join(&host, true).await;
    let produce_ack = host
        .dispatch(RpcFrame::new(
            "produce",
            "",
            json!({ "transportId": transport_id, "kind": "video" }),
        ))
        .await
        .unwrap();
    assert!(produce_ack.ok);

    // The engine refuses consumers from here on; admission still succeeds.
    harness.world.media.set_fail_consumers(true);
    let (viewer, mut viewer_wire) = connect(&harness, Some("token-viewer")).await;
    let summary = join(&viewer, false).await;
    assert_eq!(summary["status"], json!("live"));

    let events = drain_events(&mut viewer_wire).await;
    assert!(!events.iter().any(|(method, _)| method == "newConsumer"));
}

#[tokio::test]
async fn test_connection_to_finished_stream_is_rejected() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    join(&host, true).await;

    let stop_ack = host
        .dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();
    assert!(stop_ack.ok);

    // The stored record now says "end"; the gateway treats the room as gone.
    let (wire_tx, _wire_rx) = mpsc::channel(8);
    let result = harness
        .gateway
        .accept(
            ConnectQuery {
                access_token: None,
                room_id: ROOM.to_string(),
                kind: RoomKind::Livestream,
            },
            wire_tx,
        )
        .await;
    assert!(matches!(result, Err(ScError::RoomNotFound(_))));
}

// ============================================================================
// Streamer assignment
// ============================================================================

#[tokio::test]
async fn test_host_join_as_streamer_goes_live() {
    let harness = harness();
    let (viewer, mut viewer_wire) = connect(&harness, None).await;
    join(&viewer, false).await;
    let mut status_rx = harness.world.status_feed.subscribe(ROOM);

    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let summary = join(&host, true).await;
    assert_eq!(summary["status"], json!("live"));

    // Persistence saw the transition with a real start time.
    let updates = harness.world.store.updates();
    let (_, live_update) = updates
        .iter()
        .find(|(id, update)| id == ROOM && update.status == "live")
        .expect("live transition persisted");
    assert!(live_update.real_start_time.is_some());

    // Both audiences observed the transition.
    let events = drain_events(&mut viewer_wire).await;
    assert!(events.iter().any(|(method, data)| {
        method == "roomStatusUpdated" && data["status"] == json!("live")
    }));

    let snapshot = status_rx.recv().await.unwrap();
    assert_eq!(snapshot.status, "live");
    assert_eq!(snapshot.id, ROOM);

    // The follower notification went out.
    let sent = harness.world.notifier.sent();
    assert!(sent.iter().any(|n| n.template == "stream-started"));
}

#[tokio::test]
async fn test_non_host_cannot_stream() {
    let harness = harness();
    let (viewer, _wire) = connect(&harness, Some("token-viewer")).await;

    let ack = viewer
        .dispatch(RpcFrame::new("join", "", json!({ "isStreamer": true })))
        .await
        .unwrap();

    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "UNAUTHORIZED");

    // The room state is untouched.
    let state = viewer.room().get_state().await.unwrap();
    assert_eq!(state.status, "coming_soon");
    assert!(state.streamer_peer_id.is_none());
}

#[tokio::test]
async fn test_concurrent_streamer_claims_one_wins() {
    let harness = harness();
    let (host_a, _wire_a) = connect(&harness, Some("token-host")).await;
    let (host_b, _wire_b) = connect(&harness, Some("token-host")).await;

    let frame = RpcFrame::new("join", "", json!({ "isStreamer": true }));
    let (ack_a, ack_b) = tokio::join!(
        host_a.dispatch(frame.clone()),
        host_b.dispatch(frame.clone())
    );
    let (ack_a, ack_b) = (ack_a.unwrap(), ack_b.unwrap());

    assert_ne!(ack_a.ok, ack_b.ok, "exactly one claim must win");
    let loser = if ack_a.ok { ack_b } else { ack_a };
    assert_eq!(loser.error.unwrap().code, "CONFLICT");

    // Exactly one live transition was persisted.
    let live_updates = harness
        .world
        .store
        .updates()
        .iter()
        .filter(|(_, update)| update.status == "live")
        .count();
    assert_eq!(live_updates, 1);
}

#[tokio::test]
async fn test_failed_status_write_rolls_back_streamer_claim() {
    let harness = harness();
    let (host, _wire) = connect(&harness, Some("token-host")).await;
    harness.world.store.set_fail_updates(true);

    let ack = host
        .dispatch(RpcFrame::new("join", "", json!({ "isStreamer": true })))
        .await
        .unwrap();
    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "UPSTREAM_ERROR");

    let state = host.room().get_state().await.unwrap();
    assert_eq!(state.status, "coming_soon");
    assert!(state.streamer_peer_id.is_none());

    // The slot is claimable again once the store recovers.
    harness.world.store.set_fail_updates(false);
    let retry = join(&host, true).await;
    assert_eq!(retry["status"], json!("live"));
}

#[tokio::test]
async fn test_notification_failure_does_not_block_going_live() {
    let harness = harness();
    harness.world.notifier.set_fail(true);
    let (host, _wire) = connect(&harness, Some("token-host")).await;

    let summary = join(&host, true).await;
    assert_eq!(summary["status"], json!("live"));
}

// ============================================================================
// Stream teardown
// ============================================================================

#[tokio::test]
async fn test_streamer_disconnect_ends_stream() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let (viewer, mut viewer_wire) = connect(&harness, None).await;
    join(&host, true).await;
    join(&viewer, false).await;
    let room = viewer.room().clone();
    let mut status_rx = harness.world.status_feed.subscribe(ROOM);

    host.disconnect().await;

    let state = room.get_state().await.unwrap();
    assert_eq!(state.status, "end");
    assert!(state.streamer_peer_id.is_none());
    assert!(state.is_terminal);

    // Persistence saw the end transition.
    assert!(harness
        .world
        .store
        .updates()
        .iter()
        .any(|(id, update)| id == ROOM && update.status == "end"));

    // Remaining members got endstream exactly once.
    let events = drain_events(&mut viewer_wire).await;
    let endstreams = events.iter().filter(|(m, _)| m == "endstream").count();
    assert_eq!(endstreams, 1);

    // The status-subscriber audience observed the end transition too.
    let snapshot = status_rx.recv().await.unwrap();
    assert_eq!(snapshot.status, "end");
}

#[tokio::test]
async fn test_repeated_disconnect_reports_are_idempotent() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let (viewer, mut viewer_wire) = connect(&harness, None).await;
    join(&host, true).await;
    join(&viewer, false).await;
    let room = viewer.room().clone();

    host.disconnect().await;
    // A second report for the same peer is a no-op.
    room.peer_disconnected(host.peer_id().to_string())
        .await
        .unwrap();

    let events = drain_events(&mut viewer_wire).await;
    let endstreams = events.iter().filter(|(m, _)| m == "endstream").count();
    assert_eq!(endstreams, 1);

    let end_updates = harness
        .world
        .store
        .updates()
        .iter()
        .filter(|(_, update)| update.status == "end")
        .count();
    assert_eq!(end_updates, 1);
}

#[tokio::test]
async fn test_explicit_stop_matches_disconnect_teardown() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let (viewer, mut viewer_wire) = connect(&harness, None).await;
    join(&host, true).await;
    join(&viewer, false).await;

    let ack = host
        .dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();
    assert!(ack.ok);
    assert_eq!(ack.result.unwrap()["done"], json!(true));

    let state = viewer.room().get_state().await.unwrap();
    assert_eq!(state.status, "end");
    assert!(state.is_terminal);

    let events = drain_events(&mut viewer_wire).await;
    let endstreams = events.iter().filter(|(m, _)| m == "endstream").count();
    assert_eq!(endstreams, 1);
    assert!(events.iter().any(|(method, data)| {
        method == "roomStatusUpdated" && data["status"] == json!("end")
    }));
}

#[tokio::test]
async fn test_stop_ack_reaches_the_streamer_wire() {
    let harness = harness();
    let (host, mut host_wire) = connect(&harness, Some("token-host")).await;

    // Drive the frames through the session pump: the stop ack must reach
    // the wire even though stopping evicts the streamer from the room.
    let (frames_tx, frames_rx) = mpsc::channel(8);
    let pump = tokio::spawn(host.run(frames_rx));
    frames_tx
        .send(RpcFrame::new("join", "", json!({ "isStreamer": true })))
        .await
        .unwrap();
    frames_tx
        .send(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();
    drop(frames_tx);
    timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();

    let mut acks = Vec::new();
    while let Ok(Some(frame)) = timeout(Duration::from_millis(200), host_wire.recv()).await {
        if let OutboundFrame::Ack(ack) = frame {
            acks.push(ack);
        }
    }
    assert_eq!(acks.len(), 2, "one ack per frame");
    assert!(acks.iter().all(|ack| ack.ok));
}

#[tokio::test]
async fn test_streamer_join_after_end_is_not_found() {
    let harness = harness();
    let (first, _first_wire) = connect(&harness, Some("token-host")).await;
    // A second host session, attached before the stream ends.
    let (second, _second_wire) = connect(&harness, Some("token-host")).await;
    join(&first, true).await;

    first
        .dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();

    // A terminal room rejects the streamer path like any other join.
    let ack = second
        .dispatch(RpcFrame::new("join", "", json!({ "isStreamer": true })))
        .await
        .unwrap();
    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "NOT_FOUND");
}

#[tokio::test]
async fn test_only_streamer_can_stop() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let (viewer, _viewer_wire) = connect(&harness, None).await;
    join(&host, true).await;
    join(&viewer, false).await;

    let ack = viewer
        .dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();

    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "UNAUTHORIZED");
    let state = host.room().get_state().await.unwrap();
    assert_eq!(state.status, "live");
}

#[tokio::test]
async fn test_stop_without_active_stream_conflicts() {
    let harness = harness();
    let (viewer, _wire) = connect(&harness, None).await;
    join(&viewer, false).await;

    let ack = viewer
        .dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();

    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "CONFLICT");
}

#[tokio::test]
async fn test_join_after_end_is_not_found() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    // Attached before the stream ends, joining after.
    let (straggler, _wire) = connect(&harness, None).await;
    join(&host, true).await;

    host.dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();

    let ack = straggler
        .dispatch(RpcFrame::new("join", "", json!({})))
        .await
        .unwrap();
    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "NOT_FOUND");
}

// ============================================================================
// Producing gates and registry retirement
// ============================================================================

#[tokio::test]
async fn test_viewer_cannot_open_producing_transport() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    let (viewer, _viewer_wire) = connect(&harness, None).await;
    join(&host, true).await;
    join(&viewer, false).await;

    let ack = viewer
        .dispatch(RpcFrame::new(
            "createWebRtcTransport",
            "",
            json!({ "producing": true }),
        ))
        .await
        .unwrap();
    assert!(!ack.ok);
    assert_eq!(ack.error.unwrap().code, "UNAUTHORIZED");

    // Receive-only transports stay available to viewers.
    let recv_ack = viewer
        .dispatch(RpcFrame::new(
            "createWebRtcTransport",
            "",
            json!({ "producing": false }),
        ))
        .await
        .unwrap();
    assert!(recv_ack.ok);

    // Once the slot is claimed, even the host gets no further producing
    // transports.
    let host_ack = host
        .dispatch(RpcFrame::new(
            "createWebRtcTransport",
            "",
            json!({ "producing": true }),
        ))
        .await
        .unwrap();
    assert!(!host_ack.ok);
    assert_eq!(host_ack.error.unwrap().code, "CONFLICT");
}

#[tokio::test]
async fn test_terminal_empty_room_retires_and_is_recreatable() {
    let harness = harness();
    let (host, _host_wire) = connect(&harness, Some("token-host")).await;
    join(&host, true).await;
    let room = host.room().clone();

    host.dispatch(RpcFrame::new("stopLivestream", "", json!({})))
        .await
        .unwrap();
    // Terminal and empty: the actor retires on its own.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(room.get_state().await.is_err());

    // The slot is reusable for a rescheduled stream under the same id.
    harness
        .world
        .store
        .insert(sc_test_utils::livestream_record(ROOM, HOST));
    let fresh = harness
        .registry
        .get_or_create(sc_test_utils::livestream_record(ROOM, HOST))
        .await
        .unwrap();
    let state = fresh.get_state().await.unwrap();
    assert_eq!(state.status, "coming_soon");
}
