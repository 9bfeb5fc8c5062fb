//! End-to-end session scenarios on a virtual clock.
//!
//! Each test drives a real `Client` through `SimDriver`: scripted socket,
//! server frames from `frames`, and time advanced in tick-sized steps.

use std::time::Duration;

use lawbuddy_client::{
    Client, ClientConfig, ClientError, ClientEvent, CloseInfo, ConnectionState,
    CredentialProvider, Notification, SendOptions, SendReceipt,
};
use lawbuddy_core::StreamStatus;
use lawbuddy_harness::{InvariantRegistry, SimDriver, SimEnv, frames};
use lawbuddy_proto::{CLOSE_AUTH_FAILED, CLOSE_INTERNAL_ERROR};
use serde_json::json;

const ROOM: &str = "room-1";

fn sim() -> SimDriver {
    SimDriver::new(ClientConfig::local().unwrap()).with_invariants(InvariantRegistry::standard())
}

fn sim_in_room() -> SimDriver {
    SimDriver::new(ClientConfig::local().unwrap().with_initial_room(ROOM))
        .with_invariants(InvariantRegistry::standard())
}

fn contents(frames: &[serde_json::Value]) -> Vec<String> {
    frames.iter().map(|f| f["content"].as_str().unwrap().to_string()).collect()
}

#[test]
fn offline_sends_flush_in_enqueue_order() {
    let mut sim = sim();

    let receipts: Vec<_> = (0..5).map(|i| sim.send(ROOM, &format!("msg {i}"))).collect();
    for (i, receipt) in receipts.iter().enumerate() {
        assert!(matches!(receipt, SendReceipt::Queued { depth, .. } if *depth == i + 1));
    }
    assert_eq!(sim.client().health().queue_depth, 5);

    sim.connect_and_open();

    let sent = sim.take_sent_of("send_message");
    assert_eq!(contents(&sent), vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    let ids: Vec<_> = sent.iter().map(|f| f["id"].as_str().unwrap().to_string()).collect();
    let expected: Vec<_> = receipts.iter().map(|r| r.id().as_str().to_string()).collect();
    assert_eq!(ids, expected);

    let health = sim.client().health();
    assert_eq!(health.queue_depth, 0);
    assert_eq!(health.pending_acks, 5);
}

#[test]
fn queue_overflow_drops_oldest_first() {
    let mut sim = sim();

    let receipts: Vec<_> = (0..105).map(|i| sim.send(ROOM, &format!("msg {i}"))).collect();
    let dropped: Vec<_> = sim
        .take_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Dropped { id } => Some(id),
            _ => None,
        })
        .collect();
    let oldest: Vec<_> = receipts[..5].iter().map(|r| r.id().clone()).collect();
    assert_eq!(dropped, oldest);
    assert_eq!(sim.client().health().queue_depth, 100);

    sim.connect_and_open();

    let sent = contents(&sim.take_sent_of("send_message"));
    assert_eq!(sent.len(), 100);
    assert_eq!(sent.first().map(String::as_str), Some("msg 5"));
    assert_eq!(sent.last().map(String::as_str), Some("msg 104"));
}

#[test]
fn missing_ack_times_out_after_thirty_seconds() {
    let mut sim = sim();
    sim.connect_and_open();

    let receipt = sim.send(ROOM, "m1");
    assert!(matches!(receipt, SendReceipt::Sent { .. }));
    sim.take_notifications();

    sim.advance(Duration::from_millis(29_900));
    assert!(
        !sim.take_notifications()
            .iter()
            .any(|n| matches!(n, Notification::DeliveryTimeout { .. }))
    );
    assert_eq!(sim.client().health().pending_acks, 1);

    sim.advance(Duration::from_millis(100));
    let timeouts: Vec<_> = sim
        .take_notifications()
        .into_iter()
        .filter(|n| matches!(n, Notification::DeliveryTimeout { .. }))
        .collect();
    assert_eq!(timeouts, vec![Notification::DeliveryTimeout { id: receipt.id().clone() }]);

    let health = sim.client().health();
    assert_eq!(health.pending_acks, 0);
    assert_eq!(health.failed_messages, 1);
    assert!(
        health
            .recent_errors
            .contains(&ClientError::DeliveryTimeout { id: receipt.id().clone() })
    );
}

#[test]
fn timed_out_message_retries_with_same_id() {
    let mut sim = sim();
    sim.connect_and_open();

    let receipt = sim.send(ROOM, "m1");
    sim.advance(Duration::from_secs(30));
    sim.take_sent();

    let retried = sim.retry(&receipt).unwrap();
    assert_eq!(retried, SendReceipt::Sent { id: receipt.id().clone() });

    let resent = sim.take_sent_of("send_message");
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0]["id"], receipt.id().as_str());
    assert_eq!(sim.client().health().failed_messages, 0);

    // Not failed any more
    assert!(sim.retry(&receipt).is_none());
}

#[test]
fn ack_reports_delivered_with_round_trip() {
    let mut sim = sim();
    sim.connect_and_open();

    let receipt = sim.send(ROOM, "m1");
    sim.advance(Duration::from_millis(300));
    sim.take_notifications();
    sim.server_frame(&frames::ack(receipt.id().as_str()));

    let notifications = sim.take_notifications();
    assert_eq!(notifications, vec![Notification::Delivered {
        id: receipt.id().clone(),
        round_trip: Duration::from_millis(300),
    }]);
    assert_eq!(sim.client().health().average_round_trip, Some(Duration::from_millis(300)));

    // A duplicate ack is ignored
    sim.server_frame(&frames::ack(receipt.id().as_str()));
    assert!(sim.take_notifications().is_empty());
}

#[test]
fn message_sent_matches_in_flight_by_content() {
    let mut sim = sim();
    sim.connect_and_open();

    let first = sim.send(ROOM, "first");
    let second = sim.send(ROOM, "second");
    sim.take_notifications();

    sim.server_frame(&frames::message_sent("42", ROOM, "second"));
    let notifications = sim.take_notifications();
    assert!(matches!(
        &notifications[..],
        [
            Notification::Delivered { id, .. },
            Notification::MessageSent { id: Some(sent), message_id: Some(message_id), .. },
        ] if id == second.id() && sent == second.id() && message_id == "42"
    ));

    // Unknown content falls back to the oldest in the room
    sim.server_frame(&frames::message_sent("43", ROOM, "edited server-side"));
    let notifications = sim.take_notifications();
    assert!(matches!(
        &notifications[..],
        [Notification::Delivered { id, .. }, Notification::MessageSent { .. }] if id == first.id()
    ));
    assert_eq!(sim.client().health().pending_acks, 0);
}

#[test]
fn message_sent_fallback_stays_within_its_room() {
    let mut sim = sim();
    sim.connect_and_open();

    sim.send("room-2", "other room");
    let older = sim.send(ROOM, "b");
    let newer = sim.send(ROOM, "c");
    sim.take_notifications();

    sim.server_frame(&frames::message_sent("42", ROOM, "rewritten"));
    assert!(matches!(
        &sim.take_notifications()[0],
        Notification::Delivered { id, .. } if id == older.id()
    ));

    sim.server_frame(&frames::message_sent("43", ROOM, "c"));
    assert!(matches!(
        &sim.take_notifications()[0],
        Notification::Delivered { id, .. } if id == newer.id()
    ));
    assert_eq!(sim.client().health().pending_acks, 1);
}

#[test]
fn message_sent_echoing_id_acknowledges_that_message() {
    let mut sim = sim();
    sim.connect_and_open();

    let _first = sim.send(ROOM, "same");
    let second = sim.send(ROOM, "same");
    sim.take_notifications();

    sim.server_frame(&frames::message_sent_with_id(second.id().as_str(), "42", ROOM));
    let notifications = sim.take_notifications();
    assert!(matches!(&notifications[0], Notification::Delivered { id, .. } if id == second.id()));
    assert_eq!(sim.client().health().pending_acks, 1);
}

#[test]
fn manual_disconnect_fails_open_stream() {
    let mut sim = sim();
    sim.connect_and_open();

    sim.server_frame(&frames::stream_start("s1", "m-ai", ROOM));
    sim.server_frame(&frames::stream_chunk("s1", "Adverse possession "));
    assert_eq!(sim.client().stream("s1").unwrap().status, StreamStatus::Streaming);
    sim.take_notifications();

    sim.event(ClientEvent::Disconnect);
    assert_eq!(sim.state(), ConnectionState::Disconnected);

    let session = sim.client().stream("s1").unwrap();
    assert_eq!(session.status, StreamStatus::Failed("connection lost".into()));
    assert!(sim.take_notifications().contains(&Notification::StreamFailed {
        stream_id: "s1".into(),
        message_id: "m-ai".into(),
        reason: "connection lost".into(),
    }));

    // A late chunk is a no-op
    sim.event(ClientEvent::FrameReceived(frames::stream_chunk("s1", "requires")));
    assert!(sim.take_notifications().is_empty());
    assert_eq!(sim.client().stream("s1").unwrap().buffered_content, "Adverse possession ");
    assert!(sim.client().open_streams().is_empty());
}

#[test]
fn transport_loss_fails_open_streams() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.server_frame(&frames::stream_start("s1", "m1", ROOM));
    sim.server_frame(&frames::stream_start("s2", "m2", ROOM));
    sim.take_notifications();

    sim.drop_transport();

    assert_eq!(sim.state(), ConnectionState::Reconnecting);
    let failed: Vec<_> = sim
        .take_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::StreamFailed { stream_id, reason, .. } => Some((stream_id, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![
        ("s1".to_string(), "connection lost".to_string()),
        ("s2".to_string(), "connection lost".to_string()),
    ]);
}

#[test]
fn fatal_auth_close_goes_straight_to_error() {
    let mut sim = sim();
    sim.connect();
    sim.accept();
    assert_eq!(sim.state(), ConnectionState::Connected);
    sim.take_notifications();

    sim.server_close(CloseInfo::new(CLOSE_AUTH_FAILED, "Authentication failed"));

    assert_eq!(sim.state(), ConnectionState::Error);
    let notifications = sim.take_notifications();
    assert!(notifications.contains(&Notification::Error(ClientError::FatalAuth(
        "Authentication failed".into()
    ))));
    assert!(!notifications.contains(&Notification::ConnectionChanged {
        state: ConnectionState::Reconnecting
    }));

    sim.advance(Duration::from_secs(120));
    assert_eq!(sim.opens().len(), 1);
    assert_eq!(sim.client().health().attempts, 0);
}

#[test]
fn server_internal_error_close_is_retried() {
    let mut sim = sim();
    sim.connect_and_open();

    sim.server_close(CloseInfo::new(CLOSE_INTERNAL_ERROR, "Internal server error"));
    assert_eq!(sim.state(), ConnectionState::Reconnecting);

    assert!(sim.advance_until(Duration::from_secs(3), SimDriver::open_pending));
    assert_eq!(sim.opens().len(), 2);
}

#[test]
fn reconnect_gives_up_after_max_attempts() {
    let mut sim = sim();
    sim.connect();

    let mut refused = 0;
    while sim.state() != ConnectionState::Error {
        assert!(sim.advance_until(Duration::from_secs(60), SimDriver::open_pending));
        sim.refuse(CloseInfo::abnormal("connection refused"));
        refused += 1;
        assert!(refused <= 11, "kept reconnecting");
    }

    // Initial attempt plus ten reconnects
    assert_eq!(refused, 11);
    assert_eq!(sim.opens().len(), 11);
    assert_eq!(sim.client().health().attempts, 10);

    sim.advance(Duration::from_secs(300));
    assert_eq!(sim.opens().len(), 11);
    assert_eq!(sim.state(), ConnectionState::Error);
}

#[test]
fn backoff_doubles_from_one_second_to_thirty() {
    let mut sim = sim();
    sim.connect();

    let tick = Duration::from_millis(100);
    let expected = [1, 2, 4, 8, 16, 30, 30];
    for base in expected {
        sim.refuse(CloseInfo::abnormal("connection refused"));
        let refused_at = sim.env().elapsed();

        assert!(sim.advance_until(Duration::from_secs(60), SimDriver::open_pending));
        let waited = sim.env().elapsed() - refused_at;
        let base = Duration::from_secs(base);
        assert!(waited >= base, "waited {waited:?}, expected at least {base:?}");
        assert!(waited < base + Duration::from_secs(1) + tick, "waited {waited:?} for {base:?}");
    }
}

#[test]
fn connect_timeout_schedules_reconnect() {
    let mut sim = sim();
    sim.connect();

    sim.advance(Duration::from_secs(10));

    assert_eq!(sim.state(), ConnectionState::Reconnecting);
    assert_eq!(sim.closes().len(), 1);
    assert!(sim.advance_until(Duration::from_secs(3), SimDriver::open_pending));
}

#[test]
fn manual_reconnect_from_error_starts_over() {
    let mut sim = sim();
    sim.connect();
    sim.refuse(CloseInfo::new(CLOSE_AUTH_FAILED, "Authentication failed"));
    assert_eq!(sim.state(), ConnectionState::Error);

    sim.event(ClientEvent::Reconnect);

    assert_eq!(sim.state(), ConnectionState::Connecting);
    assert!(sim.open_pending());
    assert_eq!(sim.opens().len(), 2);
    sim.accept();
    assert_eq!(sim.state(), ConnectionState::Connected);
}

#[test]
fn connect_url_carries_credential_and_room() {
    let mut sim = sim_in_room();
    sim.connect();

    let url = &sim.opens()[0];
    assert_eq!(url.path(), "/ws/chat");
    let pairs: Vec<_> = url.query_pairs().into_owned().collect();
    assert!(pairs.contains(&("token".to_string(), lawbuddy_harness::SIM_TOKEN.to_string())));
    assert!(pairs.contains(&("chat_id".to_string(), ROOM.to_string())));
}

struct NoCredential;

impl CredentialProvider for NoCredential {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[test]
fn missing_credential_is_a_fatal_auth_error() {
    let client = Client::new(SimEnv::new(), ClientConfig::local().unwrap(), NoCredential);
    let mut sim = SimDriver::with_client(client);

    sim.connect();

    assert_eq!(sim.state(), ConnectionState::Error);
    assert!(sim.opens().is_empty());
    assert!(
        sim.take_notifications()
            .iter()
            .any(|n| matches!(n, Notification::Error(err) if err.requires_reauth()))
    );
}

#[test]
fn remote_typing_expires_without_stop_frame() {
    let mut sim = sim_in_room();
    sim.connect_and_open();
    sim.take_notifications();

    sim.server_frame(&frames::typing(ROOM, "alice", true));
    assert_eq!(sim.take_notifications(), vec![Notification::Typing {
        room_id: ROOM.into(),
        user_id: "alice".into(),
        is_typing: true,
    }]);

    sim.advance(Duration::from_millis(2_900));
    assert!(sim.take_notifications().is_empty());

    sim.advance(Duration::from_millis(1_100));
    assert_eq!(sim.take_notifications(), vec![Notification::Typing {
        room_id: ROOM.into(),
        user_id: "alice".into(),
        is_typing: false,
    }]);
    let now = lawbuddy_client::Environment::now(sim.env());
    assert!(sim.client().presence().typing_users(ROOM, now).is_empty());
}

#[test]
fn typing_refresh_extends_expiry() {
    let mut sim = sim_in_room();
    sim.connect_and_open();

    sim.server_frame(&frames::typing(ROOM, "alice", true));
    sim.advance(Duration::from_secs(2));
    sim.server_frame(&frames::typing(ROOM, "alice", true));
    sim.take_notifications();

    sim.advance(Duration::from_secs(2));
    assert!(sim.take_notifications().is_empty());

    sim.advance(Duration::from_secs(2));
    assert_eq!(sim.take_notifications().len(), 1);
}

#[test]
fn new_message_clears_author_typing() {
    let mut sim = sim_in_room();
    sim.connect_and_open();
    sim.server_frame(&frames::typing(ROOM, "alice", true));
    sim.take_notifications();

    sim.server_frame(&frames::new_message("7", ROOM, "alice", "Is this binding?"));

    let notifications = sim.take_notifications();
    assert_eq!(notifications[0], Notification::Typing {
        room_id: ROOM.into(),
        user_id: "alice".into(),
        is_typing: false,
    });
    assert!(matches!(
        &notifications[1],
        Notification::NewMessage { content, .. } if content == "Is this binding?"
    ));
}

#[test]
fn presence_follows_join_and_leave() {
    let mut sim = sim_in_room();
    sim.connect_and_open();

    sim.server_frame(&frames::user_joined(ROOM, "bob"));
    sim.server_frame(&frames::typing(ROOM, "bob", true));
    sim.take_notifications();
    assert_eq!(sim.client().presence().members(ROOM), vec!["bob".to_string()]);

    sim.server_frame(&frames::user_left(ROOM, "bob"));

    let notifications = sim.take_notifications();
    assert!(notifications.contains(&Notification::Typing {
        room_id: ROOM.into(),
        user_id: "bob".into(),
        is_typing: false,
    }));
    assert!(notifications.iter().any(|n| matches!(
        n,
        Notification::PresenceChanged { status: lawbuddy_client::PresenceStatus::Offline, .. }
    )));
    assert!(sim.client().presence().members(ROOM).is_empty());
}

#[test]
fn typing_in_unjoined_room_is_ignored() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.take_notifications();

    sim.server_frame(&frames::typing("elsewhere", "alice", true));
    assert!(sim.take_notifications().is_empty());
}

fn typing_flags(sim: &mut SimDriver) -> Vec<bool> {
    sim.take_sent_of("typing")
        .iter()
        .map(|f| f["metadata"]["is_typing"].as_bool().unwrap())
        .collect()
}

#[test]
fn local_typing_is_debounced_then_idles() {
    let mut sim = sim_in_room();
    sim.connect_and_open();
    sim.take_sent();

    let typing = |sim: &mut SimDriver| {
        sim.event(ClientEvent::SetTyping { room_id: ROOM.into(), is_typing: true });
    };

    typing(&mut sim);
    sim.advance(Duration::from_millis(500));
    typing(&mut sim);
    assert_eq!(typing_flags(&mut sim), vec![true]);

    sim.advance(Duration::from_millis(700));
    typing(&mut sim);
    assert_eq!(typing_flags(&mut sim), vec![true]);

    sim.advance(Duration::from_millis(900));
    assert!(typing_flags(&mut sim).is_empty());

    sim.advance(Duration::from_millis(200));
    assert_eq!(typing_flags(&mut sim), vec![false]);
}

#[test]
fn sending_ends_local_typing() {
    let mut sim = sim_in_room();
    sim.connect_and_open();
    sim.take_sent();

    sim.event(ClientEvent::SetTyping { room_id: ROOM.into(), is_typing: true });
    sim.send(ROOM, "Done typing");

    let kinds: Vec<_> =
        sim.take_sent().iter().map(|f| f["type"].as_str().unwrap().to_string()).collect();
    assert_eq!(kinds, vec!["typing", "typing", "send_message"]);

    sim.advance(Duration::from_secs(2));
    assert!(typing_flags(&mut sim).is_empty());
}

#[test]
fn rooms_are_rejoined_on_every_connect() {
    let mut sim = sim_in_room();
    sim.connect_and_open();
    let joins = sim.take_sent_of("join_chat");
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0]["chat_session_id"], ROOM);

    sim.event(ClientEvent::JoinRoom { room_id: "room-2".into() });
    assert_eq!(sim.take_sent_of("join_chat").len(), 1);
    // Joining again is a no-op
    sim.event(ClientEvent::JoinRoom { room_id: "room-2".into() });
    assert!(sim.take_sent_of("join_chat").is_empty());

    sim.drop_transport();
    assert!(sim.advance_until(Duration::from_secs(3), SimDriver::open_pending));
    sim.accept();

    let rooms: Vec<_> = sim
        .take_sent_of("join_chat")
        .iter()
        .map(|f| f["chat_session_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(rooms, vec![ROOM, "room-2"]);
}

#[test]
fn join_while_offline_is_replayed_later() {
    let mut sim = sim();
    sim.event(ClientEvent::JoinRoom { room_id: "room-9".into() });
    assert!(sim.take_sent().is_empty());

    sim.connect_and_open();
    let joins = sim.take_sent_of("join_chat");
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0]["chat_session_id"], "room-9");
}

#[test]
fn leave_room_sends_leave_and_forgets_room() {
    let mut sim = sim_in_room();
    sim.connect_and_open();
    sim.take_sent();
    sim.take_notifications();

    sim.event(ClientEvent::LeaveRoom { room_id: ROOM.into() });

    assert_eq!(sim.take_sent_of("leave_chat").len(), 1);
    assert!(
        sim.take_notifications().contains(&Notification::RoomLeft { room_id: ROOM.into() })
    );
    assert!(sim.client().health().joined_rooms.is_empty());
}

#[test]
fn flush_failure_requeues_remaining_in_order() {
    let mut sim = sim();
    let receipts: Vec<_> =
        ["one", "two", "three"].iter().map(|content| sim.send(ROOM, content)).collect();

    sim.limit_writes(Some(1));
    sim.connect();
    sim.accept();

    assert_eq!(contents(&sim.take_sent_of("send_message")), vec!["one"]);
    assert_eq!(sim.client().health().queue_depth, 2);
    assert_eq!(sim.client().health().pending_acks, 1);

    sim.limit_writes(None);
    sim.drop_transport();
    assert!(sim.advance_until(Duration::from_secs(3), SimDriver::open_pending));
    sim.accept();

    let sent = sim.take_sent_of("send_message");
    assert_eq!(contents(&sent), vec!["two", "three"]);
    assert_eq!(sent[0]["id"], receipts[1].id().as_str());
    assert_eq!(sent[1]["id"], receipts[2].id().as_str());
    assert_eq!(sim.client().health().pending_acks, 3);
}

#[test]
fn failed_write_while_connected_requeues_and_keeps_order() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.take_notifications();

    sim.limit_writes(Some(0));
    let first = sim.send(ROOM, "a");
    assert!(matches!(first, SendReceipt::Sent { .. }));
    assert!(
        sim.take_notifications()
            .contains(&Notification::Queued { id: first.id().clone(), depth: 1 })
    );
    assert_eq!(sim.client().health().queue_depth, 1);
    assert_eq!(sim.client().health().pending_acks, 0);

    // A later send waits behind the backlog and flushes it
    sim.limit_writes(None);
    let second = sim.send(ROOM, "b");
    assert!(matches!(second, SendReceipt::Queued { depth: 2, .. }));

    let sent = sim.take_sent_of("send_message");
    assert_eq!(contents(&sent), vec!["a", "b"]);
    assert_eq!(sent[0]["id"], first.id().as_str());
    assert_eq!(sim.client().health().queue_depth, 0);
    assert_eq!(sim.client().health().pending_acks, 2);
}

#[test]
fn backlog_from_failed_write_flushes_on_next_tick() {
    let mut sim = sim();
    sim.connect_and_open();

    sim.limit_writes(Some(0));
    let receipt = sim.send(ROOM, "a");
    sim.limit_writes(None);
    assert!(sim.take_sent_of("send_message").is_empty());

    sim.advance(Duration::from_millis(100));

    let sent = sim.take_sent_of("send_message");
    assert_eq!(contents(&sent), vec!["a"]);
    assert_eq!(sent[0]["id"], receipt.id().as_str());
    assert_eq!(sim.client().health().queue_depth, 0);
    assert_eq!(sim.state(), ConnectionState::Connected);
}

#[test]
fn untracked_send_is_not_timed() {
    let mut sim = sim();
    sim.connect_and_open();

    sim.send_with(ROOM, "fire and forget", SendOptions { expect_ack: false });
    assert_eq!(sim.client().health().pending_acks, 0);

    sim.advance(Duration::from_secs(31));
    assert!(
        !sim.take_notifications()
            .iter()
            .any(|n| matches!(n, Notification::DeliveryTimeout { .. }))
    );
}

#[test]
fn completion_content_is_authoritative() {
    let mut sim = sim();
    sim.connect_and_open();

    sim.server_frame(&frames::stream_start("s1", "m-ai", ROOM));
    sim.server_frame(&frames::stream_chunk("s1", "Hel"));
    sim.server_frame(&frames::stream_chunk("s1", "lo wrld"));
    sim.take_notifications();

    sim.server_frame(&frames::stream_complete("s1", "Hello world.", json!({ "model": "mini" })));

    assert_eq!(sim.take_notifications(), vec![Notification::StreamCompleted {
        stream_id: "s1".into(),
        message_id: "m-ai".into(),
        room_id: Some(ROOM.into()),
        content: "Hello world.".into(),
        metadata: Some(json!({ "model": "mini" })),
    }]);
    let session = sim.client().stream("s1").unwrap();
    assert_eq!(session.status, StreamStatus::Complete);
    assert_eq!(session.content(), "Hello world.");
    assert_eq!(session.buffered_content, "Hello wrld");
}

#[test]
fn events_for_unknown_streams_are_noops() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.take_notifications();

    sim.server_frame(&frames::stream_chunk("ghost", "boo"));
    sim.server_frame(&frames::stream_complete("ghost", "boo", json!({})));
    sim.server_frame(&frames::stream_error("ghost", "boo"));
    sim.event(ClientEvent::CancelGeneration { stream_id: "ghost".into() });

    assert!(sim.take_notifications().is_empty());
    assert!(sim.take_sent_of("cancel_generation").is_empty());
    assert!(sim.client().stream("ghost").is_none());
    assert_eq!(sim.state(), ConnectionState::Connected);
}

#[test]
fn cancel_wins_over_late_completion() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.server_frame(&frames::stream_start("s1", "m-ai", ROOM));
    sim.take_notifications();

    sim.event(ClientEvent::CancelGeneration { stream_id: "s1".into() });

    let cancels = sim.take_sent_of("cancel_generation");
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0]["stream_id"], "s1");
    assert_eq!(cancels[0]["message_id"], "m-ai");
    assert_eq!(sim.take_notifications(), vec![Notification::StreamCancelled {
        stream_id: "s1".into(),
        message_id: "m-ai".into(),
    }]);

    sim.server_frame(&frames::stream_complete("s1", "too late", json!({})));
    assert!(sim.take_notifications().is_empty());
    assert_eq!(sim.client().stream("s1").unwrap().status, StreamStatus::Cancelled);
}

#[test]
fn stream_error_fails_only_that_stream() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.server_frame(&frames::stream_start("s1", "m1", ROOM));
    sim.server_frame(&frames::stream_start("s2", "m2", ROOM));
    sim.take_notifications();

    sim.server_frame(&frames::stream_error("s1", "model overloaded"));

    let status = &sim.client().stream("s1").unwrap().status;
    assert_eq!(*status, StreamStatus::Failed("model overloaded".into()));
    assert_eq!(sim.client().open_streams(), vec!["s2".to_string()]);
    assert_eq!(sim.state(), ConnectionState::Connected);
}

#[test]
fn room_level_stream_error_fails_open_streams_in_that_room() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.server_frame(&frames::stream_start("s1", "m1", ROOM));
    sim.server_frame(&frames::stream_start("s2", "m2", "room-2"));
    sim.take_notifications();

    sim.server_frame(&frames::room_stream_error(ROOM, "Error generating AI response: timeout"));

    let status = &sim.client().stream("s1").unwrap().status;
    assert_eq!(*status, StreamStatus::Failed("Error generating AI response: timeout".into()));
    assert_eq!(sim.client().open_streams(), vec!["s2".to_string()]);
    assert!(matches!(
        &sim.take_notifications()[..],
        [Notification::StreamFailed { stream_id, .. }] if stream_id == "s1"
    ));
    assert!(matches!(
        sim.client().health().recent_errors.last(),
        Some(ClientError::Stream { stream_id, .. }) if stream_id == "s1"
    ));
}

#[test]
fn new_start_for_same_message_supersedes_old_stream() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.server_frame(&frames::stream_start("s1", "m1", ROOM));
    sim.take_notifications();

    sim.server_frame(&frames::stream_start("s2", "m1", ROOM));

    assert_eq!(sim.client().open_streams(), vec!["s2".to_string()]);
    assert!(matches!(
        &sim.take_notifications()[..],
        [Notification::StreamFailed { stream_id, .. }, Notification::StreamStarted { .. }]
            if stream_id == "s1"
    ));
}

#[test]
fn regenerate_is_queued_while_offline() {
    let mut sim = sim();
    sim.event(ClientEvent::Regenerate { room_id: ROOM.into(), message_id: "m-ai".into() });
    assert_eq!(sim.client().health().queue_depth, 1);

    sim.connect_and_open();

    let sent = sim.take_sent_of("regenerate_message");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["message_id"], "m-ai");
    assert_eq!(sim.client().health().pending_acks, 0);
}

#[test]
fn malformed_frames_do_not_affect_the_connection() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.take_notifications();

    sim.server_frame("not json");
    sim.server_frame(r#"{"type":"mystery"}"#);

    let notifications = sim.take_notifications();
    assert_eq!(notifications.len(), 2);
    assert!(
        notifications.iter().all(|n| matches!(n, Notification::Error(ClientError::Protocol(_))))
    );
    assert_eq!(sim.state(), ConnectionState::Connected);
}

#[test]
fn server_error_frame_is_recorded() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.take_notifications();

    sim.server_frame(&frames::error("Chat session not found", "NOT_FOUND"));

    let expected = ClientError::Server {
        message: "Chat session not found".into(),
        code: Some("NOT_FOUND".into()),
    };
    assert_eq!(sim.take_notifications(), vec![Notification::Error(expected.clone())]);
    assert_eq!(sim.client().health().recent_errors, vec![expected]);
}

#[test]
fn heartbeat_pings_only_while_connected() {
    let mut sim = sim();
    sim.connect_and_open();
    sim.take_sent();

    sim.advance(Duration::from_secs(30));
    assert_eq!(sim.take_sent_of("ping").len(), 1);

    sim.advance(Duration::from_millis(300));
    sim.server_frame(&frames::pong());
    assert!(matches!(
        sim.take_notifications().last(),
        Some(Notification::Pong { round_trip: Some(rtt) }) if *rtt == Duration::from_millis(300)
    ));
    assert_eq!(sim.client().health().ping_round_trip, Some(Duration::from_millis(300)));

    sim.event(ClientEvent::Disconnect);
    sim.take_sent();
    sim.advance(Duration::from_secs(90));
    assert!(sim.take_sent().is_empty());
}

#[test]
fn health_reports_connection_details() {
    let mut sim = sim_in_room();
    sim.connect_and_open();

    let health = sim.client().health();
    assert_eq!(health.state, ConnectionState::Connected);
    assert_eq!(health.connection_id.as_deref(), Some("conn-1"));
    assert_eq!(health.last_connected, Some(lawbuddy_client::Environment::wall_clock(sim.env())));
    assert_eq!(health.joined_rooms, vec![ROOM.to_string()]);
    assert_eq!(health.open_streams, 0);
}
