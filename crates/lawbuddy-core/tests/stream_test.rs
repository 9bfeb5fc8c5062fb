//! Stream assembler scenarios: interleaved generations, supersession,
//! connection loss, and bounded history.

use std::time::Duration;

use lawbuddy_core::{
    StreamAssembler, StreamEventKind, StreamStatus,
    stream::{CONNECTION_LOST, HISTORY_LIMIT, SUPERSEDED},
};
use serde_json::json;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn interleaved_streams_buffer_independently() {
    let mut streams = StreamAssembler::new();
    streams.start("a".into(), "m-a".into(), Some("r1".into()), ms(0));
    streams.start("b".into(), "m-b".into(), Some("r2".into()), ms(5));

    streams.chunk("a", "Hel", ms(10));
    streams.chunk("b", "Wor", ms(11));
    streams.chunk("a", "lo", ms(12));
    streams.chunk("b", "ld", ms(13));

    assert_eq!(streams.session("a").unwrap().buffered_content, "Hello");
    assert_eq!(streams.session("b").unwrap().buffered_content, "World");
    assert_eq!(streams.open_count(), 2);
}

#[test]
fn completion_keeps_metadata_and_server_content() {
    let mut streams = StreamAssembler::new();
    streams.start("s".into(), "m".into(), None, ms(0));
    streams.chunk("s", "draft", ms(40));

    let metadata = json!({"model": "gpt-4", "tokens": 12});
    let event = streams.complete("s", "Final answer".into(), Some(metadata.clone())).unwrap();

    assert_eq!(event.kind, StreamEventKind::Completed {
        content: "Final answer".into(),
        metadata: Some(metadata),
    });
    let session = streams.session("s").unwrap();
    assert_eq!(session.status, StreamStatus::Complete);
    assert_eq!(session.content(), "Final answer");
    assert_eq!(session.buffered_content, "draft");
    assert_eq!(session.first_chunk_latency(), Some(ms(40)));
}

#[test]
fn closed_stream_ignores_late_frames() {
    let mut streams = StreamAssembler::new();
    streams.start("s".into(), "m".into(), None, ms(0));
    streams.cancel("s").unwrap();

    assert!(streams.chunk("s", "late", ms(10)).is_none());
    assert!(streams.complete("s", "late".into(), None).is_none());
    assert!(streams.error("s", "late").is_none());
    assert!(streams.start("s".into(), "m".into(), None, ms(20)).is_empty());
    assert_eq!(streams.session("s").unwrap().status, StreamStatus::Cancelled);
}

#[test]
fn regeneration_supersedes_open_stream_for_same_message() {
    let mut streams = StreamAssembler::new();
    streams.start("old".into(), "m".into(), None, ms(0));
    streams.chunk("old", "partial", ms(5));

    let events = streams.start("new".into(), "m".into(), None, ms(10));
    let kinds: Vec<_> = events.iter().map(|e| (e.stream_id.as_str(), e.kind.clone())).collect();
    assert_eq!(kinds, vec![
        ("old", StreamEventKind::Failed { reason: SUPERSEDED.into() }),
        ("new", StreamEventKind::Started),
    ]);
    assert_eq!(streams.open_count(), 1);
}

#[test]
fn abort_all_fails_open_streams_oldest_first() {
    let mut streams = StreamAssembler::new();
    streams.start("second".into(), "m2".into(), None, ms(20));
    streams.start("first".into(), "m1".into(), None, ms(10));
    streams.start("done".into(), "m3".into(), None, ms(0));
    streams.complete("done", "ok".into(), None);

    let events = streams.abort_all(CONNECTION_LOST);
    let ids: Vec<_> = events.iter().map(|e| e.stream_id.as_str()).collect();
    assert_eq!(ids, ["first", "second"]);
    assert!(
        events
            .iter()
            .all(|e| e.kind == StreamEventKind::Failed { reason: CONNECTION_LOST.into() })
    );
    assert_eq!(streams.open_count(), 0);
    assert_eq!(streams.session("done").unwrap().status, StreamStatus::Complete);
}

#[test]
fn history_is_bounded() {
    let mut streams = StreamAssembler::new();
    for n in 0..HISTORY_LIMIT + 5 {
        let id = format!("s{n}");
        streams.start(id.clone(), format!("m{n}"), None, ms(n as u64));
        streams.complete(&id, "done".into(), None);
    }

    assert_eq!(streams.history().count(), HISTORY_LIMIT);
    assert!(streams.session("s0").is_none());
    assert!(streams.session(&format!("s{}", HISTORY_LIMIT + 4)).is_some());
}

#[test]
fn room_error_fails_only_that_rooms_streams() {
    let mut streams = StreamAssembler::new();
    streams.start("b".into(), "m-b".into(), Some("r1".into()), ms(5));
    streams.start("a".into(), "m-a".into(), Some("r1".into()), ms(0));
    streams.start("c".into(), "m-c".into(), Some("r2".into()), ms(1));

    let failed = streams.error_room(Some("r1"), "model unavailable");
    let ids: Vec<_> = failed.iter().map(|e| e.stream_id.as_str()).collect();

    assert_eq!(ids, ["a", "b"]);
    assert!(failed.iter().all(|e| e.kind == StreamEventKind::Failed {
        reason: "model unavailable".into()
    }));
    assert_eq!(streams.open_count(), 1);
    assert!(streams.session("c").unwrap().status.is_open());
}

#[test]
fn room_error_without_room_fails_everything_open() {
    let mut streams = StreamAssembler::new();
    streams.start("a".into(), "m-a".into(), Some("r1".into()), ms(0));
    streams.start("b".into(), "m-b".into(), None, ms(1));

    assert_eq!(streams.error_room(None, "boom").len(), 2);
    assert_eq!(streams.open_count(), 0);
    assert!(streams.error_room(None, "again").is_empty());
}
