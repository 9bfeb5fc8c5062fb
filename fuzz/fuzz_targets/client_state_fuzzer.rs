//! Fuzz target for the composed client state machine
//!
//! Drives a simulated session with arbitrary user calls, socket events,
//! server frames (well-formed and raw), and time.
//!
//! # Invariants
//!
//! Checked by the harness after every step:
//! - Offline queue and failed list never exceed capacity
//! - Reconnect attempts never exceed the maximum
//! - No stream stays open while disconnected
//! - Recent error log stays bounded

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use lawbuddy_client::{ClientConfig, ClientEvent, CloseInfo};
use lawbuddy_harness::{InvariantRegistry, SimDriver, frames};
use libfuzzer_sys::fuzz_target;

const ROOMS: [&str; 2] = ["room-a", "room-b"];

#[derive(Debug, Arbitrary)]
enum Op {
    Send { room: bool, tracked: bool },
    Connect,
    Disconnect,
    Reconnect,
    Accept,
    Refuse { code: u16 },
    ServerClose { code: u16 },
    Join { room: bool },
    Leave { room: bool },
    Typing { room: bool, on: bool },
    StreamStart { stream: u8, message: u8 },
    StreamChunk { stream: u8 },
    StreamComplete { stream: u8 },
    StreamError { stream: u8 },
    Cancel { stream: u8 },
    RemoteTyping { user: u8, on: bool },
    Ack { nth: u8 },
    Raw(String),
    Advance { millis: u16 },
    LimitWrites(Option<u8>),
}

fn room(flag: bool) -> &'static str {
    ROOMS[usize::from(flag)]
}

fuzz_target!(|ops: Vec<Op>| {
    let Ok(config) = ClientConfig::local() else { return };
    let config = config.with_initial_room(ROOMS[0]);
    let mut sim = SimDriver::new(config).with_invariants(InvariantRegistry::standard());
    let mut ids = Vec::new();

    for op in ops.into_iter().take(256) {
        match op {
            Op::Send { room: r, tracked } => {
                let options = lawbuddy_client::SendOptions { expect_ack: tracked };
                ids.push(sim.send_with(room(r), "fuzz", options).id().clone());
            },
            Op::Connect => sim.connect(),
            Op::Disconnect => sim.event(ClientEvent::Disconnect),
            Op::Reconnect => sim.event(ClientEvent::Reconnect),
            Op::Accept => {
                if sim.accept() {
                    sim.server_frame(&frames::connection_established("conn", "self"));
                }
            },
            Op::Refuse { code } => {
                sim.refuse(CloseInfo::new(code, "refused"));
            },
            Op::ServerClose { code } => sim.server_close(CloseInfo::new(code, "closed")),
            Op::Join { room: r } => sim.event(ClientEvent::JoinRoom { room_id: room(r).into() }),
            Op::Leave { room: r } => sim.event(ClientEvent::LeaveRoom { room_id: room(r).into() }),
            Op::Typing { room: r, on } => {
                sim.event(ClientEvent::SetTyping { room_id: room(r).into(), is_typing: on });
            },
            Op::StreamStart { stream, message } => {
                let (stream_id, message_id) = (format!("s{stream}"), format!("m{message}"));
                sim.server_frame(&frames::stream_start(&stream_id, &message_id, ROOMS[0]));
            },
            Op::StreamChunk { stream } => {
                sim.server_frame(&frames::stream_chunk(&format!("s{stream}"), "tok"));
            },
            Op::StreamComplete { stream } => {
                let stream_id = format!("s{stream}");
                sim.server_frame(&frames::stream_complete(&stream_id, "done", Default::default()));
            },
            Op::StreamError { stream } => {
                sim.server_frame(&frames::stream_error(&format!("s{stream}"), "boom"));
            },
            Op::Cancel { stream } => {
                sim.event(ClientEvent::CancelGeneration { stream_id: format!("s{stream}") });
            },
            Op::RemoteTyping { user, on } => {
                sim.server_frame(&frames::typing(ROOMS[0], &format!("u{user}"), on));
            },
            Op::Ack { nth } => {
                if !ids.is_empty() {
                    let id = &ids[usize::from(nth) % ids.len()];
                    sim.server_frame(&frames::ack(id.as_str()));
                }
            },
            Op::Raw(text) => sim.server_frame(&text),
            Op::Advance { millis } => sim.advance(Duration::from_millis(u64::from(millis))),
            Op::LimitWrites(budget) => sim.limit_writes(budget.map(usize::from)),
        }
    }
});
