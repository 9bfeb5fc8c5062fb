//! Terminal rendering of session notifications and diagnostics.

use std::fmt::Write;

use lawbuddy_client::{HealthSnapshot, Notification, PresenceStatus};
use lawbuddy_proto::MessageRole;

/// One display line for `notification`, or `None` for events that are not
/// shown (chunks, acks, pongs).
pub fn notification(notification: &Notification) -> Option<String> {
    let line = match notification {
        Notification::ConnectionChanged { state } => format!("* {state}"),
        Notification::Connected { connection_id, user_id } => match user_id {
            Some(user) => format!("* connected as {user} ({connection_id})"),
            None => format!("* connected ({connection_id})"),
        },
        Notification::Queued { depth, .. } => {
            format!("* offline, message queued ({depth} waiting)")
        },
        Notification::Dropped { id } => format!("! queue full, dropped {id}"),
        Notification::DeliveryTimeout { id } => format!("! no ack for {id}, /retry to resend"),
        Notification::NewMessage { user_id, role, content, .. } => {
            let author = match (role, user_id) {
                (Some(MessageRole::Assistant), _) => "assistant".to_string(),
                (Some(MessageRole::System), _) => "system".to_string(),
                (_, Some(user)) => user.clone(),
                (_, None) => "?".to_string(),
            };
            format!("{author}: {content}")
        },
        Notification::StreamStarted { stream_id, .. } => {
            format!("* assistant is responding (/cancel {stream_id})")
        },
        Notification::StreamCompleted { content, .. } => format!("assistant: {content}"),
        Notification::StreamFailed { stream_id, reason, .. } => {
            format!("! stream {stream_id} failed: {reason}")
        },
        Notification::StreamCancelled { stream_id, .. } => {
            format!("* stream {stream_id} cancelled")
        },
        Notification::Typing { room_id, user_id, is_typing: true } => {
            format!("* {user_id} is typing in {room_id}")
        },
        Notification::PresenceChanged { room_id, user_id, status } => match status {
            PresenceStatus::Online => format!("* {user_id} joined {room_id}"),
            PresenceStatus::Offline => format!("* {user_id} left {room_id}"),
        },
        Notification::RoomJoined { room_id } => format!("* joined {room_id}"),
        Notification::RoomLeft { room_id } => format!("* left {room_id}"),
        Notification::SystemMessage { content, .. } => format!("[system] {content}"),
        Notification::Error(err) => format!("! {err}"),
        Notification::Delivered { .. }
        | Notification::MessageSent { .. }
        | Notification::StreamChunk { .. }
        | Notification::Typing { .. }
        | Notification::Pong { .. } => return None,
    };
    Some(line)
}

/// Multi-line diagnostics for `/health`.
pub fn health(health: &HealthSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "state:        {}", health.state);
    let _ = writeln!(out, "attempts:     {}", health.attempts);
    if let Some(id) = &health.connection_id {
        let _ = writeln!(out, "connection:   {id}");
    }
    if let Some(at) = health.last_connected {
        let _ = writeln!(out, "connected at: {}", at.to_rfc3339());
    }
    let _ = writeln!(out, "rooms:        {}", health.joined_rooms.join(", "));
    let _ = writeln!(
        out,
        "queue:        {} queued, {} awaiting ack, {} failed",
        health.queue_depth, health.pending_acks, health.failed_messages
    );
    let _ = writeln!(out, "streams:      {} open", health.open_streams);
    if let Some(rtt) = health.average_round_trip {
        let _ = writeln!(out, "ack rtt:      {rtt:?}");
    }
    if let Some(rtt) = health.ping_round_trip {
        let _ = writeln!(out, "ping rtt:     {rtt:?}");
    }
    for err in &health.recent_errors {
        let _ = writeln!(out, "error:        {err}");
    }
    out.trim_end().to_string()
}
