//! Input line parsing.
//!
//! Lines starting with `/` are commands; anything else is a chat message for
//! the active room.

use lawbuddy_client::{MessageId, RoomId, StreamId};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a chat message to the active room.
    Say(String),
    /// Join a room and make it active.
    Join(RoomId),
    /// Leave a room, or the active room when none is given.
    Leave(Option<RoomId>),
    /// Set the local typing flag in the active room.
    Typing(bool),
    /// Cancel a generation.
    Cancel(StreamId),
    /// Regenerate an assistant message in the active room.
    Regenerate(MessageId),
    /// Resend every timed-out message.
    Retry,
    /// Print diagnostics.
    Health,
    /// Manual reconnect.
    Reconnect,
    /// Manual disconnect.
    Disconnect,
    /// Print command help.
    Help,
    /// Dispose the session and exit.
    Quit,
    /// Malformed or unknown command, with a usage hint.
    Invalid(String),
}

/// Command summary printed by `/help`.
pub const HELP: &str = "\
/join <room>        join a room and make it active
/leave [room]       leave a room (default: active room)
/typing on|off      set the typing indicator
/cancel <stream>    cancel a generation
/regen <message>    regenerate an assistant message
/retry              resend timed-out messages
/health             show connection diagnostics
/reconnect          reconnect now
/disconnect         disconnect and stay offline
/quit               exit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(command) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let parsed = match (name, arg) {
        ("join", Some(room)) => Command::Join(room.to_string()),
        ("join", None) => usage("/join <room>"),
        ("leave", room) => Command::Leave(room.map(str::to_string)),
        ("typing", Some("on")) => Command::Typing(true),
        ("typing", Some("off")) => Command::Typing(false),
        ("typing", _) => usage("/typing on|off"),
        ("cancel", Some(stream)) => Command::Cancel(stream.to_string()),
        ("cancel", None) => usage("/cancel <stream>"),
        ("regen", Some(message)) => Command::Regenerate(message.to_string()),
        ("regen", None) => usage("/regen <message>"),
        ("retry", _) => Command::Retry,
        ("health", _) => Command::Health,
        ("reconnect", _) => Command::Reconnect,
        ("disconnect", _) => Command::Disconnect,
        ("help" | "h", _) => Command::Help,
        ("quit" | "q", _) => Command::Quit,
        (other, _) => Command::Invalid(format!("unknown command /{other}, try /help")),
    };
    Some(parsed)
}

fn usage(form: &str) -> Command {
    Command::Invalid(format!("usage: {form}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse("  what is a tort?  "), Some(Command::Say("what is a tort?".into())));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse("/join case-42"), Some(Command::Join("case-42".into())));
        assert_eq!(parse("/leave"), Some(Command::Leave(None)));
        assert_eq!(parse("/leave case-42"), Some(Command::Leave(Some("case-42".into()))));
        assert_eq!(parse("/typing on"), Some(Command::Typing(true)));
        assert_eq!(parse("/cancel s-1"), Some(Command::Cancel("s-1".into())));
        assert_eq!(parse("/regen m-9"), Some(Command::Regenerate("m-9".into())));
        assert_eq!(parse("/q"), Some(Command::Quit));
    }

    #[test]
    fn missing_arguments_show_usage() {
        assert_eq!(parse("/join"), Some(Command::Invalid("usage: /join <room>".into())));
        assert_eq!(parse("/typing maybe"), Some(Command::Invalid("usage: /typing on|off".into())));
    }

    #[test]
    fn unknown_command_is_invalid() {
        let parsed = parse("/frobnicate");
        assert!(matches!(parsed, Some(Command::Invalid(msg)) if msg.contains("/help")));
    }
}
