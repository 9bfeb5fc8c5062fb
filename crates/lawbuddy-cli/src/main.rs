//! LawBuddy terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local server and join a room
//! LAWBUDDY_TOKEN=secret lawbuddy --room case-42
//!
//! # Production endpoint with debug logging to stderr
//! lawbuddy --url wss://api.example.com/ws/chat --token secret --log-level debug
//! ```

use std::io::Write;

use clap::Parser;
use lawbuddy_cli::{Command, HELP, parse, render};
use lawbuddy_client::{
    Client, ClientConfig, DEFAULT_SERVER_URL, EnvelopeId, Notification, RoomId, SendOptions,
    SessionActor, SessionClosed, SessionHandle, StaticCredential, SystemEnv, Topic,
    websocket::WebSocketConnector,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// LawBuddy chat client
#[derive(Parser, Debug)]
#[command(name = "lawbuddy")]
#[command(about = "Terminal client for LawBuddy real-time chat")]
#[command(version)]
struct Args {
    /// WebSocket endpoint
    #[arg(short, long, env = "LAWBUDDY_URL", default_value = DEFAULT_SERVER_URL)]
    url: String,

    /// Access token
    #[arg(short, long, env = "LAWBUDDY_TOKEN", hide_env_values = true)]
    token: String,

    /// Room to join on every connect
    #[arg(short, long)]
    room: Option<RoomId>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the chat; logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = ClientConfig::from_url(&args.url)?;
    if let Some(room) = &args.room {
        config = config.with_initial_room(room.clone());
    }

    tracing::info!(url = %config.server_url, "starting session");
    let client = Client::new(SystemEnv::new(), config, StaticCredential::new(args.token));
    let session = SessionActor::spawn(client, WebSocketConnector::new());

    let (tx, mut notifications) = mpsc::unbounded_channel::<Notification>();
    session
        .subscribe(Topic::Message, move |notification| {
            tx.send(notification.clone()).map_err(Into::into)
        })
        .await?;
    session.connect().await?;

    let mut repl = Repl { session, active_room: args.room, timed_out: Vec::new() };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    output("type a message, or /help");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(command) = parse(&line)
                    && !repl.run(command).await?
                {
                    break;
                }
            },
            Some(notification) = notifications.recv() => repl.observe(&notification),
        }
    }

    repl.session.dispose().await;
    Ok(())
}

/// Command loop state.
struct Repl {
    session: SessionHandle,
    active_room: Option<RoomId>,
    /// Timed-out messages, oldest first
    timed_out: Vec<EnvelopeId>,
}

impl Repl {
    /// Execute one command. Returns `false` to exit.
    async fn run(&mut self, command: Command) -> Result<bool, SessionClosed> {
        match command {
            Command::Say(content) => match &self.active_room {
                Some(room) => {
                    self.session.send(room.clone(), content, SendOptions::default()).await?;
                },
                None => output("! no active room, /join <room> first"),
            },
            Command::Join(room) => {
                self.session.join_room(room.clone()).await?;
                self.active_room = Some(room);
            },
            Command::Leave(room) => {
                let Some(room) = room.or_else(|| self.active_room.clone()) else {
                    output("! no active room");
                    return Ok(true);
                };
                self.session.leave_room(room.clone()).await?;
                if self.active_room.as_ref() == Some(&room) {
                    self.active_room = None;
                }
            },
            Command::Typing(is_typing) => {
                if let Some(room) = &self.active_room {
                    self.session.set_typing(room.clone(), is_typing).await?;
                }
            },
            Command::Cancel(stream) => self.session.cancel_generation(stream).await?,
            Command::Regenerate(message) => match &self.active_room {
                Some(room) => self.session.regenerate(room.clone(), message).await?,
                None => output("! no active room"),
            },
            Command::Retry => self.retry().await?,
            Command::Health => output(&render::health(&self.session.health().await?)),
            Command::Reconnect => self.session.reconnect().await?,
            Command::Disconnect => self.session.disconnect().await?,
            Command::Help => output(HELP),
            Command::Quit => return Ok(false),
            Command::Invalid(hint) => output(&format!("! {hint}")),
        }
        Ok(true)
    }

    async fn retry(&mut self) -> Result<(), SessionClosed> {
        if self.timed_out.is_empty() {
            output("* nothing to retry");
        }
        for id in std::mem::take(&mut self.timed_out) {
            if self.session.retry(id.clone()).await?.is_some() {
                output(&format!("* resent {id}"));
            }
        }
        Ok(())
    }

    fn observe(&mut self, notification: &Notification) {
        match notification {
            Notification::DeliveryTimeout { id } => self.timed_out.push(id.clone()),
            Notification::RoomLeft { room_id } if self.active_room.as_ref() == Some(room_id) => {
                self.active_room = None;
            },
            _ => {},
        }
        if let Some(line) = render::notification(notification) {
            output(&line);
        }
    }
}

/// Write one line to stdout, ignoring a closed pipe.
fn output(line: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}
