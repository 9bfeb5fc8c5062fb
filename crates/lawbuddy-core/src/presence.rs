//! Presence and typing indicators.
//!
//! Remote typing entries expire after the typing timeout even if the server
//! never sends a stop; the periodic sweep synthesizes the stop. Presence is
//! only tracked for rooms this client has joined.
//!
//! [`LocalTyping`] covers the outbound direction: it rate limits `typing`
//! frames while the user types and emits a stop after local inactivity.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Sub,
    time::Duration,
};

use lawbuddy_proto::{RoomId, UserId};

/// Remote typing entry lifetime without a refresh.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Minimum spacing between sweeps of stale typing entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum spacing between outbound `typing: true` frames.
pub const DEFAULT_LOCAL_DEBOUNCE: Duration = Duration::from_secs(1);

/// Local inactivity after which `typing: false` is sent.
pub const DEFAULT_LOCAL_IDLE: Duration = Duration::from_secs(1);

/// Presence and typing configuration
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Remote typing expiry
    pub typing_timeout: Duration,
    /// Sweep spacing
    pub sweep_interval: Duration,
    /// Outbound typing rate limit
    pub local_debounce: Duration,
    /// Outbound idle stop
    pub local_idle: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            local_debounce: DEFAULT_LOCAL_DEBOUNCE,
            local_idle: DEFAULT_LOCAL_IDLE,
        }
    }
}

/// Online status of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceStatus {
    /// In the room
    Online,
    /// Left the room
    Offline,
}

/// Last known presence of a participant in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceRecord<I> {
    /// Status
    pub status: PresenceStatus,
    /// Last activity observed
    pub last_seen: I,
}

/// Observable presence or typing transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceUpdate {
    /// Typing started or stopped
    Typing {
        /// Room
        room_id: RoomId,
        /// Participant
        user_id: UserId,
        /// New typing state
        is_typing: bool,
    },

    /// Participant came online or went offline
    Presence {
        /// Room
        room_id: RoomId,
        /// Participant
        user_id: UserId,
        /// New status
        status: PresenceStatus,
    },
}

type Key = (RoomId, UserId);

/// Remote presence and typing state.
///
/// Ordered maps keep sweep output deterministic.
#[derive(Debug, Clone)]
pub struct PresenceTracker<I> {
    config: PresenceConfig,
    self_user: Option<UserId>,
    rooms: BTreeMap<RoomId, BTreeSet<UserId>>,
    presence: HashMap<Key, PresenceRecord<I>>,
    typing: BTreeMap<Key, I>,
    last_sweep: Option<I>,
}

impl<I> PresenceTracker<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty tracker.
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            self_user: None,
            rooms: BTreeMap::new(),
            presence: HashMap::new(),
            typing: BTreeMap::new(),
            last_sweep: None,
        }
    }

    /// Set the local user id, so our own echoes are not reported.
    pub fn set_self(&mut self, user_id: UserId) {
        self.self_user = Some(user_id);
    }

    /// Local user id, once known.
    pub fn self_user(&self) -> Option<&str> {
        self.self_user.as_deref()
    }

    /// The client joined `room_id`. Idempotent.
    pub fn join_room(&mut self, room_id: RoomId) {
        self.rooms.entry(room_id).or_default();
    }

    /// The client left `room_id`: forget its members and typing entries.
    pub fn leave_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
        self.presence.retain(|(room, _), _| room != room_id);
        self.typing.retain(|(room, _), _| room != room_id);
    }

    /// Whether the client has joined `room_id`.
    pub fn is_joined(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Rooms the client has joined, sorted.
    pub fn joined_rooms(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    /// A participant joined a room.
    pub fn join(&mut self, room_id: &str, user_id: &str, now: I) -> Vec<PresenceUpdate> {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };
        members.insert(user_id.to_string());

        let key = (room_id.to_string(), user_id.to_string());
        let previous = self
            .presence
            .insert(key, PresenceRecord { status: PresenceStatus::Online, last_seen: now });

        if previous.is_some_and(|record| record.status == PresenceStatus::Online) {
            return Vec::new();
        }
        vec![PresenceUpdate::Presence {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            status: PresenceStatus::Online,
        }]
    }

    /// A participant left a room. Their typing entry is cleared; if the
    /// participant is the local user, the whole room is forgotten.
    pub fn leave(&mut self, room_id: &str, user_id: &str, now: I) -> Vec<PresenceUpdate> {
        if !self.is_joined(room_id) {
            return Vec::new();
        }
        if self.self_user.as_deref() == Some(user_id) {
            self.leave_room(room_id);
            return Vec::new();
        }

        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(user_id);
        }

        let key = (room_id.to_string(), user_id.to_string());
        let mut updates = Vec::new();
        if self.typing.remove(&key).is_some() {
            updates.push(PresenceUpdate::Typing {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                is_typing: false,
            });
        }

        let previous = self
            .presence
            .insert(key, PresenceRecord { status: PresenceStatus::Offline, last_seen: now });
        if previous.is_none_or(|record| record.status != PresenceStatus::Offline) {
            updates.push(PresenceUpdate::Presence {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                status: PresenceStatus::Offline,
            });
        }
        updates
    }

    /// Remote typing signal.
    ///
    /// A refresh of an already-typing user only extends the entry.
    pub fn remote_typing(
        &mut self,
        room_id: &str,
        user_id: &str,
        is_typing: bool,
        now: I,
    ) -> Option<PresenceUpdate> {
        if !self.is_joined(room_id) || self.self_user.as_deref() == Some(user_id) {
            return None;
        }

        let key = (room_id.to_string(), user_id.to_string());
        if let Some(record) = self.presence.get_mut(&key) {
            record.last_seen = now;
        }

        let changed = if is_typing {
            self.typing.insert(key, now).is_none()
        } else {
            self.typing.remove(&key).is_some()
        };

        changed.then(|| PresenceUpdate::Typing {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            is_typing,
        })
    }

    /// Remove stale typing entries and synthesize their stops.
    ///
    /// Runs at most once per sweep interval.
    pub fn sweep(&mut self, now: I) -> Vec<PresenceUpdate> {
        if let Some(last) = self.last_sweep
            && now - last < self.config.sweep_interval
        {
            return Vec::new();
        }
        self.last_sweep = Some(now);

        let timeout = self.config.typing_timeout;
        let stale: Vec<Key> = self
            .typing
            .iter()
            .filter(|(_, since)| now - **since >= timeout)
            .map(|(key, _)| key.clone())
            .collect();

        stale
            .into_iter()
            .map(|key| {
                self.typing.remove(&key);
                let (room_id, user_id) = key;
                PresenceUpdate::Typing { room_id, user_id, is_typing: false }
            })
            .collect()
    }

    /// Users currently typing in `room_id`, sorted. Stale entries are
    /// filtered even if the sweep has not run yet.
    pub fn typing_users(&self, room_id: &str, now: I) -> Vec<UserId> {
        self.typing
            .iter()
            .filter(|((room, _), since)| {
                room == room_id && now - **since < self.config.typing_timeout
            })
            .map(|((_, user), _)| user.clone())
            .collect()
    }

    /// Known members of `room_id`, sorted.
    pub fn members(&self, room_id: &str) -> Vec<UserId> {
        self.rooms.get(room_id).map(|m| m.iter().cloned().collect()).unwrap_or_default()
    }

    /// Presence record of a participant.
    pub fn presence(&self, room_id: &str, user_id: &str) -> Option<&PresenceRecord<I>> {
        self.presence.get(&(room_id.to_string(), user_id.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalState<I> {
    last_sent: I,
    last_input: I,
}

/// Outbound typing state for the local user.
#[derive(Debug, Clone)]
pub struct LocalTyping<I> {
    config: PresenceConfig,
    active: BTreeMap<RoomId, LocalState<I>>,
}

impl<I> LocalTyping<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create with nothing active.
    pub fn new(config: PresenceConfig) -> Self {
        Self { config, active: BTreeMap::new() }
    }

    /// Local keystroke in `room_id`. Returns `Some(true)` when a `typing`
    /// frame should be sent.
    pub fn input(&mut self, room_id: &str, now: I) -> Option<bool> {
        match self.active.get_mut(room_id) {
            Some(state) => {
                state.last_input = now;
                if now - state.last_sent >= self.config.local_debounce {
                    state.last_sent = now;
                    Some(true)
                } else {
                    None
                }
            },
            None => {
                let state = LocalState { last_sent: now, last_input: now };
                self.active.insert(room_id.to_string(), state);
                Some(true)
            },
        }
    }

    /// Explicit stop (message sent, input cleared). `Some(false)` if typing
    /// was active.
    pub fn stop(&mut self, room_id: &str) -> Option<bool> {
        self.active.remove(room_id).map(|_| false)
    }

    /// Rooms whose local input went idle; each needs a `typing: false`.
    pub fn tick(&mut self, now: I) -> Vec<RoomId> {
        let idle = self.config.local_idle;
        let rooms: Vec<RoomId> = self
            .active
            .iter()
            .filter(|(_, state)| now - state.last_input >= idle)
            .map(|(room, _)| room.clone())
            .collect();
        for room in &rooms {
            self.active.remove(room);
        }
        rooms
    }

    /// Whether the local user is typing in `room_id`.
    pub fn is_active(&self, room_id: &str) -> bool {
        self.active.contains_key(room_id)
    }

    /// Forget all local typing state (disconnect).
    pub fn clear(&mut self) {
        self.active.clear();
    }
}
