//! Invariant checking for deterministic simulation.
//!
//! Invariants are properties that must hold after every step, whatever the
//! sequence of events. [`SessionSnapshot`] captures the observable state of
//! one client and [`InvariantRegistry`] runs every registered check against
//! it.

use lawbuddy_client::{Client, ConnectionState, Environment, HealthSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Observable client state plus the bounds it must respect.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Diagnostics at the time of the snapshot.
    pub health: HealthSnapshot,
    /// Configured reconnect limit.
    pub max_reconnect_attempts: u32,
    /// Configured offline queue bound.
    pub queue_capacity: usize,
    /// Configured recent error bound.
    pub recent_error_limit: usize,
}

impl SessionSnapshot {
    /// Capture a client.
    pub fn from_client<E: Environment>(client: &Client<E>) -> Self {
        let config = client.config();
        Self {
            health: client.health(),
            max_reconnect_attempts: config.connection.max_reconnect_attempts,
            queue_capacity: config.delivery.queue_capacity,
            recent_error_limit: config.recent_error_limit,
        }
    }
}

/// A property checked against every snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// The offline queue never exceeds its capacity.
pub struct QueueBounded;

impl Invariant for QueueBounded {
    fn name(&self) -> &'static str {
        "queue_bounded"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let depth = state.health.queue_depth;
        if depth > state.queue_capacity || state.health.failed_messages > state.queue_capacity {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "queue depth {depth}, failed {}, capacity {}",
                    state.health.failed_messages, state.queue_capacity
                ),
            });
        }
        Ok(())
    }
}

/// Reconnect attempts never exceed the configured maximum.
pub struct AttemptsBounded;

impl Invariant for AttemptsBounded {
    fn name(&self) -> &'static str {
        "attempts_bounded"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.health.attempts > state.max_reconnect_attempts {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} attempts, maximum {}",
                    state.health.attempts, state.max_reconnect_attempts
                ),
            });
        }
        Ok(())
    }
}

/// Streams only stay open while connected.
pub struct NoStreamsOffline;

impl Invariant for NoStreamsOffline {
    fn name(&self) -> &'static str {
        "no_streams_offline"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let open = state.health.open_streams;
        if state.health.state != ConnectionState::Connected && open > 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{open} open streams while {}", state.health.state),
            });
        }
        Ok(())
    }
}

/// The recent error log stays within its bound.
pub struct ErrorLogBounded;

impl Invariant for ErrorLogBounded {
    fn name(&self) -> &'static str {
        "error_log_bounded"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let len = state.health.recent_errors.len();
        if len > state.recent_error_limit {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{len} recent errors, limit {}", state.recent_error_limit),
            });
        }
        Ok(())
    }
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every invariant in this module.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(QueueBounded);
        registry.add(AttemptsBounded);
        registry.add(NoStreamsOffline);
        registry.add(ErrorLogBounded);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, returning every violation found.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic, reason = "harness assertions fail the running test")]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }
}

#[cfg(test)]
mod tests {
    use lawbuddy_client::{ClientConfig, StaticCredential};

    use super::*;
    use crate::SimEnv;

    #[test]
    fn fresh_client_satisfies_standard_invariants() {
        let client =
            Client::new(SimEnv::new(), ClientConfig::local().unwrap(), StaticCredential::new("t"));
        let snapshot = SessionSnapshot::from_client(&client);
        assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
    }

    #[test]
    fn reports_attempts_over_limit() {
        let client =
            Client::new(SimEnv::new(), ClientConfig::local().unwrap(), StaticCredential::new("t"));
        let mut snapshot = SessionSnapshot::from_client(&client);
        snapshot.health.attempts = snapshot.max_reconnect_attempts + 1;

        let violations = InvariantRegistry::standard().check_all(&snapshot).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "attempts_bounded");
    }
}
