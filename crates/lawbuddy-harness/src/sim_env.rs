//! Simulated environment: virtual clock and seeded RNG.
//!
//! Time only moves when a test calls [`SimEnv::advance`] (or awaits
//! [`Environment::sleep`]), so timer behavior is reproducible down to the
//! millisecond. Clones share the same clock and RNG.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use lawbuddy_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock origin of every simulation: 2025-01-01T00:00:00Z.
const SIM_EPOCH_SECS: i64 = 1_735_689_600;

/// Virtual instant: time since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

struct SimState {
    now: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic environment for tests.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment whose RNG is seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: Duration::ZERO, rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        self.with_state(|state| state.now += duration);
    }

    /// Time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.with_state(|state| state.now)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::MAX);
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(SIM_EPOCH_SECS) + elapsed
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let env = self.clone();
        async move {
            env.advance(duration);
            tokio::task::yield_now().await;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.with_state(|state| state.rng.fill_bytes(buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = SimEnv::new();
        let t0 = env.now();
        assert_eq!(env.now(), t0);

        env.advance(Duration::from_millis(1500));
        assert_eq!(env.now() - t0, Duration::from_millis(1500));
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::new();
        let clone = env.clone();
        clone.advance(Duration::from_secs(3));
        assert_eq!(env.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        let c = SimEnv::with_seed(43);

        let seq_a: Vec<_> = (0..8).map(|_| a.random_u64()).collect();
        let seq_b: Vec<_> = (0..8).map(|_| b.random_u64()).collect();
        let seq_c: Vec<_> = (0..8).map(|_| c.random_u64()).collect();

        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a, seq_c);
    }

    #[test]
    fn wall_clock_tracks_virtual_time() {
        let env = SimEnv::new();
        let start = env.wall_clock();
        env.advance(Duration::from_secs(90));
        assert_eq!(env.wall_clock() - start, TimeDelta::seconds(90));
        assert_eq!(start.timestamp(), SIM_EPOCH_SECS);
    }

    #[test]
    fn earlier_minus_later_saturates() {
        let early = SimInstant::default();
        let late = early + Duration::from_secs(1);
        assert_eq!(early - late, Duration::ZERO);
    }
}
