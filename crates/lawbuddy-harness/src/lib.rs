//! Deterministic simulation harness for the LawBuddy session client.
//!
//! - [`SimEnv`]: virtual clock and seeded RNG implementing
//!   [`lawbuddy_core::Environment`]
//! - [`SimDriver`]: synchronous driver executing client actions against a
//!   scripted socket
//! - [`memory_transport`]: in-memory [`lawbuddy_client::Connector`] for
//!   session actor tests
//! - [`frames`]: server frame builders
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! simulated step. Attach [`InvariantRegistry::standard()`] to a driver with
//! [`SimDriver::with_invariants`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod frames;
pub mod invariants;
pub mod memory;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    AttemptsBounded, ErrorLogBounded, Invariant, InvariantRegistry, InvariantResult,
    NoStreamsOffline, QueueBounded, SessionSnapshot, Violation,
};
pub use memory::{MemoryConnector, MemoryServer, ServerSocket, memory_transport};
pub use sim_driver::{SIM_TOKEN, SimDriver};
pub use sim_env::{SimEnv, SimInstant};
