//! CLI
//!
//! Line-oriented terminal front end for a LawBuddy chat session: input
//! parsing in [`command`], notification and diagnostics formatting in
//! [`render`]. The binary wires both to a
//! [`lawbuddy_client::SessionHandle`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod render;

pub use command::{Command, HELP, parse};
