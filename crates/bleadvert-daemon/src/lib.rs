//! # bleadvert-daemon
//!
//! Process plumbing for the `bleadvert` binary: command-line parsing, logging
//! setup, and signal handling.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod cli;
pub mod logging;
pub mod shutdown;
