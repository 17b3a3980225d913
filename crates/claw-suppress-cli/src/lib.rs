//! # claw-suppress-cli
//!
//! Operator command-line interface for the Clawbernetes alert suppression
//! engine.
//!
//! Provides commands for:
//! - Creating, listing, updating, expiring, and deleting silences
//! - Feeding firing and resolved alerts into the inhibition population
//! - Checking whether an alert is silenced or inhibited
//! - Inspecting active inhibitions, rules, and state counts
//!
//! State lives in a directory of JSON snapshots, so consecutive invocations
//! see each other's silences, alerts, and inhibitions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use commands::{SuppressCommand, open_engine};
pub use error::CliError;
pub use output::OutputFormat;
