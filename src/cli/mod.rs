//! CLI module for watchplus.
//!
//! Provides command-line interface parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, ObserveArgs, ServiceAction, ServiceRef, WatchArgs, WatchTarget};
