//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, Commands enum, and all subcommand enums.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::manager::StartMethod;
use crate::observer::EngineBackend;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Filesystem observers and detached watch services
#[derive(Parser, Debug)]
#[command(
    name = "watchplus",
    version = env!("CARGO_PKG_VERSION"),
    about = "Filesystem observers and detached watch services",
    long_about = "Watch directories in the foreground, or run watchers as background services.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "WATCHPLUS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .watchplus directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    #[command(about = "Display active settings")]
    Config,

    /// Watch directories until the duration elapses or Ctrl-C
    #[command(
        after_help = "Examples:\n  watchplus watch docs=./docs src=./src --recursive\n  watchplus watch logs=/var/log --duration 60 --method process"
    )]
    Watch(WatchArgs),

    /// Run a single observer (used by process workers)
    #[command(hide = true)]
    Observe(ObserveArgs),

    /// Run a generated service script (used by launched services)
    #[command(name = "run-service", hide = true)]
    RunService {
        /// Path to the service script
        script: PathBuf,
    },

    /// Manage background watch services
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

/// A `NAME=PATH` pair given to `watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub name: String,
    pub path: PathBuf,
}

fn parse_target(raw: &str) -> Result<WatchTarget, String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok(WatchTarget {
            name: name.to_string(),
            path: PathBuf::from(path),
        }),
        _ => Err(format!("expected NAME=PATH, got '{raw}'")),
    }
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Observers to run, as NAME=PATH
    #[arg(value_name = "NAME=PATH", required = true, value_parser = parse_target)]
    pub targets: Vec<WatchTarget>,

    /// Watch subdirectories too (overrides config)
    #[arg(short, long)]
    pub recursive: bool,

    /// Seconds to run; 0 runs until interrupted
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,

    /// Worker backend (overrides config)
    #[arg(short, long, value_enum)]
    pub method: Option<StartMethod>,

    /// Built-in handler name (overrides config)
    #[arg(long)]
    pub handler: Option<String>,

    /// Skip "modified" events on directories
    #[arg(long)]
    pub filter_dir_modified: bool,

    /// Append event lines to this file instead of the log output
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ObserveArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub path: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub duration_ms: u64,

    #[arg(long, default_value = "log")]
    pub handler: String,

    #[arg(long, value_enum, default_value_t = EngineBackend::Native)]
    pub engine: EngineBackend,

    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long)]
    pub recursive: bool,

    #[arg(long)]
    pub filter_dir_modified: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Where an existing service lives, for commands run after `create`.
#[derive(Args, Debug)]
pub struct ServiceRef {
    /// Service name
    pub name: String,

    /// Service directory (defaults to "<base_dir>/<name> watchplus-service")
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Write a service script
    Create {
        /// Service name
        name: String,

        /// Directory to watch
        path: PathBuf,

        /// File the handler appends events to (defaults to
        /// "<dir>/<name>_events.log"; `clean` keeps it)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Service directory (defaults to "<base_dir>/<name> watchplus-service")
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Built-in handler name
        #[arg(long)]
        handler: Option<String>,

        /// Watch subdirectories too
        #[arg(short, long)]
        recursive: bool,

        /// Skip "modified" events on directories
        #[arg(long)]
        filter_dir_modified: bool,

        /// Launch right after writing the script
        #[arg(long)]
        start: bool,
    },

    /// Launch a created service in the background
    Start(ServiceRef),

    /// Kill a running service
    Stop(ServiceRef),

    /// Remove the service's script, output and pid files
    Clean(ServiceRef),

    /// Kill a running service, then remove its files
    #[command(name = "clean-stop")]
    CleanStop(ServiceRef),

    /// Print the PID of a running service
    Pid(ServiceRef),

    /// Send a signal number to a running service
    Signal {
        #[command(flatten)]
        service: ServiceRef,

        /// Signal number, e.g. 15 for SIGTERM
        #[arg(short, long)]
        signal: i32,
    },

    /// Restart a service from its script
    Reload(ServiceRef),

    /// Show what is known about a service
    Status {
        #[command(flatten)]
        service: ServiceRef,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
