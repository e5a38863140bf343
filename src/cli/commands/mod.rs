//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod init;
pub mod service;
pub mod watch;

use std::path::Path;

use super::Commands;
use crate::config::Settings;
use crate::manager::Shutdown;

/// Run `command` to completion.
///
/// `config_path` is the settings file given with `--config`, if any.
pub fn dispatch(
    command: Commands,
    settings: &Settings,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(settings),
        Commands::Watch(args) => watch::run_watch(args, settings, config_path, interruptible()?),
        Commands::Observe(args) => watch::run_observe(args, settings, interruptible()?),
        Commands::RunService { script } => {
            crate::service::run_service(&script, settings, interruptible()?)?;
            Ok(())
        }
        Commands::Service { action } => service::run(action, settings),
    }
}

/// A shutdown flag tripped by Ctrl-C.
fn interruptible() -> anyhow::Result<Shutdown> {
    let shutdown = Shutdown::new();
    shutdown.install_ctrlc_handler()?;
    Ok(shutdown)
}
