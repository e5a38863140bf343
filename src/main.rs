use std::process::ExitCode;

use clap::Parser;
use watchplus::cli::{Cli, commands};
use watchplus::config::Settings;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    watchplus::logging::init_with_config(&settings.logging);

    match commands::dispatch(cli.command, &settings, cli.config.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
