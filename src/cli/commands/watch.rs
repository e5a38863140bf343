//! Watch and Observe commands.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::cli::{ObserveArgs, WatchArgs};
use crate::config::Settings;
use crate::events::HandlerConfig;
use crate::manager::{ObserverManager, ObserverManagerBuilder, Shutdown};
use crate::observer::EngineConfig;

/// Run watch command - observe every target until done or interrupted.
pub fn run_watch(
    args: WatchArgs,
    settings: &Settings,
    config_path: Option<&Path>,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    let mut handler = settings.handler.clone();
    if let Some(kind) = args.handler {
        handler.kind = kind;
    }
    if args.filter_dir_modified {
        handler.filter_dir_modified = true;
    }
    if let Some(log_file) = args.log_file {
        handler.log_file = Some(log_file);
    }
    let recursive = args.recursive || settings.observer.recursive;
    let method = args.method.unwrap_or(settings.observer.start_method);

    let mut manager = ObserverManagerBuilder::from_settings(settings)
        .handler_config(handler)
        .worker_config(config_path.map(Path::to_path_buf))
        .shutdown(shutdown)
        .build();

    let observers = manager.create_observers(
        args.targets
            .iter()
            .map(|target| (target.path.as_path(), target.name.as_str())),
        recursive,
    )?;

    let names: Vec<&str> = args.targets.iter().map(|t| t.name.as_str()).collect();
    println!(
        "Watching {} target(s) with {method:?} workers: {}",
        observers.len(),
        names.join(", ")
    );

    manager
        .start_observers(names, Duration::from_secs(args.duration), method)
        .context("watch ended with failures")?;
    Ok(())
}

/// Run observe command - the body of one process worker.
pub fn run_observe(
    args: ObserveArgs,
    settings: &Settings,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    let handler = HandlerConfig {
        kind: args.handler,
        filter_dir_modified: args.filter_dir_modified,
        log_file: args.log_file,
    };
    let engine = EngineConfig {
        backend: args.engine,
        poll_interval_ms: args.poll_interval_ms,
    };

    let mut manager = ObserverManager::builder()
        .engine_config(engine)
        .handler_config(handler)
        .settings(settings.observer.clone())
        .shutdown(shutdown)
        .build();

    manager.create_observer(&args.path, &args.name, args.recursive)?;
    manager.start_observer(args.name.as_str(), Duration::from_millis(args.duration_ms))?;
    Ok(())
}
