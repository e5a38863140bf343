//! The service side: what a launched script actually runs.

use std::path::Path;
use std::time::Duration;

use super::ServiceScript;
use super::pid::write_sidecar;
use crate::config::Settings;
use crate::error::ServiceError;
use crate::events::HandlerConfig;
use crate::manager::{ObserverManagerBuilder, Shutdown};

/// Run the observer described by the script at `script_path` until
/// `shutdown` trips.
///
/// The process records its PID next to the script first, and removes
/// that record again on a graceful exit.
pub fn run_service(
    script_path: &Path,
    settings: &Settings,
    shutdown: Shutdown,
) -> Result<(), ServiceError> {
    let script = ServiceScript::load(script_path)?;
    let pid_file = script_path.with_extension("pid");
    write_sidecar(&pid_file).map_err(|e| ServiceError::io(&pid_file, e))?;
    crate::log_event!(
        "service",
        "running",
        "{} watching {} (pid {})",
        script.name,
        script.path.display(),
        std::process::id()
    );

    let result = watch(&script, settings, shutdown);

    if let Err(e) = std::fs::remove_file(&pid_file) {
        tracing::warn!("[service] could not remove {}: {e}", pid_file.display());
    }
    result
}

fn watch(
    script: &ServiceScript,
    settings: &Settings,
    shutdown: Shutdown,
) -> Result<(), ServiceError> {
    let handler = HandlerConfig::default()
        .with_kind(script.handler.as_str())
        .filter_dir_modified(script.filter_dir_modified)
        .log_file(&script.log_file);

    let mut manager = ObserverManagerBuilder::from_settings(settings)
        .handler_config(handler)
        .shutdown(shutdown)
        .build();

    manager.create_observer(&script.path, &script.name, script.recursive)?;
    manager.start_observer(script.name.as_str(), Duration::ZERO)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_service_writes_and_removes_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        std::fs::create_dir(&watched).unwrap();
        let script_path = temp_dir.path().join("docs_service.toml");
        let pid_file = temp_dir.path().join("docs_service.pid");
        ServiceScript::new("docs", &watched, temp_dir.path().join("events.log"))
            .write(Path::new("/usr/bin/watchplus"), &script_path)
            .unwrap();

        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let sidecar = pid_file.clone();
        let stopper = std::thread::spawn(move || {
            let mut seen = None;
            for _ in 0..50 {
                std::thread::sleep(Duration::from_millis(20));
                if let Some(pid) = crate::service::pid::read_sidecar(&sidecar) {
                    seen = Some(pid);
                    break;
                }
            }
            trigger.trigger();
            seen
        });

        let mut settings = Settings::default();
        settings.observer.poll_grain_ms = 50;
        run_service(&script_path, &settings, shutdown).unwrap();

        assert_eq!(stopper.join().unwrap(), Some(std::process::id()));
        assert!(!pid_file.exists());
    }

    #[test]
    fn test_missing_watch_path_fails_and_cleans_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let script_path = temp_dir.path().join("gone_service.toml");
        let log_file = temp_dir.path().join("events.log");
        ServiceScript::new("gone", temp_dir.path().join("missing"), log_file)
            .write(Path::new("/usr/bin/watchplus"), &script_path)
            .unwrap();

        let result = run_service(&script_path, &Settings::default(), Shutdown::new());

        assert!(matches!(result, Err(ServiceError::Watch(_))));
        assert!(!temp_dir.path().join("gone_service.pid").exists());
    }
}
