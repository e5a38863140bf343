//! Blocking observer runs and the thread/process fan-out.

use std::path::Path;
use std::process::{Child, Command};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Shutdown;
use crate::error::{WatchError, WorkerFailure};
use crate::observer::{EngineBackend, Observer};
use crate::registry::Named;

/// How often the process supervisor checks its children.
const CHILD_POLL: Duration = Duration::from_millis(100);

/// Subcommand a process worker runs.
pub const OBSERVE_SUBCOMMAND: &str = "observe";

/// Start `observer` and block according to `duration`.
///
/// A zero `duration` blocks until `shutdown` trips or the engine dies on
/// its own; a tripped shutdown stops the engine and waits for it. A
/// non-zero `duration` returns once it elapses and leaves the engine
/// running.
pub fn run_observer(
    observer: &Observer,
    duration: Duration,
    grain: Duration,
    shutdown: &Shutdown,
) -> Result<(), WatchError> {
    observer.start()?;

    let deadline = (!duration.is_zero()).then(|| Instant::now() + duration);
    loop {
        if shutdown.is_triggered() {
            observer.stop();
            observer.join(None);
            crate::log_event!(observer.name(), "stopped");
            return Ok(());
        }

        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    crate::debug_event!(observer.name(), "lifetime elapsed");
                    return Ok(());
                }
                remaining.min(grain)
            }
            None => grain,
        };

        if observer.join(Some(wait)) {
            crate::log_event!(observer.name(), "engine exited");
            return Ok(());
        }
    }
}

/// Run every observer on its own named thread and collect failures.
pub fn start_threads(
    observers: &[Arc<Observer>],
    duration: Duration,
    grain: Duration,
    shutdown: &Shutdown,
) -> Vec<WorkerFailure> {
    std::thread::scope(|scope| {
        let mut failures = Vec::new();
        let mut workers = Vec::with_capacity(observers.len());

        for observer in observers {
            let spawned = std::thread::Builder::new()
                .name(observer.name().to_string())
                .spawn_scoped(scope, move || run_observer(observer, duration, grain, shutdown));
            match spawned {
                Ok(handle) => workers.push((observer.name(), handle)),
                Err(e) => failures.push(failure(observer.name(), e.to_string())),
            }
        }

        for (name, handle) in workers {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(failure(name, e.to_string())),
                Err(_) => failures.push(failure(name, "worker panicked".to_string())),
            }
        }
        failures
    })
}

/// How to launch process workers.
///
/// Handler and engine options come from each observer, as bound when it
/// was created.
#[derive(Debug, Clone)]
pub struct WorkerSpec<'a> {
    pub program: &'a Path,
    pub duration: Duration,
    /// Settings file the parent was started with, if any.
    pub config: Option<&'a Path>,
}

impl WorkerSpec<'_> {
    /// Build the command that runs `observer` in a child process.
    pub fn command(&self, observer: &Observer) -> Command {
        let handler = observer.handler_config();
        let engine = observer.engine_config();

        let mut command = Command::new(self.program);
        if let Some(config) = self.config {
            command.arg("--config").arg(config);
        }
        command
            .arg(OBSERVE_SUBCOMMAND)
            .arg("--name")
            .arg(observer.name())
            .arg("--path")
            .arg(observer.path())
            .arg("--duration-ms")
            .arg(self.duration.as_millis().to_string())
            .arg("--handler")
            .arg(&handler.kind)
            .arg("--engine")
            .arg(match engine.backend {
                EngineBackend::Native => "native",
                EngineBackend::Poll => "poll",
            })
            .arg("--poll-interval-ms")
            .arg(engine.poll_interval_ms.to_string());
        if observer.recursive() {
            command.arg("--recursive");
        }
        if handler.filter_dir_modified {
            command.arg("--filter-dir-modified");
        }
        if let Some(log_file) = &handler.log_file {
            command.arg("--log-file").arg(log_file);
        }
        command
    }
}

/// Run every observer in its own child process and collect failures.
///
/// Children get their own copy of the observer state. A tripped shutdown
/// forwards SIGINT to every child, then waits for all of them.
pub fn start_processes(
    observers: &[Arc<Observer>],
    spec: &WorkerSpec<'_>,
    shutdown: &Shutdown,
) -> Vec<WorkerFailure> {
    let mut failures = Vec::new();
    let mut children: Vec<(String, Child)> = Vec::with_capacity(observers.len());

    for observer in observers {
        match spec.command(observer).spawn() {
            Ok(child) => {
                crate::debug_event!(observer.name(), "worker spawned", "pid {}", child.id());
                children.push((observer.name().to_string(), child));
            }
            Err(e) => failures.push(failure(observer.name(), e.to_string())),
        }
    }

    let mut interrupted = false;
    while !children.is_empty() {
        if shutdown.is_triggered() && !interrupted {
            interrupted = true;
            for (name, child) in &children {
                if let Err(e) = crate::process::send_signal(child.id(), libc::SIGINT) {
                    tracing::warn!("[{name}] failed to interrupt worker: {e}");
                }
            }
        }

        children.retain_mut(|(name, child)| match child.try_wait() {
            Ok(Some(status)) if status.success() => false,
            Ok(Some(status)) => {
                failures.push(failure(name, format!("worker exited with {status}")));
                false
            }
            Ok(None) => true,
            Err(e) => {
                failures.push(failure(name, e.to_string()));
                false
            }
        });

        if !children.is_empty() {
            std::thread::sleep(CHILD_POLL);
        }
    }
    failures
}

fn failure(name: &str, reason: String) -> WorkerFailure {
    WorkerFailure {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BaseEventHandler, HandlerConfig};
    use crate::observer::{EngineConfig, NotifyEngine};
    use tempfile::TempDir;

    fn observer(name: &str, dir: &Path) -> Arc<Observer> {
        Arc::new(
            Observer::new(
                name,
                dir,
                false,
                Box::new(NotifyEngine::new(EngineConfig::default())),
                Arc::new(BaseEventHandler),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_bounded_run_leaves_engine_running() {
        let temp_dir = TempDir::new().unwrap();
        let obs = observer("bounded", temp_dir.path());

        let started = Instant::now();
        run_observer(
            &obs,
            Duration::from_millis(200),
            Duration::from_secs(1),
            &Shutdown::new(),
        )
        .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!obs.join(Some(Duration::from_millis(10))));

        obs.stop();
        obs.join(None);
    }

    #[test]
    fn test_interrupt_stops_unbounded_run() {
        let temp_dir = TempDir::new().unwrap();
        let obs = observer("unbounded", temp_dir.path());
        let shutdown = Shutdown::new();

        let trigger = shutdown.clone();
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            trigger.trigger();
        });

        let started = Instant::now();
        run_observer(&obs, Duration::ZERO, Duration::from_millis(100), &shutdown).unwrap();
        interrupter.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(obs.state(), crate::observer::EngineState::Stopped);
    }

    #[test]
    fn test_worker_command_carries_observer_config() {
        let temp_dir = TempDir::new().unwrap();
        let handler = HandlerConfig::default()
            .filter_dir_modified(true)
            .log_file("/tmp/out.log");
        let obs = Observer::new(
            "cmd",
            temp_dir.path(),
            false,
            Box::new(NotifyEngine::new(EngineConfig::default())),
            Arc::new(BaseEventHandler),
        )
        .unwrap()
        .with_config(handler, EngineConfig::default());
        let spec = WorkerSpec {
            program: Path::new("/usr/bin/watchplus"),
            duration: Duration::from_secs(2),
            config: None,
        };

        let command = spec.command(&obs);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(command.get_program(), "/usr/bin/watchplus");
        assert_eq!(args[0], OBSERVE_SUBCOMMAND);
        assert!(args.windows(2).any(|w| w == ["--name", "cmd"]));
        assert!(args.windows(2).any(|w| w == ["--duration-ms", "2000"]));
        assert!(args.windows(2).any(|w| w == ["--handler", "log"]));
        assert!(args.windows(2).any(|w| w == ["--log-file", "/tmp/out.log"]));
        assert!(args.contains(&"--filter-dir-modified".to_string()));
        assert!(!args.contains(&"--recursive".to_string()));
        assert!(!args.contains(&"--config".to_string()));
    }

    #[test]
    fn test_worker_command_passes_settings_file_first() {
        let temp_dir = TempDir::new().unwrap();
        let obs = observer("cfg", temp_dir.path());
        let spec = WorkerSpec {
            program: Path::new("watchplus"),
            duration: Duration::ZERO,
            config: Some(Path::new("/etc/watchplus/settings.toml")),
        };

        let command = spec.command(&obs);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args[..3],
            ["--config", "/etc/watchplus/settings.toml", OBSERVE_SUBCOMMAND]
        );
    }

    #[test]
    fn test_failed_spawns_are_collected() {
        let temp_dir = TempDir::new().unwrap();
        let observers = vec![
            observer("one", temp_dir.path()),
            observer("two", temp_dir.path()),
        ];
        let missing = temp_dir.path().join("no-such-program");
        let spec = WorkerSpec {
            program: &missing,
            duration: Duration::from_millis(100),
            config: None,
        };

        let failures = start_processes(&observers, &spec, &Shutdown::new());
        let names: Vec<&str> = failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }
}
