//! Watch engine abstraction and its `notify` implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::events::{EventHandler, FsEvent};

/// Which `notify` backend an engine uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// Platform watcher (inotify, FSEvents, ReadDirectoryChangesW).
    #[default]
    Native,
    /// Periodic directory scan. Works on network mounts.
    Poll,
}

/// Options bound to every engine created by an observer manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: EngineBackend,

    /// Scan interval for the poll backend.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Native,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// A path scheduled on an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHandle {
    pub path: PathBuf,
    pub recursive: bool,
}

/// Capability that detects filesystem changes and dispatches them.
pub trait Engine: Send + Sync {
    /// Register `handler` for events under `path`.
    fn schedule(
        &self,
        handler: Arc<dyn EventHandler>,
        path: &Path,
        recursive: bool,
    ) -> Result<WatchHandle, WatchError>;

    /// Begin monitoring. `name` is passed to handlers with every event.
    fn start(&self, name: &str) -> Result<(), WatchError>;

    /// Ask the engine to quiesce. Returns without waiting.
    fn stop(&self);

    /// Wait for the engine to terminate. Returns `true` once it has,
    /// `false` if `timeout` elapsed first.
    fn join(&self, timeout: Option<Duration>) -> bool;

    fn is_alive(&self) -> bool;
}

struct Watch {
    handle: WatchHandle,
    canonical: Option<PathBuf>,
    handler: Arc<dyn EventHandler>,
}

impl Watch {
    fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.handle.path)
            || self
                .canonical
                .as_deref()
                .is_some_and(|canonical| path.starts_with(canonical))
    }
}

struct Running {
    watcher: Option<Box<dyn Watcher + Send>>,
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

/// [`Engine`] backed by a `notify` watcher and a dispatch thread.
pub struct NotifyEngine {
    config: EngineConfig,
    watches: Arc<Mutex<Vec<Watch>>>,
    running: Mutex<Option<Running>>,
}

impl NotifyEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            watches: Arc::new(Mutex::new(Vec::new())),
            running: Mutex::new(None),
        }
    }

    fn create_watcher(
        &self,
        tx: Sender<notify::Result<notify::Event>>,
    ) -> Result<Box<dyn Watcher + Send>, WatchError> {
        let handler = move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        };
        let watcher: Box<dyn Watcher + Send> = match self.config.backend {
            EngineBackend::Native => Box::new(notify::recommended_watcher(handler)?),
            EngineBackend::Poll => {
                let config = notify::Config::default()
                    .with_poll_interval(Duration::from_millis(self.config.poll_interval_ms));
                Box::new(notify::PollWatcher::new(handler, config)?)
            }
        };
        Ok(watcher)
    }
}

impl Engine for NotifyEngine {
    fn schedule(
        &self,
        handler: Arc<dyn EventHandler>,
        path: &Path,
        recursive: bool,
    ) -> Result<WatchHandle, WatchError> {
        if !path.exists() {
            return Err(WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: "path does not exist".to_string(),
            });
        }
        let handle = WatchHandle {
            path: path.to_path_buf(),
            recursive,
        };
        self.watches.lock().push(Watch {
            handle: handle.clone(),
            canonical: path.canonicalize().ok(),
            handler,
        });
        Ok(handle)
    }

    fn start(&self, name: &str) -> Result<(), WatchError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(WatchError::EngineStartFailed {
                name: name.to_string(),
                reason: "engine already started".to_string(),
            });
        }

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let mut watcher = self.create_watcher(event_tx)?;

        for watch in self.watches.lock().iter() {
            let mode = if watch.handle.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher
                .watch(&watch.handle.path, mode)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: watch.handle.path.clone(),
                    reason: e.to_string(),
                })?;
            crate::debug_event!(name, "watching", "{}", watch.handle.path.display());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let watches = Arc::clone(&self.watches);
        let observer_name = name.to_string();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                dispatch_loop(&observer_name, &watches, &event_rx, &stop_rx);
                drop(done_tx);
            })
            .map_err(|e| WatchError::EngineStartFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        *running = Some(Running {
            watcher: Some(watcher),
            stop_tx: Some(stop_tx),
            done_rx,
            thread: Some(thread),
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(running) = self.running.lock().as_mut() {
            // Disconnecting the stop channel wakes the dispatch loop
            running.stop_tx.take();
            running.watcher.take();
        }
    }

    fn join(&self, timeout: Option<Duration>) -> bool {
        let done_rx = match self.running.lock().as_ref() {
            Some(running) => running.done_rx.clone(),
            None => return true,
        };

        let finished = match timeout {
            Some(timeout) => matches!(
                done_rx.recv_timeout(timeout),
                Err(RecvTimeoutError::Disconnected)
            ),
            None => {
                let _ = done_rx.recv();
                true
            }
        };

        if finished {
            let thread = self
                .running
                .lock()
                .as_mut()
                .and_then(|running| running.thread.take());
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    tracing::error!("[engine] dispatch thread panicked");
                }
            }
        }
        finished
    }

    fn is_alive(&self) -> bool {
        match self.running.lock().as_ref() {
            Some(running) => !matches!(running.done_rx.try_recv(), Err(TryRecvError::Disconnected)),
            None => false,
        }
    }
}

impl Drop for NotifyEngine {
    fn drop(&mut self) {
        self.stop();
        self.join(None);
    }
}

fn dispatch_loop(
    name: &str,
    watches: &Mutex<Vec<Watch>>,
    event_rx: &Receiver<notify::Result<notify::Event>>,
    stop_rx: &Receiver<()>,
) {
    loop {
        let msg = crossbeam_channel::select! {
            recv(stop_rx) -> _ => None,
            recv(event_rx) -> msg => msg.ok(),
        };
        match msg {
            Some(Ok(event)) => {
                let Some(fs_event) = FsEvent::from_notify(&event) else {
                    continue;
                };
                // Hold the lock for the whole dispatch so watches can't
                // change under a running handler
                let watches = watches.lock();
                for watch in watches.iter().filter(|w| w.covers(&fs_event.src_path)) {
                    watch.handler.dispatch(&fs_event, name);
                }
            }
            Some(Err(e)) => tracing::error!("[{name}] file watch error: {e}"),
            None => break,
        }
    }
    crate::debug_event!(name, "dispatch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BaseEventHandler, FsEventKind};
    use std::time::Instant;
    use tempfile::TempDir;

    struct Capture {
        tx: Sender<(FsEventKind, String)>,
    }

    impl EventHandler for Capture {
        fn on_any_event(&self, event: &FsEvent, name: &str) {
            let _ = self.tx.send((event.kind, name.to_string()));
        }
    }

    #[test]
    fn test_schedule_rejects_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let engine = NotifyEngine::new(EngineConfig::default());
        let result = engine.schedule(
            Arc::new(BaseEventHandler),
            &temp_dir.path().join("absent"),
            false,
        );
        assert!(matches!(result, Err(WatchError::PathWatchFailed { .. })));
    }

    #[test]
    fn test_unstarted_engine_is_not_alive() {
        let engine = NotifyEngine::new(EngineConfig::default());
        assert!(!engine.is_alive());
        assert!(engine.join(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_start_stop_join() {
        let temp_dir = TempDir::new().unwrap();
        let engine = NotifyEngine::new(EngineConfig::default());
        engine
            .schedule(Arc::new(BaseEventHandler), temp_dir.path(), false)
            .unwrap();

        engine.start("lifecycle").unwrap();
        assert!(engine.is_alive());
        assert!(!engine.join(Some(Duration::from_millis(50))));

        // Starting twice is refused
        assert!(matches!(
            engine.start("lifecycle"),
            Err(WatchError::EngineStartFailed { .. })
        ));

        engine.stop();
        assert!(engine.join(Some(Duration::from_secs(5))));
        assert!(!engine.is_alive());
    }

    #[test]
    fn test_events_reach_handler_with_observer_name() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let engine = NotifyEngine::new(EngineConfig::default());
        engine
            .schedule(Arc::new(Capture { tx }), temp_dir.path(), false)
            .unwrap();
        engine.start("docs").unwrap();

        std::fs::write(temp_dir.path().join("new.txt"), "hello").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            if let Ok(item) = rx.recv_timeout(Duration::from_millis(100)) {
                seen.push(item);
                if seen.iter().any(|(kind, _)| *kind == FsEventKind::Created) {
                    break;
                }
            }
        }

        engine.stop();
        engine.join(None);

        assert!(
            seen.iter()
                .any(|(kind, name)| *kind == FsEventKind::Created && name == "docs"),
            "expected a created event, got {seen:?}"
        );
    }
}
