//! Observers: one watched path, one handler, one engine.
//!
//! # Architecture
//!
//! ```text
//! Observer
//!   - name (immutable)
//!   - WatchHandle (path + recursion flag)
//!   - HandlerConfig / EngineConfig bound at creation
//!   - Arc<dyn EventHandler>
//!   - Box<dyn Engine>  -> dispatch thread -> handler.dispatch(event, name)
//! ```

mod engine;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use engine::{Engine, EngineBackend, EngineConfig, NotifyEngine, WatchHandle};

use crate::error::WatchError;
use crate::events::{EventHandler, HandlerConfig};
use crate::registry::Named;

/// Whether an observer's engine is dispatching events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

/// A named monitor of one filesystem path.
pub struct Observer {
    name: String,
    watch: WatchHandle,
    handler_config: HandlerConfig,
    engine_config: EngineConfig,
    handler: Arc<dyn EventHandler>,
    engine: Box<dyn Engine>,
}

impl Observer {
    /// Schedule `handler` on `path` with `engine` and tag the result with `name`.
    pub fn new(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        recursive: bool,
        engine: Box<dyn Engine>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, WatchError> {
        let watch = engine.schedule(Arc::clone(&handler), path.as_ref(), recursive)?;
        Ok(Self {
            name: name.into(),
            watch,
            handler_config: HandlerConfig::default(),
            engine_config: EngineConfig::default(),
            handler,
            engine,
        })
    }

    /// Record the configuration `handler` and `engine` were built from.
    ///
    /// Process workers rebuild the observer from these values.
    pub fn with_config(mut self, handler: HandlerConfig, engine: EngineConfig) -> Self {
        self.handler_config = handler;
        self.engine_config = engine;
        self
    }

    pub fn path(&self) -> &Path {
        &self.watch.path
    }

    pub fn recursive(&self) -> bool {
        self.watch.recursive
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn handler_config(&self) -> &HandlerConfig {
        &self.handler_config
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn state(&self) -> EngineState {
        if self.engine.is_alive() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    pub fn start(&self) -> Result<(), WatchError> {
        self.engine.start(&self.name)?;
        crate::log_event!(self.name, "started", "{}", self.watch.path.display());
        Ok(())
    }

    /// Request a stop without waiting for it.
    pub fn stop(&self) {
        self.engine.stop();
    }

    /// See [`Engine::join`].
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        self.engine.join(timeout)
    }
}

impl Named for Observer {
    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("name", &self.name)
            .field("path", &self.watch.path)
            .field("recursive", &self.watch.recursive)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BaseEventHandler;
    use tempfile::TempDir;

    fn observer(name: &str, dir: &TempDir) -> Observer {
        Observer::new(
            name,
            dir.path(),
            true,
            Box::new(NotifyEngine::new(EngineConfig::default())),
            Arc::new(BaseEventHandler),
        )
        .unwrap()
    }

    #[test]
    fn test_observer_fields() {
        let temp_dir = TempDir::new().unwrap();
        let obs = observer("desktop", &temp_dir);

        assert_eq!(obs.name(), "desktop");
        assert_eq!(obs.path(), temp_dir.path());
        assert!(obs.recursive());
        assert_eq!(obs.state(), EngineState::Stopped);
        assert_eq!(obs.handler_config(), &HandlerConfig::default());
    }

    #[test]
    fn test_with_config_records_bound_options() {
        let temp_dir = TempDir::new().unwrap();
        let engine = EngineConfig {
            backend: EngineBackend::Poll,
            poll_interval_ms: 50,
        };
        let obs = observer("bound", &temp_dir)
            .with_config(HandlerConfig::default().with_kind("base"), engine.clone());

        assert_eq!(obs.handler_config().kind, "base");
        assert_eq!(obs.engine_config(), &engine);
    }

    #[test]
    fn test_observer_state_follows_engine() {
        let temp_dir = TempDir::new().unwrap();
        let obs = observer("state", &temp_dir);

        obs.start().unwrap();
        assert_eq!(obs.state(), EngineState::Running);

        obs.stop();
        assert!(obs.join(Some(Duration::from_secs(5))));
        assert_eq!(obs.state(), EngineState::Stopped);
    }
}
