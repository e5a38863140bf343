//! Observer manager: creation, lookup and concurrent start of observers.
//!
//! Engine and handler construction goes through factories that receive
//! the configuration bound at the time each observer is created. Calling
//! [`ObserverManager::configure_engine`] or
//! [`ObserverManager::configure_handler`] only affects observers created
//! afterwards.

mod fanout;
mod shutdown;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use fanout::{OBSERVE_SUBCOMMAND, WorkerSpec, run_observer};
pub use shutdown::Shutdown;

use crate::config::Settings;
use crate::error::WatchError;
use crate::events::{EventHandler, HandlerConfig, builtin_handler};
use crate::observer::{Engine, EngineConfig, NotifyEngine, Observer};
use crate::registry::{Named, Registry};

/// Builds the engine for a new observer.
pub type EngineFactory =
    Arc<dyn Fn(&EngineConfig) -> Result<Box<dyn Engine>, WatchError> + Send + Sync>;

/// Builds the handler for a new observer.
pub type HandlerFactory =
    Arc<dyn Fn(&HandlerConfig) -> Result<Arc<dyn EventHandler>, WatchError> + Send + Sync>;

/// Concurrency backend for [`ObserverManager::start_observers`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StartMethod {
    /// One named thread per observer, sharing the observer objects.
    #[default]
    Thread,
    /// One child process per observer, each with its own copy of the state.
    Process,
}

/// Manager-level settings (the `[observer]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverSettings {
    /// Wake-up interval of blocking starts, so interrupts are seen promptly.
    #[serde(default = "default_poll_grain_ms")]
    pub poll_grain_ms: u64,

    /// Backend used when none is given explicitly.
    #[serde(default)]
    pub start_method: StartMethod,

    /// Default recursion flag for the CLI.
    #[serde(default)]
    pub recursive: bool,

    /// Executable for process workers. Defaults to the running binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,
}

fn default_poll_grain_ms() -> u64 {
    1000
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            poll_grain_ms: default_poll_grain_ms(),
            start_method: StartMethod::default(),
            recursive: false,
            worker_program: None,
        }
    }
}

impl ObserverSettings {
    pub fn poll_grain(&self) -> Duration {
        Duration::from_millis(self.poll_grain_ms.max(1))
    }
}

/// An observer given by name or by handle.
#[derive(Debug, Clone)]
pub enum ObserverRef {
    Name(String),
    Observer(Arc<Observer>),
}

impl From<&str> for ObserverRef {
    fn from(name: &str) -> Self {
        ObserverRef::Name(name.to_string())
    }
}

impl From<String> for ObserverRef {
    fn from(name: String) -> Self {
        ObserverRef::Name(name)
    }
}

impl From<Arc<Observer>> for ObserverRef {
    fn from(observer: Arc<Observer>) -> Self {
        ObserverRef::Observer(observer)
    }
}

impl From<&Arc<Observer>> for ObserverRef {
    fn from(observer: &Arc<Observer>) -> Self {
        ObserverRef::Observer(Arc::clone(observer))
    }
}

/// Creates, tracks and starts observers.
pub struct ObserverManager {
    engine_factory: EngineFactory,
    handler_factory: HandlerFactory,
    engine_config: EngineConfig,
    handler_config: HandlerConfig,
    settings: ObserverSettings,
    worker_config: Option<PathBuf>,
    observers: Registry<Arc<Observer>>,
    shutdown: Shutdown,
}

impl ObserverManager {
    /// Manager with the `notify` engine and the built-in handlers.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ObserverManagerBuilder {
        ObserverManagerBuilder::new()
    }

    /// Manager configured from the `[engine]`, `[handler]` and `[observer]` sections.
    pub fn from_settings(settings: &Settings) -> Self {
        ObserverManagerBuilder::from_settings(settings).build()
    }

    /// Bind engine options for observers created after this call.
    pub fn configure_engine(&mut self, config: EngineConfig) {
        self.engine_config = config;
    }

    /// Bind handler options for observers created after this call.
    pub fn configure_handler(&mut self, config: HandlerConfig) {
        self.handler_config = config;
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn handler_config(&self) -> &HandlerConfig {
        &self.handler_config
    }

    /// Token that stops blocking starts when tripped.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Create an observer for `path`, register it under `name` and return it.
    pub fn create_observer(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
        recursive: bool,
    ) -> Result<Arc<Observer>, WatchError> {
        // Fail before building anything; handlers may open files
        if self.observers.contains(name) {
            return Err(crate::error::RegistryError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }

        let engine = (self.engine_factory)(&self.engine_config)?;
        let handler = (self.handler_factory)(&self.handler_config)?;
        let observer = Observer::new(name, path, recursive, engine, handler)?
            .with_config(self.handler_config.clone(), self.engine_config.clone());
        let observer = Arc::new(observer);
        self.observers.insert(Arc::clone(&observer))?;

        crate::debug_event!(
            "manager",
            "created",
            "{} -> {}",
            observer.name(),
            observer.path().display()
        );
        Ok(observer)
    }

    /// Create one observer per `(path, name)` pair, in order.
    ///
    /// Stops at the first failure. Observers created before it stay
    /// registered.
    pub fn create_observers<I, P, N>(
        &mut self,
        pairs: I,
        recursive: bool,
    ) -> Result<Vec<Arc<Observer>>, WatchError>
    where
        I: IntoIterator<Item = (P, N)>,
        P: AsRef<Path>,
        N: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(path, name)| self.create_observer(path, name.as_ref(), recursive))
            .collect()
    }

    pub fn get_observer(&self, name: &str) -> Result<Arc<Observer>, WatchError> {
        Ok(Arc::clone(self.observers.get(name)?))
    }

    pub fn observers(&self) -> impl Iterator<Item = &Arc<Observer>> {
        self.observers.iter()
    }

    /// Start one observer and block.
    ///
    /// A zero `duration` blocks until the shutdown handle trips, then stops
    /// the observer gracefully and returns `Ok`. A non-zero `duration`
    /// returns after at most that long and leaves the observer running.
    pub fn start_observer(
        &self,
        target: impl Into<ObserverRef>,
        duration: Duration,
    ) -> Result<(), WatchError> {
        let observer = self.resolve(target.into())?;
        run_observer(
            &observer,
            duration,
            self.settings.poll_grain(),
            &self.shutdown,
        )
    }

    /// Start every target at once, one worker each, and wait for all.
    ///
    /// A failing worker does not affect the others; failures are returned
    /// together as [`WatchError::WorkersFailed`].
    pub fn start_observers<I, R>(
        &self,
        targets: I,
        duration: Duration,
        method: StartMethod,
    ) -> Result<(), WatchError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ObserverRef>,
    {
        let observers = targets
            .into_iter()
            .map(|target| self.resolve(target.into()))
            .collect::<Result<Vec<_>, _>>()?;
        if observers.is_empty() {
            return Ok(());
        }

        crate::log_event!(
            "manager",
            "starting",
            "{} observer(s) on {method:?} workers",
            observers.len()
        );

        let failures = match method {
            StartMethod::Thread => fanout::start_threads(
                &observers,
                duration,
                self.settings.poll_grain(),
                &self.shutdown,
            ),
            StartMethod::Process => {
                let program = match &self.settings.worker_program {
                    Some(program) => program.clone(),
                    None => crate::process::current_program().map_err(|source| {
                        WatchError::Io {
                            path: PathBuf::from("<current executable>"),
                            source,
                        }
                    })?,
                };
                let spec = WorkerSpec {
                    program: &program,
                    duration,
                    config: self.worker_config.as_deref(),
                };
                fanout::start_processes(&observers, &spec, &self.shutdown)
            }
        };

        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                tracing::error!("[{}] worker failed: {}", failure.name, failure.reason);
            }
            Err(WatchError::WorkersFailed(failures))
        }
    }

    fn resolve(&self, target: ObserverRef) -> Result<Arc<Observer>, WatchError> {
        match target {
            ObserverRef::Name(name) => self.get_observer(&name),
            ObserverRef::Observer(observer) => Ok(observer),
        }
    }
}

impl Default for ObserverManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObserverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverManager")
            .field("observers", &self.observers.names())
            .field("engine_config", &self.engine_config)
            .field("handler_config", &self.handler_config)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder for constructing an ObserverManager.
pub struct ObserverManagerBuilder {
    engine_factory: Option<EngineFactory>,
    handler_factory: Option<HandlerFactory>,
    engine_config: EngineConfig,
    handler_config: HandlerConfig,
    settings: ObserverSettings,
    worker_config: Option<PathBuf>,
    shutdown: Option<Shutdown>,
}

impl ObserverManagerBuilder {
    pub fn new() -> Self {
        Self {
            engine_factory: None,
            handler_factory: None,
            engine_config: EngineConfig::default(),
            handler_config: HandlerConfig::default(),
            settings: ObserverSettings::default(),
            worker_config: None,
            shutdown: None,
        }
    }

    /// Builder preset from the `[engine]`, `[handler]` and `[observer]` sections.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new()
            .engine_config(settings.engine.clone())
            .handler_config(settings.handler.clone())
            .settings(settings.observer.clone())
    }

    /// Replace the `notify` engine.
    pub fn engine_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&EngineConfig) -> Result<Box<dyn Engine>, WatchError> + Send + Sync + 'static,
    {
        self.engine_factory = Some(Arc::new(factory));
        self
    }

    /// Replace the built-in handler lookup.
    ///
    /// Process workers and services still resolve handlers by
    /// `HandlerConfig::kind` through the built-in lookup.
    pub fn handler_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&HandlerConfig) -> Result<Arc<dyn EventHandler>, WatchError>
            + Send
            + Sync
            + 'static,
    {
        self.handler_factory = Some(Arc::new(factory));
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn handler_config(mut self, config: HandlerConfig) -> Self {
        self.handler_config = config;
        self
    }

    pub fn settings(mut self, settings: ObserverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Settings file handed to process workers as `--config`.
    pub fn worker_config(mut self, path: Option<PathBuf>) -> Self {
        self.worker_config = path;
        self
    }

    /// Share an existing shutdown token.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> ObserverManager {
        let engine_factory: EngineFactory = match self.engine_factory {
            Some(factory) => factory,
            None => Arc::new(notify_engine),
        };
        let handler_factory: HandlerFactory = match self.handler_factory {
            Some(factory) => factory,
            None => Arc::new(builtin_handler),
        };

        ObserverManager {
            engine_factory,
            handler_factory,
            engine_config: self.engine_config,
            handler_config: self.handler_config,
            settings: self.settings,
            worker_config: self.worker_config,
            observers: Registry::new(),
            shutdown: self.shutdown.unwrap_or_default(),
        }
    }
}

fn notify_engine(config: &EngineConfig) -> Result<Box<dyn Engine>, WatchError> {
    Ok(Box::new(NotifyEngine::new(config.clone())))
}

impl Default for ObserverManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
