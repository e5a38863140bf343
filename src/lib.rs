//! Filesystem observers and detached watch services.
//!
//! - [`ObserverManager`] creates named observers and runs them
//!   concurrently on threads or child processes.
//! - [`ServiceManager`] turns an observer into a generated script, launches
//!   it detached from the caller, and finds, signals and cleans it up later.

pub mod logging;

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod observer;
pub mod process;
pub mod registry;
pub mod service;

pub use config::Settings;
pub use error::{RegistryError, ServiceError, WatchError, WorkerFailure};
pub use events::{EventHandler, FsEvent, FsEventKind, HandlerConfig};
pub use manager::{ObserverManager, Shutdown, StartMethod};
pub use observer::{Engine, EngineBackend, EngineConfig, NotifyEngine, Observer};
pub use registry::{Named, Registry};
pub use service::{
    PidDiscovery, Service, ServiceManager, ServiceScript, ServiceSettings, ServiceStatus,
};
