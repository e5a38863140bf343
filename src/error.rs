//! Error types shared by the observer and service managers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the named-item registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("item with name '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("item with name '{name}' does not exist")]
    DoesNotExist { name: String },
}

/// A single worker that failed during a fan-out start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    /// Name of the observer the worker was running.
    pub name: String,
    /// Human readable failure reason.
    pub reason: String,
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// Errors from observer and engine operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Observer '{name}' failed to start: {reason}")]
    EngineStartFailed { name: String, reason: String },

    #[error("Unknown event handler '{name}'")]
    UnknownHandler { name: String },

    #[error("{} worker(s) failed: {}", .0.len(), format_failures(.0))]
    WorkersFailed(Vec<WorkerFailure>),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_failures(failures: &[WorkerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Errors from service operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("service with name '{name}' not found")]
    ServiceNotFound { name: String },

    #[error("the pid of service '{name}' not found, is it running?")]
    ServicePidNotFound { name: String },

    #[error("service '{name}' is not running")]
    ServiceNotRunning { name: String },

    #[error("cannot reload service '{name}': {reason}")]
    ServiceReloadError { name: String, reason: String },

    #[error("invalid service name '{name}'")]
    InvalidName { name: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service script {path}: {reason}")]
    Script { path: PathBuf, reason: String },

    #[error("failed to launch service '{name}': {reason}")]
    LaunchFailed { name: String, reason: String },

    #[error("failed to deliver signal {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),
}

impl ServiceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServiceError::Io {
            path: path.into(),
            source,
        }
    }
}
