//! Filesystem events and the handlers that consume them.
//!
//! The engine translates raw `notify` events into [`FsEvent`]s and hands
//! each one to the observer's [`EventHandler`] together with the
//! observer's name.

mod handler;
mod log_handler;

use std::path::PathBuf;

use notify::EventKind;
use notify::event::{AccessKind, ModifyKind};
use serde::{Deserialize, Serialize};

pub use handler::{BUILTIN_HANDLERS, BaseEventHandler, EventHandler, builtin_handler};
pub use log_handler::{LogEventHandler, LogSink};


/// The five event kinds an observer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Created,
    Deleted,
    Modified,
    Moved,
    Closed,
}

impl FsEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsEventKind::Created => "created",
            FsEventKind::Deleted => "deleted",
            FsEventKind::Modified => "modified",
            FsEventKind::Moved => "moved",
            FsEventKind::Closed => "closed",
        }
    }

    /// Map a `notify` event kind, dropping kinds observers don't report.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FsEventKind::Created),
            EventKind::Remove(_) => Some(FsEventKind::Deleted),
            EventKind::Modify(ModifyKind::Name(_)) => Some(FsEventKind::Moved),
            EventKind::Modify(_) => Some(FsEventKind::Modified),
            EventKind::Access(AccessKind::Close(_)) => Some(FsEventKind::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub src_path: PathBuf,
    /// Destination of a move, when the backend reports both ends.
    pub dest_path: Option<PathBuf>,
    pub is_directory: bool,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, src_path: impl Into<PathBuf>) -> Self {
        let src_path = src_path.into();
        let is_directory = src_path.is_dir();
        Self {
            kind,
            src_path,
            dest_path: None,
            is_directory,
        }
    }

    /// Convert a `notify` event. Returns `None` for ignored kinds or
    /// events that carry no path.
    pub fn from_notify(event: &notify::Event) -> Option<Self> {
        let kind = FsEventKind::from_notify(&event.kind)?;
        let mut paths = event.paths.iter();
        let src = paths.next()?;
        let mut fs_event = FsEvent::new(kind, src.clone());
        if kind == FsEventKind::Moved {
            fs_event.dest_path = paths.next().cloned();
        }
        Some(fs_event)
    }
}

/// Options bound to every handler created by an observer manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Built-in handler name (`log` or `base`).
    #[serde(default = "default_handler_kind")]
    pub kind: String,

    /// Skip `modified` events on directories.
    #[serde(default)]
    pub filter_dir_modified: bool,

    /// Append handler output to this file instead of the tracing log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_handler_kind() -> String {
    "log".to_string()
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            kind: default_handler_kind(),
            filter_dir_modified: false,
            log_file: None,
        }
    }
}

impl HandlerConfig {
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn filter_dir_modified(mut self, filter: bool) -> Self {
        self.filter_dir_modified = filter;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}
