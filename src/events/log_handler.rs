//! Handler that writes one line per event to an explicit sink.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{EventHandler, FsEvent, FsEventKind};
use crate::error::WatchError;

/// Where [`LogEventHandler`] writes its lines.
#[derive(Debug, Clone)]
pub enum LogSink {
    /// Emit through `tracing` at info level.
    Tracing,
    /// Append to a file, flushing after every line.
    File(Arc<Mutex<File>>),
}

impl LogSink {
    /// Open `path` for appending, creating it if needed.
    pub fn file(path: &Path) -> Result<Self, WatchError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| WatchError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(LogSink::File(Arc::new(Mutex::new(file))))
    }

    fn write_line(&self, line: &str) {
        match self {
            LogSink::Tracing => tracing::info!(target: "watchplus::events", "{line}"),
            LogSink::File(file) => {
                let mut file = file.lock();
                if let Err(e) = writeln!(file, "{line}").and_then(|()| file.flush()) {
                    tracing::warn!("[handler] failed to write event line: {e}");
                }
            }
        }
    }
}

/// Logs every event as `<WatchDog: name> watched '<path>' got <kind>`.
#[derive(Debug, Clone)]
pub struct LogEventHandler {
    filter_dir_modified: bool,
    sink: LogSink,
}

impl LogEventHandler {
    pub fn new(filter_dir_modified: bool, sink: LogSink) -> Self {
        Self {
            filter_dir_modified,
            sink,
        }
    }

    /// Format the line written for `event`.
    pub fn format_line(event: &FsEvent, name: &str) -> String {
        format!(
            "<WatchDog: {name}> watched '{}' got {}",
            event.src_path.display(),
            event.kind
        )
    }
}

impl EventHandler for LogEventHandler {
    fn on_any_event(&self, event: &FsEvent, name: &str) {
        // Directory mtimes change whenever a child does
        if self.filter_dir_modified && event.is_directory && event.kind == FsEventKind::Modified {
            return;
        }
        self.sink.write_line(&Self::format_line(event, name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_event(kind: FsEventKind, path: &Path) -> FsEvent {
        FsEvent {
            kind,
            src_path: path.to_path_buf(),
            dest_path: None,
            is_directory: true,
        }
    }

    #[test]
    fn test_format_line() {
        let event = FsEvent::new(FsEventKind::Created, "/data/report.csv");
        assert_eq!(
            LogEventHandler::format_line(&event, "downloads"),
            "<WatchDog: downloads> watched '/data/report.csv' got created"
        );
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("events.log");
        std::fs::write(&log_path, "existing\n").unwrap();

        let handler = LogEventHandler::new(false, LogSink::file(&log_path).unwrap());
        handler.dispatch(&FsEvent::new(FsEventKind::Deleted, "/a/b"), "w1");
        handler.dispatch(&FsEvent::new(FsEventKind::Closed, "/a/c"), "w1");

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "existing",
                "<WatchDog: w1> watched '/a/b' got deleted",
                "<WatchDog: w1> watched '/a/c' got closed",
            ]
        );
    }

    #[test]
    fn test_directory_modified_filter() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("events.log");

        let filtered = LogEventHandler::new(true, LogSink::file(&log_path).unwrap());
        filtered.dispatch(&dir_event(FsEventKind::Modified, temp_dir.path()), "f");
        // Other kinds on directories still pass
        filtered.dispatch(&dir_event(FsEventKind::Created, temp_dir.path()), "f");

        let unfiltered = LogEventHandler::new(false, LogSink::file(&log_path).unwrap());
        unfiltered.dispatch(&dir_event(FsEventKind::Modified, temp_dir.path()), "u");

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("<WatchDog: f>"));
        assert!(content.contains("got created"));
        assert!(content.contains("<WatchDog: u>"));
        assert_eq!(content.matches("<WatchDog: f>").count(), 1);
    }

    #[test]
    fn test_file_sink_reports_unopenable_path() {
        let temp_dir = TempDir::new().unwrap();
        let bad = temp_dir.path().join("missing").join("events.log");
        assert!(matches!(LogSink::file(&bad), Err(WatchError::Io { .. })));
    }
}
