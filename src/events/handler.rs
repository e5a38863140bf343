//! Event handler trait and the built-in handlers.

use std::sync::Arc;

use super::{FsEvent, FsEventKind, HandlerConfig, LogEventHandler, LogSink};
use crate::error::WatchError;

/// Receives events dispatched by an observer.
///
/// All callbacks default to no-ops; implement the ones you care about.
/// `name` is the name of the observer that saw the event.
pub trait EventHandler: Send + Sync {
    /// Called for every event before the kind-specific callback.
    fn on_any_event(&self, _event: &FsEvent, _name: &str) {}

    fn on_created(&self, _event: &FsEvent, _name: &str) {}

    fn on_deleted(&self, _event: &FsEvent, _name: &str) {}

    fn on_modified(&self, _event: &FsEvent, _name: &str) {}

    fn on_moved(&self, _event: &FsEvent, _name: &str) {}

    fn on_closed(&self, _event: &FsEvent, _name: &str) {}

    /// Route an event to `on_any_event` and then to its kind callback.
    fn dispatch(&self, event: &FsEvent, name: &str) {
        self.on_any_event(event, name);
        match event.kind {
            FsEventKind::Created => self.on_created(event, name),
            FsEventKind::Deleted => self.on_deleted(event, name),
            FsEventKind::Modified => self.on_modified(event, name),
            FsEventKind::Moved => self.on_moved(event, name),
            FsEventKind::Closed => self.on_closed(event, name),
        }
    }
}

/// Handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseEventHandler;

impl EventHandler for BaseEventHandler {}

/// Handler names [`builtin_handler`] accepts.
pub const BUILTIN_HANDLERS: &[&str] = &["log", "base"];

/// Resolve a built-in handler by the name in `config.kind`.
///
/// Service scripts and process workers can only name handlers known to
/// the binary, so this is the lookup they go through.
pub fn builtin_handler(config: &HandlerConfig) -> Result<Arc<dyn EventHandler>, WatchError> {
    match config.kind.as_str() {
        "log" => {
            let sink = match &config.log_file {
                Some(path) => LogSink::file(path)?,
                None => LogSink::Tracing,
            };
            Ok(Arc::new(LogEventHandler::new(
                config.filter_dir_modified,
                sink,
            )))
        }
        "base" => Ok(Arc::new(BaseEventHandler)),
        other => Err(WatchError::UnknownHandler {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl EventHandler for Recorder {
        fn on_any_event(&self, event: &FsEvent, name: &str) {
            self.calls.lock().push(format!("any:{name}:{}", event.kind));
        }

        fn on_created(&self, _event: &FsEvent, _name: &str) {
            self.calls.lock().push("created".to_string());
        }

        fn on_moved(&self, _event: &FsEvent, _name: &str) {
            self.calls.lock().push("moved".to_string());
        }
    }

    #[test]
    fn test_dispatch_calls_catch_all_first() {
        let recorder = Recorder::default();
        recorder.dispatch(&FsEvent::new(FsEventKind::Created, "/x/a"), "obs");
        recorder.dispatch(&FsEvent::new(FsEventKind::Moved, "/x/b"), "obs");
        // No override for deleted: only the catch-all fires
        recorder.dispatch(&FsEvent::new(FsEventKind::Deleted, "/x/c"), "obs");

        assert_eq!(
            *recorder.calls.lock(),
            vec![
                "any:obs:created",
                "created",
                "any:obs:moved",
                "moved",
                "any:obs:deleted",
            ]
        );
    }

    #[test]
    fn test_builtin_handler_lookup() {
        assert!(builtin_handler(&HandlerConfig::default()).is_ok());
        assert!(builtin_handler(&HandlerConfig::default().with_kind("base")).is_ok());

        for name in BUILTIN_HANDLERS {
            assert!(builtin_handler(&HandlerConfig::default().with_kind(*name)).is_ok());
        }

        let err = builtin_handler(&HandlerConfig::default().with_kind("custom")).err();
        assert!(matches!(err, Some(WatchError::UnknownHandler { name }) if name == "custom"));
    }
}
