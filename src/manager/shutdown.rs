//! Cooperative interrupt flag shared by the controlling call and its workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable stop request. Tripping any clone trips them all.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a graceful stop.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Trip this flag on SIGINT (Ctrl-C).
    ///
    /// Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("[shutdown] interrupt received, stopping observers");
            shutdown.trigger();
        })
    }
}
