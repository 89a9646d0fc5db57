//! Cooperative shutdown
//!
//! Long-running work polls a process-wide flag between steps; the cleaner's
//! saga in particular decides between finishing, stopping and compensating
//! based on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tracing::warn;

/// Process-wide shutdown indicator; cheap to clone and poll.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trip the flag on Ctrl+C.
pub fn spawn_signal_listener(flag: ShutdownFlag) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, stopping background work gracefully...");
            flag.trigger();
        }
    });
}
