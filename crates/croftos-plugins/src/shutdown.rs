//! [`ShutdownManager`] – total-effort shutdown listener list.
//!
//! Subsystems that own releasable resources (plugin managers, bus claims,
//! timers) register a listener; before a restart or deep-sleep transition
//! the device runs them all.  Invocation is newest-first (resources release
//! opposite to acquisition) and total-effort: a failing listener is logged
//! and swallowed so every remaining listener still runs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use croftos_types::KernelError;
use tracing::{debug, warn};

type ShutdownListener = Box<dyn Fn() -> Result<(), KernelError> + Send + Sync>;

/// Ordered collection of shutdown listeners.
#[derive(Default)]
pub struct ShutdownManager {
    listeners: Mutex<Vec<(String, ShutdownListener)>>,
    done: AtomicBool,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.  `name` is only used for diagnostics.
    pub fn register<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn() -> Result<(), KernelError> + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.into(), Box::new(listener)));
    }

    /// Run every listener, newest first.  Idempotent: the second call is a
    /// no-op.
    pub fn shutdown(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = std::mem::take(&mut *self.listeners.lock().unwrap_or_else(|e| e.into_inner()));
        for (name, listener) in listeners.into_iter().rev() {
            match listener() {
                Ok(()) => debug!(listener = %name, "shutdown listener done"),
                Err(e) => warn!(listener = %name, error = %e, "shutdown listener failed"),
            }
        }
    }

    /// Whether shutdown has already run.
    pub fn is_shut_down(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}
