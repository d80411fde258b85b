//! One-shot readiness latch: [`StateSource`] (write side) and [`State`]
//! (read-only view).
//!
//! A latch starts unset and can only ever move to set; there is no unset
//! operation.  Readiness is monotonic within a process lifetime, which is
//! what makes it safe to build the boot dependency graph out of these:
//! a dependent that observed "ready" never has to re-check.
//!
//! The subsystem that determines readiness owns the [`StateSource`]; any
//! number of dependents hold [`State`] views and block on
//! [`State::await_set`].
//!
//! # Example
//!
//! ```
//! use croftos_kernel::state::StateSource;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let network_ready = StateSource::new("network-ready");
//! let view = network_ready.state();
//!
//! network_ready.set();
//! view.await_set().await; // returns immediately, the latch is already set
//! assert!(view.is_set());
//! # });
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::debug;

struct Latch {
    name: String,
    set: AtomicBool,
    notify: Notify,
}

/// The write side of a one-shot latch.  Cloning shares the same latch.
#[derive(Clone)]
pub struct StateSource {
    latch: Arc<Latch>,
}

/// A read-only view of a latch.  Cloning shares the same latch.
#[derive(Clone)]
pub struct State {
    latch: Arc<Latch>,
}

impl StateSource {
    /// Create a new, unset latch.  The name is only used for diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            latch: Arc::new(Latch {
                name: name.into(),
                set: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Set the latch, waking all current and future waiters.  Idempotent.
    pub fn set(&self) {
        if !self.latch.set.swap(true, Ordering::AcqRel) {
            debug!(state = %self.latch.name, "state set");
        }
        self.latch.notify.notify_waiters();
    }

    /// A read-only view of this latch.
    pub fn state(&self) -> State {
        State {
            latch: Arc::clone(&self.latch),
        }
    }

    /// Non-blocking poll.
    pub fn is_set(&self) -> bool {
        self.latch.set.load(Ordering::Acquire)
    }

    /// Block the calling task until the latch is set.
    pub async fn await_set(&self) {
        self.state().await_set().await;
    }
}

impl State {
    /// Non-blocking poll.
    pub fn is_set(&self) -> bool {
        self.latch.set.load(Ordering::Acquire)
    }

    /// Block the calling task until the latch is set.  Returns immediately
    /// if it already is.
    pub async fn await_set(&self) {
        loop {
            // Register interest before re-checking the flag, otherwise a
            // `set()` between the check and the await would be lost.
            let notified = self.latch.notify.notified();
            if self.latch.set.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Diagnostic name of the underlying latch.
    pub fn name(&self) -> &str {
        &self.latch.name
    }
}

impl std::fmt::Debug for StateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSource")
            .field("name", &self.latch.name)
            .field("set", &self.is_set())
            .finish()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.latch.name)
            .field("set", &self.is_set())
            .finish()
    }
}
