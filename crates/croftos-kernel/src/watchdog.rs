//! [`Watchdog`] – single-deadline liveness supervisor.
//!
//! Construction arms a deadline; [`Watchdog::restart`] resets it.  If the
//! deadline lapses without a restart, the expiry callback fires exactly once
//! with [`WatchdogState::TimedOut`] and the watchdog becomes terminal.  The
//! device binary installs a callback that aborts the process, relying on the
//! supervising hardware or OS to restart it; that is the single point of
//! total-liveness enforcement for the firmware.
//!
//! The task that owns the kick (the telemetry loop) is therefore the one
//! whose stall terminates the device.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace};

/// Lifecycle of a watchdog: armed at construction, kicked on every
/// [`Watchdog::restart`], then terminally timed out when the deadline
/// lapses or cancelled by an orderly shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Armed,
    Kicked,
    TimedOut,
    Cancelled,
}

#[derive(Clone, Copy)]
enum Signal {
    Kick(Instant),
    Cancel,
}

/// Liveness supervisor with a fixed timeout and an expiry callback.
pub struct Watchdog {
    name: String,
    tx: watch::Sender<Signal>,
    state: Arc<Mutex<WatchdogState>>,
    supervisor: JoinHandle<()>,
}

impl Watchdog {
    /// Arm a watchdog.  `on_expiry` is invoked once, from the supervisor
    /// task, if `timeout` elapses without a [`restart`][Self::restart].
    pub fn new<F>(name: impl Into<String>, timeout: Duration, on_expiry: F) -> Self
    where
        F: Fn(WatchdogState) + Send + Sync + 'static,
    {
        let name = name.into();
        let (tx, mut rx) = watch::channel(Signal::Kick(Instant::now()));
        let state = Arc::new(Mutex::new(WatchdogState::Armed));

        let supervisor = {
            let name = name.clone();
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                loop {
                    let deadline = match *rx.borrow() {
                        Signal::Kick(at) => at + timeout,
                        Signal::Cancel => {
                            debug!(watchdog = %name, "watchdog cancelled");
                            break;
                        }
                    };
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            error!(watchdog = %name, ?timeout, "watchdog timed out");
                            *state.lock().unwrap_or_else(|e| e.into_inner()) =
                                WatchdogState::TimedOut;
                            on_expiry(WatchdogState::TimedOut);
                            break;
                        }
                        changed = rx.changed() => {
                            // Sender dropped: treat like a cancel.
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        Self {
            name,
            tx,
            state,
            supervisor,
        }
    }

    /// Reset the deadline.  No-op once the watchdog has timed out or been
    /// cancelled.
    pub fn restart(&self) {
        trace!(watchdog = %self.name, "watchdog kicked");
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*state, WatchdogState::TimedOut | WatchdogState::Cancelled) {
                return;
            }
            *state = WatchdogState::Kicked;
        }
        let _ = self.tx.send(Signal::Kick(Instant::now()));
    }

    /// Disarm the watchdog for an orderly shutdown.  The expiry callback
    /// will not fire after this, and late kicks are no-ops.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != WatchdogState::TimedOut {
                *state = WatchdogState::Cancelled;
            }
        }
        let _ = self.tx.send(Signal::Cancel);
        self.supervisor.abort();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatchdogState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn expiry_counter() -> (Arc<AtomicUsize>, impl Fn(WatchdogState) + Send + Sync + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        (fired, move |state| {
            assert_eq!(state, WatchdogState::TimedOut);
            fired_cb.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn expires_when_not_kicked() {
        let (fired, on_expiry) = expiry_counter();
        let wd = Watchdog::new("wd", Duration::from_secs(10), on_expiry);

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(wd.state(), WatchdogState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn kick_resets_the_deadline() {
        let (fired, on_expiry) = expiry_counter();
        let wd = Watchdog::new("wd", Duration::from_secs(10), on_expiry);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(8)).await;
            wd.restart();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(wd.state(), WatchdogState::Kicked);

        // Stop kicking and the deadline lapses.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_fires_exactly_once() {
        let (fired, on_expiry) = expiry_counter();
        let wd = Watchdog::new("wd", Duration::from_secs(1), on_expiry);

        tokio::time::sleep(Duration::from_secs(5)).await;
        // A late kick must not rearm a timed-out watchdog.
        wd.restart();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(wd.state(), WatchdogState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_the_watchdog() {
        let (fired, on_expiry) = expiry_counter();
        let wd = Watchdog::new("wd", Duration::from_secs(1), on_expiry);

        wd.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(wd.state(), WatchdogState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn kick_after_cancel_does_not_rearm() {
        let (fired, on_expiry) = expiry_counter();
        let wd = Watchdog::new("wd", Duration::from_secs(1), on_expiry);

        wd.cancel();
        wd.restart();
        assert_eq!(wd.state(), WatchdogState::Cancelled);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(wd.state(), WatchdogState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_armed() {
        let (_fired, on_expiry) = expiry_counter();
        let wd = Watchdog::new("wd", Duration::from_secs(60), on_expiry);
        assert_eq!(wd.state(), WatchdogState::Armed);
        wd.cancel();
    }
}
