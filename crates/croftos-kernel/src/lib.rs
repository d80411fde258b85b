//! `croftos-kernel` – concurrency and liveness primitives.
//!
//! The load-bearing building blocks that the rest of the firmware is wired
//! together with.  Nothing in here knows about configuration, plugins or the
//! protocol layer.
//!
//! # Modules
//!
//! - [`state`] – [`StateSource`][state::StateSource] / [`State`][state::State]:
//!   a one-shot, monotonic readiness latch with a blocking wait.  Boot
//!   ordering is enforced entirely through these gates.
//! - [`task`] – named one-shot and looping tasks with a
//!   [`TaskContext`][task::TaskContext] that supports cooperative delay and
//!   drift-free fixed-cadence scheduling.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: a single-deadline
//!   liveness supervisor.  If nobody kicks it within the timeout, the expiry
//!   callback fires once and the watchdog is terminal.
//! - [`switch`] – [`Switch`][switch::Switch]: debounced physical-input edge
//!   timing; reports how long the input was held on each disengage.

pub mod state;
pub mod switch;
pub mod task;
pub mod watchdog;

pub use state::{State, StateSource};
pub use switch::{Switch, SwitchEvent};
pub use task::TaskContext;
pub use watchdog::{Watchdog, WatchdogState};
