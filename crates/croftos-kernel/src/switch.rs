//! [`Switch`] – debounced edge timing for a physical input.
//!
//! The pin driver (out of scope here) feeds engage/disengage edges into
//! [`Switch::handle_edge`].  On each disengaged edge the switch computes the
//! time elapsed since the previous transition and fires its callback exactly
//! once with that duration.  What a given hold duration *means* (factory
//! reset, telemetry trigger, ...) is caller policy; this component only
//! guarantees accurate edge timestamps and single-fire delivery.

use std::time::{Duration, Instant};

use tracing::trace;

/// Delivered to the disengage callback on each falling edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEvent {
    pub name: String,
    /// How long since the previous transition, i.e. how long the switch was
    /// held engaged.
    pub time_since_last_change: Duration,
}

/// A single physical input with edge timing.
pub struct Switch {
    name: String,
    engaged: bool,
    last_change: Instant,
    on_disengaged: Box<dyn Fn(SwitchEvent) + Send + Sync>,
}

impl Switch {
    /// Create a switch in the disengaged state.  `on_disengaged` fires once
    /// per physical disengage transition.
    pub fn new<F>(name: impl Into<String>, on_disengaged: F) -> Self
    where
        F: Fn(SwitchEvent) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            engaged: false,
            last_change: Instant::now(),
            on_disengaged: Box::new(on_disengaged),
        }
    }

    /// Feed one edge from the pin driver.  Repeated edges in the same state
    /// (contact bounce) are ignored, so the callback fires at most once per
    /// physical transition.
    pub fn handle_edge(&mut self, engaged: bool, at: Instant) {
        if engaged == self.engaged {
            return;
        }
        let since_last_change = at.saturating_duration_since(self.last_change);
        self.engaged = engaged;
        self.last_change = at;
        trace!(switch = %self.name, engaged, ?since_last_change, "edge");

        if !engaged {
            (self.on_disengaged)(SwitchEvent {
                name: self.name.clone(),
                time_since_last_change: since_last_change,
            });
        }
    }

    /// Current state as of the last edge.
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
