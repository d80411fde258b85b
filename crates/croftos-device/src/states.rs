//! The boot readiness latches.
//!
//! Boot ordering is expressed entirely through these gates; there is no
//! central sequencer.  Each latch is set by exactly one subsystem:
//!
//! - `network_ready` — the network driver, once connectivity is up;
//! - `rtc_in_sync` — the time-sync task, once wall-clock time is trusted;
//! - `transport_ready` — the transport starter, once the broker session is
//!   established;
//! - `kernel_ready` — the boot orchestrator, after the init document goes
//!   out.
//!
//! Dependency graph: `network_ready → {rtc_in_sync, transport_ready}`,
//! `rtc_in_sync → plugin population`, population complete → `kernel_ready`.

use croftos_kernel::state::StateSource;

/// All boot latches, shared by reference across the boot graph.
pub struct BootStates {
    pub network_ready: StateSource,
    pub rtc_in_sync: StateSource,
    pub transport_ready: StateSource,
    pub kernel_ready: StateSource,
}

impl Default for BootStates {
    fn default() -> Self {
        Self::new()
    }
}

impl BootStates {
    pub fn new() -> Self {
        Self {
            network_ready: StateSource::new("network-ready"),
            rtc_in_sync: StateSource::new("rtc-in-sync"),
            transport_ready: StateSource::new("transport-ready"),
            kernel_ready: StateSource::new("kernel-ready"),
        }
    }
}
