//! [`Platform`] – the hardware/OS surface the kernel runs on.
//!
//! Everything board-specific sits behind this trait: identity (MAC,
//! firmware version), boot forensics (reset reason, wakeup cause, boot
//! count), heap statistics for telemetry, and the two exits (restart and
//! deep sleep).  [`HostPlatform`] is the host-process stand-in used by the
//! binary in simulation and by the integration tests; it records the exit
//! requests instead of performing them.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Board/OS seam.
pub trait Platform: Send + Sync {
    fn mac_address(&self) -> String;
    fn firmware_version(&self) -> String;
    /// Why the previous process/firmware instance ended.
    fn reset_reason(&self) -> String;
    /// What woke the device from deep sleep, if anything.
    fn wakeup_cause(&self) -> String;
    /// Increment and return the persistent boot counter.
    fn next_boot_count(&self) -> u32;
    fn free_heap(&self) -> u64;
    fn min_free_heap(&self) -> u64;
    /// Reboot.  May return; the caller must not assume it does not.
    fn restart(&self);
    /// Enter deep sleep for `duration`.  May return, as above.
    fn deep_sleep(&self, duration: Duration);
}

/// What a [`HostPlatform`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitRequest {
    Restart,
    DeepSleep(Duration),
}

/// Host-process platform: fixed identity, recorded exits.
pub struct HostPlatform {
    mac: String,
    boot_count: AtomicU32,
    exits: Mutex<Vec<ExitRequest>>,
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new("02:00:00:00:00:01")
    }
}

impl HostPlatform {
    pub fn new(mac: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            boot_count: AtomicU32::new(0),
            exits: Mutex::new(Vec::new()),
        }
    }

    /// Exit requests recorded so far, oldest first.
    pub fn exit_requests(&self) -> Vec<ExitRequest> {
        self.exits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Platform for HostPlatform {
    fn mac_address(&self) -> String {
        self.mac.clone()
    }

    fn firmware_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn reset_reason(&self) -> String {
        "power-on".to_string()
    }

    fn wakeup_cause(&self) -> String {
        "undefined".to_string()
    }

    fn next_boot_count(&self) -> u32 {
        self.boot_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn free_heap(&self) -> u64 {
        0
    }

    fn min_free_heap(&self) -> u64 {
        0
    }

    fn restart(&self) {
        self.exits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ExitRequest::Restart);
    }

    fn deep_sleep(&self, duration: Duration) {
        self.exits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ExitRequest::DeepSleep(duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_count_increments_per_boot() {
        let platform = HostPlatform::default();
        assert_eq!(platform.next_boot_count(), 1);
        assert_eq!(platform.next_boot_count(), 2);
    }

    #[test]
    fn exits_are_recorded_in_order() {
        let platform = HostPlatform::default();
        platform.restart();
        platform.deep_sleep(Duration::from_secs(3600));
        assert_eq!(
            platform.exit_requests(),
            vec![
                ExitRequest::Restart,
                ExitRequest::DeepSleep(Duration::from_secs(3600))
            ]
        );
    }
}
