//! Wall-clock time synchronisation.
//!
//! Plugins that schedule against wall-clock time cannot be created until
//! the RTC is trusted, so the boot pass gates plugin population on the
//! `rtc_in_sync` latch this task sets.  The protocol itself (NTP, or a
//! platform RTC) sits behind the [`TimeSync`] seam.
//!
//! Sync policy: wait for the network, then try; on failure retry after a
//! fixed back-off, indefinitely — the latch simply stays unset and the rest
//! of boot waits.  Once in sync, re-sync hourly to bound drift.  A clock
//! that is already set at boot (deep-sleep wakeup keeps the RTC) sets the
//! latch without a network round trip.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use croftos_kernel::state::{State, StateSource};
use croftos_kernel::task;
use croftos_types::KernelError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fixed back-off between failed sync attempts.
pub const SYNC_RETRY: Duration = Duration::from_secs(10);
/// Interval between periodic re-syncs once the clock is trusted.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// The actual time-sync mechanism.
#[async_trait]
pub trait TimeSync: Send + Sync {
    /// Perform one synchronisation round trip.
    async fn sync(&self) -> Result<(), KernelError>;

    /// Whether the clock is already trustworthy without a sync.
    fn is_time_set(&self) -> bool;
}

/// Start the time-sync task.  Sets `rtc_in_sync` on the first success (or
/// immediately when the clock is already set), then keeps re-syncing.
pub fn start_time_sync(
    time_sync: Arc<dyn TimeSync>,
    network_ready: State,
    rtc_in_sync: StateSource,
) -> JoinHandle<()> {
    task::run("time-sync", move |ctx| async move {
        if time_sync.is_time_set() {
            info!("clock already set, skipping initial sync");
            rtc_in_sync.set();
        }
        network_ready.await_set().await;
        loop {
            match time_sync.sync().await {
                Ok(()) => {
                    if !rtc_in_sync.is_set() {
                        info!("clock synchronised");
                        rtc_in_sync.set();
                    }
                    ctx.delay(RESYNC_INTERVAL).await;
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?SYNC_RETRY, "time sync failed");
                    ctx.delay(SYNC_RETRY).await;
                }
            }
        }
    })
}
