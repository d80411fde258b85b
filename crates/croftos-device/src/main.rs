//! Host simulation of a CroftOS device.
//!
//! Runs the full boot sequence against host seam implementations: a
//! directory-backed config namespace under `CROFTOS_DATA_DIR` (default
//! `./croftos-data`), the in-process transport, an already-up network and
//! an already-set clock.  Ctrl-C runs the shutdown listeners and exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use croftos_config::{DirKvStore, KvStore};
use croftos_plugins::PluginRegistry;
use croftos_protocol::MemoryTransport;
use croftos_types::KernelError;
use tracing::{error, info};

use croftos_device::boot::{DeviceDeps, HostNetwork, start_device};
use croftos_device::commands::UpdateRequester;
use croftos_device::logging;
use croftos_device::platform::HostPlatform;
use croftos_device::rtc::TimeSync;

struct HostClock;

#[async_trait]
impl TimeSync for HostClock {
    async fn sync(&self) -> Result<(), KernelError> {
        Ok(())
    }

    fn is_time_set(&self) -> bool {
        // The host OS clock is trusted as-is.
        true
    }
}

struct LoggingUpdater;

impl UpdateRequester for LoggingUpdater {
    fn request_update(&self, url: &str) -> Result<(), KernelError> {
        info!(url, "update requested, apply on next restart");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    logging::init_tracing();

    let data_dir =
        std::env::var("CROFTOS_DATA_DIR").unwrap_or_else(|_| "./croftos-data".to_string());
    let config_kv = match DirKvStore::open(format!("{data_dir}/config")) {
        Ok(kv) => Arc::new(kv) as Arc<dyn KvStore>,
        Err(e) => {
            error!(error = %e, "cannot open config namespace");
            std::process::exit(1);
        }
    };
    let function_kv = match DirKvStore::open(format!("{data_dir}/function-cfg")) {
        Ok(kv) => Arc::new(kv) as Arc<dyn KvStore>,
        Err(e) => {
            error!(error = %e, "cannot open function config namespace");
            std::process::exit(1);
        }
    };

    let deps = DeviceDeps {
        platform: Arc::new(HostPlatform::default()),
        config_kv,
        function_kv,
        transport: Arc::new(MemoryTransport::new()),
        network: Arc::new(HostNetwork),
        time_sync: Arc::new(HostClock),
        updater: Arc::new(LoggingUpdater),
        peripheral_registry: PluginRegistry::new(),
        function_registry: PluginRegistry::new(),
        on_watchdog_expiry: Arc::new(|| {
            error!("watchdog expired, aborting");
            std::process::abort();
        }),
        telemetry_sources: Vec::new(),
    };

    let kernel = match start_device(deps).await {
        Ok(kernel) => kernel,
        Err(e) => {
            error!(error = %e, "boot failed");
            std::process::exit(1);
        }
    };
    info!(root = kernel.root.root(), "device up");

    if tokio::signal::ctrl_c().await.is_err() {
        error!("cannot listen for shutdown signal");
    }
    info!("shutting down");
    kernel.shutdown.shutdown();
    // Give in-flight publishes a moment to drain.
    tokio::time::sleep(Duration::from_millis(100)).await;
}
