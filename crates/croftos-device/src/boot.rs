//! The boot orchestrator.
//!
//! [`start_device`] is wiring only: it owns no policy of its own beyond the
//! boot order, which is enforced through the [`BootStates`] latches rather
//! than a sequencer.  Everything board- or deployment-specific arrives
//! through [`DeviceDeps`].
//!
//! Boot order:
//!
//! 1. hydrate `network-config` and `device-config`;
//! 2. arm the watchdog;
//! 3. wire the factory-reset switch tiers;
//! 4. build the protocol root, register the built-in commands, start
//!    dispatch;
//! 5. bring up the network (sets `network_ready`), the transport session
//!    and the time-sync task (`transport_ready`, `rtc_in_sync`);
//! 6. once the clock is trusted, create peripherals, then functions —
//!    partial-failure tolerant, every outcome recorded;
//! 7. start the telemetry loop;
//! 8. publish the `init` document (not retained, at-least-once, bounded
//!    confirmation wait) and set `kernel_ready`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use croftos_config::{ConfigStore, KvStore};
use croftos_kernel::switch::{Switch, SwitchEvent};
use croftos_kernel::task;
use croftos_kernel::watchdog::{Watchdog, WatchdogState};
use croftos_plugins::{PluginManager, PluginRegistry, ShutdownManager};
use croftos_protocol::{
    ProtocolRoot, QoS, Retention, TelemetryPublisher, TelemetrySource, Transport, device_root,
    start_telemetry_loop,
};
use croftos_types::{InitRecord, InitState, KernelError, PluginEntry};
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::commands::{CommandServices, UpdateRequester, register_builtin_commands};
use crate::platform::Platform;
use crate::rtc::{TimeSync, start_time_sync};
use crate::settings::{DEVICE_CONFIG_KEY, DeviceSettings, NETWORK_CONFIG_KEY, NetworkConfig};
use crate::states::BootStates;

/// Product segment of the topic root.
const PRODUCT: &str = "croftos";
/// Confirmation wait for the one-shot init publication.
const INIT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory-reset switch tiers, inclusive lower bounds.
const HOLD_FULL_RESET: Duration = Duration::from_secs(15);
const HOLD_NETWORK_RESET: Duration = Duration::from_secs(5);
const HOLD_TELEMETRY: Duration = Duration::from_millis(200);

/// Network bring-up seam.  WiFi/Ethernet, captive portal and reconnection
/// live behind this.
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    async fn bring_up(&self, hostname: &str) -> Result<(), KernelError>;
}

/// Host stand-in: the network is already up.
pub struct HostNetwork;

#[async_trait]
impl NetworkDriver for HostNetwork {
    async fn bring_up(&self, _hostname: &str) -> Result<(), KernelError> {
        Ok(())
    }
}

/// Everything [`start_device`] composes.
pub struct DeviceDeps {
    pub platform: Arc<dyn Platform>,
    /// Namespace holding `network-config` and `device-config`.
    pub config_kv: Arc<dyn KvStore>,
    /// Per-function runtime config namespace, keyed by function name.
    pub function_kv: Arc<dyn KvStore>,
    pub transport: Arc<dyn Transport>,
    pub network: Arc<dyn NetworkDriver>,
    pub time_sync: Arc<dyn TimeSync>,
    pub updater: Arc<dyn UpdateRequester>,
    pub peripheral_registry: PluginRegistry,
    pub function_registry: PluginRegistry,
    /// Runs when the watchdog expires; the production binary aborts the
    /// process here.
    pub on_watchdog_expiry: Arc<dyn Fn() + Send + Sync>,
    /// Board-specific telemetry contributors (wifi, mqtt, power, battery
    /// sections where the hardware has them), appended after the built-in
    /// sources.
    pub telemetry_sources: Vec<TelemetrySource>,
}

/// Live device handle returned by [`start_device`].
pub struct Kernel {
    pub states: Arc<BootStates>,
    pub root: Arc<ProtocolRoot>,
    pub shutdown: Arc<ShutdownManager>,
    pub peripherals: Arc<PluginManager>,
    pub functions: Arc<PluginManager>,
    pub watchdog: Arc<Watchdog>,
    pub telemetry: TelemetryPublisher,
    pub init_state: InitState,
    switch: Mutex<Switch>,
}

impl Kernel {
    /// Feed one boot-button edge from the pin driver.
    pub fn handle_switch_edge(&self, engaged: bool, at: std::time::Instant) {
        self.switch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handle_edge(engaged, at);
    }
}

/// Boot the device.  Returns once `kernel_ready` is set; the returned
/// [`Kernel`] keeps every long-running task alive.
pub async fn start_device(deps: DeviceDeps) -> Result<Kernel, KernelError> {
    let started_at = Instant::now();
    let boot_count = deps.platform.next_boot_count();
    let mac = deps.platform.mac_address();
    info!(boot_count, %mac, "booting");

    // 1. Configuration.
    let network_store: Arc<ConfigStore<NetworkConfig>> = Arc::new(ConfigStore::new(
        Arc::clone(&deps.config_kv),
        NETWORK_CONFIG_KEY,
    ));
    let settings_store: Arc<ConfigStore<DeviceSettings>> = Arc::new(ConfigStore::new(
        Arc::clone(&deps.config_kv),
        DEVICE_CONFIG_KEY,
    ));
    let network_config = network_store.snapshot();
    let settings = settings_store.snapshot();
    let instance = network_config.instance_or(&mac);

    // 2. Watchdog.  Kicked by the telemetry loop from here on.
    let watchdog = {
        let on_expiry = Arc::clone(&deps.on_watchdog_expiry);
        Arc::new(Watchdog::new(
            "device",
            settings.watchdog_timeout(),
            move |_state: WatchdogState| on_expiry(),
        ))
    };

    let states = Arc::new(BootStates::new());
    let shutdown = Arc::new(ShutdownManager::new());
    let telemetry = TelemetryPublisher::new();

    // 3. Factory-reset tiers on the boot button.
    let switch = {
        let kv = Arc::clone(&deps.config_kv);
        let platform = Arc::clone(&deps.platform);
        let telemetry = telemetry.clone();
        Switch::new("boot-button", move |event: SwitchEvent| {
            let held = event.time_since_last_change;
            match hold_action(held) {
                Some(HoldAction::FullReset) => {
                    warn!(?held, "full factory reset");
                    if let Err(e) = wipe_namespace(kv.as_ref()) {
                        warn!(error = %e, "factory reset wipe failed");
                    }
                    platform.restart();
                }
                Some(HoldAction::NetworkReset) => {
                    warn!(?held, "network settings reset");
                    if let Err(e) = kv.remove(NETWORK_CONFIG_KEY) {
                        warn!(error = %e, "network settings removal failed");
                    }
                    platform.restart();
                }
                Some(HoldAction::RequestTelemetry) => telemetry.request_publish(),
                None => {}
            }
        })
    };

    // 4. Protocol root and commands.
    let root = Arc::new(ProtocolRoot::new(
        Arc::clone(&deps.transport),
        device_root(&network_config.location, PRODUCT, &instance),
    ));
    register_builtin_commands(
        &root,
        Arc::new(CommandServices {
            platform: Arc::clone(&deps.platform),
            kv: Arc::clone(&deps.config_kv),
            shutdown: Arc::clone(&shutdown),
            telemetry: telemetry.clone(),
            updater: Arc::clone(&deps.updater),
            started_at,
        }),
    );
    root.start_dispatch().await?;

    // 5. Network, transport session, clock.
    {
        let network = Arc::clone(&deps.network);
        let hostname = network_config.hostname(&mac);
        let network_ready = states.network_ready.clone();
        task::run("network", move |ctx| async move {
            loop {
                match network.bring_up(&hostname).await {
                    Ok(()) => {
                        network_ready.set();
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "network bring-up failed, retrying");
                        ctx.delay(Duration::from_secs(10)).await;
                    }
                }
            }
        });
    }
    {
        // The broker session piggybacks on the network; its connect and
        // reconnect machinery lives behind the transport seam.
        let network_ready = states.network_ready.state();
        let transport_ready = states.transport_ready.clone();
        task::run("transport", move |_ctx| async move {
            network_ready.await_set().await;
            transport_ready.set();
        });
    }
    start_time_sync(
        Arc::clone(&deps.time_sync),
        states.network_ready.state(),
        states.rtc_in_sync.clone(),
    );

    // 6. Plugins, once wall-clock time is trusted.
    states.rtc_in_sync.await_set().await;

    let peripherals = Arc::new(PluginManager::new("peripheral", deps.peripheral_registry));
    let mut peripheral_records = Vec::new();
    for entry in &settings.peripherals {
        peripherals.create(entry, &mut peripheral_records);
    }
    peripherals.seal();

    let functions = Arc::new(PluginManager::with_lookup(
        "function",
        deps.function_registry,
        Arc::clone(&peripherals),
    ));
    let mut function_records = Vec::new();
    for entry in &settings.functions {
        let entry = with_function_config(entry, deps.function_kv.as_ref());
        functions.create(&entry, &mut function_records);
    }
    functions.seal();

    let init_state = init_state(&peripheral_records, &function_records);

    {
        let peripherals = Arc::clone(&peripherals);
        shutdown.register("peripherals", move || {
            peripherals.shutdown();
            Ok(())
        });
    }
    {
        let functions = Arc::clone(&functions);
        shutdown.register("functions", move || {
            functions.shutdown();
            Ok(())
        });
    }
    {
        let watchdog = Arc::clone(&watchdog);
        shutdown.register("watchdog", move || {
            watchdog.cancel();
            Ok(())
        });
    }

    // 7. Telemetry.
    let mut sources: Vec<TelemetrySource> = vec![
        {
            let platform = Arc::clone(&deps.platform);
            Box::new(move |doc: &mut Map<String, Value>| {
                doc.insert(
                    "memory".to_string(),
                    json!({
                        "free-heap": platform.free_heap(),
                        "min-heap": platform.min_free_heap(),
                    }),
                );
            }) as TelemetrySource
        },
        {
            let peripherals = Arc::clone(&peripherals);
            let functions = Arc::clone(&functions);
            Box::new(move |doc: &mut Map<String, Value>| {
                let mut features = Vec::new();
                peripherals.collect_telemetry(&mut features);
                functions.collect_telemetry(&mut features);
                doc.insert("features".to_string(), Value::Array(features));
            }) as TelemetrySource
        },
    ];
    sources.extend(deps.telemetry_sources);
    start_telemetry_loop(
        Arc::clone(&root),
        settings.publish_interval(),
        Arc::clone(&watchdog),
        Arc::new(sources),
        telemetry.clone(),
        started_at,
    );

    // 8. Init document, then open the gate.  The init publish needs a live
    // broker session; wait for it here.
    states.transport_ready.await_set().await;
    let init_doc = json!({
        "model": settings.model,
        "instance": instance,
        "mac": mac,
        "settings": settings_store.store()?,
        "version": deps.platform.firmware_version(),
        "debug": cfg!(debug_assertions),
        "reset": deps.platform.reset_reason(),
        "wakeup": deps.platform.wakeup_cause(),
        "bootCount": boot_count,
        "time": chrono::Utc::now().to_rfc3339(),
        "state": init_state.code(),
        "peripherals": peripheral_records,
        "functions": function_records,
        "sleepWhenIdle": settings.sleep_when_idle,
    });
    root.publish_with_timeout(
        "init",
        init_doc,
        Retention::NoRetain,
        QoS::AtLeastOnce,
        INIT_PUBLISH_TIMEOUT,
    )
    .await?;

    states.kernel_ready.set();
    info!(state = init_state.code(), "kernel ready");

    Ok(Kernel {
        states,
        root,
        shutdown,
        peripherals,
        functions,
        watchdog,
        telemetry,
        init_state,
        switch: Mutex::new(switch),
    })
}

/// What a boot-button hold of a given length means.  Lower bounds are
/// inclusive: a hold of exactly 5 s is a network reset, not a telemetry
/// trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldAction {
    FullReset,
    NetworkReset,
    RequestTelemetry,
}

fn hold_action(held: Duration) -> Option<HoldAction> {
    if held >= HOLD_FULL_RESET {
        Some(HoldAction::FullReset)
    } else if held >= HOLD_NETWORK_RESET {
        Some(HoldAction::NetworkReset)
    } else if held >= HOLD_TELEMETRY {
        Some(HoldAction::RequestTelemetry)
    } else {
        None
    }
}

/// Overall boot outcome from the per-entry records.
fn init_state(peripherals: &[InitRecord], functions: &[InitRecord]) -> InitState {
    if peripherals.iter().any(|r| !r.is_success()) {
        InitState::PeripheralError
    } else if functions.iter().any(|r| !r.is_success()) {
        InitState::FunctionError
    } else {
        InitState::Success
    }
}

/// Merge a function's persisted runtime config over its declared params.
fn with_function_config(entry: &PluginEntry, function_kv: &dyn KvStore) -> PluginEntry {
    match function_kv.get_json(&entry.name) {
        Ok(Some(stored)) => {
            let mut merged = entry.clone();
            merged.params = merge_params(&entry.params, &stored);
            merged
        }
        Ok(None) => entry.clone(),
        Err(e) => {
            warn!(function = %entry.name, error = %e, "ignoring unreadable function config");
            entry.clone()
        }
    }
}

fn merge_params(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                let slot = merged.entry(key.clone()).or_insert(Value::Null);
                *slot = merge_params(slot, value);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

fn wipe_namespace(kv: &dyn KvStore) -> Result<(), KernelError> {
    for key in kv.keys()? {
        kv.remove(&key)?;
    }
    Ok(())
}
