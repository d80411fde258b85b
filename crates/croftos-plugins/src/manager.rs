//! [`PluginManager`] – creates, tracks and tears down named plugin
//! instances.
//!
//! One manager serves peripherals, a structurally identical second one
//! serves functions.  Creation happens during the boot pass with
//! partial-failure isolation: a bad entry is logged and reported in the
//! results accumulator, and the pass continues with the remaining entries —
//! one misconfigured peripheral degrades observability, it never blocks the
//! rest of the device.
//!
//! Lifecycle per manager: `Empty → Populating → Ready` during boot, then
//! `Ready → ShuttingDown → Terminated` on the way down.  Nothing leaves
//! `Terminated`.

use std::sync::{Arc, Mutex};

use croftos_types::{InitRecord, KernelError, PluginEntry};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::plugin::Plugin;
use crate::registry::{FactoryContext, PluginRegistry};

/// Lifecycle state of a [`PluginManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Empty,
    Populating,
    Ready,
    ShuttingDown,
    Terminated,
}

struct Inner {
    // Insertion order preserved; shutdown walks it in reverse.
    instances: Vec<(String, Arc<dyn Plugin>)>,
    state: ManagerState,
}

/// Factory-driven collection of named plugin instances.
pub struct PluginManager {
    kind: String,
    registry: PluginRegistry,
    // Lookup service for factories whose plugins depend on plugins of
    // another manager (functions depending on peripherals).
    lookup: Option<Arc<PluginManager>>,
    inner: Mutex<Inner>,
}

impl PluginManager {
    /// A manager whose factories stand alone.
    pub fn new(kind: impl Into<String>, registry: PluginRegistry) -> Self {
        Self {
            kind: kind.into(),
            registry,
            lookup: None,
            inner: Mutex::new(Inner {
                instances: Vec::new(),
                state: ManagerState::Empty,
            }),
        }
    }

    /// A manager whose factories may resolve instances of `peripherals` by
    /// name through [`FactoryContext::peripherals`].
    pub fn with_lookup(
        kind: impl Into<String>,
        registry: PluginRegistry,
        peripherals: Arc<PluginManager>,
    ) -> Self {
        Self {
            lookup: Some(peripherals),
            ..Self::new(kind, registry)
        }
    }

    /// Create one instance from `entry`, appending its outcome to
    /// `results`.  Returns whether the entry succeeded; failures (unknown
    /// type, duplicate name, factory error) are logged and reported, and
    /// the caller is expected to continue with the remaining entries.
    pub fn create(&self, entry: &PluginEntry, results: &mut Vec<InitRecord>) -> bool {
        match self.try_create(entry) {
            Ok(()) => {
                info!(kind = %self.kind, name = %entry.name, r#type = %entry.kind, "created");
                results.push(InitRecord::success(&entry.name, &entry.kind));
                true
            }
            Err(e) => {
                warn!(kind = %self.kind, name = %entry.name, r#type = %entry.kind, error = %e,
                    "failed to create");
                results.push(InitRecord::failure(&entry.name, &entry.kind, e.to_string()));
                false
            }
        }
    }

    fn try_create(&self, entry: &PluginEntry) -> Result<(), KernelError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            ManagerState::Empty => inner.state = ManagerState::Populating,
            ManagerState::Populating => {}
            state => {
                return Err(KernelError::PluginInit {
                    name: entry.name.clone(),
                    reason: format!("{} manager is not populating (state {state:?})", self.kind),
                });
            }
        }
        if inner.instances.iter().any(|(name, _)| *name == entry.name) {
            return Err(KernelError::DuplicatePluginName {
                name: entry.name.clone(),
            });
        }
        let factory =
            self.registry
                .get(&entry.kind)
                .ok_or_else(|| KernelError::UnknownPluginType {
                    kind: entry.kind.clone(),
                })?;
        let ctx = FactoryContext {
            name: &entry.name,
            params: &entry.params,
            peripherals: self.lookup.as_deref(),
        };
        let instance = factory(&ctx)?;
        inner.instances.push((entry.name.clone(), instance));
        Ok(())
    }

    /// Close the boot pass: no further instances can be created.
    pub fn seal(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(inner.state, ManagerState::Empty | ManagerState::Populating) {
            debug!(kind = %self.kind, instances = inner.instances.len(), "sealed");
            inner.state = ManagerState::Ready;
        }
    }

    /// Resolve a live instance by its configured name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .instances
            .iter()
            .find(|(instance_name, _)| instance_name == name)
            .map(|(_, instance)| Arc::clone(instance))
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .instances
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Append each instance's telemetry contribution to `features`.
    pub fn collect_telemetry(&self, features: &mut Vec<Value>) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (_, instance) in &inner.instances {
            if let Some(value) = instance.telemetry() {
                features.push(value);
            }
        }
    }

    /// Tear down every instance, newest first.  Errors are logged and
    /// swallowed so that every remaining instance still gets shut down.
    pub fn shutdown(&self) {
        let drained = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(
                inner.state,
                ManagerState::ShuttingDown | ManagerState::Terminated
            ) {
                return;
            }
            inner.state = ManagerState::ShuttingDown;
            std::mem::take(&mut inner.instances)
        };
        for (name, instance) in drained.into_iter().rev() {
            if let Err(e) = instance.shutdown() {
                warn!(kind = %self.kind, name = %name, error = %e, "shutdown listener failed");
            } else {
                debug!(kind = %self.kind, name = %name, "shut down");
            }
        }
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state = ManagerState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockPeripheral {
        name: String,
        feature: Option<Value>,
        shutdown_log: Arc<Mutex<Vec<String>>>,
        fail_shutdown: bool,
        shut_down: AtomicBool,
    }

    impl Plugin for MockPeripheral {
        fn name(&self) -> &str {
            &self.name
        }
        fn telemetry(&self) -> Option<Value> {
            self.feature.clone()
        }
        fn shutdown(&self) -> Result<(), KernelError> {
            self.shut_down.store(true, Ordering::SeqCst);
            self.shutdown_log.lock().unwrap().push(self.name.clone());
            if self.fail_shutdown {
                return Err(KernelError::PluginInit {
                    name: self.name.clone(),
                    reason: "release failed".to_string(),
                });
            }
            Ok(())
        }
    }

    fn manager_with_mock_types(shutdown_log: Arc<Mutex<Vec<String>>>) -> PluginManager {
        let mut registry = PluginRegistry::new();
        {
            let log = Arc::clone(&shutdown_log);
            registry.register("valve", move |ctx| {
                Ok(Arc::new(MockPeripheral {
                    name: ctx.name.to_string(),
                    feature: Some(json!({"type": "valve", "name": ctx.name})),
                    shutdown_log: Arc::clone(&log),
                    fail_shutdown: false,
                    shut_down: AtomicBool::new(false),
                }) as Arc<dyn Plugin>)
            });
        }
        {
            let log = Arc::clone(&shutdown_log);
            registry.register("flaky", move |ctx| {
                Ok(Arc::new(MockPeripheral {
                    name: ctx.name.to_string(),
                    feature: None,
                    shutdown_log: Arc::clone(&log),
                    fail_shutdown: true,
                    shut_down: AtomicBool::new(false),
                }) as Arc<dyn Plugin>)
            });
        }
        registry.register("broken", |ctx| {
            Err(KernelError::PluginInit {
                name: ctx.name.to_string(),
                reason: "no such pin".to_string(),
            })
        });
        PluginManager::new("peripheral", registry)
    }

    fn entry(kind: &str, name: &str) -> PluginEntry {
        PluginEntry {
            kind: kind.to_string(),
            name: name.to_string(),
            params: Value::Null,
        }
    }

    #[test]
    fn boot_pass_isolates_malformed_entries() {
        let manager = manager_with_mock_types(Arc::default());
        let entries = vec![
            entry("valve", "valve-a"),
            entry("bogus", "x"),          // unknown type
            entry("valve", "valve-b"),
            entry("valve", "valve-a"),    // duplicate name
            entry("broken", "dead-pin"),  // factory error
            entry("valve", "valve-c"),
        ];

        let mut results = Vec::new();
        let outcomes: Vec<bool> = entries
            .iter()
            .map(|e| manager.create(e, &mut results))
            .collect();

        assert_eq!(outcomes, vec![true, false, true, false, false, true]);
        // N descriptors, in input order, with K failures.
        assert_eq!(results.len(), 6);
        assert_eq!(
            results.iter().filter(|r| !r.is_success()).count(),
            3,
            "three failure descriptors expected"
        );
        assert_eq!(results[1].name, "x");
        assert!(results[1].error.as_deref().unwrap().contains("bogus"));
        assert!(results[3].error.as_deref().unwrap().contains("valve-a"));
        assert!(results[4].error.as_deref().unwrap().contains("no such pin"));
        // Exactly N−K instances exist afterwards.
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn get_resolves_created_instances_by_name() {
        let manager = manager_with_mock_types(Arc::default());
        let mut results = Vec::new();
        manager.create(&entry("valve", "main"), &mut results);

        assert!(manager.get("main").is_some());
        assert!(manager.get("other").is_none());
    }

    #[test]
    fn function_factories_resolve_peripherals_through_lookup() {
        let peripherals = Arc::new(manager_with_mock_types(Arc::default()));
        let mut results = Vec::new();
        peripherals.create(&entry("valve", "heater-valve"), &mut results);
        peripherals.seal();

        let mut registry = PluginRegistry::new();
        registry.register("thermostat", |ctx| {
            let target = ctx.params["switch"].as_str().unwrap_or_default();
            let valve = ctx
                .peripherals
                .and_then(|p| p.get(target))
                .ok_or_else(|| KernelError::PluginInit {
                    name: ctx.name.to_string(),
                    reason: format!("peripheral '{target}' not found"),
                })?;
            struct Thermostat {
                name: String,
                _valve: Arc<dyn Plugin>,
            }
            impl Plugin for Thermostat {
                fn name(&self) -> &str {
                    &self.name
                }
            }
            Ok(Arc::new(Thermostat {
                name: ctx.name.to_string(),
                _valve: valve,
            }) as Arc<dyn Plugin>)
        });
        let functions = PluginManager::with_lookup("function", registry, peripherals);

        let mut results = Vec::new();
        let ok = functions.create(
            &PluginEntry {
                kind: "thermostat".to_string(),
                name: "greenhouse-heat".to_string(),
                params: json!({"switch": "heater-valve"}),
            },
            &mut results,
        );
        assert!(ok);

        // A dangling reference is reported, not fatal.
        let ok = functions.create(
            &PluginEntry {
                kind: "thermostat".to_string(),
                name: "broken-heat".to_string(),
                params: json!({"switch": "missing"}),
            },
            &mut results,
        );
        assert!(!ok);
        assert!(results[1].error.as_deref().unwrap().contains("missing"));
    }

    #[test]
    fn sealed_manager_rejects_new_instances() {
        let manager = manager_with_mock_types(Arc::default());
        let mut results = Vec::new();
        manager.create(&entry("valve", "valve-a"), &mut results);
        manager.seal();
        assert_eq!(manager.state(), ManagerState::Ready);

        let ok = manager.create(&entry("valve", "late"), &mut results);
        assert!(!ok);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn shutdown_runs_newest_first_and_swallows_errors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager_with_mock_types(Arc::clone(&log));
        let mut results = Vec::new();
        manager.create(&entry("valve", "first"), &mut results);
        manager.create(&entry("flaky", "second"), &mut results);
        manager.create(&entry("valve", "third"), &mut results);
        manager.seal();

        manager.shutdown();

        // Reverse insertion order, and the flaky one did not stop the rest.
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(manager.state(), ManagerState::Terminated);
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn shutdown_is_terminal_and_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager_with_mock_types(Arc::clone(&log));
        let mut results = Vec::new();
        manager.create(&entry("valve", "only"), &mut results);

        manager.shutdown();
        manager.shutdown();
        assert_eq!(log.lock().unwrap().len(), 1);

        // No way back out of Terminated.
        let ok = manager.create(&entry("valve", "reborn"), &mut results);
        assert!(!ok);
        assert_eq!(manager.state(), ManagerState::Terminated);
    }

    #[test]
    fn collect_telemetry_gathers_contributions_in_order() {
        let manager = manager_with_mock_types(Arc::default());
        let mut results = Vec::new();
        manager.create(&entry("valve", "valve-a"), &mut results);
        manager.create(&entry("flaky", "quiet"), &mut results); // contributes nothing
        manager.create(&entry("valve", "valve-b"), &mut results);

        let mut features = Vec::new();
        manager.collect_telemetry(&mut features);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["name"], "valve-a");
        assert_eq!(features[1]["name"], "valve-b");
    }

    #[test]
    fn state_progression() {
        let manager = manager_with_mock_types(Arc::default());
        assert_eq!(manager.state(), ManagerState::Empty);

        let mut results = Vec::new();
        manager.create(&entry("valve", "v"), &mut results);
        assert_eq!(manager.state(), ManagerState::Populating);

        manager.seal();
        assert_eq!(manager.state(), ManagerState::Ready);

        manager.shutdown();
        assert_eq!(manager.state(), ManagerState::Terminated);
    }
}
