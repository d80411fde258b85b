//! [`ConfigStore`] – one typed section bound to a persistence key.
//!
//! Construction hydrates the in-memory section from the backend, falling
//! back to defaults when the blob is absent, empty or corrupt (corruption is
//! logged, never fatal).  [`ConfigStore::update`] is the single path for
//! runtime reconfiguration: it merges the incoming document, persists the
//! *full* current document, and then notifies every registered observer in
//! registration order — boot-time hydration and protocol-driven
//! reconfiguration share the same validation and persistence guarantees.
//!
//! A failed persist is returned to the caller as `Err`: the boot path
//! propagates it, command handlers report it in the response document.

use std::sync::{Arc, Mutex, RwLock};

use croftos_types::KernelError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::kv::KvStore;
use crate::section::ConfigSection;

type UpdateCallback = Box<dyn Fn(&Value) + Send + Sync>;

/// A typed configuration section persisted under one key of a [`KvStore`]
/// namespace, with ordered change notification.
pub struct ConfigStore<T: ConfigSection> {
    backend: Arc<dyn KvStore>,
    key: String,
    section: RwLock<T>,
    callbacks: Mutex<Vec<UpdateCallback>>,
}

impl<T: ConfigSection> ConfigStore<T> {
    /// Bind a fresh section (at its defaults) to `key` and hydrate it from
    /// the backend.  Missing, empty or corrupt data leaves the defaults in
    /// place.
    pub fn new(backend: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut section = T::default();
        match backend.get_json(&key) {
            Ok(Some(doc)) => match section.load(&doc) {
                Ok(()) => debug!(key, "loaded persisted config"),
                Err(e) => {
                    warn!(key, error = %e, "persisted config does not match schema, using defaults");
                    section = T::default();
                }
            },
            Ok(None) => debug!(key, "no persisted config, using defaults"),
            Err(e) => warn!(key, error = %e, "cannot read persisted config, using defaults"),
        }
        Self {
            backend,
            key,
            section: RwLock::new(section),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Merge `doc` into the section, persist the full current document, then
    /// invoke every registered callback with the raw incoming document, in
    /// registration order, before returning.
    pub fn update(&self, doc: &Value) -> Result<(), KernelError> {
        {
            let mut section = self.section.write().unwrap_or_else(|e| e.into_inner());
            section.load(doc)?;
            let full = section.store()?;
            self.backend.set_json(&self.key, &full)?;
        }
        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for callback in callbacks.iter() {
            callback(doc);
        }
        Ok(())
    }

    /// Register an additional reaction to every future
    /// [`update`][Self::update].
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(callback));
    }

    /// Serialize the current full value set.  No side effects.
    pub fn store(&self) -> Result<Value, KernelError> {
        self.section
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .store()
    }

    /// Restore defaults in memory only; persisting is the caller's call.
    pub fn reset(&self) {
        self.section
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
    }

    /// A copy of the current section value.
    pub fn snapshot(&self) -> T {
        self.section
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The backend key this store persists under.
    pub fn key(&self) -> &str {
        &self.key
    }
}
