//! [`PluginRegistry`] – type tag → factory lookup.
//!
//! A factory maps a configuration entry's name and `params` document to a
//! live [`Plugin`] instance, or an error when the parameters are unusable.
//! Factories capture whatever services they need (bus managers, stores,
//! the telemetry trigger) at registration time; function factories resolve
//! peripherals through [`FactoryContext::peripherals`].

use std::collections::HashMap;
use std::sync::Arc;

use croftos_types::KernelError;
use serde_json::Value;

use crate::manager::PluginManager;
use crate::plugin::Plugin;

/// Everything a factory gets to work with when creating one instance.
pub struct FactoryContext<'a> {
    /// The configured instance name.
    pub name: &'a str,
    /// The entry's raw `params` document.
    pub params: &'a Value,
    /// Lookup over already-created peripherals; `None` for managers whose
    /// plugins do not depend on other plugins.
    pub peripherals: Option<&'a PluginManager>,
}

type PluginFactory =
    Box<dyn Fn(&FactoryContext<'_>) -> Result<Arc<dyn Plugin>, KernelError> + Send + Sync>;

/// Open registry mapping a declared type name to a constructor.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `type_name`.  A previously registered
    /// factory with the same tag is replaced.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&FactoryContext<'_>) -> Result<Arc<dyn Plugin>, KernelError> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Box::new(factory));
    }

    pub(crate) fn get(&self, type_name: &str) -> Option<&PluginFactory> {
        self.factories.get(type_name)
    }

    /// The registered type tags, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
