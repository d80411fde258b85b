//! [`ConfigSection`] – typed configuration sections.
//!
//! A section is an ordinary serde struct whose fields all have declared
//! defaults (`#[serde(default)]` + a `Default` impl).  The trait adds the
//! three operations every configuration object supports:
//!
//! - [`load`][ConfigSection::load] merges a *partial* document over the
//!   current values: only properties present in the input are overwritten,
//!   everything else keeps its prior value;
//! - [`store`][ConfigSection::store] always emits the *total* document,
//!   every property included;
//! - [`reset`][ConfigSection::reset] restores the declared defaults.
//!
//! Round-trip law: `load(store(s))` reproduces `s`.

use croftos_types::KernelError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Typed, defaultable configuration section.  Blanket-usable by any serde
/// struct that also implements `Default + Clone`.
pub trait ConfigSection:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// Merge `doc` over the current values.  Properties absent from `doc`
    /// are left untouched; nested objects merge recursively; scalars and
    /// arrays are replaced wholesale.
    ///
    /// On a merge that does not deserialize back into the section type,
    /// the section is left unchanged and an error is returned.
    fn load(&mut self, doc: &Value) -> Result<(), KernelError> {
        let mut current = serde_json::to_value(&*self)?;
        merge(&mut current, doc);
        *self = serde_json::from_value(current)?;
        Ok(())
    }

    /// Serialize the full current value set as a JSON document.
    fn store(&self) -> Result<Value, KernelError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Restore every property to its declared default.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl<T> ConfigSection for T where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

/// Deep-merge `incoming` into `target`: objects merge per key, everything
/// else replaces.
fn merge(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_map), Value::Object(incoming_map)) => {
            for (key, incoming_value) in incoming_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge(existing, incoming_value),
                    None => {
                        target_map.insert(key.clone(), incoming_value.clone());
                    }
                }
            }
        }
        (target, incoming) => *target = incoming.clone(),
    }
}
