//! `croftos-types` – shared wire and data types.
//!
//! Every other CroftOS crate depends on this one for the plugin
//! configuration entry format, the per-item boot results that end up in the
//! `init` document, and the global [`KernelError`] taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One declarative plugin configuration entry, as found in the
/// `peripherals` and `functions` arrays of the device configuration.
///
/// `name` must be unique within its manager; `type` selects the registered
/// factory; `params` is handed to the factory untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

/// Per-entry outcome of a plugin boot pass.  Serialized into the
/// `peripherals` / `functions` arrays of the `init` document.
///
/// A record without an `error` field is a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitRecord {
    /// A successful creation record.
    pub fn success(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            error: None,
        }
    }

    /// A failure record carrying the reason the entry was rejected.
    pub fn failure(
        name: impl Into<String>,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            error: Some(reason.into()),
        }
    }

    /// Whether this record describes a successfully created instance.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Overall outcome of the boot-time plugin population, reported in the
/// `state` field of the `init` document.
///
/// A peripheral failure is reported even when functions failed too:
/// functions depend on peripherals, so the peripheral error is the root
/// cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Success,
    PeripheralError,
    FunctionError,
}

impl InitState {
    /// Numeric code used on the wire: 0 = success, 1 = peripheral error,
    /// 2 = function error.
    pub fn code(self) -> u8 {
        match self {
            InitState::Success => 0,
            InitState::PeripheralError => 1,
            InitState::FunctionError => 2,
        }
    }
}

/// Global error type spanning configuration, storage, plugin lifecycle and
/// transport failures.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("configuration error for '{key}': {message}")]
    Config { key: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error for '{key}': {message}")]
    Storage { key: String, message: String },

    #[error("unknown plugin type '{kind}'")]
    UnknownPluginType { kind: String },

    #[error("duplicate plugin name '{name}'")]
    DuplicatePluginName { name: String },

    #[error("plugin '{name}' failed to initialize: {reason}")]
    PluginInit { name: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("time sync failed: {0}")]
    TimeSync(String),

    #[error("update error: {0}")]
    Update(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }
}
