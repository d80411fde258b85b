//! The [`Plugin`] trait implemented by every peripheral and function
//! instance.
//!
//! An instance owns the resources it acquired during construction (pins,
//! bus handles, timers) and releases them in [`Plugin::shutdown`].  Shared
//! handles (`Arc<dyn Plugin>`) are handed out by the manager so that
//! functions can drive the peripherals they depend on; instances use
//! interior mutability for their own state.

use croftos_types::KernelError;
use serde_json::Value;

/// A live peripheral or function created from a configuration entry.
pub trait Plugin: Send + Sync {
    /// The unique name this instance was configured under.
    fn name(&self) -> &str;

    /// Contribution to the telemetry document's `features` array, if any.
    fn telemetry(&self) -> Option<Value> {
        None
    }

    /// Release owned resources.  Called once, during manager shutdown;
    /// errors are logged and swallowed by the caller.
    fn shutdown(&self) -> Result<(), KernelError> {
        Ok(())
    }
}
