//! `croftos-plugins` – plugin registry and lifecycle management.
//!
//! Peripherals and functions are both "plugins": named instances created
//! from declarative `{type, name, params}` configuration entries through a
//! factory registry.  The same machinery serves both; a function manager
//! additionally resolves already-created peripherals by name.
//!
//! # Modules
//!
//! - [`plugin`] – the [`Plugin`][plugin::Plugin] instance trait.
//! - [`registry`] – [`PluginRegistry`][registry::PluginRegistry]: type tag →
//!   factory lookup.
//! - [`manager`] – [`PluginManager`][manager::PluginManager]: per-entry
//!   creation with partial-failure isolation, name-keyed lookup, ordered
//!   shutdown.
//! - [`shutdown`] – [`ShutdownManager`][shutdown::ShutdownManager]:
//!   total-effort shutdown listener list for the whole device.

pub mod manager;
pub mod plugin;
pub mod registry;
pub mod shutdown;

pub use manager::{ManagerState, PluginManager};
pub use plugin::Plugin;
pub use registry::{FactoryContext, PluginRegistry};
pub use shutdown::ShutdownManager;
