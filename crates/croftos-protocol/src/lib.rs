//! `croftos-protocol` – command/telemetry protocol over a publish-subscribe
//! transport.
//!
//! The transport's connection and reconnect machinery is an external
//! collaborator behind the [`Transport`][transport::Transport] trait; this
//! crate owns the topic layout, the command/response dispatch contract
//! (including retained-command consumption) and the debounced telemetry
//! publication loop.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`][transport::Transport] seam, the
//!   [`Message`][transport::Message] wire shape, and
//!   [`MemoryTransport`][transport::MemoryTransport], an in-process broker
//!   with retained-message support for tests and host simulation.
//! - [`root`] – [`ProtocolRoot`][root::ProtocolRoot]: the device's topic
//!   root, command registration and dispatch, response publication.
//! - [`telemetry`] – [`TelemetryPublisher`][telemetry::TelemetryPublisher]
//!   (single-slot coalescing trigger) and the periodic telemetry loop that
//!   kicks the watchdog.

pub mod root;
pub mod telemetry;
pub mod transport;

pub use root::{ProtocolRoot, device_root};
pub use telemetry::{TELEMETRY_DEBOUNCE, TelemetryPublisher, TelemetrySource, start_telemetry_loop};
pub use transport::{MemoryTransport, Message, QoS, Retention, Transport};
