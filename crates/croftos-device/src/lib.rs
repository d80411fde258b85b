//! `croftos-device` – the device kernel: settings, built-in commands and
//! the state-gated boot sequence.
//!
//! The binary in `main.rs` runs a host simulation of the device; the
//! library surface exists so integration tests (and other hosts) can boot
//! the kernel with their own seam implementations.
//!
//! # Modules
//!
//! - [`settings`] – the persisted `network-config` and `device-config`
//!   schemas.
//! - [`platform`] – the [`Platform`][platform::Platform] board/OS seam and
//!   the host stand-in.
//! - [`states`] – the [`BootStates`][states::BootStates] latch bundle.
//! - [`rtc`] – the [`TimeSync`][rtc::TimeSync] seam and the clock-sync
//!   task that opens the `rtc_in_sync` gate.
//! - [`commands`] – the built-in command handlers (`restart`, `sleep`,
//!   `update`, `nvs/*`, `ping`).
//! - [`boot`] – [`start_device`][boot::start_device]: the boot
//!   orchestrator, and the [`Kernel`][boot::Kernel] handle it returns.
//! - [`logging`] – `tracing` subscriber setup for the binary.

pub mod boot;
pub mod commands;
pub mod logging;
pub mod platform;
pub mod rtc;
pub mod settings;
pub mod states;

pub use boot::{DeviceDeps, HostNetwork, Kernel, NetworkDriver, start_device};
pub use commands::UpdateRequester;
pub use platform::{HostPlatform, Platform};
pub use rtc::TimeSync;
pub use settings::{DeviceSettings, LogLevel, NetworkConfig};
pub use states::BootStates;
