//! Persisted device configuration schemas.
//!
//! Two sections live in the configuration namespace: `network-config`
//! (provisioning: identity, broker, NTP) and `device-config` (what this
//! device runs: the declarative peripheral and function lists plus runtime
//! tuning).  Both hydrate through
//! [`ConfigStore`](croftos_config::ConfigStore), so a partial persisted
//! document merges over these defaults.
//!
//! Per-function runtime config blobs live in the separate `function-cfg`
//! namespace, keyed by function name, so reconfiguring one function never
//! rewrites the device document.

use std::time::Duration;

use croftos_types::PluginEntry;
use serde::{Deserialize, Serialize};

/// Key of the [`NetworkConfig`] section in the config namespace.
pub const NETWORK_CONFIG_KEY: &str = "network-config";
/// Key of the [`DeviceSettings`] section in the config namespace.
pub const DEVICE_CONFIG_KEY: &str = "device-config";
/// Namespace holding per-function runtime config blobs.
pub const FUNCTION_CONFIG_NAMESPACE: &str = "function-cfg";

/// Provisioning-time identity and connectivity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Device instance id; empty means "use the MAC address".
    pub instance: String,
    /// Site prefix for the topic root; empty for none.
    pub location: String,
    /// Broker host.
    pub host: String,
    pub port: u16,
    pub ntp: NtpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NtpConfig {
    pub host: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            instance: String::new(),
            location: String::new(),
            host: String::new(),
            port: 1883,
            ntp: NtpConfig::default(),
        }
    }
}

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            host: "pool.ntp.org".to_string(),
        }
    }
}

impl NetworkConfig {
    /// The effective instance id: the configured one, or `mac` when unset.
    pub fn instance_or(&self, mac: &str) -> String {
        if self.instance.is_empty() {
            mac.to_string()
        } else {
            self.instance.clone()
        }
    }

    /// A hostname-safe rendering of the instance id.  MAC-style colons
    /// become dashes and `?` (unknown-MAC octets) is stripped.
    pub fn hostname(&self, mac: &str) -> String {
        self.instance_or(mac)
            .chars()
            .filter(|c| *c != '?')
            .map(|c| if c == ':' { '-' } else { c })
            .collect()
    }
}

/// Minimum log level republished over the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// What this device runs and how often it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceSettings {
    pub model: String,
    pub peripherals: Vec<PluginEntry>,
    pub functions: Vec<PluginEntry>,
    pub sleep_when_idle: bool,
    /// Seconds between periodic telemetry publications.
    pub publish_interval: u64,
    pub publish_logs: LogLevel,
    /// Seconds without a telemetry cycle before the watchdog fires.
    pub watchdog_timeout: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            peripherals: Vec::new(),
            functions: Vec::new(),
            sleep_when_idle: true,
            publish_interval: 300,
            publish_logs: LogLevel::Info,
            watchdog_timeout: 900,
        }
    }
}

impl DeviceSettings {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croftos_config::section::ConfigSection;
    use serde_json::json;

    #[test]
    fn network_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.ntp.host, "pool.ntp.org");
        assert!(config.instance.is_empty());
    }

    #[test]
    fn instance_falls_back_to_mac() {
        let config = NetworkConfig::default();
        assert_eq!(config.instance_or("aa:bb:cc"), "aa:bb:cc");

        let named = NetworkConfig {
            instance: "glasshouse-1".to_string(),
            ..NetworkConfig::default()
        };
        assert_eq!(named.instance_or("aa:bb:cc"), "glasshouse-1");
    }

    #[test]
    fn hostname_sanitises_mac_characters() {
        let config = NetworkConfig::default();
        assert_eq!(config.hostname("aa:bb:cc:dd:ee:ff"), "aa-bb-cc-dd-ee-ff");
        assert_eq!(config.hostname("a?:bb"), "a-bb");
    }

    #[test]
    fn device_defaults() {
        let settings = DeviceSettings::default();
        assert!(settings.sleep_when_idle);
        assert_eq!(settings.publish_interval(), Duration::from_secs(300));
        assert_eq!(settings.watchdog_timeout(), Duration::from_secs(900));
        assert_eq!(settings.publish_logs, LogLevel::Info);
        assert!(settings.peripherals.is_empty());
    }

    #[test]
    fn device_settings_load_a_declarative_document() {
        let mut settings = DeviceSettings::default();
        settings
            .load(&json!({
                "model": "croftling-mk1",
                "peripherals": [
                    {"type": "valve", "name": "main-valve", "params": {"pin": 12}}
                ],
                "functions": [
                    {"type": "thermostat", "name": "heat", "params": {"switch": "main-valve"}}
                ],
                "publishInterval": 60,
                "publishLogs": "debug"
            }))
            .unwrap();

        assert_eq!(settings.model, "croftling-mk1");
        assert_eq!(settings.peripherals.len(), 1);
        assert_eq!(settings.peripherals[0].kind, "valve");
        assert_eq!(settings.functions[0].params["switch"], "main-valve");
        assert_eq!(settings.publish_interval, 60);
        assert_eq!(settings.publish_logs, LogLevel::Debug);
        // Unspecified properties keep their defaults.
        assert_eq!(settings.watchdog_timeout, 900);
    }

    #[test]
    fn settings_round_trip_through_store() {
        let settings = DeviceSettings {
            model: "croftling-mk1".to_string(),
            ..DeviceSettings::default()
        };
        let doc = settings.store().unwrap();
        assert_eq!(doc["model"], "croftling-mk1");
        assert_eq!(doc["sleepWhenIdle"], true);

        let mut reloaded = DeviceSettings::default();
        reloaded.load(&doc).unwrap();
        assert_eq!(reloaded, settings);
    }
}
