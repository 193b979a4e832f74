//! Configuration for the device server.
//!
//! A [`Config`] is resolved once at startup (TOML file, then environment
//! overrides) and handed by reference to the server and the watchdog. Nothing
//! mutates it afterwards.
//!
//! ```toml
//! device = "HXM012345"
//! port = "/dev/rfcomm0"
//! enable_watchdog = true
//! liveness_threshold_ms = 10000
//! spin_time_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Watchdog tick interval in milliseconds.
pub const SPIN_TIME_MS: u64 = 1000;

/// Default silence, in milliseconds, before the watchdog gives up on a device.
pub const LIVENESS_THRESHOLD_MS: u64 = 10_000;

/// Overrides the configured serial port.
pub const ENV_PORT: &str = "SENSORLINK_PORT";

/// Overrides `enable_watchdog` (`0`, `1`, `true`, `false`).
pub const ENV_WATCHDOG: &str = "SENSORLINK_WATCHDOG";

/// Device server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Friendly (Bluetooth) name of the device; selects the driver family.
    pub device: String,

    /// Serial port the device is reachable on.
    pub port: String,

    /// Start the liveness watchdog once connected.
    #[serde(default = "default_enable_watchdog")]
    pub enable_watchdog: bool,

    /// Silence tolerated before the watchdog terminates the process.
    #[serde(default = "default_liveness_threshold_ms")]
    pub liveness_threshold_ms: u64,

    /// Watchdog tick interval.
    #[serde(default = "default_spin_time_ms")]
    pub spin_time_ms: u64,
}

fn default_enable_watchdog() -> bool {
    true
}

fn default_liveness_threshold_ms() -> u64 {
    LIVENESS_THRESHOLD_MS
}

fn default_spin_time_ms() -> u64 {
    SPIN_TIME_MS
}

impl Config {
    /// Configuration for `device` on `port` with every other setting at its
    /// default.
    pub fn new(device: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            port: port.into(),
            enable_watchdog: default_enable_watchdog(),
            liveness_threshold_ms: default_liveness_threshold_ms(),
            spin_time_ms: default_spin_time_ms(),
        }
    }

    /// Load configuration from a TOML file, apply environment overrides and
    /// validate the result.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port;
        }

        if let Some(flag) = lookup(ENV_WATCHDOG) {
            self.enable_watchdog = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(Error::Config(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_WATCHDOG, other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Error::Config("device name is empty".to_string()));
        }
        if self.port.trim().is_empty() {
            return Err(Error::Config("port is empty".to_string()));
        }
        if self.spin_time_ms == 0 {
            return Err(Error::Config("spin_time_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Silence tolerated before the watchdog fires.
    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_millis(self.liveness_threshold_ms)
    }

    /// Watchdog tick interval.
    pub fn spin_time(&self) -> Duration {
        Duration::from_millis(self.spin_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = Config::from_toml_str(
            r#"
            device = "HXM012345"
            port = "/dev/rfcomm0"
            "#,
        )
        .unwrap();

        assert_eq!(config, Config::new("HXM012345", "/dev/rfcomm0"));
        assert!(config.enable_watchdog);
        assert_eq!(config.spin_time(), Duration::from_secs(1));
        assert_eq!(config.liveness_threshold(), Duration::from_secs(10));
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::from_toml_str(
            r#"
            device = "beam"
            port = "COM4"
            enable_watchdog = false
            liveness_threshold_ms = 2500
            spin_time_ms = 250
            "#,
        )
        .unwrap();

        assert!(!config.enable_watchdog);
        assert_eq!(config.liveness_threshold(), Duration::from_millis(2500));
        assert_eq!(config.spin_time(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str(
            r#"
            device = "beam"
            port = "COM4"
            enable_watchdgo = false
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_missing_port_rejected() {
        assert!(Config::from_toml_str(r#"device = "beam""#).is_err());
    }

    #[test_case("1", true ; "one")]
    #[test_case("true", true ; "true word")]
    #[test_case("OFF", false ; "off uppercase")]
    #[test_case(" 0 ", false ; "zero padded")]
    fn test_env_watchdog_override(value: &str, expected: bool) {
        let mut config = Config::new("beam", "COM4");
        config.enable_watchdog = !expected;
        config
            .apply_env(|key| (key == ENV_WATCHDOG).then(|| value.to_string()))
            .unwrap();
        assert_eq!(config.enable_watchdog, expected);
    }

    #[test]
    fn test_env_port_override() {
        let mut config = Config::new("beam", "COM4");
        config
            .apply_env(|key| (key == ENV_PORT).then(|| "/dev/ttyUSB1".to_string()))
            .unwrap();
        assert_eq!(config.port, "/dev/ttyUSB1");
    }

    #[test]
    fn test_env_watchdog_garbage_rejected() {
        let mut config = Config::new("beam", "COM4");
        let err = config
            .apply_env(|key| (key == ENV_WATCHDOG).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test_case("", "COM4" ; "empty device")]
    #[test_case("beam", "  " ; "blank port")]
    fn test_validate_rejects_blank(device: &str, port: &str) {
        assert!(Config::new(device, port).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_spin() {
        let mut config = Config::new("beam", "COM4");
        config.spin_time_ms = 0;
        assert!(config.validate().is_err());
    }
}
