//! Hardware configuration loading.
//!
//! A hardware file lists the devices a front end should connect to. Each
//! device carries a `[devices.driver]` table whose `type` field selects the
//! [`crate::driver::DriverFactory`]; the rest of the table is that driver's
//! own configuration.
//!
//! # Example TOML format:
//! ```toml
//! log_level = "info"
//!
//! [[devices]]
//! id = "stage_tec"
//! name = "Sample stage TEC"
//! [devices.driver]
//! type = "tec1089"
//! port = "/dev/ttyUSB0"
//! address = 2
//! ```
//!
//! Values can be overridden from the environment with the `TEC_` prefix,
//! nested fields separated by double underscores (e.g. `TEC_LOG_LEVEL=debug`).

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TEC_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Hardware configuration loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Default tracing filter for front ends (e.g. "info", "tec_core=debug")
    #[serde(default)]
    pub log_level: Option<String>,

    /// List of devices to connect
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Configuration for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique identifier (e.g., "stage_tec")
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,
    /// Driver type and driver-specific settings
    pub driver: toml::Table,
}

impl DeviceConfig {
    /// Value of the driver table's `type` field
    pub fn driver_type(&self) -> Option<&str> {
        self.driver.get("type").and_then(|v| v.as_str())
    }

    /// Driver table as a value, ready for `DriverFactory::validate`/`build`
    pub fn driver_config(&self) -> toml::Value {
        toml::Value::Table(self.driver.clone())
    }
}

impl HardwareConfig {
    /// Load and validate a hardware configuration file.
    ///
    /// The TOML file is merged with `TEC_`-prefixed environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
        }

        debug!("Loading hardware config from: {}", path.display());

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: HardwareConfig = figment
            .extract()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        info!(
            "Loaded hardware config with {} device(s) from {}",
            config.devices.len(),
            path.display()
        );

        Ok(config)
    }

    /// Check cross-device invariants: unique ids, every driver names a type.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for device in &self.devices {
            if !seen.insert(device.id.as_str()) {
                errors.push(format!("duplicate device id '{}'", device.id));
            }
            if device.driver_type().is_none() {
                errors.push(format!("device '{}' has no driver type", device.id));
            }
        }

        if !errors.is_empty() {
            return Err(ConfigLoadError::ValidationError(errors.join("; ")).into());
        }
        Ok(())
    }

    /// Find a device by id, or the first device of the given driver type.
    pub fn find_device(&self, id: Option<&str>, driver_type: &str) -> Option<&DeviceConfig> {
        match id {
            Some(id) => self.devices.iter().find(|d| d.id == id),
            None => self
                .devices
                .iter()
                .find(|d| d.driver_type() == Some(driver_type)),
        }
    }
}
