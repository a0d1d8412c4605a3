//! Meerstetter TEC-1089-SV Thermoelectric Controller Driver
//!
//! Reference: Meerstetter "MeCom" communication protocol 5117 / TEC parameter list 5136
//!
//! Protocol Overview:
//! - Format: ASCII frames, `#` + address + sequence + operation + fields + CRC-16/XMODEM
//! - Baud: 57600, 8N1, no flow control
//! - Terminator: CR (`\r`) in both directions
//! - Operations: `?VR` (read parameter), `VS` (set parameter), `?IF` (identify),
//!   `ES` (emergency stop), `RS` (reset)
//!
//! On connect the driver disables flash persistence (parameter 108) and sets
//! the ramp start point (50010) so repeated set-point writes don't wear the
//! controller's flash, then reads the identity string.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tec_driver_meerstetter::{Tec1089Config, Tec1089Driver};
//! use tec_core::capabilities::TemperatureControl;
//!
//! let driver = Tec1089Driver::connect(&Tec1089Config::new("/dev/ttyUSB0")).await?;
//! driver.set_target_temperature(25.0).await?;
//! driver.enable_control().await?;
//! ```

use crate::session::DeviceSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tec_core::capabilities::{Readable, StabilityState, TemperatureControl};
use tec_core::driver::DriverFactory;
use tec_core::error::{TecError, TecResult};
use tec_core::transport::{SerialTransport, Transport};
use tracing::instrument;

/// Default MeCom address of a TEC-1089-SV.
pub const DEFAULT_ADDRESS: u8 = 2;
/// Default line rate.
pub const DEFAULT_BAUD_RATE: u32 = 57600;
/// Default response timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

// =============================================================================
// Tec1089Factory - DriverFactory implementation
// =============================================================================

/// Configuration for the TEC-1089-SV driver
#[derive(Debug, Clone, Deserialize)]
pub struct Tec1089Config {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Device address on the MeCom bus (default: 2)
    #[serde(default = "default_address")]
    pub address: u8,
    /// Baud rate (default: 57600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Response timeout in milliseconds (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Parameter instance / channel (default: 1)
    #[serde(default = "default_instance")]
    pub instance: u8,
}

fn default_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_instance() -> u8 {
    crate::registers::DEFAULT_INSTANCE
}

impl Tec1089Config {
    /// Config for `port` with every other field at its default.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            address: DEFAULT_ADDRESS,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            instance: crate::registers::DEFAULT_INSTANCE,
        }
    }

    /// Response timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check values serde can't.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(invalid("port must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than zero"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> anyhow::Error {
    TecError::Configuration(format!("TEC-1089 {}", reason)).into()
}

/// Factory validating TEC-1089-SV device tables.
pub struct Tec1089Factory;

impl DriverFactory for Tec1089Factory {
    fn driver_type(&self) -> &'static str {
        "tec1089"
    }

    fn name(&self) -> &'static str {
        "Meerstetter TEC-1089-SV"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Tec1089Config = config
            .clone()
            .try_into()
            .context("Invalid TEC-1089 config")?;
        cfg.validate()?;
        tracing::info!(
            port = %cfg.port,
            address = cfg.address,
            baud_rate = cfg.baud_rate,
            "TEC-1089 config validated"
        );
        Ok(())
    }
}

// =============================================================================
// Tec1089Driver
// =============================================================================

/// Driver for the Meerstetter TEC-1089-SV
///
/// Implements Readable (object temperature) and TemperatureControl. All
/// protocol work happens in the wrapped [`DeviceSession`].
#[derive(Debug)]
pub struct Tec1089Driver {
    session: DeviceSession,
    identity: String,
}

impl Tec1089Driver {
    /// Open the serial port and run the connect handshake.
    ///
    /// # Errors
    /// Returns error if:
    /// - Serial port cannot be opened
    /// - Any of the setup writes or the identity query fails
    pub async fn connect(config: &Tec1089Config) -> Result<Self> {
        let transport =
            SerialTransport::open(&config.port, config.baud_rate, "TEC-1089-SV").await?;

        Self::connect_with_transport(config, Box::new(transport))
            .await
            .with_context(|| format!("TEC-1089 on {}: connect handshake failed", config.port))
    }

    /// Run the connect handshake over an already open transport.
    pub async fn connect_with_transport(
        config: &Tec1089Config,
        transport: Box<dyn Transport>,
    ) -> TecResult<Self> {
        let session = DeviceSession::new(config.address, config.instance, config.timeout());
        let identity = session.connect(transport).await?;
        tracing::info!(
            port = %config.port,
            address = config.address,
            identity = %identity,
            "TEC-1089 connected"
        );
        Ok(Self { session, identity })
    }

    /// Identity reported at connect time
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The underlying protocol session, for register-level access
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Close the serial link
    pub async fn close(&self) -> TecResult<()> {
        self.session.close().await
    }
}

#[async_trait]
impl Readable for Tec1089Driver {
    /// Object temperature in °C
    #[instrument(skip(self), err)]
    async fn read(&self) -> Result<f64> {
        Ok(f64::from(self.session.object_temperature().await?))
    }
}

#[async_trait]
impl TemperatureControl for Tec1089Driver {
    #[instrument(skip(self), err)]
    async fn set_target_temperature(&self, celsius: f64) -> Result<()> {
        self.session
            .set_target_temperature(celsius as f32)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self), err)]
    async fn target_temperature(&self) -> Result<f64> {
        Ok(f64::from(self.session.target_temperature().await?))
    }

    #[instrument(skip(self), err)]
    async fn enable_control(&self) -> Result<()> {
        self.session.enable_control().await.map_err(Into::into)
    }

    #[instrument(skip(self), err)]
    async fn disable_control(&self) -> Result<()> {
        self.session.disable_control().await.map_err(Into::into)
    }

    #[instrument(skip(self), err)]
    async fn stability(&self) -> Result<StabilityState> {
        self.session.stability_state().await.map_err(Into::into)
    }
}
