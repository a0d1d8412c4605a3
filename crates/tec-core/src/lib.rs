//! `tec-core`
//!
//! Core trait definitions and types shared by TEC controller drivers.
//!
//! ## Modules
//!
//! - [`error`]: [`TecError`], one variant per failure mode of a request/response exchange
//! - [`transport`]: The send / receive-line [`Transport`] boundary and its serial implementation
//! - [`capabilities`]: Capability traits ([`Readable`], [`TemperatureControl`])
//! - [`driver`]: [`DriverFactory`], config validation keyed by driver type
//! - [`config`]: Hardware configuration files (figment, TOML + environment)

pub mod capabilities;
pub mod config;
pub mod driver;
pub mod error;
pub mod transport;

pub use capabilities::{Readable, StabilityState, TemperatureControl};
pub use config::{DeviceConfig, HardwareConfig};
pub use driver::DriverFactory;
pub use error::{TecError, TecResult};
pub use transport::{SerialTransport, Transport};
