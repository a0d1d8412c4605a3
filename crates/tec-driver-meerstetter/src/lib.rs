//! Meerstetter TEC controller driver.
//!
//! This crate speaks the MeCom ASCII protocol used by Meerstetter TEC
//! controllers, and provides a driver for the TEC-1089-SV:
//!
//! - [`checksum`]: CRC-16/XMODEM over frame text
//! - [`codec`]: fixed-width hex encoding of ids, integers and floats
//! - [`frame`]: request assembly, response validation, device error detection
//! - [`registers`]: static parameter table
//! - [`session`]: [`DeviceSession`], one serialized request at a time
//! - [`tec1089`]: [`Tec1089Driver`] and its [`Tec1089Factory`]
//!
//! # Usage
//!
//! Check a device table, then connect:
//!
//! ```rust,ignore
//! use tec_core::driver::DriverFactory;
//! use tec_driver_meerstetter::{Tec1089Config, Tec1089Driver, Tec1089Factory};
//!
//! Tec1089Factory.validate(&table)?;
//! let config: Tec1089Config = table.try_into()?;
//! let driver = Tec1089Driver::connect(&config).await?;
//! println!("{:.2} °C", driver.session().object_temperature().await?);
//! ```

pub mod checksum;
pub mod codec;
pub mod frame;
pub mod registers;
pub mod session;
pub mod status;
pub mod tec1089;

#[cfg(test)]
mod fake_device;

pub use codec::{Value, ValueKind};
pub use registers::{Access, Register};
pub use session::DeviceSession;
pub use status::DeviceErrorCode;
pub use tec1089::{Tec1089Config, Tec1089Driver, Tec1089Factory};

