//! Driver Factory
//!
//! Drivers implement [`DriverFactory`] so a front end can check a TOML
//! device table against the driver type it names before any port is opened.
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! use tec_core::driver::DriverFactory;
//!
//! pub struct Tec1089Factory;
//!
//! impl DriverFactory for Tec1089Factory {
//!     fn driver_type(&self) -> &'static str { "tec1089" }
//!     fn name(&self) -> &'static str { "Meerstetter TEC-1089-SV" }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let cfg: Tec1089Config = config.clone().try_into()?;
//!         cfg.validate()
//!     }
//! }
//! ```

use anyhow::Result;

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Trait for driver factories.
///
/// The factory is responsible for:
///
/// 1. Declaring what driver type it handles (matching the TOML `type` field)
/// 2. Validating configuration before any port is opened
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in TOML config `type` field.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    /// Validate configuration without instantiating.
    fn validate(&self, config: &toml::Value) -> Result<()>;
}
