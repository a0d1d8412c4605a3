//! Capability Traits for Temperature Controllers
//!
//! Drivers expose what they can do through small, composable async traits
//! rather than one monolithic device trait. A controller implements only
//! the capabilities it supports.
//!
//! # Traits
//!
//! - [`Readable`]: Produces one scalar value (the controlled object temperature)
//! - [`TemperatureControl`]: Target temperature, control loop on/off, stability

use crate::error::TecError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capability: Scalar Readout
///
/// Devices that produce single scalar values (temperature sensors,
/// controller readbacks).
///
/// # Contract
/// - `read()` performs one request/response exchange and returns the value
/// - Units are device-specific (document in implementation)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}

/// Capability: Closed-Loop Temperature Control
///
/// Devices that regulate an object to a target temperature.
///
/// # Contract
/// - Temperatures are in degrees Celsius
/// - `set_target_temperature()` only changes the set point; the loop must be
///   enabled separately with `enable_control()`
#[async_trait]
pub trait TemperatureControl: Send + Sync {
    /// Set the regulation target in °C
    async fn set_target_temperature(&self, celsius: f64) -> Result<()>;

    /// Read the regulation target in °C
    async fn target_temperature(&self) -> Result<f64>;

    /// Start regulating towards the target
    async fn enable_control(&self) -> Result<()>;

    /// Stop regulating (output off)
    async fn disable_control(&self) -> Result<()>;

    /// Current stability classification of the control loop
    async fn stability(&self) -> Result<StabilityState>;
}

/// Temperature stability reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityState {
    /// Control loop is not running
    Off,
    /// Regulating, but not yet within the stability window
    Unstable,
    /// Object temperature is stable at the target
    Stable,
}

impl StabilityState {
    /// Lower-case label, as printed by tools
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Unstable => "unstable",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for StabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for StabilityState {
    type Error = TecError;

    /// Map a raw status register value. Unknown codes are an error, never a
    /// silent default.
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::Unstable),
            2 => Ok(Self::Stable),
            other => Err(TecError::Decode(format!(
                "unknown temperature stability code {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stability_codes_map() {
        assert_eq!(StabilityState::try_from(0).unwrap(), StabilityState::Off);
        assert_eq!(
            StabilityState::try_from(1).unwrap(),
            StabilityState::Unstable
        );
        assert_eq!(StabilityState::try_from(2).unwrap(), StabilityState::Stable);
        assert_eq!(StabilityState::Stable.to_string(), "stable");
    }

    #[test]
    fn unknown_stability_code_is_decode_error() {
        for code in [-1, 3, 5, i32::MAX] {
            let err = StabilityState::try_from(code).unwrap_err();
            assert!(matches!(err, TecError::Decode(_)), "code {}", code);
        }
    }
}
