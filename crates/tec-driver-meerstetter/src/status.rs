//! Human-readable labels for MeCom device error codes.
//!
//! Classification never depends on these: a `+NN` frame is always a
//! [`TecError::Device`] carrying the raw code. This is purely for display.

use tec_core::error::TecError;

/// Error code reported after the `+` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// 01: command not available
    CommandNotAvailable,
    /// 02: device is busy
    DeviceBusy,
    /// 03: general communication error
    GeneralCommunication,
    /// 04: format error in the request
    Format,
    /// 05: parameter id not available
    ParameterNotAvailable,
    /// 06: parameter is read-only
    ParameterNotWritable,
    /// 07: value out of range
    ParameterOutOfRange,
    /// 08: instance not available for this parameter
    InstanceNotAvailable,
    /// Anything else the device sends
    Unknown(u8),
}

impl DeviceErrorCode {
    /// Raw numeric code
    pub fn code(&self) -> u8 {
        match *self {
            Self::CommandNotAvailable => 1,
            Self::DeviceBusy => 2,
            Self::GeneralCommunication => 3,
            Self::Format => 4,
            Self::ParameterNotAvailable => 5,
            Self::ParameterNotWritable => 6,
            Self::ParameterOutOfRange => 7,
            Self::InstanceNotAvailable => 8,
            Self::Unknown(code) => code,
        }
    }

    /// Short description for logs and tools
    pub fn description(&self) -> &'static str {
        match self {
            Self::CommandNotAvailable => "command not available",
            Self::DeviceBusy => "device busy",
            Self::GeneralCommunication => "general communication error",
            Self::Format => "format error",
            Self::ParameterNotAvailable => "parameter not available",
            Self::ParameterNotWritable => "parameter not writable",
            Self::ParameterOutOfRange => "parameter out of range",
            Self::InstanceNotAvailable => "parameter instance not available",
            Self::Unknown(_) => "unknown error",
        }
    }

    /// Code carried by a [`TecError::Device`], if that's what `err` is.
    pub fn from_error(err: &TecError) -> Option<Self> {
        match err {
            TecError::Device { code, .. } => Some(Self::from(*code)),
            _ => None,
        }
    }
}

impl From<u8> for DeviceErrorCode {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::CommandNotAvailable,
            2 => Self::DeviceBusy,
            3 => Self::GeneralCommunication,
            4 => Self::Format,
            5 => Self::ParameterNotAvailable,
            6 => Self::ParameterNotWritable,
            7 => Self::ParameterOutOfRange,
            8 => Self::InstanceNotAvailable,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02} ({})", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        for code in 1..=8u8 {
            let decoded = DeviceErrorCode::from(code);
            assert!(!matches!(decoded, DeviceErrorCode::Unknown(_)));
            assert_eq!(decoded.code(), code);
        }
    }

    #[test]
    fn unknown_codes_pass_through() {
        assert_eq!(DeviceErrorCode::from(0), DeviceErrorCode::Unknown(0));
        assert_eq!(DeviceErrorCode::from(9).code(), 9);
        assert_eq!(DeviceErrorCode::from(9).to_string(), "09 (unknown error)");
    }

    #[test]
    fn from_device_error() {
        let err = TecError::Device {
            code: 7,
            response: "!020000+070820".into(),
        };
        let code = DeviceErrorCode::from_error(&err).unwrap();
        assert_eq!(code, DeviceErrorCode::ParameterOutOfRange);
        assert_eq!(code.to_string(), "07 (parameter out of range)");

        assert!(DeviceErrorCode::from_error(&TecError::NotConnected).is_none());
    }
}
