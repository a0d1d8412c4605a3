//! Error types for TEC controller communication.
//!
//! This module defines [`TecError`], the single error type returned by the
//! protocol codec, the transport layer and device sessions. Using the
//! `thiserror` crate, each failure mode of a request/response exchange gets
//! its own inspectable variant so callers can decide what to do with it.
//!
//! ## Error Taxonomy
//!
//! - **`Framing`**: The response was too short to contain a header and
//!   checksum, or contained characters outside the protocol alphabet.
//! - **`ChecksumMismatch`**: The checksum carried by the response disagrees
//!   with the one recomputed over the received bytes.
//! - **`Device`**: The controller answered with an explicit error frame
//!   (`+` followed by a code). The code is carried through uninterpreted.
//! - **`Decode`**: A payload could not be turned into the requested type,
//!   or an enumerated status code was not one of the known values.
//! - **`Timeout`**: No response line arrived within the configured window.
//!
//! None of these are fatal to the session: every logical operation fails
//! independently and the session stays usable for subsequent calls.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using [`TecError`].
pub type TecResult<T> = std::result::Result<T, TecError>;

/// Primary error type for TEC controller communication.
#[derive(Error, Debug)]
pub enum TecError {
    /// Response is shorter than header + checksum, or contains characters
    /// outside the expected alphabet.
    ///
    /// **Recovery Strategy**: The request failed; the caller decides whether
    /// to re-issue it (with a new sequence number).
    #[error("Framing error: {reason} (response: {response:?})")]
    Framing {
        /// What was wrong with the frame
        reason: String,
        /// The raw response text, for diagnostics
        response: String,
    },

    /// Recomputed checksum disagrees with the received checksum field.
    ///
    /// Indicates corruption on the wire.
    #[error("Checksum mismatch: expected {expected:04X}, received {received:04X}")]
    ChecksumMismatch {
        /// Checksum recomputed over the received header and payload
        expected: u16,
        /// Checksum carried by the response
        received: u16,
    },

    /// The device reported a fault via the `+` error marker.
    ///
    /// The numeric code is opaque here; drivers may offer a description.
    #[error("Device reported error code {code:02} (response: {response:?})")]
    Device {
        /// Error code following the `+` marker
        code: u8,
        /// The raw response text, for diagnostics
        response: String,
    },

    /// Payload could not be decoded into the requested type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// No response within the configured window.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Operation attempted on a session or transport that is not connected.
    #[error("Not connected")]
    NotConnected,

    /// Operation rejected before anything was sent (e.g. writing a
    /// read-only register).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration values are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation on the transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TecError {
    /// Build a [`TecError::Framing`] from a reason and the offending response.
    pub fn framing(reason: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
            response: response.into(),
        }
    }

    /// Whether re-issuing the same logical request might succeed.
    ///
    /// Timeouts, corrupted frames and I/O hiccups are transient; device
    /// error codes, decode failures and configuration problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ChecksumMismatch { .. } | Self::Framing { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_codes_with_padding() {
        let err = TecError::Device {
            code: 7,
            response: "!020001+07ABCD".into(),
        };
        assert_eq!(
            err.to_string(),
            "Device reported error code 07 (response: \"!020001+07ABCD\")"
        );

        let err = TecError::ChecksumMismatch {
            expected: 0x0A1B,
            received: 0xFFFF,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0A1B, received FFFF"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(TecError::Timeout(Duration::from_millis(10)).is_transient());
        assert!(TecError::framing("short", "").is_transient());
        assert!(!TecError::Decode("bad".into()).is_transient());
        assert!(!TecError::NotConnected.is_transient());
        assert!(!TecError::Device {
            code: 2,
            response: String::new()
        }
        .is_transient());
    }

    #[test]
    fn io_errors_convert() {
        let err: TecError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, TecError::Io(_)));
    }
}
