use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Protocol errors
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Frame too short to carry a checksum: {0:?}")]
    FrameTooShort(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unexpected reply to {expected}: {received}")]
    UnexpectedReply { expected: String, received: String },

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // Device-reported errors
    #[error("Device reported {code}: {message}")]
    Device {
        code: DeviceErrorCode,
        message: String,
    },

    // Validation errors
    #[error("Invalid tag id: {0}")]
    InvalidTagId(String),

    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a device error from a reported code, using the code's own description.
    pub fn device(code: DeviceErrorCode) -> Self {
        Error::Device {
            code,
            message: code.description().to_string(),
        }
    }

    /// Protocol errors leave the connection usable; only the command fails.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::ChecksumMismatch { .. }
                | Error::FrameTooShort(_)
                | Error::MalformedFrame(_)
                | Error::UnexpectedReply { .. }
                | Error::FrameTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Short error codes reported by metraTec readers in place of a reply.
///
/// The ASCII protocol answers a failed command with a bare three-letter code
/// (`UPA`, `NRF`, ...). The AT protocol reports errors as `ERROR` with a
/// `<...>` message and maps to [`DeviceErrorCode::Reported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DeviceErrorCode {
    /// `ARH` - antenna reflectivity too high.
    AntennaReflectivityHigh,
    /// `BOD` - buffer overflow while receiving data.
    BufferOverflowData,
    /// `BOF` - command buffer overflow.
    BufferOverflow,
    /// `CCE` - checksum error on the received command.
    CommandChecksumError,
    /// `CER` - CRC error in the tag response.
    TagChecksumError,
    /// `CLD` - command length differs from expectation.
    CommandLengthDifference,
    /// `EDX` - decimal value expected.
    DecimalExpected,
    /// `EHX` - hexadecimal value expected.
    HexExpected,
    /// `NCM` - command not allowed in the current mode.
    NotInCorrectMode,
    /// `NOR` - number out of range.
    NumberOutOfRange,
    /// `NOS` - operation not supported by this reader.
    NotSupported,
    /// `NRF` - no RF field active.
    NoRfField,
    /// `TCE` - tag communication error.
    TagCommunicationError,
    /// `TOE` - tag did not answer in time.
    TagTimeout,
    /// `TOR` - tag out of range.
    TagOutOfRange,
    /// `UCO` - unknown command.
    UnknownCommand,
    /// `UER` - unknown error.
    UnknownError,
    /// `UPA` - unknown parameter.
    UnknownParameter,
    /// `WDL` - wrong data length.
    WrongDataLength,
    /// `WPA` - wrong parameter (count or value).
    WrongParameter,
    /// Error reported in free text (AT protocol `ERROR` line).
    Reported,
}

impl DeviceErrorCode {
    /// All short codes the ASCII protocol can report.
    pub const SHORT_CODES: [DeviceErrorCode; 20] = [
        DeviceErrorCode::AntennaReflectivityHigh,
        DeviceErrorCode::BufferOverflowData,
        DeviceErrorCode::BufferOverflow,
        DeviceErrorCode::CommandChecksumError,
        DeviceErrorCode::TagChecksumError,
        DeviceErrorCode::CommandLengthDifference,
        DeviceErrorCode::DecimalExpected,
        DeviceErrorCode::HexExpected,
        DeviceErrorCode::NotInCorrectMode,
        DeviceErrorCode::NumberOutOfRange,
        DeviceErrorCode::NotSupported,
        DeviceErrorCode::NoRfField,
        DeviceErrorCode::TagCommunicationError,
        DeviceErrorCode::TagTimeout,
        DeviceErrorCode::TagOutOfRange,
        DeviceErrorCode::UnknownCommand,
        DeviceErrorCode::UnknownError,
        DeviceErrorCode::UnknownParameter,
        DeviceErrorCode::WrongDataLength,
        DeviceErrorCode::WrongParameter,
    ];

    /// Look up a short code as it appears on the wire.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::SHORT_CODES
            .iter()
            .copied()
            .find(|candidate| candidate.code() == code)
    }

    /// Wire representation of the code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AntennaReflectivityHigh => "ARH",
            Self::BufferOverflowData => "BOD",
            Self::BufferOverflow => "BOF",
            Self::CommandChecksumError => "CCE",
            Self::TagChecksumError => "CER",
            Self::CommandLengthDifference => "CLD",
            Self::DecimalExpected => "EDX",
            Self::HexExpected => "EHX",
            Self::NotInCorrectMode => "NCM",
            Self::NumberOutOfRange => "NOR",
            Self::NotSupported => "NOS",
            Self::NoRfField => "NRF",
            Self::TagCommunicationError => "TCE",
            Self::TagTimeout => "TOE",
            Self::TagOutOfRange => "TOR",
            Self::UnknownCommand => "UCO",
            Self::UnknownError => "UER",
            Self::UnknownParameter => "UPA",
            Self::WrongDataLength => "WDL",
            Self::WrongParameter => "WPA",
            Self::Reported => "ERROR",
        }
    }

    /// Human readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AntennaReflectivityHigh => "antenna reflectivity too high",
            Self::BufferOverflowData => "buffer overflow while receiving data",
            Self::BufferOverflow => "command buffer overflow",
            Self::CommandChecksumError => "checksum error in command",
            Self::TagChecksumError => "CRC error in tag response",
            Self::CommandLengthDifference => "command length difference",
            Self::DecimalExpected => "decimal value expected",
            Self::HexExpected => "hexadecimal value expected",
            Self::NotInCorrectMode => "not in correct mode",
            Self::NumberOutOfRange => "number out of range",
            Self::NotSupported => "not supported",
            Self::NoRfField => "no RF field active",
            Self::TagCommunicationError => "tag communication error",
            Self::TagTimeout => "tag timeout",
            Self::TagOutOfRange => "tag out of range",
            Self::UnknownCommand => "unknown command",
            Self::UnknownError => "unknown error",
            Self::UnknownParameter => "unknown parameter",
            Self::WrongDataLength => "wrong data length",
            Self::WrongParameter => "wrong parameter",
            Self::Reported => "error reported by device",
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("UPA", DeviceErrorCode::UnknownParameter)]
    #[case("NRF", DeviceErrorCode::NoRfField)]
    #[case("TCE", DeviceErrorCode::TagCommunicationError)]
    #[case("WPA", DeviceErrorCode::WrongParameter)]
    fn test_device_code_lookup(#[case] code: &str, #[case] expected: DeviceErrorCode) {
        assert_eq!(DeviceErrorCode::from_code(code), Some(expected));
        assert_eq!(expected.code(), code);
    }

    #[test]
    fn test_unknown_code_is_not_an_error() {
        assert_eq!(DeviceErrorCode::from_code("OK!"), None);
        assert_eq!(DeviceErrorCode::from_code("ERROR"), None);
    }

    #[test]
    fn test_short_codes_are_unique() {
        for (i, a) in DeviceErrorCode::SHORT_CODES.iter().enumerate() {
            for b in &DeviceErrorCode::SHORT_CODES[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_device_error_display() {
        let error = Error::device(DeviceErrorCode::NoRfField);
        assert_eq!(error.to_string(), "Device reported NRF: no RF field active");
        assert!(!error.is_protocol());
    }

    #[test]
    fn test_protocol_classification() {
        let error = Error::ChecksumMismatch {
            expected: "ABCD".to_string(),
            actual: "0000".to_string(),
        };
        assert!(error.is_protocol());
        assert!(Error::FrameTooShort("AB".to_string()).is_protocol());
        assert!(!Error::Config("x".to_string()).is_protocol());
    }
}
