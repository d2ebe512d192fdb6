//! Error types for reader operations.

use metra_transport::TransportError;

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors surfaced to callers of a reader.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// Framing, checksum or device-reported error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] metra_core::Error),

    /// Link failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No complete reply within the command timeout.
    #[error("Command timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The worker has no session with the reader.
    #[error("Reader not connected")]
    NotConnected,

    /// The operation is already in progress.
    #[error("Reader busy: {operation}")]
    Busy { operation: String },

    /// The worker was stopped.
    #[error("Reader stopped")]
    Stopped,

    /// The event delivery thread could not be spawned.
    #[error("Event dispatcher failed to start: {0}")]
    Dispatcher(#[from] std::io::Error),

    /// The configuration sequence after connect failed.
    #[error("Device preparation failed: {message}")]
    PrepareFailed { message: String },
}

impl ReaderError {
    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new busy error.
    pub fn busy(operation: impl Into<String>) -> Self {
        Self::Busy {
            operation: operation.into(),
        }
    }

    /// Create a new prepare failure.
    pub fn prepare_failed(message: impl Into<String>) -> Self {
        Self::PrepareFailed {
            message: message.into(),
        }
    }

    /// Device-reported error code, if this is one.
    pub fn device_code(&self) -> Option<metra_core::DeviceErrorCode> {
        match self {
            Self::Protocol(metra_core::Error::Device { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metra_core::DeviceErrorCode;

    #[test]
    fn test_device_code() {
        let err = ReaderError::from(metra_core::Error::device(DeviceErrorCode::NoRfField));
        assert_eq!(err.device_code(), Some(DeviceErrorCode::NoRfField));
        assert_eq!(ReaderError::NotConnected.device_code(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ReaderError::timeout(2000).to_string(),
            "Command timeout after 2000ms"
        );
        assert_eq!(
            ReaderError::busy("scan").to_string(),
            "Reader busy: scan"
        );
    }
}
