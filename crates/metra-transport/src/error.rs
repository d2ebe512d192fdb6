//! Error types for transport operations.
//!
//! Every transport failure except [`TransportError::ReceiveTimeout`] is
//! fatal to the current session: the connection worker drops the link and
//! schedules a reconnect. A receive timeout only means the reader had
//! nothing to say within the poll interval.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur on a reader link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No byte arrived within the receive timeout.
    #[error("Receive timeout after {duration_ms}ms")]
    ReceiveTimeout { duration_ms: u64 },

    /// The peer closed the link or the link broke.
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// The configured device (serial port, USB adapter) does not exist.
    #[error("No devices found: {device}")]
    NoDevicesFound { device: String },

    /// Operation on a transport that is not connected.
    #[error("Transport not initialised")]
    NotInitialised,

    /// TCP connect did not complete in time.
    #[error("Ethernet connect timeout after {duration_ms}ms")]
    EthernetTimeout { duration_ms: u64 },

    /// Any other failure reported by the underlying driver.
    #[error("Unhandled transport error: {message}")]
    Unhandled { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a new receive timeout error.
    pub fn receive_timeout(duration_ms: u64) -> Self {
        Self::ReceiveTimeout { duration_ms }
    }

    /// Create a new connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Create a new no-devices-found error.
    pub fn no_devices_found(device: impl Into<String>) -> Self {
        Self::NoDevicesFound {
            device: device.into(),
        }
    }

    /// Create a new ethernet timeout error.
    pub fn ethernet_timeout(duration_ms: u64) -> Self {
        Self::EthernetTimeout { duration_ms }
    }

    /// Create a new unhandled error.
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::Unhandled {
            message: message.into(),
        }
    }

    /// Whether the error ends the current session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReceiveTimeout { .. })
    }
}
