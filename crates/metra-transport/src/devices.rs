//! Enum wrapper for transport dispatch.
//!
//! Native `async fn` in traits is not object-safe, so a reader whose link
//! is chosen at runtime (from configuration) holds an [`AnyTransport`]
//! instead of a `Box<dyn Transport>`.
//!
//! # Examples
//!
//! ```
//! use metra_transport::devices::AnyTransport;
//! use metra_transport::{MockTransport, Transport};
//!
//! let (mock, _handle) = MockTransport::new();
//! let transport = AnyTransport::from(mock);
//! assert_eq!(transport.endpoint(), "mock://");
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::mock::MockTransport;
#[cfg(feature = "hardware-serial")]
use crate::serial::{SerialTransport, SerialTransportConfig};
use crate::tcp::{TcpTransport, TcpTransportConfig};
use crate::{Result, Transport};

/// Link configuration as it appears in a host's config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportConfig {
    Tcp(TcpTransportConfig),
    #[cfg(feature = "hardware-serial")]
    Serial(SerialTransportConfig),
}

impl TransportConfig {
    /// Build the transport this configuration describes.
    pub fn build(self) -> AnyTransport {
        match self {
            Self::Tcp(config) => AnyTransport::Tcp(TcpTransport::new(config)),
            #[cfg(feature = "hardware-serial")]
            Self::Serial(config) => AnyTransport::Serial(SerialTransport::new(config)),
        }
    }
}

/// Enum wrapper for transport dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// Ethernet reader.
    Tcp(TcpTransport),
    /// USB or RS232 reader.
    #[cfg(feature = "hardware-serial")]
    Serial(SerialTransport),
    /// Mock link for development and testing.
    Mock(MockTransport),
}

impl Transport for AnyTransport {
    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Tcp(t) => t.connect().await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.connect().await,
            Self::Mock(t) => t.connect().await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            Self::Tcp(t) => t.disconnect().await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.disconnect().await,
            Self::Mock(t) => t.disconnect().await,
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(t) => t.send(data).await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.send(data).await,
            Self::Mock(t) => t.send(data).await,
        }
    }

    async fn recv(&mut self, timeout: Duration) -> Result<u8> {
        match self {
            Self::Tcp(t) => t.recv(timeout).await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.recv(timeout).await,
            Self::Mock(t) => t.recv(timeout).await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Tcp(t) => t.is_connected(),
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.is_connected(),
            Self::Mock(t) => t.is_connected(),
        }
    }

    fn bytes_available(&self) -> usize {
        match self {
            Self::Tcp(t) => t.bytes_available(),
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.bytes_available(),
            Self::Mock(t) => t.bytes_available(),
        }
    }

    fn endpoint(&self) -> String {
        match self {
            Self::Tcp(t) => t.endpoint(),
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.endpoint(),
            Self::Mock(t) => t.endpoint(),
        }
    }
}

impl From<TcpTransport> for AnyTransport {
    fn from(transport: TcpTransport) -> Self {
        Self::Tcp(transport)
    }
}

#[cfg(feature = "hardware-serial")]
impl From<SerialTransport> for AnyTransport {
    fn from(transport: SerialTransport) -> Self {
        Self::Serial(transport)
    }
}

impl From<MockTransport> for AnyTransport {
    fn from(transport: MockTransport) -> Self {
        Self::Mock(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_config_from_json() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"kind":"tcp","addr":"10.0.0.5:10001"}"#).unwrap();

        let TransportConfig::Tcp(tcp) = &config else {
            panic!("expected tcp config");
        };
        assert_eq!(tcp.addr, "10.0.0.5:10001");
        assert_eq!(tcp.connect_timeout_ms, 3000);
        assert_eq!(config.build().endpoint(), "tcp://10.0.0.5:10001");
    }

    #[tokio::test]
    async fn test_dispatch_to_mock() {
        let (mock, handle) = MockTransport::new();
        let mut transport = AnyTransport::from(mock);

        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        transport.send(b"ATI\r").await.unwrap();
        assert_eq!(handle.written().await.unwrap(), b"ATI\r");

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }
}
