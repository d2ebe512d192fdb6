//! TCP transport for Ethernet readers.
//!
//! Readers with an Ethernet port expose the same command interface as the
//! serial models on a plain TCP socket (port 10001 by default).
//!
//! ```no_run
//! use metra_transport::{TcpTransport, TcpTransportConfig, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> metra_transport::Result<()> {
//! let mut transport = TcpTransport::new(TcpTransportConfig {
//!     addr: "192.168.2.239:10001".to_string(),
//!     connect_timeout_ms: 3000,
//! });
//!
//! transport.connect().await?;
//! transport.send(b"REV\r").await?;
//! let first = transport.recv(Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

use metra_core::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::{Result, Transport, TransportError};

/// Default TCP port of metraTec Ethernet readers.
pub const DEFAULT_TCP_PORT: u16 = 10001;

/// Configuration for a [`TcpTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpTransportConfig {
    /// `host:port` of the reader.
    pub addr: String,

    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{DEFAULT_TCP_PORT}"),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

/// Transport over a TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpTransportConfig,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpTransport {
    /// Create a transport; call [`connect`](Transport::connect) to open it.
    pub fn new(config: TcpTransportConfig) -> Self {
        debug!(addr = %config.addr, "Creating TCP transport");
        Self {
            config,
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or(TransportError::NotInitialised)
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        info!(addr = %self.config.addr, "Connecting to reader");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&self.config.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(addr = %self.config.addr, error = %e, "Connection failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    addr = %self.config.addr,
                    "Connection timeout after {}ms", self.config.connect_timeout_ms
                );
                return Err(TransportError::ethernet_timeout(
                    self.config.connect_timeout_ms,
                ));
            }
        };

        // Commands are a few bytes each; Nagle would hold them back
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        self.stream = Some(BufReader::new(stream));
        info!(addr = %self.config.addr, "Connected to reader");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        debug!(addr = %self.config.addr, "Closing TCP connection");
        match tokio::time::timeout(Duration::from_millis(500), stream.get_mut().shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Shutdown failed, dropping socket"),
            Err(_) => debug!("Shutdown timed out, dropping socket"),
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?.get_mut();
        if let Err(e) = stream.write_all(data).await {
            self.stream = None;
            return Err(TransportError::connection_lost(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<u8> {
        let stream = self.stream()?;

        // read_u8 on a BufReader is cancel safe: a byte is either returned
        // or left in the buffer
        match tokio::time::timeout(timeout, stream.read_u8()).await {
            Ok(Ok(byte)) => Ok(byte),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.stream = None;
                Err(TransportError::connection_lost("reader closed connection"))
            }
            Ok(Err(e)) => {
                self.stream = None;
                Err(TransportError::connection_lost(e.to_string()))
            }
            Err(_) => Err(TransportError::receive_timeout(timeout.as_millis() as u64)),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn bytes_available(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.buffer().len())
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.config.addr)
    }
}
