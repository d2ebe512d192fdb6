//! Serial transport for USB and RS232 readers.
//!
//! `serialport` is a blocking API, so a dedicated thread reads the port
//! and forwards chunks over a channel. Writes run on the blocking pool.

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Result, Transport, TransportError};

/// Read timeout of the blocking port; bounds how long the reader thread
/// takes to notice a disconnect.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Chunks buffered between the reader thread and the worker.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Configuration for a [`SerialTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialTransportConfig {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,

    pub baud_rate: u32,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

struct OpenPort {
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    chunks: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// Transport over a serial port.
pub struct SerialTransport {
    config: SerialTransportConfig,
    port: Option<OpenPort>,
    pending: VecDeque<u8>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("config", &self.config)
            .field("connected", &self.port.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl SerialTransport {
    pub fn new(config: SerialTransportConfig) -> Self {
        Self {
            config,
            port: None,
            pending: VecDeque::new(),
        }
    }

    fn close_port(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.running.store(false, Ordering::Release);
            if let Some(reader) = port.reader.take() {
                // The thread exits within one read timeout
                if reader.join().is_err() {
                    warn!(path = %self.config.path, "Serial reader thread panicked");
                }
            }
        }
        self.pending.clear();
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<std::io::Result<Vec<u8>>>,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 256];
    while running.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        info!(path = %self.config.path, baud = self.config.baud_rate, "Opening serial port");

        let port = serialport::new(&self.config.path, self.config.baud_rate)
            .timeout(PORT_READ_TIMEOUT)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    TransportError::no_devices_found(self.config.path.clone())
                }
                serialport::ErrorKind::Io(kind) => {
                    TransportError::Io(std::io::Error::new(kind, e.description))
                }
                _ => TransportError::unhandled(e.to_string()),
            })?;

        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::unhandled(e.to_string()))?;

        let (tx, chunks) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let reader = std::thread::Builder::new()
            .name(format!("serial-{}", self.config.path))
            .spawn(move || read_loop(reader_port, tx, thread_running))?;

        self.pending.clear();
        self.port = Some(OpenPort {
            writer: Arc::new(Mutex::new(port)),
            chunks,
            running,
            reader: Some(reader),
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        debug!(path = %self.config.path, "Closing serial port");
        self.close_port();
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_ref().ok_or(TransportError::NotInitialised)?;
        let writer = Arc::clone(&port.writer);
        let data = data.to_vec();

        let written = tokio::task::spawn_blocking(move || {
            let mut port = writer
                .lock()
                .map_err(|_| std::io::Error::other("serial writer lock poisoned"))?;
            port.write_all(&data)?;
            port.flush()
        })
        .await
        .map_err(|e| TransportError::unhandled(e.to_string()))?;

        if let Err(e) = written {
            self.close_port();
            return Err(TransportError::connection_lost(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<u8> {
        if let Some(byte) = self.pending.pop_front() {
            return Ok(byte);
        }

        let port = self.port.as_mut().ok_or(TransportError::NotInitialised)?;
        // mpsc::Receiver::recv is cancel safe
        match tokio::time::timeout(timeout, port.chunks.recv()).await {
            Ok(Some(Ok(chunk))) => {
                self.pending.extend(chunk);
                self.pending
                    .pop_front()
                    .ok_or_else(|| TransportError::unhandled("empty serial chunk"))
            }
            Ok(Some(Err(e))) => {
                self.close_port();
                Err(TransportError::connection_lost(e.to_string()))
            }
            Ok(None) => {
                self.close_port();
                Err(TransportError::connection_lost("serial reader stopped"))
            }
            Err(_) => Err(TransportError::receive_timeout(timeout.as_millis() as u64)),
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&self) -> usize {
        self.pending.len()
    }

    fn endpoint(&self) -> String {
        format!("serial://{}@{}", self.config.path, self.config.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close_port();
    }
}
