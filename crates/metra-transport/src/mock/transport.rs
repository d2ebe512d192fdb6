//! Scriptable in-memory transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::{Result, Transport, TransportError};

/// Input delivered to the mock, in order.
#[derive(Debug)]
enum Inbound {
    Bytes(Vec<u8>),
    Disconnect,
}

#[derive(Debug, Default)]
struct Shared {
    connected: bool,
    fail_connects: u32,
    connect_attempts: Vec<Instant>,
}

/// Mock reader link.
///
/// # Examples
///
/// ```
/// use metra_transport::{MockTransport, Transport};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> metra_transport::Result<()> {
///     let (mut transport, handle) = MockTransport::new();
///     transport.connect().await?;
///
///     transport.send(b"REV\r").await?;
///     assert_eq!(handle.written().await.unwrap(), b"REV\r");
///
///     handle.inject(b"OK");
///     assert_eq!(transport.recv(Duration::from_millis(10)).await?, b'O');
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shared: Arc<Mutex<Shared>>,
    pending: VecDeque<u8>,
}

impl MockTransport {
    /// Create a mock transport and the handle that drives it.
    pub fn new() -> (Self, MockTransportHandle) {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));

        let transport = Self {
            inbound,
            outbound,
            shared: Arc::clone(&shared),
            pending: VecDeque::new(),
        };

        let handle = MockTransportHandle {
            inbound: inbound_tx,
            outbound: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
            shared,
        };

        (transport, handle)
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    fn set_connected(&self, connected: bool) {
        self.shared().connected = connected;
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        {
            let mut shared = self.shared();
            shared.connect_attempts.push(Instant::now());
            if shared.fail_connects > 0 {
                shared.fail_connects -= 1;
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
            }
            shared.connected = true;
        }

        // Whatever was queued for the previous session is gone
        self.pending.clear();
        while self.inbound.try_recv().is_ok() {}
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.set_connected(false);
        self.pending.clear();
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotInitialised);
        }
        self.outbound
            .send(data.to_vec())
            .map_err(|_| TransportError::connection_lost("mock handle dropped"))
    }

    async fn recv(&mut self, timeout: Duration) -> Result<u8> {
        if !self.is_connected() {
            return Err(TransportError::NotInitialised);
        }

        if let Some(byte) = self.pending.pop_front() {
            return Ok(byte);
        }

        loop {
            match tokio::time::timeout(timeout, self.inbound.recv()).await {
                Ok(Some(Inbound::Bytes(bytes))) => {
                    self.pending.extend(bytes);
                    if let Some(byte) = self.pending.pop_front() {
                        return Ok(byte);
                    }
                }
                Ok(Some(Inbound::Disconnect)) => {
                    self.set_connected(false);
                    return Err(TransportError::connection_lost("link dropped by test"));
                }
                Ok(None) => {
                    self.set_connected(false);
                    return Err(TransportError::connection_lost("mock handle dropped"));
                }
                Err(_) => {
                    return Err(TransportError::receive_timeout(timeout.as_millis() as u64));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.shared().connected
    }

    fn bytes_available(&self) -> usize {
        self.pending.len()
    }

    fn endpoint(&self) -> String {
        "mock://".to_string()
    }
}

/// Handle for controlling a [`MockTransport`].
///
/// Clones share the same link, so a simulated device task and the test
/// body can both hold one.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    outbound: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    shared: Arc<Mutex<Shared>>,
}

impl MockTransportHandle {
    /// Queue bytes as if the reader had sent them.
    pub fn inject(&self, bytes: impl AsRef<[u8]>) {
        let _ = self.inbound.send(Inbound::Bytes(bytes.as_ref().to_vec()));
    }

    /// Cut the link after everything injected so far has been read.
    pub fn drop_connection(&self) {
        let _ = self.inbound.send(Inbound::Disconnect);
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.shared).fail_connects = count;
    }

    /// Next chunk written by the transport user; `None` once the
    /// transport is dropped.
    pub async fn written(&self) -> Option<Vec<u8>> {
        self.outbound.lock().await.recv().await
    }

    /// Next written chunk if one is already queued.
    pub fn try_written(&self) -> Option<Vec<u8>> {
        self.outbound.try_lock().ok()?.try_recv().ok()
    }

    /// Times at which `connect` was called.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        lock(&self.shared).connect_attempts.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }
}
