//! Byte-level link to a reader.
//!
//! The connection worker is the only user of a transport and drives it
//! from a single task. Methods spell out `impl Future + Send` so a worker
//! generic over `T: Transport` can be spawned onto the runtime.

use std::future::Future;
use std::time::Duration;

use crate::Result;

/// A bidirectional byte stream to one reader.
///
/// # Cancel safety
///
/// [`recv`](Transport::recv) is raced against other events in a
/// `tokio::select!`. Implementations must not lose a byte when the future
/// is dropped before completing.
pub trait Transport: Send + 'static {
    /// Open the link.
    ///
    /// # Errors
    /// `EthernetTimeout`, `NoDevicesFound` or an I/O error.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the link. Closing a closed transport is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read one byte, waiting at most `timeout`.
    ///
    /// # Errors
    /// `ReceiveTimeout` when nothing arrived, `ConnectionLost` when the
    /// peer closed the link.
    fn recv(&mut self, timeout: Duration) -> impl Future<Output = Result<u8>> + Send;

    fn is_connected(&self) -> bool;

    /// Bytes that can be read without waiting.
    fn bytes_available(&self) -> usize;

    /// Human readable endpoint for logs.
    fn endpoint(&self) -> String;
}
