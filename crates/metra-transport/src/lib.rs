//! Byte-level links to metraTec readers.
//!
//! A [`Transport`] moves raw bytes; it knows nothing about frames or
//! commands. The connection worker in `metra-reader` owns exactly one
//! transport and is its only user.
//!
//! | Transport | Link | Feature |
//! |---|---|---|
//! | [`TcpTransport`] | Ethernet readers | always |
//! | `SerialTransport` | USB / RS232 readers | `hardware-serial` |
//! | [`MockTransport`] | in-memory, driven by a handle | always |
//!
//! [`AnyTransport`](devices::AnyTransport) selects one at runtime.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`] with a [`TransportError`]. Only
//! [`TransportError::ReceiveTimeout`] is recoverable within a session.

pub mod devices;
pub mod error;
pub mod mock;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod tcp;
pub mod traits;

pub use devices::{AnyTransport, TransportConfig};
pub use error::{Result, TransportError};
pub use mock::{MockTransport, MockTransportHandle};
#[cfg(feature = "hardware-serial")]
pub use serial::{SerialTransport, SerialTransportConfig};
pub use tcp::{DEFAULT_TCP_PORT, TcpTransport, TcpTransportConfig};
pub use traits::Transport;
