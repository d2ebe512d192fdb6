//! Mock transport for testing without a reader.
//!
//! The mock is controlled through a [`MockTransportHandle`]: tests inject
//! the bytes the reader would send, read what the worker wrote, make
//! connects fail and cut the link.

pub mod transport;

pub use transport::{MockTransport, MockTransportHandle};
