//! Connection state of a reader worker.
//!
//! # States
//!
//! - `Connecting`: opening the transport
//! - `Configuring`: transport up, device preparation running
//! - `Running`: device prepared, commands and events flowing
//! - `WaitingForReconnect`: link lost or connect failed, waiting out the backoff
//! - `Stopped`: worker shut down (terminal)
//!
//! # Valid Transitions
//!
//! - Connecting → Configuring → Running
//! - Connecting / Configuring / Running → WaitingForReconnect → Connecting
//! - any state → Stopped
//!
//! ```
//! use metra_reader::ConnectionState;
//!
//! assert!(ConnectionState::Connecting.can_transition_to(&ConnectionState::Configuring));
//! assert!(!ConnectionState::Stopped.can_transition_to(&ConnectionState::Running));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a connection worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Opening the transport. A worker that was never started reports this.
    #[default]
    Connecting,

    /// Transport open, device preparation in progress.
    Configuring,

    /// Device prepared and serving requests.
    Running,

    /// Waiting for the backoff delay before the next connect attempt.
    WaitingForReconnect,

    /// Worker shut down; no further transitions.
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Configuring => "Configuring",
            ConnectionState::Running => "Running",
            ConnectionState::WaitingForReconnect => "WaitingForReconnect",
            ConnectionState::Stopped => "Stopped",
        };
        write!(f, "{}", state_str)
    }
}

impl ConnectionState {
    /// Check if transition to target state is valid from this state.
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, target),
            (Connecting, Configuring | WaitingForReconnect | Stopped)
                | (Configuring, Running | WaitingForReconnect | Stopped)
                | (Running, WaitingForReconnect | Stopped)
                | (WaitingForReconnect, Connecting | Stopped)
        )
    }

    /// Transport is open (the device may still be preparing).
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Configuring | ConnectionState::Running)
    }

    /// Device is prepared and serving requests.
    pub fn is_working(&self) -> bool {
        matches!(self, ConnectionState::Running)
    }
}

/// Snapshot of a worker, published on every change.
///
/// Only the worker writes it; everyone else reads it through a
/// `tokio::sync::watch` receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub state: ConnectionState,

    /// Error that caused the last transition to `WaitingForReconnect`.
    pub last_error: Option<String>,

    /// Consecutive failed connect attempts; reset once `Running`.
    pub attempt: u32,

    /// Last reported level of each input pin.
    pub input_pins: BTreeMap<u8, bool>,

    /// Identification returned by the device during preparation.
    pub device_status: Option<String>,

    /// Frames dropped because they failed checksum verification.
    pub protocol_errors: u64,
}
