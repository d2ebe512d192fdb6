//! Events delivered to reader listeners.

use chrono::{DateTime, Utc};
use metra_core::{DeviceId, Tag};
use serde::{Deserialize, Serialize};

use crate::ConnectionState;

/// Something that happened on a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    /// Event stamped with the current time.
    pub fn now(device_id: DeviceId, kind: EventKind) -> Self {
        Self {
            device_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventKind {
    /// The worker changed state; `error` holds the cause of a failure.
    ConnectionStateChanged {
        state: ConnectionState,
        error: Option<String>,
    },

    /// A (debounced) input pin changed level.
    InputPinChanged { pin: u8, high: bool },

    /// A tag came into view.
    TagArrived { tag: Tag },

    /// A tag was not seen for longer than the keep time.
    TagLost { tag: Tag },

    /// Full result of one inventory round.
    InventoryUpdated { tags: Vec<Tag> },
}

impl EventKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::InputPinChanged { .. } => "input_pin_changed",
            Self::TagArrived { .. } => "tag_arrived",
            Self::TagLost { .. } => "tag_lost",
            Self::InventoryUpdated { .. } => "inventory_updated",
        }
    }
}
