//! Device-model interface.
//!
//! The connection worker is protocol-agnostic. A [`ReaderProfile`] tells it
//! which codec to use, how to prepare the device after each connect and
//! what an incoming frame means.
//!
//! | Profile | Protocol | Prepare | Inventory | Scan start / stop |
//! |---|---|---|---|---|
//! | [`AsciiProfile`] | ASCII, optional CRC16 | `REV`, `EOF`, `HBT` | `INV` | `CNR INV` / `BRK` |
//! | [`AtProfile`] | AT commands | `ATI`, `AT+HBT` | `AT+INV` | `AT+CINV` / `AT+BINV` |

mod ascii;
mod at;

pub use ascii::AsciiProfile;
pub use at::AtProfile;

use metra_core::{TagObservation, TagId};
use metra_protocol::{Command, Frame, FrameCodec, Reply};
use std::future::Future;
use std::time::Duration;

use crate::channel::CommandChannel;
use crate::config::PrepareConfig;
use crate::error::Result;

/// What an incoming frame is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// (Part of) the reply to the pending command.
    Reply,
    /// Keep-alive from the device.
    Heartbeat,
    /// An input pin changed level.
    InputChange { pin: u8, high: bool },
    /// Tags reported outside of a command reply, closing their block.
    Tags(Vec<TagObservation>),
    /// Tag lines of an unsolicited block whose footer has not arrived yet.
    PartialTags(Vec<TagObservation>),
    /// The device restarted and lost its configuration.
    SoftReset,
    /// Unsolicited frame with no meaning to the worker.
    Ignored,
}

/// What the worker knows when a frame arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameContext<'a> {
    /// Command awaiting its reply.
    pub pending: Option<&'a Command>,
    /// A continuous scan is running.
    pub scanning: bool,
}

impl<'a> FrameContext<'a> {
    pub fn new(pending: Option<&'a Command>, scanning: bool) -> Self {
        Self { pending, scanning }
    }

    /// No command pending, no scan running.
    pub fn idle() -> Self {
        Self::default()
    }

    /// `command` is pending, no scan running.
    pub fn pending(command: &'a Command) -> Self {
        Self::new(Some(command), false)
    }
}

/// Result of a successful preparation sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrepareOutcome {
    /// Identification reported by the device.
    pub status: String,
    /// Heartbeat interval the device was configured for.
    pub heartbeat: Option<Duration>,
}

/// Commands that start and stop a continuous scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCommands {
    pub start: Command,
    pub stop: Command,
}

/// Behaviour of one reader family.
pub trait ReaderProfile: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Codec for a fresh session.
    fn codec(&self) -> FrameCodec;

    /// Configure the device after a connect.
    ///
    /// Runs on its own task while the worker keeps routing frames, so the
    /// commands issued through `channel` are answered normally.
    fn prepare(
        &self,
        channel: CommandChannel,
        config: PrepareConfig,
    ) -> impl Future<Output = Result<PrepareOutcome>> + Send;

    /// Decide what `frame` is.
    ///
    /// `frame` has already passed checksum verification, with the
    /// checksums stripped.
    fn classify(&self, frame: &Frame, context: FrameContext<'_>) -> FrameKind;

    /// Decode the tags in an inventory reply.
    fn parse_inventory(&self, reply: &Reply) -> Result<Vec<TagObservation>>;

    /// Single inventory round.
    fn inventory_command(&self) -> Command;

    fn scan_commands(&self) -> ScanCommands;
}

/// Parse a tag id, mapping failures to a malformed-frame error.
pub(crate) fn tag_id(raw: &str) -> Result<TagId> {
    TagId::new(raw).map_err(|_| {
        metra_core::Error::MalformedFrame(format!("invalid tag id {raw:?}")).into()
    })
}
