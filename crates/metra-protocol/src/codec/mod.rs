//! Wire codecs for the two metraTec reader protocols.
//!
//! Both protocols share one connection state machine; what differs is how
//! a [`Command`] is rendered into bytes and how reply text is turned back
//! into a [`Reply`]. The codec is chosen once per device and injected into
//! the connection worker as a [`FrameCodec`] value.
//!
//! ```text
//! Command ──encode──> bytes ──(transport)──> reader
//! reader ──(transport)──> Framer ──> Frame text ──decode──> Reply | Partial | Error
//! ```
//!
//! # Example
//!
//! ```
//! use metra_protocol::{AtCodec, Command, Decoded, FrameCodec};
//!
//! let codec = FrameCodec::At(AtCodec::new());
//! let cmd = Command::new("AT+PWR").param(17);
//! assert_eq!(&codec.encode(&cmd).unwrap()[..], b"AT+PWR=17\r");
//!
//! let decoded = codec.decode(&cmd, "AT+PWR=17\rOK\r").unwrap();
//! assert!(matches!(decoded, Decoded::Complete(_)));
//! ```

mod ascii;
mod at;

pub use ascii::{AsciiCodec, is_inventory_command};
pub use at::AtCodec;

use bytes::Bytes;
use metra_core::Result;

use crate::{Command, Frame, Reply};

/// Outcome of feeding reply text to a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The reply is complete.
    Complete(Reply),
    /// More lines are needed before the reply is complete.
    Partial,
}

/// Codec strategy for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameCodec {
    /// Legacy ASCII protocol with optional CRC16.
    Ascii(AsciiCodec),
    /// AT-command protocol.
    At(AtCodec),
}

impl FrameCodec {
    /// Render a command into wire bytes, terminator included.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommand` if the command cannot be expressed
    /// in this protocol.
    pub fn encode(&self, command: &Command) -> Result<Bytes> {
        match self {
            Self::Ascii(codec) => codec.encode(command),
            Self::At(codec) => codec.encode(command),
        }
    }

    /// Decode the reply text collected so far for `command`.
    ///
    /// `raw` holds every frame received for the command, each followed by
    /// CR. Returns [`Decoded::Partial`] while the reply is incomplete.
    ///
    /// # Errors
    /// Protocol errors (checksum, malformed or unexpected reply) and
    /// device-reported errors.
    pub fn decode(&self, command: &Command, raw: &str) -> Result<Decoded> {
        match self {
            Self::Ascii(codec) => codec.decode(command, raw),
            Self::At(codec) => codec.decode(command, raw),
        }
    }

    /// Verify the per-line checksums of an incoming frame and strip them.
    ///
    /// Frames pass through unchanged when the protocol or the current
    /// configuration carries no checksum.
    ///
    /// # Errors
    /// `ChecksumMismatch` or `FrameTooShort` if any line fails the check.
    pub fn verify(&self, frame: &Frame) -> Result<Frame> {
        match self {
            Self::Ascii(codec) => codec.verify_frame(frame),
            Self::At(_) => Ok(frame.clone()),
        }
    }

    /// Parse a command line as a reader would receive it.
    pub fn parse_command(&self, raw: &[u8]) -> Result<Command> {
        match self {
            Self::Ascii(codec) => codec.parse_command(raw),
            Self::At(codec) => codec.parse_command(raw),
        }
    }

    /// Enable or disable CRC16 checksums. The AT protocol has none, so
    /// this is a no-op there.
    pub fn set_checksum(&mut self, enabled: bool) {
        if let Self::Ascii(codec) = self {
            codec.set_checksum(enabled);
        }
    }

    /// Short protocol name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii(_) => "ascii",
            Self::At(_) => "at",
        }
    }
}

impl From<AsciiCodec> for FrameCodec {
    fn from(codec: AsciiCodec) -> Self {
        Self::Ascii(codec)
    }
}

impl From<AtCodec> for FrameCodec {
    fn from(codec: AtCodec) -> Self {
        Self::At(codec)
    }
}

/// Split reply text into non-empty lines, dropping CR and stray LF.
pub(crate) fn reply_lines(raw: &str) -> Vec<&str> {
    raw.split('\r')
        .map(|line| line.trim_matches('\n'))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Strip the terminator from a command line.
pub(crate) fn strip_terminator(raw: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| metra_core::Error::MalformedFrame("command is not UTF-8".to_string()))?;
    Ok(text.trim_end_matches(['\r', '\n']))
}
