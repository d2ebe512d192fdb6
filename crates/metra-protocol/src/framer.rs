//! Terminator-based framing of the reader byte stream.
//!
//! Readers deliver bytes one at a time over serial or TCP links. The
//! [`Framer`] accumulates them and cuts the stream into [`Frame`]s at the
//! active terminator:
//!
//! ```text
//! ┌──────────┐  byte != terminator   ┌───────────┐
//! │ buffering│──────────────────────>│ buffering │
//! └──────────┘                       └───────────┘
//!       │ terminator                       │ buffer > MAX_FRAME_SIZE
//!       ▼                                  ▼
//!  frame emitted, buffer cleared      buffer discarded
//! ```
//!
//! # Framing modes
//!
//! - [`FramingMode::CarriageReturn`]: every CR ends a frame, LF bytes are
//!   ignored. This is the default for both protocols.
//! - [`FramingMode::EndOfFrame`]: only LF ends a frame; CRs stay inside the
//!   frame as line separators. ASCII readers switch to this mode once the
//!   `EOF` command was acknowledged.
//!
//! # Usage
//!
//! ```
//! use metra_protocol::{Framer, FramingMode};
//!
//! let mut framer = Framer::new();
//! framer.set_mode(FramingMode::EndOfFrame);
//!
//! // A reply terminated by CR alone is not complete in end-of-frame mode
//! framer.feed(b"OK!\r");
//! assert!(framer.next_frame().is_none());
//!
//! framer.feed(b"\n");
//! assert_eq!(framer.next_frame().unwrap().lines(), ["OK!"]);
//! ```

use bytes::BytesMut;
use metra_core::constants::{CR, LF, MAX_FRAME_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

use crate::frame::Frame;

/// Initial buffer capacity for incoming data.
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Recommended initial capacity for frame queue.
const INITIAL_FRAME_QUEUE_CAPACITY: usize = 4;

/// Which byte terminates a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Frames end at CR; LF is ignored.
    #[default]
    CarriageReturn,
    /// Frames end at LF; CR separates lines inside a frame.
    EndOfFrame,
}

impl FramingMode {
    /// The terminator byte of this mode.
    pub fn terminator(&self) -> u8 {
        match self {
            FramingMode::CarriageReturn => CR,
            FramingMode::EndOfFrame => LF,
        }
    }
}

/// Stateful splitter turning a byte stream into frames.
#[derive(Debug)]
pub struct Framer {
    /// Bytes of the frame currently being received.
    buffer: BytesMut,

    /// Active framing mode.
    mode: FramingMode,

    /// Frames completed by `feed()` and not yet taken.
    frames: VecDeque<Frame>,
}

impl Framer {
    pub fn new() -> Self {
        Self::with_mode(FramingMode::default())
    }

    pub fn with_mode(mode: FramingMode) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            mode,
            frames: VecDeque::with_capacity(INITIAL_FRAME_QUEUE_CAPACITY),
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Switch the framing mode.
    ///
    /// Bytes already buffered are kept; they will be terminated according
    /// to the new mode.
    pub fn set_mode(&mut self, mode: FramingMode) {
        self.mode = mode;
    }

    /// Enable or disable end-of-frame mode.
    pub fn set_end_of_frame(&mut self, enabled: bool) {
        self.set_mode(if enabled {
            FramingMode::EndOfFrame
        } else {
            FramingMode::CarriageReturn
        });
    }

    /// Push a single byte; returns the frame it completed, if any.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        if byte == self.mode.terminator() {
            return self.take_frame();
        }

        if byte == LF {
            // LF outside end-of-frame mode is the tail of a CRLF pair
            return None;
        }

        if self.buffer.len() >= MAX_FRAME_SIZE {
            warn!(
                size = self.buffer.len(),
                "frame exceeds {MAX_FRAME_SIZE} bytes without terminator, discarding"
            );
            self.buffer.clear();
        }

        self.buffer.extend_from_slice(&[byte]);
        None
    }

    /// Feed a chunk of bytes; completed frames are queued for
    /// [`next_frame()`](Framer::next_frame).
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(frame) = self.push(byte) {
                self.frames.push_back(frame);
            }
        }
    }

    /// Take the next queued frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Number of bytes of the incomplete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Discard buffered bytes and queued frames; the mode is kept.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
    }

    /// Iterate over and remove all queued frames.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { framer: self }
    }

    fn take_frame(&mut self) -> Option<Frame> {
        let payload = self.buffer.split().freeze();

        if payload.iter().all(|&b| b == CR || b == LF) {
            return None;
        }

        if !payload.is_ascii() {
            // Non-ASCII frames are line noise or a baud-rate mismatch
            warn!(size = payload.len(), "discarding non-ASCII frame");
            return None;
        }

        Some(Frame::new(payload))
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator that drains frames from a [`Framer`].
pub struct DrainFrames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for DrainFrames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.framer.frames_available();
        (len, Some(len))
    }
}
