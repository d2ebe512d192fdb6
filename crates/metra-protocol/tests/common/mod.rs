//! Shared helpers for metra-protocol integration tests.

#![allow(dead_code)]

use metra_protocol::{Command, Decoded, FrameCodec, Framer, Reply, crc16_hex};

/// Append the CRC16 of `text + " "` to a line, as a checksumming reader does.
pub fn with_crc(text: &str) -> String {
    let payload = format!("{text} ");
    let crc = crc16_hex(payload.as_bytes());
    format!("{payload}{crc}")
}

/// Feed raw bytes through a framer and collect the text of each frame.
pub fn frames_of(framer: &mut Framer, bytes: &[u8]) -> Vec<String> {
    framer.feed(bytes);
    framer
        .drain_frames()
        .map(|frame| frame.text().into_owned())
        .collect()
}

/// Decode `raw` and unwrap a complete reply.
pub fn complete(codec: &FrameCodec, command: &Command, raw: &str) -> Reply {
    match codec.decode(command, raw) {
        Ok(Decoded::Complete(reply)) => reply,
        other => panic!("expected complete reply for {command}, got {other:?}"),
    }
}
