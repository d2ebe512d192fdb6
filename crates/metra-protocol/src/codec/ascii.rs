//! Legacy ASCII protocol.
//!
//! ```text
//! command:  VERB P1 P2<CR>               (checksum off)
//!           VERB P1 P2 C0DE<CR>          (checksum on, CRC16 of "VERB P1 P2 ")
//! reply:    FIELD FIELD ...<CR>          one line per frame, or several
//!                                        CR-separated lines in EOF mode
//! error:    UPA<CR>                      three-letter device error code
//! ```
//!
//! Inventory replies (`INV`, `CNR INV`) list one tag per line and close
//! with an `IVF nn` footer. In CR line mode they arrive as one frame per
//! line and are only complete once the footer has been received.

use bytes::Bytes;
use metra_core::constants::{ASCII_INVENTORY_FOOTER, ASCII_SEPARATOR, CRC_HEX_DIGITS};
use metra_core::{DeviceErrorCode, Error, Result};

use super::{Decoded, reply_lines, strip_terminator};
use crate::{Command, Frame, Reply, crc::crc16_hex};

const INVENTORY: &str = "INV";
const REPEAT: &str = "CNR";

/// Commands whose reply is a tag block closed by the inventory footer.
pub fn is_inventory_command(command: &Command) -> bool {
    match command.verb() {
        INVENTORY => true,
        REPEAT => command.params().first().is_some_and(|p| p == INVENTORY),
        _ => false,
    }
}

/// Codec for the CRC-checked ASCII protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsciiCodec {
    checksum: bool,
}

impl AsciiCodec {
    /// Codec with checksums disabled.
    pub fn new() -> Self {
        Self { checksum: false }
    }

    /// Codec with CRC16 checksums on commands and replies.
    pub fn with_checksum() -> Self {
        Self { checksum: true }
    }

    pub fn checksum(&self) -> bool {
        self.checksum
    }

    pub fn set_checksum(&mut self, enabled: bool) {
        self.checksum = enabled;
    }

    /// Render a command.
    ///
    /// Empty parameters are skipped; parameters must not contain spaces.
    ///
    /// ```
    /// use metra_protocol::{AsciiCodec, Command};
    ///
    /// let codec = AsciiCodec::new();
    /// let bytes = codec.encode(&Command::new("SRI").param("SS").param("")).unwrap();
    /// assert_eq!(&bytes[..], b"SRI SS\r");
    /// ```
    pub fn encode(&self, command: &Command) -> Result<Bytes> {
        command.validate()?;

        if command.verb().contains(ASCII_SEPARATOR)
            || command.params().iter().any(|p| p.contains(ASCII_SEPARATOR))
        {
            return Err(Error::InvalidCommand(format!(
                "ASCII command fields must not contain spaces: {command}"
            )));
        }

        let mut text = String::from(command.verb());
        for param in command.params().iter().filter(|p| !p.is_empty()) {
            text.push(ASCII_SEPARATOR);
            text.push_str(param);
        }

        if self.checksum {
            text.push(ASCII_SEPARATOR);
            let crc = crc16_hex(text.as_bytes());
            text.push_str(&crc);
        }

        text.push('\r');
        Ok(Bytes::from(text))
    }

    /// Decode reply text.
    ///
    /// Every line is checksum-verified when checksums are on. A reply whose
    /// first field is a known device error code becomes `Error::Device`.
    /// Inventory replies stay [`Decoded::Partial`] until their footer line;
    /// any other reply is complete with its first frame.
    pub fn decode(&self, command: &Command, raw: &str) -> Result<Decoded> {
        let lines = reply_lines(raw);
        if lines.is_empty() {
            return Ok(Decoded::Partial);
        }

        let mut fields = Vec::with_capacity(lines.len());
        for line in lines {
            let payload = if self.checksum {
                verify_checksum(line)?
            } else {
                line
            };
            fields.push(split_fields(payload));
        }

        if let Some(code) = fields
            .first()
            .and_then(|line| line.first())
            .and_then(|first| DeviceErrorCode::from_code(first))
        {
            return Err(Error::device(code));
        }

        let footer_seen = fields
            .last()
            .and_then(|line| line.first())
            .is_some_and(|first| first == ASCII_INVENTORY_FOOTER);
        if is_inventory_command(command) && !footer_seen {
            return Ok(Decoded::Partial);
        }

        Ok(Decoded::Complete(Reply::new(command.verb(), fields, raw)))
    }

    /// Verify and strip the checksum of every line in `frame`.
    ///
    /// Returns the frame unchanged when checksums are off. The stripped
    /// frame keeps one CR after each line.
    ///
    /// # Errors
    /// `ChecksumMismatch` or `FrameTooShort` for the first bad line.
    pub fn verify_frame(&self, frame: &Frame) -> Result<Frame> {
        if !self.checksum {
            return Ok(frame.clone());
        }

        let mut text = String::with_capacity(frame.size());
        for line in frame.lines() {
            text.push_str(verify_checksum(&line)?);
            text.push('\r');
        }
        Ok(Frame::from_string(&text))
    }

    /// Parse a command line (as the reader sees it) back into a [`Command`].
    pub fn parse_command(&self, raw: &[u8]) -> Result<Command> {
        let line = strip_terminator(raw)?;
        let payload = if self.checksum {
            verify_checksum(line)?
        } else {
            line
        };

        let mut fields = split_fields(payload).into_iter();
        let verb = fields
            .next()
            .ok_or_else(|| Error::MalformedFrame("empty command".to_string()))?;
        Ok(Command::new(verb).params_from(fields))
    }
}

/// Check the trailing CRC16 of a line and return the text before it.
///
/// The checksum covers everything before the four hex digits, including
/// the separating space, which is not part of the returned payload.
fn verify_checksum(line: &str) -> Result<&str> {
    if line.len() < CRC_HEX_DIGITS {
        return Err(Error::FrameTooShort(line.to_string()));
    }

    let split = line.len() - CRC_HEX_DIGITS;
    let (Some(payload), Some(actual)) = (line.get(..split), line.get(split..)) else {
        return Err(Error::MalformedFrame(format!("invalid checksum field in {line:?}")));
    };

    let expected = crc16_hex(payload.as_bytes());
    if !expected.eq_ignore_ascii_case(actual) {
        return Err(Error::ChecksumMismatch {
            expected,
            actual: actual.to_string(),
        });
    }

    Ok(payload.strip_suffix(ASCII_SEPARATOR).unwrap_or(payload))
}

fn split_fields(payload: &str) -> Vec<String> {
    payload
        .split(ASCII_SEPARATOR)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}
