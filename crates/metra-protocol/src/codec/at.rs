//! AT-command protocol.
//!
//! ```text
//! command:  AT+VERB=P1,P2<CR>
//! reply:    AT+VERB=P1,P2<CR>            echo of the command
//!           +VERB: F1,F2<CR>             zero or more data lines
//!           OK<CR>                       or ERROR, with a <message> on failure
//! ```

use bytes::Bytes;
use metra_core::constants::{AT_ASSIGN, AT_ERROR, AT_FIELD_SEPARATOR, AT_OK};
use metra_core::{DeviceErrorCode, Error, Result};

use super::{Decoded, reply_lines, strip_terminator};
use crate::{Command, Reply};

/// Codec for the AT-command protocol. Stateless; replies carry no checksum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtCodec;

impl AtCodec {
    pub fn new() -> Self {
        Self
    }

    /// Render a command.
    ///
    /// ```
    /// use metra_protocol::{AtCodec, Command};
    ///
    /// let bytes = AtCodec::new()
    ///     .encode(&Command::new("AT+CINV").param("ON").param(1))
    ///     .unwrap();
    /// assert_eq!(&bytes[..], b"AT+CINV=ON,1\r");
    /// ```
    pub fn encode(&self, command: &Command) -> Result<Bytes> {
        command.validate()?;

        if command.verb().contains(AT_ASSIGN)
            || command
                .params()
                .iter()
                .any(|p| p.contains(AT_FIELD_SEPARATOR))
        {
            return Err(Error::InvalidCommand(format!(
                "AT command fields must not contain '{AT_ASSIGN}' or '{AT_FIELD_SEPARATOR}': {command}"
            )));
        }

        let mut text = String::from(command.verb());
        if !command.params().is_empty() {
            text.push(AT_ASSIGN);
            text.push_str(&command.params().join(&AT_FIELD_SEPARATOR.to_string()));
        }
        text.push('\r');

        Ok(Bytes::from(text))
    }

    /// Decode the reply lines collected so far.
    ///
    /// The first line must echo the issued verb. The reply is complete
    /// once a line reads `OK` or starts with `ERROR`.
    pub fn decode(&self, command: &Command, raw: &str) -> Result<Decoded> {
        let lines = reply_lines(raw);
        let Some((echo, rest)) = lines.split_first() else {
            return Ok(Decoded::Partial);
        };

        if echoed_verb(echo) != echoed_verb(command.verb()) {
            return Err(Error::UnexpectedReply {
                expected: command.verb().to_string(),
                received: (*echo).to_string(),
            });
        }

        let Some((last, data)) = rest.split_last() else {
            return Ok(Decoded::Partial);
        };

        if *last == AT_OK {
            let fields = data.iter().map(|line| split_fields(line)).collect();
            return Ok(Decoded::Complete(Reply::new(command.verb(), fields, raw)));
        }

        if last.starts_with(AT_ERROR) {
            let message = std::iter::once(last)
                .chain(data.iter())
                .find_map(|line| bracketed(line))
                .unwrap_or(AT_ERROR)
                .to_string();
            return Err(Error::Device {
                code: DeviceErrorCode::Reported,
                message,
            });
        }

        Ok(Decoded::Partial)
    }

    /// Parse a command line (as the reader sees it) back into a [`Command`].
    pub fn parse_command(&self, raw: &[u8]) -> Result<Command> {
        let line = strip_terminator(raw)?;
        if line.is_empty() {
            return Err(Error::MalformedFrame("empty command".to_string()));
        }

        Ok(match line.split_once(AT_ASSIGN) {
            Some((verb, params)) => {
                Command::new(verb).params_from(params.split(AT_FIELD_SEPARATOR))
            }
            None => Command::new(line),
        })
    }
}

/// Verb of a command line: everything before `=` or `?`.
fn echoed_verb(line: &str) -> &str {
    line.split([AT_ASSIGN, '?'])
        .next()
        .unwrap_or_default()
        .trim_end()
}

/// Split a data line into fields, removing the `+VERB: ` prefix.
pub(crate) fn split_fields(line: &str) -> Vec<String> {
    let body = match line.split_once(": ") {
        Some((prefix, body)) if prefix.starts_with('+') => body,
        _ => line,
    };

    body.split(AT_FIELD_SEPARATOR)
        .map(|field| field.trim().to_string())
        .collect()
}

/// Text between the first `<` and the following `>`.
fn bracketed(line: &str) -> Option<&str> {
    let start = line.find('<')? + 1;
    let len = line[start..].find('>')?;
    Some(&line[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_params() {
        let bytes = AtCodec::new().encode(&Command::new("ATI")).unwrap();
        assert_eq!(&bytes[..], b"ATI\r");
    }

    #[test]
    fn test_encode_rejects_separators() {
        let codec = AtCodec::new();
        assert!(codec.encode(&Command::new("AT+X").param("1,2")).is_err());
        assert!(codec.encode(&Command::new("AT+X=1")).is_err());
    }

    #[test]
    fn test_decode_waits_for_terminal_line() {
        let codec = AtCodec::new();
        let cmd = Command::new("AT+INV");

        assert_eq!(codec.decode(&cmd, "").unwrap(), Decoded::Partial);
        assert_eq!(codec.decode(&cmd, "AT+INV\r").unwrap(), Decoded::Partial);
        assert_eq!(
            codec
                .decode(&cmd, "AT+INV\r+INV: 3000AB,1,-52\r")
                .unwrap(),
            Decoded::Partial
        );
    }

    #[test]
    fn test_decode_complete_reply() {
        let codec = AtCodec::new();
        let cmd = Command::new("AT+INV");
        let raw = "AT+INV\r+INV: 3000AB,1,-52\r+INV: 3000AC,2,-60\rOK\r";

        let Decoded::Complete(reply) = codec.decode(&cmd, raw).unwrap() else {
            panic!("expected complete reply");
        };
        assert_eq!(reply.line_count(), 2);
        assert_eq!(reply.lines()[0], ["3000AB", "1", "-52"]);
        assert_eq!(reply.lines()[1], ["3000AC", "2", "-60"]);
        assert_eq!(reply.raw(), raw);
    }

    #[test]
    fn test_decode_bare_ok() {
        let codec = AtCodec::new();
        let Decoded::Complete(reply) = codec.decode(&Command::new("AT+BINV"), "AT+BINV\rOK\r").unwrap()
        else {
            panic!("expected complete reply");
        };
        assert!(reply.fields().is_empty());
    }

    #[test]
    fn test_decode_error_message() {
        let codec = AtCodec::new();
        let result = codec.decode(
            &Command::new("AT+PWR").param(99),
            "AT+PWR=99\rERROR<Parameter out of range>\r",
        );

        match result {
            Err(Error::Device { code, message }) => {
                assert_eq!(code, DeviceErrorCode::Reported);
                assert_eq!(message, "Parameter out of range");
            }
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_without_message() {
        let codec = AtCodec::new();
        let result = codec.decode(&Command::new("AT+X"), "AT+X\rERROR\r");
        assert!(matches!(result, Err(Error::Device { message, .. }) if message == "ERROR"));
    }

    #[test]
    fn test_decode_rejects_missing_echo() {
        let codec = AtCodec::new();
        let result = codec.decode(&Command::new("AT+INV"), "+HBT\rOK\r");
        assert!(matches!(result, Err(Error::UnexpectedReply { .. })));
    }

    #[test]
    fn test_decode_rejects_longer_verb_echo() {
        let codec = AtCodec::new();
        let result = codec.decode(&Command::new("AT+INV"), "AT+INVX\rOK\r");
        assert!(matches!(result, Err(Error::UnexpectedReply { .. })));
    }

    #[test]
    fn test_decode_accepts_query_and_assignment_echo() {
        let codec = AtCodec::new();
        let decoded = codec.decode(&Command::new("AT+PWR?"), "AT+PWR?\r+PWR: 17\rOK\r").unwrap();
        assert!(matches!(decoded, Decoded::Complete(_)));

        let cmd = Command::new("AT+PWR").param(17);
        let decoded = codec.decode(&cmd, "AT+PWR=17\rOK\r").unwrap();
        assert!(matches!(decoded, Decoded::Complete(_)));
    }

    #[test]
    fn test_parse_command() {
        let codec = AtCodec::new();
        let cmd = codec.parse_command(b"AT+HBT=5\r").unwrap();
        assert_eq!(cmd, Command::new("AT+HBT").param(5));

        let cmd = codec.parse_command(b"ATI\r").unwrap();
        assert_eq!(cmd, Command::new("ATI"));
    }

    #[test]
    fn test_split_fields_keeps_plain_lines() {
        assert_eq!(split_fields("1,2"), ["1", "2"]);
        assert_eq!(split_fields("+IEV: 1,HIGH"), ["1", "HIGH"]);
    }
}
