//! Readers speaking the legacy ASCII protocol (DeskID, Dwarf, QuasarMX...).
//!
//! Unsolicited frames:
//!
//! ```text
//! HBT                       heartbeat
//! IEV 1 HI                  input pin 1 went high (LO for low)
//! SRT                       device restarted
//! E2003412 ANT 1 RSSI -52   one line per tag during a continuous scan,
//! IVF 01                    closed by the inventory footer
//! ```
//!
//! In end-of-frame mode a whole tag block is one frame. In CR line mode
//! every tag line is its own frame and the worker collects them until the
//! footer arrives.

use metra_core::TagObservation;
use metra_core::constants::ASCII_INVENTORY_FOOTER;
use metra_protocol::codec::is_inventory_command;
use metra_protocol::{AsciiCodec, Command, Frame, FrameCodec, Reply};
use std::time::Duration;
use tracing::debug;

use super::{FrameContext, FrameKind, PrepareOutcome, ReaderProfile, ScanCommands, tag_id};
use crate::channel::CommandChannel;
use crate::config::PrepareConfig;
use crate::error::Result;

const HEARTBEAT: &str = "HBT";
const INPUT_EVENT: &str = "IEV";
const SOFT_RESET: &str = "SRT";
const BREAK: &str = "BRK";

/// Profile for ASCII protocol readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsciiProfile;

impl AsciiProfile {
    pub fn new() -> Self {
        Self
    }
}

/// Parse `EPC [ANT n] [RSSI v]`; unknown tokens (such as a trailing
/// checksum) are skipped.
fn parse_tag_line<S: AsRef<str>>(fields: &[S]) -> Result<TagObservation> {
    let mut tokens = fields.iter().map(AsRef::as_ref);
    let id = tokens.next().unwrap_or_default();
    let mut observation = TagObservation::new(tag_id(id)?);

    while let Some(token) = tokens.next() {
        match token {
            "ANT" => {
                if let Some(antenna) = tokens.next().and_then(|v| v.parse().ok()) {
                    observation = observation.with_antenna(antenna);
                }
            }
            "RSSI" => {
                if let Some(rssi) = tokens.next().and_then(|v| v.parse().ok()) {
                    observation = observation.with_rssi(rssi);
                }
            }
            _ => {}
        }
    }

    Ok(observation)
}

fn parse_line(line: &str) -> Result<TagObservation> {
    let fields: Vec<&str> = line.split(' ').collect();
    parse_tag_line(fields.as_slice())
}

fn first_token(line: &str) -> &str {
    line.split(' ').next().unwrap_or_default()
}

impl ReaderProfile for AsciiProfile {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn codec(&self) -> FrameCodec {
        FrameCodec::Ascii(AsciiCodec::new())
    }

    async fn prepare(&self, channel: CommandChannel, config: PrepareConfig) -> Result<PrepareOutcome> {
        channel.set_checksum(config.checksum).await?;

        let revision = channel.send(Command::new("REV")).await?;
        let status = revision.fields().join(" ");

        if config.end_of_frame {
            channel.send(Command::new("EOF")).await?;
            channel.set_end_of_frame(true).await?;
        }

        let heartbeat = if config.heartbeat_secs > 0 {
            channel
                .send(Command::new(HEARTBEAT).param(config.heartbeat_secs))
                .await?;
            let interval = Duration::from_secs(u64::from(config.heartbeat_secs));
            channel.set_heartbeat(Some(interval)).await?;
            Some(interval)
        } else {
            None
        };

        Ok(PrepareOutcome { status, heartbeat })
    }

    fn classify(&self, frame: &Frame, context: FrameContext<'_>) -> FrameKind {
        let lines = frame.lines();
        let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
            return FrameKind::Ignored;
        };

        let mut tokens = first.split(' ');
        match tokens.next().unwrap_or_default() {
            HEARTBEAT => return FrameKind::Heartbeat,
            SOFT_RESET => return FrameKind::SoftReset,
            INPUT_EVENT => {
                let pin = tokens.next().and_then(|p| p.parse().ok());
                let level = tokens.next();
                return match (pin, level) {
                    (Some(pin), Some("HI")) => FrameKind::InputChange { pin, high: true },
                    (Some(pin), Some("LO")) => FrameKind::InputChange { pin, high: false },
                    _ => {
                        debug!(frame = %frame, "Malformed input event");
                        FrameKind::Ignored
                    }
                };
            }
            _ => {}
        }

        if context.pending.is_some_and(is_inventory_command) {
            return FrameKind::Reply;
        }

        // A tag block answers no other command
        if first_token(last) == ASCII_INVENTORY_FOOTER {
            let tags = lines[..lines.len() - 1]
                .iter()
                .filter_map(|line| {
                    parse_line(line)
                        .inspect_err(|e| debug!(line = %line, error = %e, "Skipping tag line"))
                        .ok()
                })
                .collect();
            return FrameKind::Tags(tags);
        }

        // In CR line mode a scan block arrives one tag per frame
        if context.pending.is_none() || context.scanning {
            let tags: Result<Vec<TagObservation>> = lines.iter().map(|line| parse_line(line)).collect();
            if let Ok(tags) = tags {
                return FrameKind::PartialTags(tags);
            }
        }

        if context.pending.is_some() {
            FrameKind::Reply
        } else {
            FrameKind::Ignored
        }
    }

    fn parse_inventory(&self, reply: &Reply) -> Result<Vec<TagObservation>> {
        reply
            .lines()
            .iter()
            .filter(|fields| fields.first().is_some_and(|f| f != ASCII_INVENTORY_FOOTER))
            .map(|fields| parse_tag_line(fields.as_slice()))
            .collect()
    }

    fn inventory_command(&self) -> Command {
        Command::new("INV")
    }

    fn scan_commands(&self) -> ScanCommands {
        ScanCommands {
            start: Command::new("CNR").param("INV"),
            stop: Command::new(BREAK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classify(text: &str, pending: Option<&Command>) -> FrameKind {
        AsciiProfile::new().classify(&Frame::from(text), FrameContext::new(pending, false))
    }

    fn classify_scanning(text: &str, pending: Option<&Command>) -> FrameKind {
        AsciiProfile::new().classify(&Frame::from(text), FrameContext::new(pending, true))
    }

    #[rstest]
    #[case("HBT", FrameKind::Heartbeat)]
    #[case("SRT", FrameKind::SoftReset)]
    #[case("IEV 1 HI", FrameKind::InputChange { pin: 1, high: true })]
    #[case("IEV 2 LO", FrameKind::InputChange { pin: 2, high: false })]
    #[case("IEV X HI", FrameKind::Ignored)]
    #[case("OK!", FrameKind::Ignored)]
    fn test_unsolicited_frames(#[case] text: &str, #[case] expected: FrameKind) {
        assert_eq!(classify(text, None), expected);
    }

    #[test]
    fn test_heartbeat_while_command_pending() {
        let pending = Command::new("INV");
        assert_eq!(classify("HBT", Some(&pending)), FrameKind::Heartbeat);
        assert_eq!(classify("OK!", Some(&pending)), FrameKind::Reply);
    }

    #[test]
    fn test_scan_block_is_tags() {
        let kind = classify("E2003412 ANT 2 RSSI -52\rE2003413\rIVF 02", None);
        let FrameKind::Tags(tags) = kind else {
            panic!("expected tags, got {kind:?}");
        };
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].id.as_str(), "E2003412");
        assert_eq!(tags[0].antenna, 2);
        assert_eq!(tags[0].rssi, Some(-52));
        assert_eq!(tags[1].antenna, 1);
    }

    #[test]
    fn test_inventory_block_answers_pending_inv() {
        let pending = Command::new("INV");
        assert_eq!(classify("E2003412\rIVF 01", Some(&pending)), FrameKind::Reply);

        let pending = Command::new("CNR").param("INV");
        assert_eq!(classify("E2003412", Some(&pending)), FrameKind::Reply);

        let pending = Command::new(BREAK);
        assert!(matches!(classify("E2003412\rIVF 01", Some(&pending)), FrameKind::Tags(_)));
    }

    #[test]
    fn test_tag_block_never_answers_other_commands() {
        let pending = Command::new("RDT");
        let kind = classify("DDDD\rIVF 01", Some(&pending));
        let FrameKind::Tags(tags) = kind else {
            panic!("expected tags, got {kind:?}");
        };
        assert_eq!(tags[0].id.as_str(), "DDDD");
    }

    #[test]
    fn test_line_mode_tag_lines_are_partial() {
        let kind = classify("CCCC ANT 2", None);
        let FrameKind::PartialTags(tags) = kind else {
            panic!("expected partial tags, got {kind:?}");
        };
        assert_eq!(tags[0].antenna, 2);

        // The footer alone closes the block
        assert_eq!(classify("IVF 01", None), FrameKind::Tags(vec![]));
    }

    #[test]
    fn test_line_mode_while_scanning_with_command_pending() {
        let pending = Command::new("SLOW");
        assert!(matches!(
            classify_scanning("DDDD", Some(&pending)),
            FrameKind::PartialTags(_)
        ));
        assert_eq!(classify_scanning("SLOW ACK", Some(&pending)), FrameKind::Reply);

        // Without a scan, hex data is the reply
        assert_eq!(classify("DDDD", Some(&pending)), FrameKind::Reply);
    }

    #[test]
    fn test_parse_inventory() {
        let reply = Reply::new(
            "INV",
            vec![
                vec!["3000AB".to_string(), "ANT".to_string(), "3".to_string()],
                vec!["3000AC".to_string()],
                vec!["IVF".to_string(), "02".to_string()],
            ],
            "",
        );

        let tags = AsciiProfile::new().parse_inventory(&reply).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].antenna, 3);
        assert_eq!(tags[1].id.as_str(), "3000AC");
    }

    #[test]
    fn test_parse_empty_inventory() {
        let reply = Reply::new("INV", vec![vec!["IVF".to_string(), "00".to_string()]], "");
        assert!(AsciiProfile::new().parse_inventory(&reply).unwrap().is_empty());
    }

    #[test]
    fn test_parse_inventory_rejects_bad_id() {
        let reply = Reply::new("INV", vec![vec!["XYZ".to_string()]], "");
        assert!(AsciiProfile::new().parse_inventory(&reply).is_err());
    }
}
