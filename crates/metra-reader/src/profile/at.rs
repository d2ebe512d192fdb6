//! Readers speaking the AT-command protocol (UHF+ family).
//!
//! Unsolicited frames:
//!
//! ```text
//! +HBT                          heartbeat
//! +IEV: 1,HIGH                  input pin 1 went high (LOW for low)
//! +BOOT                         device restarted
//! +CINV: E2003412,1,-52         one tag during a continuous scan
//! +CINV: <ROUND FINISHED,ANT=1> scan round marker, ignored
//! ```

use metra_core::TagObservation;
use metra_protocol::{AtCodec, Command, Frame, FrameCodec, Reply};
use std::time::Duration;
use tracing::debug;

use super::{FrameContext, FrameKind, PrepareOutcome, ReaderProfile, ScanCommands, tag_id};
use crate::channel::CommandChannel;
use crate::config::PrepareConfig;
use crate::error::Result;

const HEARTBEAT: &str = "+HBT";
const INPUT_EVENT: &str = "+IEV";
const BOOT: &str = "+BOOT";
const CONTINUOUS_INVENTORY: &str = "+CINV";

/// Profile for AT protocol readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtProfile;

impl AtProfile {
    pub fn new() -> Self {
        Self
    }
}

/// Parse `EPC,ANT[,RSSI]` fields.
fn parse_tag_fields<S: AsRef<str>>(fields: &[S]) -> Result<TagObservation> {
    let mut fields = fields.iter().map(|f| f.as_ref().trim());
    let mut observation = TagObservation::new(tag_id(fields.next().unwrap_or_default())?);

    if let Some(antenna) = fields.next().and_then(|a| a.parse().ok()) {
        observation = observation.with_antenna(antenna);
    }
    if let Some(rssi) = fields.next().and_then(|r| r.parse().ok()) {
        observation = observation.with_rssi(rssi);
    }
    Ok(observation)
}

/// Split `+VERB: a,b` into the verb and its body.
fn split_event(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((verb, body)) => (verb.trim(), body.trim()),
        None => (line.trim(), ""),
    }
}

/// Round markers and "no tag" notices are wrapped in angle brackets.
fn is_notice(body: &str) -> bool {
    body.starts_with('<')
}

impl ReaderProfile for AtProfile {
    fn name(&self) -> &'static str {
        "at"
    }

    fn codec(&self) -> FrameCodec {
        FrameCodec::At(AtCodec::new())
    }

    async fn prepare(&self, channel: CommandChannel, config: PrepareConfig) -> Result<PrepareOutcome> {
        let identity = channel.send(Command::new("ATI")).await?;
        let status = identity
            .lines()
            .iter()
            .map(|fields| fields.join(","))
            .collect::<Vec<_>>()
            .join(" ");

        let heartbeat = if config.heartbeat_secs > 0 {
            channel
                .send(Command::new("AT+HBT").param(config.heartbeat_secs))
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
        let Some(first) = frame.first_line() else {
            return FrameKind::Ignored;
        };

        let (verb, body) = split_event(&first);
        match verb {
            HEARTBEAT => FrameKind::Heartbeat,
            BOOT => FrameKind::SoftReset,
            INPUT_EVENT => {
                let mut fields = body.split(',').map(str::trim);
                let pin = fields.next().and_then(|p| p.parse().ok());
                match (pin, fields.next()) {
                    (Some(pin), Some("HIGH")) => FrameKind::InputChange { pin, high: true },
                    (Some(pin), Some("LOW")) => FrameKind::InputChange { pin, high: false },
                    _ => {
                        debug!(frame = %frame, "Malformed input event");
                        FrameKind::Ignored
                    }
                }
            }
            CONTINUOUS_INVENTORY if is_notice(body) => FrameKind::Ignored,
            CONTINUOUS_INVENTORY => {
                let fields: Vec<&str> = body.split(',').collect();
                match parse_tag_fields(fields.as_slice()) {
                    Ok(tag) => FrameKind::Tags(vec![tag]),
                    Err(e) => {
                        debug!(frame = %frame, error = %e, "Skipping tag event");
                        FrameKind::Ignored
                    }
                }
            }
            _ if context.pending.is_some() => FrameKind::Reply,
            _ => FrameKind::Ignored,
        }
    }

    fn parse_inventory(&self, reply: &Reply) -> Result<Vec<TagObservation>> {
        reply
            .lines()
            .iter()
            .filter(|fields| fields.first().is_some_and(|f| !is_notice(f)))
            .map(|fields| parse_tag_fields(fields.as_slice()))
            .collect()
    }

    fn inventory_command(&self) -> Command {
        Command::new("AT+INV")
    }

    fn scan_commands(&self) -> ScanCommands {
        ScanCommands {
            start: Command::new("AT+CINV"),
            stop: Command::new("AT+BINV"),
        }
    }
}
