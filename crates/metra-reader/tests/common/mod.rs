//! Shared helpers for metra-reader integration tests.

#![allow(dead_code)]

use metra_protocol::{AsciiCodec, AtCodec, Command, FrameCodec, crc16_hex};
use metra_reader::{ConnectionState, Event, EventKind, Reader, ReaderConfig, ReaderProfile};
use metra_transport::{MockTransport, MockTransportHandle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("metra_reader=debug")
        .with_test_writer()
        .try_init();
}

/// Config with small timeouts suitable for real-time tests.
pub fn fast_config() -> ReaderConfig {
    let mut config = ReaderConfig::default();
    config.command_timeout_ms = 300;
    config.poll_interval_ms = 20;
    config.backoff.min_wait_ms = 50;
    config.backoff.max_wait_ms = 200;
    config.sweep_interval_ms = 20;
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ascii,
    At,
}

/// A reader simulated on the far side of a [`MockTransport`].
///
/// Replies to the preparation commands, answers inventories from a
/// configurable set of tags in the field, echoes unknown ASCII commands as
/// `<VERB> ACK` and ignores `SLOW`. A checksummed ASCII reader expects a
/// CRC on every command and appends one to every reply line.
pub struct SimulatedReader {
    pub handle: MockTransportHandle,
    field: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Command>>>,
    task: JoinHandle<()>,
}

impl SimulatedReader {
    pub fn spawn(handle: MockTransportHandle, protocol: Protocol) -> Self {
        Self::spawn_with(handle, protocol, false)
    }

    /// ASCII reader with CRC16 checksums on.
    pub fn spawn_checksummed(handle: MockTransportHandle) -> Self {
        Self::spawn_with(handle, Protocol::Ascii, true)
    }

    fn spawn_with(handle: MockTransportHandle, protocol: Protocol, checksum: bool) -> Self {
        let field = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let handle = handle.clone();
            let field = Arc::clone(&field);
            let received = Arc::clone(&received);
            async move {
                let codec = match protocol {
                    Protocol::Ascii if checksum => FrameCodec::Ascii(AsciiCodec::with_checksum()),
                    Protocol::Ascii => FrameCodec::Ascii(AsciiCodec::new()),
                    Protocol::At => FrameCodec::At(AtCodec::new()),
                };
                let mut end_of_frame = false;

                while let Some(bytes) = handle.written().await {
                    let Ok(command) = codec.parse_command(&bytes) else {
                        continue;
                    };
                    received.lock().unwrap().push(command.clone());

                    let tags = field.lock().unwrap().clone();
                    let reply = match protocol {
                        Protocol::Ascii => ascii_reply(&command, &tags, &mut end_of_frame, checksum),
                        Protocol::At => at_reply(&command, &tags),
                    };
                    if let Some(reply) = reply {
                        handle.inject(reply);
                    }
                }
            }
        });

        Self {
            handle,
            field,
            received,
            task,
        }
    }

    /// Replace the tags in the field.
    pub fn set_field(&self, tags: &[&str]) {
        *self.field.lock().unwrap() = tags.iter().map(|t| t.to_string()).collect();
    }

    /// Verbs received so far, in order.
    pub fn verbs(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.verb().to_string())
            .collect()
    }
}

impl Drop for SimulatedReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// `text` followed by its CRC16, as a checksummed reader sends it.
pub fn with_crc(text: &str) -> String {
    format!("{text} {}", crc16_hex(format!("{text} ").as_bytes()))
}

fn ascii_reply(
    command: &Command,
    tags: &[String],
    end_of_frame: &mut bool,
    checksum: bool,
) -> Option<String> {
    let lines: Vec<String> = match command.verb() {
        "REV" => vec!["DESKID_UHF 0104".to_string()],
        "EOF" => {
            *end_of_frame = true;
            vec!["OK!".to_string()]
        }
        "HBT" | "BRK" => vec!["OK!".to_string()],
        "INV" | "CNR" => {
            let mut lines: Vec<String> = tags.to_vec();
            lines.push(format!("IVF {:02}", tags.len()));
            lines
        }
        "SRI" => vec!["UPA".to_string()],
        "SLOW" => return None,
        verb => vec![format!("{verb} ACK")],
    };

    let lines: Vec<String> = if checksum {
        lines.iter().map(|line| with_crc(line)).collect()
    } else {
        lines
    };
    let mut reply = lines.join("\r");
    reply.push('\r');
    if *end_of_frame {
        reply.push('\n');
    }
    Some(reply)
}

fn at_reply(command: &Command, tags: &[String]) -> Option<String> {
    let verb = command.verb();
    let data: Vec<String> = match verb {
        "ATI" => vec!["PULSAR_LR 0104".to_string()],
        "AT+INV" => {
            let mut lines: Vec<String> = tags.iter().map(|t| format!("+INV: {t},1,-52")).collect();
            lines.push("+INV: <ROUND FINISHED, ANT=1>".to_string());
            lines
        }
        "AT+PWR" => {
            return Some(format!("{verb}\rERROR <Value out of range>\r"));
        }
        "SLOW" => return None,
        _ => Vec::new(),
    };

    let mut reply = String::from(verb);
    reply.push('\r');
    for line in data {
        reply.push_str(&line);
        reply.push('\r');
    }
    reply.push_str("OK\r");
    Some(reply)
}

/// Reader on a mock transport with a simulated device behind it.
pub fn simulated<P: ReaderProfile>(
    config: ReaderConfig,
    profile: P,
    protocol: Protocol,
) -> (Reader<MockTransport, P>, SimulatedReader) {
    let (transport, handle) = MockTransport::new();
    let reader = Reader::new(config, transport, profile).unwrap();
    (reader, SimulatedReader::spawn(handle, protocol))
}

/// Reader with a checksummed simulated ASCII device behind it.
pub fn simulated_checksummed<P: ReaderProfile>(
    config: ReaderConfig,
    profile: P,
) -> (Reader<MockTransport, P>, SimulatedReader) {
    let (transport, handle) = MockTransport::new();
    let reader = Reader::new(config, transport, profile).unwrap();
    (reader, SimulatedReader::spawn_checksummed(handle))
}

pub async fn wait_for_state<P: ReaderProfile>(reader: &Reader<MockTransport, P>, state: ConnectionState) {
    let mut status = reader.worker().watch_status();
    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("reader never reached {state}"))
        .unwrap();
}

/// Wait for the next event matching `predicate`, skipping others.
pub async fn next_event(
    events: &mut UnboundedReceiver<Event>,
    predicate: impl Fn(&EventKind) -> bool,
) -> Event {
    let wait = async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event.kind) {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no matching event")
}

/// Every event already delivered.
pub fn drain(events: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// States carried by the `ConnectionStateChanged` events in `events`.
pub fn states(events: &[Event]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::ConnectionStateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}
