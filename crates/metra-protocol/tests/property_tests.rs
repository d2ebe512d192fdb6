//! Property-based tests for the wire codecs.
//!
//! Commands built from valid verbs and parameters must survive
//! encode/parse for both protocols, and a checksummed reply must be
//! rejected whenever a payload byte is altered.

mod common;

use metra_core::Error;
use metra_protocol::{AsciiCodec, AtCodec, Command, Decoded, FrameCodec, Framer};
use proptest::prelude::*;

/// Verbs as the readers use them: upper-case letters, optionally `AT+` prefixed.
fn ascii_verb() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z]{2,4}").expect("Failed to create verb regex strategy")
}

fn at_verb() -> impl Strategy<Value = String> {
    prop::string::string_regex("AT\\+[A-Z]{2,6}").expect("Failed to create AT verb regex strategy")
}

/// Parameters without separators or terminators.
fn param() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9A-Za-z_.-]{1,12}")
        .expect("Failed to create parameter regex strategy")
}

/// Reply fields: printable ASCII without spaces.
fn field() -> impl Strategy<Value = String> {
    prop::string::string_regex("[!-~]{1,16}").expect("Failed to create field regex strategy")
}

proptest! {
    #[test]
    fn prop_ascii_command_roundtrip(
        verb in ascii_verb(),
        params in prop::collection::vec(param(), 0..5),
        checksum in any::<bool>(),
    ) {
        let codec = FrameCodec::Ascii(if checksum { AsciiCodec::with_checksum() } else { AsciiCodec::new() });
        let cmd = Command::new(verb).params_from(params);

        let bytes = codec.encode(&cmd).unwrap();
        prop_assert_eq!(bytes.last(), Some(&b'\r'));
        prop_assert_eq!(codec.parse_command(&bytes).unwrap(), cmd);
    }

    #[test]
    fn prop_at_command_roundtrip(
        verb in at_verb(),
        params in prop::collection::vec(param(), 0..5),
    ) {
        let codec = FrameCodec::At(AtCodec::new());
        let cmd = Command::new(verb).params_from(params);

        let bytes = codec.encode(&cmd).unwrap();
        prop_assert_eq!(codec.parse_command(&bytes).unwrap(), cmd);
    }

    #[test]
    fn prop_checksummed_reply_decodes(fields in prop::collection::vec(field(), 1..6)) {
        // Device error codes are decoded as errors, not replies
        prop_assume!(metra_core::DeviceErrorCode::from_code(&fields[0]).is_none());

        let codec = FrameCodec::Ascii(AsciiCodec::with_checksum());
        let cmd = Command::new("TST");
        let raw = format!("{}\r", common::with_crc(&fields.join(" ")));

        let reply = common::complete(&codec, &cmd, &raw);
        prop_assert_eq!(reply.fields(), fields.as_slice());
    }

    #[test]
    fn prop_corrupted_payload_is_rejected(
        fields in prop::collection::vec(field(), 1..4),
        index in any::<prop::sample::Index>(),
        replacement in b'!'..=b'~',
    ) {
        let line = common::with_crc(&fields.join(" "));
        let payload_len = line.len() - 4;
        let at = index.index(payload_len);

        let mut bytes = line.into_bytes();
        prop_assume!(bytes[at] != replacement && bytes[at] != b' ');
        bytes[at] = replacement;

        // CRC16 detects every burst error of up to 16 bits
        let raw = format!("{}\r", String::from_utf8(bytes).unwrap());
        let codec = FrameCodec::Ascii(AsciiCodec::with_checksum());
        let result = codec.decode(&Command::new("TST"), &raw);
        prop_assert!(matches!(result, Err(Error::ChecksumMismatch { .. })), "got {:?}", result);
    }

    #[test]
    fn prop_framer_chunking_is_irrelevant(
        lines in prop::collection::vec(field(), 1..8),
        split in any::<prop::sample::Index>(),
    ) {
        let stream: String = lines.iter().map(|l| format!("{l}\r")).collect();
        let at = split.index(stream.len());

        let mut framer = Framer::new();
        let mut frames = common::frames_of(&mut framer, &stream.as_bytes()[..at]);
        frames.extend(common::frames_of(&mut framer, &stream.as_bytes()[at..]));

        prop_assert_eq!(frames, lines);
        prop_assert_eq!(framer.pending_bytes(), 0);
    }

    #[test]
    fn prop_incomplete_at_reply_stays_partial(data in prop::collection::vec(field(), 0..4)) {
        prop_assume!(data.iter().all(|l| l != "OK" && !l.starts_with("ERROR")));

        let codec = FrameCodec::At(AtCodec::new());
        let cmd = Command::new("AT+INV");
        let mut raw = String::from("AT+INV\r");
        for line in &data {
            raw.push_str(&format!("+INV: {line}\r"));
        }

        prop_assert_eq!(codec.decode(&cmd, &raw).unwrap(), Decoded::Partial);
    }
}
