pub mod codec;
pub mod command;
pub mod crc;
pub mod frame;
pub mod framer;
pub mod reply;

pub use codec::{AsciiCodec, AtCodec, Decoded, FrameCodec};
pub use command::Command;
pub use crc::{crc16, crc16_hex};
pub use frame::Frame;
pub use framer::{Framer, FramingMode};
pub use reply::Reply;
