//! Protocol-level constants for metraTec reader communication.
//!
//! This module collects the constants shared by the framing, codec and
//! connection layers. Both wire protocols spoken by metraTec readers are
//! line oriented:
//!
//! ```text
//! ASCII (legacy):  VERB PARAM1 PARAM2[ CRC16]<CR>
//! AT-command:      AT+VERB=PARAM1,PARAM2<CR>
//! ```
//!
//! Replies are terminated by `<CR>`. Readers speaking the ASCII protocol
//! can be switched into end-of-frame mode, where every complete reply is
//! additionally terminated by `<LF>` so that multi-line replies can be told
//! apart from single lines.
//!
//! # Usage
//!
//! ```
//! use metra_core::constants::*;
//!
//! assert_eq!(CR, b'\r');
//! assert_eq!(CRC_HEX_DIGITS, 4);
//!
//! use std::time::Duration;
//! let timeout = Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS);
//! assert!(timeout.as_millis() > 0);
//! ```

// ============================================================================
// Framing
// ============================================================================

/// Carriage return, terminates every command and every reply line.
pub const CR: u8 = b'\r';

/// Line feed, terminates a complete reply when end-of-frame mode is active.
pub const LF: u8 = b'\n';

/// Separator between verb and parameters in the ASCII protocol.
pub const ASCII_SEPARATOR: char = ' ';

/// First field of the line that closes an ASCII inventory block.
pub const ASCII_INVENTORY_FOOTER: &str = "IVF";

/// Separator between verb and first parameter in the AT protocol.
pub const AT_ASSIGN: char = '=';

/// Separator between parameters (and reply fields) in the AT protocol.
pub const AT_FIELD_SEPARATOR: char = ',';

/// Maximum number of bytes buffered for a single frame.
///
/// A reader that never sends a terminator would otherwise make the
/// framing buffer grow without bound.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

// ============================================================================
// Checksum
// ============================================================================

/// CRC16 polynomial in reflected form (CCITT 0x1021 bit-reversed).
pub const CRC_POLYNOMIAL: u16 = 0x8408;

/// CRC16 initial register value.
pub const CRC_INITIAL: u16 = 0xFFFF;

/// Number of hex digits used to transmit a CRC16.
pub const CRC_HEX_DIGITS: usize = 4;

// ============================================================================
// AT protocol reply markers
// ============================================================================

/// Terminal line of a successful AT reply.
pub const AT_OK: &str = "OK";

/// Terminal line of a failed AT reply.
pub const AT_ERROR: &str = "ERROR";

// ============================================================================
// Timing
// ============================================================================

/// Default time a caller waits for a command reply (milliseconds).
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 2_000;

/// Default time the transport waits for a single byte before reporting
/// an idle poll (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default connect timeout for network transports (milliseconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;

/// Default first reconnect delay (milliseconds).
pub const DEFAULT_MIN_RECONNECT_WAIT_MS: u64 = 1_000;

/// Default upper bound for the reconnect delay (milliseconds).
pub const DEFAULT_MAX_RECONNECT_WAIT_MS: u64 = 30_000;

/// A connection is considered dead when nothing was received for this many
/// heartbeat intervals.
pub const HEARTBEAT_TIMEOUT_FACTOR: u32 = 3;

/// Default keep-time for tags that are no longer observed (milliseconds).
pub const DEFAULT_KEEP_TIME_MS: u64 = 1_000;

/// Default interval of the stale-tag sweep (milliseconds).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 100;

/// Default sampling interval of the input debouncer (milliseconds).
pub const DEFAULT_DEBOUNCE_INTERVAL_MS: u64 = 10;

/// Default window an input must stay stable before it is reported (milliseconds).
pub const DEFAULT_DEBOUNCE_STABLE_MS: u64 = 50;

// ============================================================================
// Queues
// ============================================================================

/// Default capacity of the event dispatcher queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the request channel feeding the connection worker.
pub const WORKER_REQUEST_CAPACITY: usize = 32;
