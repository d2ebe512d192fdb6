//! CRC16 used by the ASCII protocol.
//!
//! The checksum is the reflected CCITT variant (polynomial `0x8408`,
//! initial value `0xFFFF`, no final XOR), also known as CRC-16/MCRF4XX.
//! It is transmitted as four upper-case hex digits.

use metra_core::constants::{CRC_INITIAL, CRC_POLYNOMIAL};

/// Compute the CRC16 of `data`.
///
/// # Example
///
/// ```
/// use metra_protocol::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0x6F91);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INITIAL, |crc, &byte| {
        let mut crc = crc ^ u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC_POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        crc
    })
}

/// CRC16 of `data` formatted for the wire.
///
/// ```
/// use metra_protocol::crc16_hex;
///
/// assert_eq!(crc16_hex(b"123456789"), "6F91");
/// ```
pub fn crc16_hex(data: &[u8]) -> String {
    format!("{:04X}", crc16(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x6F91);
    }

    #[test]
    fn test_empty_input_is_initial_value() {
        assert_eq!(crc16(b""), CRC_INITIAL);
    }

    #[test]
    fn test_hex_is_zero_padded() {
        let hex = crc16_hex(b"");
        assert_eq!(hex.len(), 4);
        assert_eq!(hex, "FFFF");
    }

    #[test]
    fn test_single_bit_flip_changes_crc() {
        let original = crc16(b"INV ");
        let flipped = crc16(b"INW ");
        assert_ne!(original, flipped);
    }
}
