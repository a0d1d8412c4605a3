//! CRC-16/XMODEM checksum used by MeCom frames.
//!
//! Polynomial 0x1021, initial value 0, no reflection, no final XOR. The sum
//! covers every byte of a frame before the checksum field, including the
//! leading `#` or `!`. On the wire it is always four uppercase hex digits.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hex digits the checksum occupies on the wire.
pub const CHECKSUM_WIDTH: usize = 4;

/// CRC-16/XMODEM engine; its lookup table is built at compile time.
pub const CRC16_XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the CRC-16/XMODEM of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    CRC16_XMODEM.checksum(data)
}

/// Render a checksum as the 4-digit uppercase wire field.
pub fn checksum_hex(crc: u16) -> String {
    format!("{:04X}", crc)
}

/// Parse a 4-digit checksum field. Hex digits are compared
/// case-insensitively.
pub fn parse_checksum(field: &str) -> Option<u16> {
    if field.len() != CHECKSUM_WIDTH || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(field, 16).ok()
}
