//! # Internal utilities
//!
//! VISCA spreads multi-nibble values over consecutive bytes, one nibble in the
//! low half of each byte (`0p 0q 0r 0s`).

/// Splits `value` into 4 bytes, most significant nibble first.
pub const fn split_nibbles_u16(value: u16) -> [u8; 4] {
    [
        ((value >> 12) & 0xf) as u8,
        ((value >> 8) & 0xf) as u8,
        ((value >> 4) & 0xf) as u8,
        (value & 0xf) as u8,
    ]
}

/// Splits `value` into 2 bytes, most significant nibble first.
pub const fn split_nibbles_u8(value: u8) -> [u8; 2] {
    [(value >> 4) & 0xf, value & 0xf]
}

/// Joins the low nibbles of `b` into an integer, most significant first.
///
/// High nibbles are ignored.
pub fn join_nibbles(b: &[u8]) -> u16 {
    b.iter().fold(0, |acc, v| (acc << 4) | u16::from(v & 0xf))
}
