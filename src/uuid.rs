//! UUID v4 generation.
//!
//! Provides a minimal UUID v4 implementation for key aliases.

use rand::RngCore as _;
use rand::rngs::OsRng;

const HEX: [u8; 16] = *b"0123456789abcdef";

/// Generates a random UUID v4 as a lowercase hyphenated string.
#[must_use]
pub(crate) fn uuid_v4() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);

    // Set version (4) and variant (RFC 4122)
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    // UUID string is always 36 bytes: 8-4-4-4-12 hex digits + 4 hyphens
    let mut s = String::with_capacity(36);
    for (i, &b) in bytes.iter().enumerate() {
        s.push(char::from(HEX[(b >> 4) as usize]));
        s.push(char::from(HEX[(b & 0x0F) as usize]));
        if matches!(i, 3 | 5 | 7 | 9) {
            s.push('-');
        }
    }
    s
}
