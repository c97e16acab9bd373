//! Variable-width integer encoding.
//!
//! Unsigned varuints are base-128 big-endian: seven payload bits per
//! byte, most-significant group first, and the **final** byte carries
//! bit 7 set. This is the wire form used for length tails, struct field
//! labels, and symbol ids:
//!
//! | Value range      | Encoded bytes        |
//! |------------------|----------------------|
//! | `[0, 2^7)`       | `1vvvvvvv`           |
//! | `[2^7, 2^14)`    | `0vvvvvvv 1vvvvvvv`  |
//! | ...              | up to 10 bytes       |
//!
//! Signed varints (timestamp offsets) use the same shape except that
//! bit 6 of the first byte is the sign.

use sift_error::{Result, SiftError};

/// Maximum number of bytes a varuint may span.
///
/// A u64 needs at most ten 7-bit groups; anything longer is corrupt.
pub const MAX_VARUINT_BYTES: usize = 10;

/// Read a varuint, returning `(value, bytes_consumed)`.
///
/// # Errors
///
/// Returns [`SiftError::TruncatedVarUint`] when no terminating byte is
/// found within the buffer, and [`SiftError::Corrupt`] when the
/// encoding spans more than [`MAX_VARUINT_BYTES`].
pub fn read_varuint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARUINT_BYTES {
            return Err(SiftError::Corrupt {
                detail: "varuint longer than 10 bytes",
            });
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 != 0 {
            return Ok((value, i + 1));
        }
    }
    Err(SiftError::TruncatedVarUint { offset: buf.len() })
}

/// Read a signed varint, returning `(value, bytes_consumed)`.
///
/// Bit 6 of the first byte is the sign; the remaining bits follow the
/// varuint scheme.
///
/// # Errors
///
/// Same failure modes as [`read_varuint`].
pub fn read_varint(buf: &[u8]) -> Result<(i64, usize)> {
    let first = *buf.first().ok_or(SiftError::TruncatedVarUint { offset: 0 })?;
    let negative = first & 0x40 != 0;
    let mut value = u64::from(first & 0x3F);
    if first & 0x80 != 0 {
        let v = value as i64;
        return Ok((if negative { -v } else { v }, 1));
    }
    for (i, &byte) in buf.iter().enumerate().skip(1) {
        if i >= MAX_VARUINT_BYTES {
            return Err(SiftError::Corrupt {
                detail: "varint longer than 10 bytes",
            });
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 != 0 {
            let v = value as i64;
            return Ok((if negative { -v } else { v }, i + 1));
        }
    }
    Err(SiftError::TruncatedVarUint { offset: buf.len() })
}

/// Number of bytes needed to encode `value` as a varuint.
#[must_use]
pub const fn varuint_len(value: u64) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x001F_FFFF => 3,
        0x0020_0000..=0x0FFF_FFFF => 4,
        0x1000_0000..=0x07_FFFF_FFFF => 5,
        0x08_0000_0000..=0x03FF_FFFF_FFFF => 6,
        0x0400_0000_0000..=0x01_FFFF_FFFF_FFFF => 7,
        0x02_0000_0000_0000..=0xFF_FFFF_FFFF_FFFF => 8,
        0x0100_0000_0000_0000..=0x7FFF_FFFF_FFFF_FFFF => 9,
        _ => 10,
    }
}

/// Append a varuint to `dst`, returning the number of bytes written.
pub fn write_varuint(dst: &mut Vec<u8>, value: u64) -> usize {
    let len = varuint_len(value);
    for i in (0..len).rev() {
        let mut byte = ((value >> (7 * i)) & 0x7F) as u8;
        if i == 0 {
            byte |= 0x80;
        }
        dst.push(byte);
    }
    len
}

/// Append a signed varint to `dst`, returning the number of bytes written.
pub fn write_varint(dst: &mut Vec<u8>, value: i64) -> usize {
    let negative = value < 0;
    let magnitude = value.unsigned_abs();
    // Six payload bits fit in the first byte alongside the sign.
    let mut groups = 1;
    loop {
        let payload_bits = 6 + 7 * (groups - 1);
        if payload_bits >= 64 || magnitude >> payload_bits == 0 {
            break;
        }
        groups += 1;
    }
    for i in (0..groups).rev() {
        let shift = 7 * i;
        let mut byte = ((magnitude >> shift) & 0x7F) as u8;
        if i == groups - 1 {
            byte = ((magnitude >> shift) & 0x3F) as u8;
            if negative {
                byte |= 0x40;
            }
        }
        if i == 0 {
            byte |= 0x80;
        }
        dst.push(byte);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varuint_roundtrip_boundaries() {
        let cases: &[u64] = &[
            0,
            1,
            0x7F,
            0x80,
            0x3FFF,
            0x4000,
            0x001F_FFFF,
            0x0020_0000,
            0x0FFF_FFFF,
            0x1000_0000,
            u64::from(u32::MAX),
            u64::MAX / 2,
            u64::MAX,
        ];
        for &value in cases {
            let mut buf = Vec::new();
            let written = write_varuint(&mut buf, value);
            assert_eq!(written, varuint_len(value), "length mismatch for {value}");
            let (decoded, consumed) = read_varuint(&buf).unwrap();
            assert_eq!(decoded, value, "roundtrip failed for {value}");
            assert_eq!(consumed, written);
        }
    }

    #[test]
    fn varuint_golden_vectors() {
        // Final byte carries the stop bit; high groups carry clear bit 7.
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x80]),
            (1, &[0x81]),
            (127, &[0xFF]),
            (128, &[0x01, 0x80]),
            (300, &[0x02, 0xAC]),
            (16383, &[0x7F, 0xFF]),
            (16384, &[0x01, 0x00, 0x80]),
        ];
        for &(value, expected) in cases {
            let mut buf = Vec::new();
            write_varuint(&mut buf, value);
            assert_eq!(&buf, expected, "bad encoding for {value}");
            let (decoded, consumed) = read_varuint(expected).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, expected.len());
        }
    }

    #[test]
    fn varuint_truncated() {
        assert!(read_varuint(&[]).is_err());
        // Continuation bytes with no terminator.
        assert!(read_varuint(&[0x01]).is_err());
        assert!(read_varuint(&[0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn varuint_too_long() {
        let buf = [0x01u8; 16];
        assert!(matches!(
            read_varuint(&buf),
            Err(sift_error::SiftError::Corrupt { .. })
        ));
    }

    #[test]
    fn varuint_stops_at_terminator() {
        // Trailing bytes must not be consumed.
        let buf = [0x81, 0xCC, 0xCC];
        let (value, consumed) = read_varuint(&buf).unwrap();
        assert_eq!(value, 1);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn varint_signs() {
        for value in [0i64, 1, -1, 63, -63, 64, -64, 8191, -8192, 1 << 40, -(1 << 40)] {
            let mut buf = Vec::new();
            let written = write_varint(&mut buf, value);
            let (decoded, consumed) = read_varint(&buf).unwrap();
            assert_eq!(decoded, value, "roundtrip failed for {value}");
            assert_eq!(consumed, written);
        }
    }

    #[test]
    fn varint_single_byte_forms() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0);
        assert_eq!(buf, [0x80]);

        buf.clear();
        write_varint(&mut buf, -5);
        assert_eq!(buf, [0xC5]);

        buf.clear();
        write_varint(&mut buf, 63);
        assert_eq!(buf, [0xBF]);
    }
}
