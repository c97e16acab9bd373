//! TLV header inspection.
//!
//! Every encoded value starts with one byte packing a 4-bit type code
//! (high nibble) and a 4-bit length code (low nibble). Length codes
//! 0–13 give the body length directly, 14 means the length follows as a
//! varuint, and 15 marks a typed null. Booleans are the exception: the
//! length code carries the value and there is never a body.

use sift_error::{Result, SiftError};

use crate::varint::read_varuint;

/// Binary version marker: resets the symbol table when scanned.
pub const BVM: [u8; 4] = [0xE0, 0x01, 0x00, 0xEA];

/// Length-code nibble meaning "length follows as a varuint".
pub const LEN_VARUINT: u8 = 14;
/// Length-code nibble meaning "null of this type".
pub const LEN_NULL: u8 = 15;

/// The sixteen value type codes, in tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Type {
    Null = 0x0,
    Bool = 0x1,
    Uint = 0x2,
    NegInt = 0x3,
    Float = 0x4,
    Decimal = 0x5,
    Timestamp = 0x6,
    Symbol = 0x7,
    String = 0x8,
    Clob = 0x9,
    Blob = 0xA,
    List = 0xB,
    Sexp = 0xC,
    Struct = 0xD,
    Annotation = 0xE,
    Reserved = 0xF,
}

impl Type {
    /// Decode a type from the high nibble of a TLV byte.
    #[must_use]
    pub const fn from_tlv(tlv: u8) -> Self {
        match tlv >> 4 {
            0x0 => Self::Null,
            0x1 => Self::Bool,
            0x2 => Self::Uint,
            0x3 => Self::NegInt,
            0x4 => Self::Float,
            0x5 => Self::Decimal,
            0x6 => Self::Timestamp,
            0x7 => Self::Symbol,
            0x8 => Self::String,
            0x9 => Self::Clob,
            0xA => Self::Blob,
            0xB => Self::List,
            0xC => Self::Sexp,
            0xD => Self::Struct,
            0xE => Self::Annotation,
            _ => Self::Reserved,
        }
    }

    /// Display name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Uint => "int",
            Self::NegInt => "negative int",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Timestamp => "timestamp",
            Self::Symbol => "symbol",
            Self::String => "string",
            Self::Clob => "clob",
            Self::Blob => "blob",
            Self::List => "list",
            Self::Sexp => "sexp",
            Self::Struct => "struct",
            Self::Annotation => "annotation",
            Self::Reserved => "reserved",
        }
    }

    /// Whether values of this type contain further encoded values.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::List | Self::Sexp | Self::Struct | Self::Annotation)
    }
}

/// Type code of the value starting at `buf[0]`.
///
/// Returns [`Type::Null`] for an empty buffer; callers that care about
/// framing should use [`size_of`] which rejects empties.
#[must_use]
pub fn type_of(buf: &[u8]) -> Type {
    match buf.first() {
        Some(&b) => Type::from_tlv(b),
        None => Type::Null,
    }
}

/// Whether `buf` starts with a binary version marker.
#[must_use]
pub fn is_bvm(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf[..4] == BVM
}

/// Total span of the value at `buf[0]` (header plus body), in bytes.
///
/// # Errors
///
/// Fails on an empty buffer, a truncated length varuint, or a span that
/// exceeds the buffer.
pub fn size_of(buf: &[u8]) -> Result<usize> {
    let &tlv = buf.first().ok_or(SiftError::Corrupt {
        detail: "empty buffer has no value",
    })?;
    let lencode = tlv & 0x0F;
    // Bool carries its value in the length code; never a body.
    if Type::from_tlv(tlv) == Type::Bool {
        return Ok(1);
    }
    let size = match lencode {
        LEN_NULL => 1,
        LEN_VARUINT => {
            let (body, consumed) = read_varuint(&buf[1..])?;
            let body = usize::try_from(body).map_err(|_| SiftError::Corrupt {
                detail: "value length overflows usize",
            })?;
            1 + consumed + body
        }
        n => 1 + n as usize,
    };
    if size > buf.len() {
        return Err(SiftError::ValueOverrun {
            size,
            remaining: buf.len(),
        });
    }
    Ok(size)
}

/// Header size of the value at `buf[0]`: 1 byte plus the length varuint
/// when the length code is [`LEN_VARUINT`].
///
/// # Errors
///
/// Fails on an empty buffer or a truncated length varuint.
pub fn header_size_of(buf: &[u8]) -> Result<usize> {
    let &tlv = buf.first().ok_or(SiftError::Corrupt {
        detail: "empty buffer has no value",
    })?;
    if tlv & 0x0F == LEN_VARUINT && Type::from_tlv(tlv) != Type::Bool {
        let (_, consumed) = read_varuint(&buf[1..])?;
        Ok(1 + consumed)
    } else {
        Ok(1)
    }
}

/// Body span of the value at `buf[0]`, with the remainder of the buffer.
///
/// # Errors
///
/// Fails with the same framing errors as [`size_of`].
pub fn contents(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    let size = size_of(buf)?;
    let header = header_size_of(buf)?;
    Ok((&buf[header..size], &buf[size..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_cover_all_nibbles() {
        for tag in 0u8..16 {
            let ty = Type::from_tlv(tag << 4);
            assert_eq!(ty as u8, tag);
            assert!(!ty.name().is_empty());
        }
    }

    #[test]
    fn size_of_short_forms() {
        // 0x21 = one-byte positive int
        assert_eq!(size_of(&[0x21, 0x05]).unwrap(), 2);
        // 0x0F = null
        assert_eq!(size_of(&[0x0F]).unwrap(), 1);
        // bools never have a body regardless of length code
        assert_eq!(size_of(&[0x10]).unwrap(), 1);
        assert_eq!(size_of(&[0x11]).unwrap(), 1);
        assert_eq!(size_of(&[0x1F]).unwrap(), 1);
    }

    #[test]
    fn size_of_varuint_length() {
        // string of 20 bytes: 0x8E, varuint(20), body
        let mut buf = vec![0x8E, 0x94];
        buf.extend(std::iter::repeat(b'x').take(20));
        assert_eq!(size_of(&buf).unwrap(), 22);
        assert_eq!(header_size_of(&buf).unwrap(), 2);
        let (body, rest) = contents(&buf).unwrap();
        assert_eq!(body.len(), 20);
        assert!(rest.is_empty());
    }

    #[test]
    fn size_of_rejects_overrun() {
        // declared body of 5 bytes, only 2 present
        let buf = [0x85, b'a', b'b'];
        assert!(matches!(
            size_of(&buf),
            Err(SiftError::ValueOverrun { size: 6, remaining: 3 })
        ));
    }

    #[test]
    fn size_of_rejects_truncated_varuint() {
        // length code 14 but no terminating varuint byte
        let buf = [0x8E, 0x01];
        assert!(size_of(&buf).is_err());
    }

    #[test]
    fn bvm_detection() {
        assert!(is_bvm(&[0xE0, 0x01, 0x00, 0xEA, 0x0F]));
        assert!(!is_bvm(&[0xE0, 0x01, 0x00]));
        assert!(!is_bvm(&[0xE1, 0x01, 0x00, 0xEA]));
    }
}
