//! Zero-copy typed readers.
//!
//! Each `read_*` function checks the type tag of the value at the head
//! of the buffer, decodes the body without copying, and returns the
//! decoded value together with the remainder of the buffer.

use sift_error::{Result, SiftError};

use crate::symtab::SymbolId;
use crate::timestamp::{self, DateTime};
use crate::tlv::{self, Type};
use crate::varint::read_varuint;

fn expect(buf: &[u8], want: Type) -> Result<()> {
    let found = tlv::type_of(buf);
    if found == want {
        Ok(())
    } else {
        Err(SiftError::TypeMismatch {
            wanted: want.name(),
            found: found.name(),
        })
    }
}

/// Big-endian magnitude of an integer body.
fn magnitude(body: &[u8]) -> Result<u64> {
    if body.len() > 8 {
        return Err(SiftError::Corrupt {
            detail: "integer magnitude wider than 8 bytes",
        });
    }
    let mut value: u64 = 0;
    for &b in body {
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

/// Read a bool. Length code 0 is false, 1 is true.
///
/// # Errors
///
/// Fails on a non-bool tag or a null bool.
pub fn read_bool(buf: &[u8]) -> Result<(bool, &[u8])> {
    expect(buf, Type::Bool)?;
    match buf[0] & 0x0F {
        0 => Ok((false, &buf[1..])),
        1 => Ok((true, &buf[1..])),
        _ => Err(SiftError::Corrupt {
            detail: "bool with invalid length code",
        }),
    }
}

/// Read an unsigned integer.
pub fn read_uint(buf: &[u8]) -> Result<(u64, &[u8])> {
    expect(buf, Type::Uint)?;
    let (body, rest) = tlv::contents(buf)?;
    Ok((magnitude(body)?, rest))
}

/// Read a signed integer from either integer type.
///
/// # Errors
///
/// Fails when the magnitude does not fit `i64`, or on the forbidden
/// negative-zero encoding.
pub fn read_int(buf: &[u8]) -> Result<(i64, &[u8])> {
    let ty = tlv::type_of(buf);
    let (body, rest) = tlv::contents(buf)?;
    let mag = magnitude(body)?;
    match ty {
        Type::Uint => {
            let v = i64::try_from(mag).map_err(|_| SiftError::Corrupt {
                detail: "integer magnitude overflows i64",
            })?;
            Ok((v, rest))
        }
        Type::NegInt => {
            if mag == 0 {
                return Err(SiftError::Corrupt {
                    detail: "negative zero is forbidden",
                });
            }
            if mag > (i64::MAX as u64) + 1 {
                return Err(SiftError::Corrupt {
                    detail: "integer magnitude overflows i64",
                });
            }
            Ok(((mag as i64).wrapping_neg(), rest))
        }
        other => Err(SiftError::TypeMismatch {
            wanted: "int",
            found: other.name(),
        }),
    }
}

/// Read a float. Bodies of 0, 4, and 8 bytes are accepted.
pub fn read_float(buf: &[u8]) -> Result<(f64, &[u8])> {
    expect(buf, Type::Float)?;
    let (body, rest) = tlv::contents(buf)?;
    let value = match body.len() {
        0 => 0.0,
        4 => f64::from(f32::from_be_bytes([body[0], body[1], body[2], body[3]])),
        8 => f64::from_be_bytes(body.try_into().expect("checked length")),
        _ => {
            return Err(SiftError::Corrupt {
                detail: "float body must be 0, 4, or 8 bytes",
            })
        }
    };
    Ok((value, rest))
}

/// Read a symbol reference.
pub fn read_symbol(buf: &[u8]) -> Result<(SymbolId, &[u8])> {
    expect(buf, Type::Symbol)?;
    let (body, rest) = tlv::contents(buf)?;
    let mag = magnitude(body)?;
    let sym = SymbolId::try_from(mag).map_err(|_| SiftError::Corrupt {
        detail: "symbol id overflows u32",
    })?;
    Ok((sym, rest))
}

/// Read a struct field label (a bare varuint symbol id).
pub fn read_label(buf: &[u8]) -> Result<(SymbolId, &[u8])> {
    let (value, consumed) = read_varuint(buf)?;
    let sym = SymbolId::try_from(value).map_err(|_| SiftError::Corrupt {
        detail: "field label overflows u32",
    })?;
    Ok((sym, &buf[consumed..]))
}

/// Read a string body without copying or validating UTF-8.
pub fn read_string_shared(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    expect(buf, Type::String)?;
    tlv::contents(buf)
}

/// Read a string body, validating UTF-8.
pub fn read_string(buf: &[u8]) -> Result<(&str, &[u8])> {
    let (body, rest) = read_string_shared(buf)?;
    let s = std::str::from_utf8(body).map_err(|_| SiftError::Corrupt {
        detail: "string body is not valid UTF-8",
    })?;
    Ok((s, rest))
}

/// Read a blob or clob body without copying.
///
/// Clobs decode identically to blobs; the tag is preserved in the raw
/// span for re-emission.
pub fn read_blob_shared(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    match tlv::type_of(buf) {
        Type::Blob | Type::Clob => tlv::contents(buf),
        other => Err(SiftError::TypeMismatch {
            wanted: "blob",
            found: other.name(),
        }),
    }
}

/// Read an annotation wrapper: the first annotation symbol, the wrapped
/// value span, and the remainder after the whole annotation.
pub fn read_annotation(buf: &[u8]) -> Result<(SymbolId, &[u8], &[u8])> {
    expect(buf, Type::Annotation)?;
    let (body, rest) = tlv::contents(buf)?;
    let (annot_len, n) = read_varuint(body)?;
    let annot_len = annot_len as usize;
    if n + annot_len > body.len() {
        return Err(SiftError::Corrupt {
            detail: "annotation symbols exceed body",
        });
    }
    let (sym, _) = read_label(&body[n..n + annot_len])?;
    let value = &body[n + annot_len..];
    Ok((sym, value, rest))
}

/// Read a timestamp, normalised to UTC.
pub fn read_time(buf: &[u8]) -> Result<(DateTime, &[u8])> {
    expect(buf, Type::Timestamp)?;
    let (body, rest) = tlv::contents(buf)?;
    Ok((timestamp::decode_body(body)?, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn int_signs() {
        // 0x21 0x2A = +42, 0x31 0x2A = -42
        assert_eq!(read_int(&[0x21, 0x2A]).unwrap().0, 42);
        assert_eq!(read_int(&[0x31, 0x2A]).unwrap().0, -42);
        // 0x20 = zero with empty body
        assert_eq!(read_int(&[0x20]).unwrap().0, 0);
    }

    #[test]
    fn negative_zero_is_rejected() {
        assert!(read_int(&[0x30]).is_err());
    }

    #[test]
    fn int_magnitude_limits() {
        let mut buf = Buffer::new();
        buf.write_int(i64::MIN);
        assert_eq!(read_int(buf.bytes()).unwrap().0, i64::MIN);

        let mut buf = Buffer::new();
        buf.write_uint(u64::MAX);
        assert!(read_int(buf.bytes()).is_err());
        assert_eq!(read_uint(buf.bytes()).unwrap().0, u64::MAX);
    }

    #[test]
    fn float_widths() {
        assert_eq!(read_float(&[0x40]).unwrap().0, 0.0);
        let mut four = vec![0x44];
        four.extend_from_slice(&2.5f32.to_be_bytes());
        assert_eq!(read_float(&four).unwrap().0, 2.5);
        let mut eight = vec![0x48];
        eight.extend_from_slice(&(-1.25f64).to_be_bytes());
        assert_eq!(read_float(&eight).unwrap().0, -1.25);
        assert!(read_float(&[0x42, 0, 0]).is_err());
    }

    #[test]
    fn bool_values() {
        assert_eq!(read_bool(&[0x10]).unwrap().0, false);
        assert_eq!(read_bool(&[0x11]).unwrap().0, true);
        assert!(read_bool(&[0x1F]).is_err());
        assert!(read_bool(&[0x21, 0x01]).is_err());
    }

    #[test]
    fn type_mismatch_is_reported() {
        let err = read_float(&[0x21, 0x05]).unwrap_err();
        assert!(err.to_string().contains("wanted float"));
    }

    #[test]
    fn string_reads() {
        let buf = [0x83, b'a', b'b', b'c', 0x0F];
        let (s, rest) = read_string(&buf).unwrap();
        assert_eq!(s, "abc");
        assert_eq!(rest, &[0x0F]);
    }

    #[test]
    fn labels_are_varuints() {
        let (sym, rest) = read_label(&[0x8A, 0x21, 0x01]).unwrap();
        assert_eq!(sym, 10);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn annotation_unwraps() {
        let mut buf = Buffer::new();
        buf.begin_annotation(3);
        buf.write_int(7);
        buf.end_annotation();
        let (sym, value, rest) = read_annotation(buf.bytes()).unwrap();
        assert_eq!(sym, 3);
        assert_eq!(read_int(value).unwrap().0, 7);
        assert!(rest.is_empty());
    }
}
