//! Growable encode buffer.
//!
//! The writer counterpart of the zero-copy readers: append-only, with
//! container framing done by splicing the TLV header in front of the
//! body once its true length is known (`begin_struct` / `end_struct`
//! and friends).

use crate::symtab::SymbolId;
use crate::timestamp::{self, DateTime};
use crate::tlv::{Type, BVM, LEN_NULL, LEN_VARUINT};
use crate::varint::{varuint_len, write_varuint};

/// Number of header bytes a value with `body_len` body bytes needs.
#[must_use]
pub const fn tlv_header_len(body_len: usize) -> usize {
    if body_len < 14 {
        1
    } else {
        1 + varuint_len(body_len as u64)
    }
}

/// Encode a TLV header into the front of `dst`, returning its size.
///
/// `dst` must have room for [`tlv_header_len`] bytes.
pub fn encode_tlv_into(dst: &mut [u8], ty: Type, body_len: usize) -> usize {
    let tag = (ty as u8) << 4;
    if body_len < 14 {
        dst[0] = tag | body_len as u8;
        return 1;
    }
    dst[0] = tag | LEN_VARUINT;
    let len = varuint_len(body_len as u64);
    for i in 0..len {
        let shift = 7 * (len - 1 - i);
        let mut byte = ((body_len as u64 >> shift) & 0x7F) as u8;
        if shift == 0 {
            byte |= 0x80;
        }
        dst[1 + i] = byte;
    }
    1 + len
}

fn push_tlv(buf: &mut Vec<u8>, ty: Type, body_len: usize) {
    let mut header = [0u8; 11];
    let n = encode_tlv_into(&mut header, ty, body_len);
    buf.extend_from_slice(&header[..n]);
}

/// Append-only encode buffer.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    buf: Vec<u8>,
    // (body start offset, container type) for open containers.
    open: Vec<(usize, Type)>,
}

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        debug_assert!(self.open.is_empty(), "unclosed container");
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        debug_assert!(self.open.is_empty(), "unclosed container");
        self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.open.clear();
    }

    /// Append pre-encoded bytes verbatim.
    pub fn write_raw(&mut self, raw: &[u8]) {
        self.buf.extend_from_slice(raw);
    }

    /// Append the binary version marker.
    pub fn write_bvm(&mut self) {
        self.buf.extend_from_slice(&BVM);
    }

    pub fn write_null(&mut self) {
        self.buf.push((Type::Null as u8) << 4 | LEN_NULL);
    }

    /// Typed null of any type.
    pub fn write_typed_null(&mut self, ty: Type) {
        self.buf.push((ty as u8) << 4 | LEN_NULL);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push((Type::Bool as u8) << 4 | u8::from(value));
    }

    pub fn write_uint(&mut self, value: u64) {
        let bytes = value.to_be_bytes();
        let skip = (value.leading_zeros() / 8) as usize;
        push_tlv(&mut self.buf, Type::Uint, 8 - skip);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    /// Sign lives in the type code; magnitude is big-endian.
    pub fn write_int(&mut self, value: i64) {
        if value >= 0 {
            self.write_uint(value as u64);
            return;
        }
        let magnitude = value.unsigned_abs();
        let bytes = magnitude.to_be_bytes();
        let skip = (magnitude.leading_zeros() / 8) as usize;
        push_tlv(&mut self.buf, Type::NegInt, 8 - skip);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    /// Fixed 9-byte float encoding. Boxing opcodes rely on this form
    /// having a constant stride.
    pub fn write_f64(&mut self, value: f64) {
        push_tlv(&mut self.buf, Type::Float, 8);
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Shortest lossless float encoding: zero body for +0.0, four bytes
    /// when f32 round-trips, eight otherwise.
    pub fn write_canonical_float(&mut self, value: f64) {
        if value == 0.0 && value.is_sign_positive() {
            push_tlv(&mut self.buf, Type::Float, 0);
        } else if f64::from(value as f32).to_bits() == value.to_bits() {
            push_tlv(&mut self.buf, Type::Float, 4);
            self.buf.extend_from_slice(&(value as f32).to_be_bytes());
        } else {
            self.write_f64(value);
        }
    }

    pub fn write_string(&mut self, s: &str) {
        push_tlv(&mut self.buf, Type::String, s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_blob(&mut self, b: &[u8]) {
        push_tlv(&mut self.buf, Type::Blob, b.len());
        self.buf.extend_from_slice(b);
    }

    pub fn write_symbol(&mut self, sym: SymbolId) {
        let bytes = sym.to_be_bytes();
        let skip = (sym.leading_zeros() / 8) as usize;
        push_tlv(&mut self.buf, Type::Symbol, 4 - skip);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    pub fn write_timestamp(&mut self, dt: &DateTime) {
        let mut body = Vec::with_capacity(16);
        timestamp::encode_body(&mut body, dt);
        push_tlv(&mut self.buf, Type::Timestamp, body.len());
        self.buf.extend_from_slice(&body);
    }

    /// Struct field label; must be followed by exactly one value.
    pub fn begin_field(&mut self, sym: SymbolId) {
        write_varuint(&mut self.buf, u64::from(sym));
    }

    pub fn begin_struct(&mut self) {
        self.open.push((self.buf.len(), Type::Struct));
    }

    pub fn end_struct(&mut self) {
        self.close(Type::Struct);
    }

    pub fn begin_list(&mut self) {
        self.open.push((self.buf.len(), Type::List));
    }

    pub fn end_list(&mut self) {
        self.close(Type::List);
    }

    /// Open an annotation wrapper with a single annotation symbol; the
    /// caller writes the wrapped value, then calls `end_annotation`.
    pub fn begin_annotation(&mut self, sym: SymbolId) {
        self.open.push((self.buf.len(), Type::Annotation));
        let sym_len = varuint_len(u64::from(sym));
        write_varuint(&mut self.buf, sym_len as u64);
        write_varuint(&mut self.buf, u64::from(sym));
    }

    pub fn end_annotation(&mut self) {
        self.close(Type::Annotation);
    }

    fn close(&mut self, want: Type) {
        let (start, ty) = self.open.pop().expect("close without open container");
        assert_eq!(ty, want, "mismatched container close");
        let body_len = self.buf.len() - start;
        let mut header = [0u8; 11];
        let n = encode_tlv_into(&mut header, ty, body_len);
        self.buf.splice(start..start, header[..n].iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read_int, read_string, read_symbol, read_time, read_uint};
    use crate::tlv::{contents, size_of, type_of};

    #[test]
    fn scalar_encodings() {
        let mut buf = Buffer::new();
        buf.write_int(42);
        assert_eq!(buf.bytes(), &[0x21, 0x2A]);

        let mut buf = Buffer::new();
        buf.write_int(-42);
        assert_eq!(buf.bytes(), &[0x31, 0x2A]);

        let mut buf = Buffer::new();
        buf.write_int(0);
        assert_eq!(buf.bytes(), &[0x20]);

        let mut buf = Buffer::new();
        buf.write_bool(true);
        assert_eq!(buf.bytes(), &[0x11]);

        let mut buf = Buffer::new();
        buf.write_null();
        assert_eq!(buf.bytes(), &[0x0F]);
    }

    #[test]
    fn f64_is_nine_bytes() {
        let mut buf = Buffer::new();
        buf.write_f64(3.5);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf.bytes()[0], 0x48);
    }

    #[test]
    fn canonical_float_widths() {
        let mut buf = Buffer::new();
        buf.write_canonical_float(0.0);
        assert_eq!(buf.bytes(), &[0x40]);

        let mut buf = Buffer::new();
        buf.write_canonical_float(2.5);
        assert_eq!(buf.len(), 5);

        let mut buf = Buffer::new();
        buf.write_canonical_float(0.1);
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn struct_framing_roundtrip() {
        let mut st = crate::symtab::SymbolTable::new();
        let a = st.intern("a");
        let b = st.intern("b");
        let mut buf = Buffer::new();
        buf.begin_struct();
        buf.begin_field(a);
        buf.write_int(1);
        buf.begin_field(b);
        buf.write_int(2);
        buf.end_struct();

        let bytes = buf.bytes();
        assert_eq!(type_of(bytes), Type::Struct);
        assert_eq!(size_of(bytes).unwrap(), bytes.len());
        let (mut body, _) = contents(bytes).unwrap();
        let (label, rest) = crate::reader::read_label(body).unwrap();
        assert_eq!(label, a);
        let (v, rest) = read_int(rest).unwrap();
        assert_eq!(v, 1);
        body = rest;
        let (label, rest) = crate::reader::read_label(body).unwrap();
        assert_eq!(label, b);
        assert_eq!(read_int(rest).unwrap().0, 2);
    }

    #[test]
    fn long_container_gets_varuint_length() {
        let mut buf = Buffer::new();
        buf.begin_list();
        for _ in 0..10 {
            buf.write_string("xxxxxxxx");
        }
        buf.end_list();
        let bytes = buf.bytes();
        // 10 strings of 9 bytes each: body 90 > 13 so length code 14.
        assert_eq!(bytes[0] & 0x0F, LEN_VARUINT);
        assert_eq!(size_of(bytes).unwrap(), bytes.len());
    }

    #[test]
    fn uint_and_symbol_magnitudes() {
        let mut buf = Buffer::new();
        buf.write_uint(0x1_0000);
        assert_eq!(read_uint(buf.bytes()).unwrap().0, 0x1_0000);

        let mut buf = Buffer::new();
        buf.write_symbol(300);
        assert_eq!(read_symbol(buf.bytes()).unwrap().0, 300);
    }

    #[test]
    fn timestamp_roundtrip() {
        let dt = DateTime {
            year: 2022,
            month: 11,
            day: 8,
            hour: 6,
            minute: 30,
            second: 0,
            micros: 250_000,
        };
        let mut buf = Buffer::new();
        buf.write_timestamp(&dt);
        let (decoded, rest) = read_time(buf.bytes()).unwrap();
        assert_eq!(decoded, dt);
        assert!(rest.is_empty());
    }

    #[test]
    fn nested_containers() {
        let mut buf = Buffer::new();
        buf.begin_list();
        buf.begin_list();
        buf.write_string("inner");
        buf.end_list();
        buf.write_int(5);
        buf.end_list();
        let bytes = buf.bytes();
        let (body, _) = contents(bytes).unwrap();
        let inner_size = size_of(body).unwrap();
        let (inner_body, _) = contents(&body[..inner_size]).unwrap();
        assert_eq!(read_string(inner_body).unwrap().0, "inner");
        assert_eq!(read_int(&body[inner_size..]).unwrap().0, 5);
    }
}
