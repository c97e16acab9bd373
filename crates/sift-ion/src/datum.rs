//! Decoded datum model.
//!
//! A [`Datum`] is a `(symbol-table handle, byte span)` pair: a view of
//! one encoded value plus the snapshot needed to resolve any symbols
//! inside it. Spans borrow from the scanned buffer where possible;
//! constructors that materialise new bytes own them.
//!
//! Equality is semantic: numbers compare across int/uint/float when the
//! value survives the conversion exactly, symbols compare by resolved
//! text, structs compare as label→value maps, lists positionally.
//! [`Datum::less_imprecise`] exposes the fast raw-byte ordering.

use std::borrow::Cow;

use sift_error::{Result, SiftError};

use crate::buffer::Buffer;
use crate::reader::{
    read_annotation, read_bool, read_float, read_int, read_label, read_string_shared, read_symbol,
    read_time, read_uint,
};
use crate::symtab::{snapshot_lookup, SymbolId, SymbolTable, SymtabSnapshot};
use crate::timestamp::DateTime;
use crate::tlv::{self, Type, LEN_NULL};

/// One decoded value: a byte span plus the symbol table it was decoded
/// against (present only when the value can contain symbols).
#[derive(Debug, Clone)]
pub struct Datum<'a> {
    st: Option<SymtabSnapshot>,
    buf: Cow<'a, [u8]>,
}

impl<'a> Datum<'a> {
    fn raw(st: Option<SymtabSnapshot>, buf: &'a [u8], size: usize) -> Self {
        Self {
            st,
            buf: Cow::Borrowed(&buf[..size]),
        }
    }

    fn owned(st: Option<SymtabSnapshot>, bytes: Vec<u8>) -> Self {
        Self {
            st,
            buf: Cow::Owned(bytes),
        }
    }

    // === constructors ===

    #[must_use]
    pub fn null() -> Self {
        Self::owned(None, vec![0x0F])
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::owned(None, vec![(Type::Bool as u8) << 4 | u8::from(value)])
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        let mut b = Buffer::new();
        b.write_int(value);
        Self::owned(None, b.into_bytes())
    }

    #[must_use]
    pub fn uint(value: u64) -> Self {
        let mut b = Buffer::new();
        b.write_uint(value);
        Self::owned(None, b.into_bytes())
    }

    #[must_use]
    pub fn float(value: f64) -> Self {
        let mut b = Buffer::new();
        b.write_f64(value);
        Self::owned(None, b.into_bytes())
    }

    #[must_use]
    pub fn string(value: &str) -> Self {
        let mut b = Buffer::new();
        b.write_string(value);
        Self::owned(None, b.into_bytes())
    }

    #[must_use]
    pub fn blob(value: &[u8]) -> Self {
        let mut b = Buffer::new();
        b.write_blob(value);
        Self::owned(None, b.into_bytes())
    }

    #[must_use]
    pub fn timestamp(value: DateTime) -> Self {
        let mut b = Buffer::new();
        b.write_timestamp(&value);
        Self::owned(None, b.into_bytes())
    }

    /// An interned string: encoded as a symbol carrying `st`'s snapshot.
    #[must_use]
    pub fn interned(st: &mut SymbolTable, value: &str) -> Self {
        let sym = st.intern(value);
        let mut b = Buffer::new();
        b.write_symbol(sym);
        Self::owned(Some(st.snapshot()), b.into_bytes())
    }

    /// A struct from `(label, value)` pairs. Fields are emitted in
    /// ascending symbol-id order, as the format requires.
    #[must_use]
    pub fn new_struct(st: &mut SymbolTable, fields: &[(&str, Datum<'_>)]) -> Self {
        let mut interned: Vec<(SymbolId, &Datum<'_>)> = fields
            .iter()
            .map(|(label, value)| (st.intern(label), value))
            .collect();
        interned.sort_by_key(|&(sym, _)| sym);
        let mut b = Buffer::new();
        b.begin_struct();
        for (sym, value) in interned {
            b.begin_field(sym);
            value.encode(&mut b, st);
        }
        b.end_struct();
        Self::owned(Some(st.snapshot()), b.into_bytes())
    }

    /// A list of values.
    #[must_use]
    pub fn new_list(st: &mut SymbolTable, items: &[Datum<'_>]) -> Self {
        let mut b = Buffer::new();
        b.begin_list();
        for item in items {
            item.encode(&mut b, st);
        }
        b.end_list();
        Self::owned(Some(st.snapshot()), b.into_bytes())
    }

    /// An annotation wrapper with a single annotation symbol.
    #[must_use]
    pub fn annotation(st: &mut SymbolTable, label: &str, value: &Datum<'_>) -> Self {
        let sym = st.intern(label);
        let mut b = Buffer::new();
        b.begin_annotation(sym);
        value.encode(&mut b, st);
        b.end_annotation();
        Self::owned(Some(st.snapshot()), b.into_bytes())
    }

    // === inspection ===

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn type_of(&self) -> Type {
        tlv::type_of(&self.buf)
    }

    /// Whether this is an untyped or typed null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self.type_of() {
            Type::Null => true,
            _ => self.buf[0] & 0x0F == LEN_NULL,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        read_bool(&self.buf).ok().map(|(v, _)| v)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        matches!(self.type_of(), Type::Uint | Type::NegInt)
            .then(|| read_int(&self.buf).ok().map(|(v, _)| v))
            .flatten()
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        read_uint(&self.buf).ok().map(|(v, _)| v)
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        read_float(&self.buf).ok().map(|(v, _)| v)
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime> {
        read_time(&self.buf).ok().map(|(v, _)| v)
    }

    /// Resolved text of a string or symbol datum.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self.type_of() {
            Type::String => read_string_shared(&self.buf)
                .ok()
                .and_then(|(b, _)| std::str::from_utf8(b).ok()),
            Type::Symbol => {
                let (sym, _) = read_symbol(&self.buf).ok()?;
                snapshot_lookup(self.st.as_ref()?, sym)
            }
            _ => None,
        }
    }

    /// Blob or clob contents.
    #[must_use]
    pub fn blob_shared(&self) -> Option<&[u8]> {
        matches!(self.type_of(), Type::Blob | Type::Clob)
            .then(|| tlv::contents(&self.buf).ok().map(|(b, _)| b))
            .flatten()
    }

    /// Iterate struct fields. `None` when this is not a struct.
    #[must_use]
    pub fn fields(&self) -> Option<StructIter<'_>> {
        if self.type_of() != Type::Struct {
            return None;
        }
        let (body, _) = tlv::contents(&self.buf).ok()?;
        Some(StructIter {
            body,
            st: self.st.clone(),
        })
    }

    /// Iterate list elements. `None` when this is not a list or sexp.
    #[must_use]
    pub fn items(&self) -> Option<ListIter<'_>> {
        if !matches!(self.type_of(), Type::List | Type::Sexp) {
            return None;
        }
        let (body, _) = tlv::contents(&self.buf).ok()?;
        Some(ListIter {
            body,
            st: self.st.clone(),
        })
    }

    /// Value of the struct field with the given symbol id.
    #[must_use]
    pub fn field(&self, sym: SymbolId) -> Option<Datum<'_>> {
        self.fields()?
            .flatten()
            .find(|f| f.sym == sym)
            .map(|f| f.value)
    }

    /// Value of the struct field with the given resolved name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<Datum<'_>> {
        self.fields()?
            .flatten()
            .find(|f| f.label() == Some(name))
            .map(|f| f.value)
    }

    /// Raw byte ordering. Fast, but does not order equal values with
    /// different binary representations correctly.
    #[must_use]
    pub fn less_imprecise(&self, other: &Datum<'_>) -> bool {
        *self.buf < *other.buf
    }

    // === encoding ===

    /// Append this datum to `dst`, interning into `st` as needed.
    ///
    /// Fast path: when the datum's source table is a prefix of `st`,
    /// the raw bytes are appended verbatim. Otherwise the datum is
    /// walked structurally and every symbol is translated.
    pub fn encode(&self, dst: &mut Buffer, st: &mut SymbolTable) {
        match &self.st {
            None => dst.write_raw(&self.buf),
            Some(src) if st.contains(src) => dst.write_raw(&self.buf),
            Some(src) => {
                let mut rs = Resymbolizer::new(src.clone());
                rs.resym(dst, st, &self.buf);
            }
        }
    }
}

impl PartialEq for Datum<'_> {
    /// Semantic equality (see module docs).
    fn eq(&self, other: &Self) -> bool {
        semantic_eq(self, other)
    }
}

fn semantic_eq(a: &Datum<'_>, b: &Datum<'_>) -> bool {
    match a.type_of() {
        Type::Null => b.is_null(),
        Type::Bool => {
            if a.is_null() {
                return b.is_null();
            }
            a.as_bool().is_some() && a.as_bool() == b.as_bool()
        }
        Type::Uint | Type::NegInt | Type::Float => numeric_eq(a, b),
        Type::String | Type::Symbol => match a.text() {
            Some(text) => b.text() == Some(text),
            None => false,
        },
        Type::Blob | Type::Clob => match (a.blob_shared(), b.blob_shared()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        Type::Timestamp => match (a.as_timestamp(), b.as_timestamp()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        Type::List | Type::Sexp => list_eq(a, b),
        Type::Struct => struct_eq(a, b),
        Type::Annotation => annotation_eq(a, b),
        _ => false,
    }
}

fn numeric_eq(a: &Datum<'_>, b: &Datum<'_>) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    // Cross-type equality normalises through the representable range:
    // a float equals an integer only when the float is integral and the
    // integer round-trips through f64 unchanged.
    match (a.type_of(), b.type_of()) {
        (Type::Float, Type::Float) => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
            _ => false,
        },
        (Type::Float, Type::Uint | Type::NegInt) => match (a.as_float(), b.as_int()) {
            (Some(f), Some(i)) => in_i64_range(f) && f == f.trunc() && f as i64 == i,
            (Some(f), None) => match b.as_uint() {
                Some(u) => f >= 0.0 && f == f.trunc() && f as u64 == u,
                None => false,
            },
            _ => false,
        },
        (Type::Uint | Type::NegInt, Type::Float) => numeric_eq(b, a),
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.as_uint(), b.as_uint()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        },
    }
}

fn in_i64_range(f: f64) -> bool {
    f >= -(2f64.powi(63)) && f < 2f64.powi(63)
}

fn list_eq(a: &Datum<'_>, b: &Datum<'_>) -> bool {
    let (Some(xs), Some(ys)) = (a.items(), b.items()) else {
        return false;
    };
    let xs: Vec<_> = xs.flatten().collect();
    let ys: Vec<_> = ys.flatten().collect();
    xs.len() == ys.len() && xs.iter().zip(&ys).all(|(x, y)| semantic_eq(x, y))
}

fn collect_sorted_fields<'a>(it: StructIter<'a>) -> Option<Vec<(String, Datum<'a>)>> {
    let mut v = Vec::new();
    for field in it {
        let field = field.ok()?;
        v.push((field.label()?.to_owned(), field.value));
    }
    v.sort_by(|(x, _), (y, _)| x.cmp(y));
    Some(v)
}

fn struct_eq(a: &Datum<'_>, b: &Datum<'_>) -> bool {
    let (Some(xs), Some(ys)) = (a.fields(), b.fields()) else {
        return false;
    };
    let (Some(xs), Some(ys)) = (collect_sorted_fields(xs), collect_sorted_fields(ys)) else {
        return false;
    };
    xs.len() == ys.len()
        && xs
            .iter()
            .zip(&ys)
            .all(|((xl, xv), (yl, yv))| xl == yl && semantic_eq(xv, yv))
}

fn annotation_eq(a: &Datum<'_>, b: &Datum<'_>) -> bool {
    let (Ok((asym, abody, _)), Ok((bsym, bbody, _))) =
        (read_annotation(a.bytes()), read_annotation(b.bytes()))
    else {
        return false;
    };
    let alabel = a.st.as_ref().and_then(|st| snapshot_lookup(st, asym));
    let blabel = b.st.as_ref().and_then(|st| snapshot_lookup(st, bsym));
    if alabel.is_none() || alabel != blabel {
        return false;
    }
    let ad = Datum {
        st: a.st.clone(),
        buf: Cow::Borrowed(abody),
    };
    let bd = Datum {
        st: b.st.clone(),
        buf: Cow::Borrowed(bbody),
    };
    semantic_eq(&ad, &bd)
}

/// One struct field: label symbol plus its value.
pub struct FieldRef<'a> {
    pub sym: SymbolId,
    st: Option<SymtabSnapshot>,
    pub value: Datum<'a>,
}

impl FieldRef<'_> {
    /// Resolved label text.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        snapshot_lookup(self.st.as_ref()?, self.sym)
    }
}

/// Lazy forward-only iterator over struct fields.
pub struct StructIter<'a> {
    body: &'a [u8],
    st: Option<SymtabSnapshot>,
}

impl<'a> Iterator for StructIter<'a> {
    type Item = Result<FieldRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }
        let step = || -> Result<(FieldRef<'a>, &'a [u8])> {
            let (sym, rest) = read_label(self.body)?;
            let size = tlv::size_of(rest)?;
            let field = FieldRef {
                sym,
                st: self.st.clone(),
                value: Datum {
                    st: self.st.clone(),
                    buf: Cow::Borrowed(&rest[..size]),
                },
            };
            Ok((field, &rest[size..]))
        };
        match step() {
            Ok((field, rest)) => {
                self.body = rest;
                Some(Ok(field))
            }
            Err(e) => {
                self.body = &[];
                Some(Err(e))
            }
        }
    }
}

/// Lazy forward-only iterator over list elements.
pub struct ListIter<'a> {
    body: &'a [u8],
    st: Option<SymtabSnapshot>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = Result<Datum<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }
        match tlv::size_of(self.body) {
            Ok(size) => {
                let item = Datum {
                    st: self.st.clone(),
                    buf: Cow::Borrowed(&self.body[..size]),
                };
                self.body = &self.body[size..];
                Some(Ok(item))
            }
            Err(e) => {
                self.body = &[];
                Some(Err(e))
            }
        }
    }
}

/// Structural re-encoder translating symbols from a source table into a
/// destination table through a dense id cache.
struct Resymbolizer {
    src: SymtabSnapshot,
    // old id -> new id; 0 means "not yet translated".
    idmap: Vec<SymbolId>,
}

impl Resymbolizer {
    fn new(src: SymtabSnapshot) -> Self {
        let idmap = vec![0; src.len()];
        Self { src, idmap }
    }

    fn get(&mut self, st: &mut SymbolTable, sym: SymbolId) -> SymbolId {
        let idx = sym as usize;
        if idx < self.idmap.len() && self.idmap[idx] != 0 {
            return self.idmap[idx];
        }
        let mapped = match snapshot_lookup(&self.src, sym) {
            Some(text) => st.intern(text),
            None => sym, // unresolvable ids pass through untouched
        };
        if idx >= self.idmap.len() {
            self.idmap.resize(idx + 1, 0);
        }
        self.idmap[idx] = mapped;
        mapped
    }

    fn resym(&mut self, dst: &mut Buffer, st: &mut SymbolTable, buf: &[u8]) {
        match tlv::type_of(buf) {
            Type::Symbol => {
                if let Ok((sym, _)) = read_symbol(buf) {
                    dst.write_symbol(self.get(st, sym));
                } else {
                    dst.write_raw(buf);
                }
            }
            Type::Struct if buf[0] & 0x0F != LEN_NULL => {
                dst.begin_struct();
                if let Ok((mut body, _)) = tlv::contents(buf) {
                    while !body.is_empty() {
                        let Ok((sym, rest)) = read_label(body) else { break };
                        let Ok(size) = tlv::size_of(rest) else { break };
                        dst.begin_field(self.get(st, sym));
                        self.resym(dst, st, &rest[..size]);
                        body = &rest[size..];
                    }
                }
                dst.end_struct();
            }
            Type::List if buf[0] & 0x0F != LEN_NULL => {
                dst.begin_list();
                if let Ok((mut body, _)) = tlv::contents(buf) {
                    while !body.is_empty() {
                        let Ok(size) = tlv::size_of(body) else { break };
                        self.resym(dst, st, &body[..size]);
                        body = &body[size..];
                    }
                }
                dst.end_list();
            }
            Type::Annotation if buf[0] & 0x0F != LEN_NULL => {
                if let Ok((sym, value, _)) = read_annotation(buf) {
                    dst.begin_annotation(self.get(st, sym));
                    self.resym(dst, st, value);
                    dst.end_annotation();
                } else {
                    dst.write_raw(buf);
                }
            }
            // Scalars (and sexp/clob, kept verbatim) carry no symbols.
            _ => dst.write_raw(buf),
        }
    }
}

/// Read the next datum from `buf`.
///
/// Consumes any binary version marker or symbol-table update first
/// (updating `st`), then dispatches by top-level type and validates the
/// value. Returns `None` when the buffer ends after a symbol table.
/// Symbol-bearing datums carry `st`'s snapshot so later re-encoding
/// against a different table stays sound.
///
/// # Errors
///
/// Framing errors, out-of-range symbols inside structs and annotations,
/// and reserved type codes are rejected.
pub fn read_datum<'a>(st: &mut SymbolTable, buf: &'a [u8]) -> Result<(Option<Datum<'a>>, &'a [u8])> {
    let buf = st.unmarshal(buf)?;
    if buf.is_empty() {
        return Ok((None, buf));
    }
    let size = tlv::size_of(buf)?;
    // Typed nulls of any non-reserved type are valid and carry no symbols.
    if buf[0] & 0x0F == LEN_NULL && tlv::type_of(buf) != Type::Reserved {
        let datum = if tlv::type_of(buf) == Type::Null {
            Datum::null()
        } else {
            Datum::raw(None, buf, size)
        };
        return Ok((Some(datum), &buf[size..]));
    }
    let datum = match tlv::type_of(buf) {
        // A multi-byte nop pad is skipped as a whole; the datum is null.
        Type::Null => Datum::null(),
        Type::Bool => {
            if buf[0] & 0x0F != LEN_NULL {
                read_bool(buf)?;
            }
            Datum::raw(None, buf, size)
        }
        Type::Uint => {
            read_uint(buf)?;
            Datum::raw(None, buf, size)
        }
        Type::NegInt => {
            read_int(buf)?;
            Datum::raw(None, buf, size)
        }
        Type::Float => {
            read_float(buf)?;
            Datum::raw(None, buf, size)
        }
        Type::Decimal => {
            return Err(SiftError::NotSupported { name: "decimal" });
        }
        Type::Timestamp => {
            read_time(buf)?;
            Datum::raw(None, buf, size)
        }
        Type::Symbol => {
            let (sym, _) = read_symbol(buf)?;
            if st.lookup(sym).is_none() {
                return Err(SiftError::SymbolOutOfRange {
                    symbol: sym,
                    max: st.max_id(),
                });
            }
            Datum::raw(Some(st.snapshot()), buf, size)
        }
        Type::String | Type::Clob | Type::Blob => {
            tlv::contents(buf)?;
            Datum::raw(None, buf, size)
        }
        // Sexp values are validated and iterated exactly like lists.
        Type::List | Type::Sexp => {
            validate_sequence(st, buf)?;
            Datum::raw(Some(st.snapshot()), buf, size)
        }
        Type::Struct => {
            validate_struct(st, buf)?;
            Datum::raw(Some(st.snapshot()), buf, size)
        }
        Type::Annotation => {
            let (sym, value, _) = read_annotation(buf)?;
            if st.lookup(sym).is_none() {
                return Err(SiftError::SymbolOutOfRange {
                    symbol: sym,
                    max: st.max_id(),
                });
            }
            validate_value(st, value)?;
            Datum::raw(Some(st.snapshot()), buf, size)
        }
        Type::Reserved => {
            return Err(SiftError::ReservedType { tag: buf[0] });
        }
    };
    Ok((Some(datum), &buf[size..]))
}

fn validate_value(st: &SymbolTable, buf: &[u8]) -> Result<()> {
    match tlv::type_of(buf) {
        Type::Reserved => Err(SiftError::ReservedType { tag: buf[0] }),
        _ if buf[0] & 0x0F == LEN_NULL => {
            tlv::size_of(buf)?;
            Ok(())
        }
        Type::Symbol => {
            let (sym, _) = read_symbol(buf)?;
            if st.lookup(sym).is_none() {
                return Err(SiftError::SymbolOutOfRange {
                    symbol: sym,
                    max: st.max_id(),
                });
            }
            Ok(())
        }
        Type::List | Type::Sexp => validate_sequence(st, buf),
        Type::Struct => validate_struct(st, buf),
        _ => {
            tlv::size_of(buf)?;
            Ok(())
        }
    }
}

fn validate_sequence(st: &SymbolTable, buf: &[u8]) -> Result<()> {
    if buf[0] & 0x0F == LEN_NULL {
        return Ok(());
    }
    let (mut body, _) = tlv::contents(buf)?;
    while !body.is_empty() {
        let size = tlv::size_of(body)?;
        validate_value(st, &body[..size])?;
        body = &body[size..];
    }
    Ok(())
}

fn validate_struct(st: &SymbolTable, buf: &[u8]) -> Result<()> {
    if buf[0] & 0x0F == LEN_NULL {
        return Ok(());
    }
    let (mut body, _) = tlv::contents(buf)?;
    while !body.is_empty() {
        let (sym, rest) = read_label(body)?;
        if st.lookup(sym).is_none() {
            return Err(SiftError::SymbolOutOfRange {
                symbol: sym,
                max: st.max_id(),
            });
        }
        if rest.is_empty() {
            return Err(SiftError::Corrupt {
                detail: "struct field label without value",
            });
        }
        let size = tlv::size_of(rest)?;
        validate_value(st, &rest[..size])?;
        body = &rest[size..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_type_equality() {
        assert_eq!(Datum::int(3), Datum::float(3.0));
        assert_eq!(Datum::float(3.0), Datum::int(3));
        assert_ne!(Datum::float(3.5), Datum::int(3));
        assert_eq!(Datum::int(-7), Datum::int(-7));
        assert_eq!(Datum::uint(u64::MAX), Datum::uint(u64::MAX));
        assert_ne!(Datum::uint(u64::MAX), Datum::float(1.0));
        // NaN equals NaN for datum purposes.
        assert_eq!(Datum::float(f64::NAN), Datum::float(f64::NAN));
    }

    #[test]
    fn symbol_equals_string() {
        let mut st = SymbolTable::new();
        let sym = Datum::interned(&mut st, "hello");
        assert_eq!(sym, Datum::string("hello"));
        assert_ne!(sym, Datum::string("world"));
    }

    #[test]
    fn struct_equality_is_order_insensitive_across_tables() {
        let mut st1 = SymbolTable::new();
        st1.intern("x"); // shift ids so the tables disagree
        let a = Datum::new_struct(&mut st1, &[("a", Datum::int(1)), ("b", Datum::int(2))]);

        let mut st2 = SymbolTable::new();
        let b = Datum::new_struct(&mut st2, &[("b", Datum::int(2)), ("a", Datum::int(1))]);

        assert_eq!(a, b);
        let c = Datum::new_struct(&mut st2, &[("a", Datum::int(1)), ("b", Datum::int(3))]);
        assert_ne!(a, c);
    }

    #[test]
    fn list_equality_is_positional() {
        let mut st = SymbolTable::new();
        let a = Datum::new_list(&mut st, &[Datum::int(1), Datum::int(2)]);
        let b = Datum::new_list(&mut st, &[Datum::int(1), Datum::int(2)]);
        let c = Datum::new_list(&mut st, &[Datum::int(2), Datum::int(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn read_datum_consumes_symtab_prefix() {
        // BVM + symbol table declaring ["a", "b"] + struct {a: 1, b: 2}.
        let mut build = SymbolTable::new();
        let a = build.intern("a");
        let b = build.intern("b");
        let mut buf = Buffer::new();
        buf.write_bvm();
        buf.begin_annotation(crate::symtab::SYM_ION_SYMBOL_TABLE);
        buf.begin_struct();
        buf.begin_field(crate::symtab::SYM_SYMBOLS);
        buf.begin_list();
        buf.write_string("a");
        buf.write_string("b");
        buf.end_list();
        buf.end_struct();
        buf.end_annotation();
        buf.begin_struct();
        buf.begin_field(a);
        buf.write_int(1);
        buf.begin_field(b);
        buf.write_int(2);
        buf.end_struct();
        let bytes = buf.into_bytes();

        let mut st = SymbolTable::new();
        let (datum, rest) = read_datum(&mut st, &bytes).unwrap();
        assert!(rest.is_empty());
        let datum = datum.unwrap();
        assert_eq!(datum.field_by_name("a").unwrap().as_int(), Some(1));
        assert_eq!(datum.field_by_name("b").unwrap().as_int(), Some(2));
        // Exactly one datum: reading again from rest yields nothing.
        assert!(read_datum(&mut st, rest).unwrap().0.is_none());
    }

    #[test]
    fn read_datum_rejects_unknown_symbol() {
        let mut buf = Buffer::new();
        buf.begin_struct();
        buf.begin_field(99); // never interned
        buf.write_int(1);
        buf.end_struct();
        let bytes = buf.into_bytes();
        let mut st = SymbolTable::new();
        assert!(matches!(
            read_datum(&mut st, &bytes),
            Err(SiftError::SymbolOutOfRange { symbol: 99, .. })
        ));
    }

    #[test]
    fn read_datum_rejects_reserved() {
        let mut st = SymbolTable::new();
        assert!(matches!(
            read_datum(&mut st, &[0xF1, 0x00]),
            Err(SiftError::ReservedType { .. })
        ));
    }

    #[test]
    fn resymbolisation_keeps_semantics() {
        let mut src = SymbolTable::new();
        src.intern("padding1");
        src.intern("padding2");
        let tag = Datum::interned(&mut src, "t");
        let datum =
            Datum::new_struct(&mut src, &[("name", Datum::string("x")), ("tag", tag)]);

        // Destination table with entirely different id assignments.
        let mut dst_table = SymbolTable::new();
        dst_table.intern("unrelated");
        let mut out = Buffer::new();
        datum.encode(&mut out, &mut dst_table);
        let bytes = out.into_bytes();

        let mut reread_table = dst_table.clone();
        let (reread, _) = read_datum(&mut reread_table, &bytes).unwrap();
        assert_eq!(reread.unwrap(), datum);
    }

    #[test]
    fn encode_fast_path_is_verbatim() {
        let mut st = SymbolTable::new();
        let datum = Datum::new_struct(&mut st, &[("k", Datum::int(9))]);
        // Same table grows: still a prefix, so bytes are unchanged.
        st.intern("later");
        let mut out = Buffer::new();
        datum.encode(&mut out, &mut st);
        assert_eq!(out.bytes(), datum.bytes());
    }

    #[test]
    fn less_imprecise_is_byte_order() {
        assert!(Datum::int(1).less_imprecise(&Datum::int(2)));
        assert!(!Datum::int(2).less_imprecise(&Datum::int(1)));
    }
}
