//! Symbol tables.
//!
//! A symbol table is an ordered mapping from small integer ids to
//! strings, used to compress struct field labels and symbol datums.
//! Id 0 is reserved; ids 1–9 are the fixed system symbols; user symbols
//! are interned densely from [`MIN_USER_ID`] upward.
//!
//! A scan consumes symbol-table updates embedded in the document
//! stream: a binary version marker resets the table, and an annotation
//! whose first annotation symbol is `$ion_symbol_table` either appends
//! to or replaces the active table (see [`SymbolTable::unmarshal`]).

use std::collections::HashMap;
use std::sync::Arc;

use sift_error::{Result, SiftError};

use crate::reader::{read_annotation, read_label, read_string, read_symbol};
use crate::tlv::{self, Type};

/// Identifier of an interned string.
pub type SymbolId = u32;

/// Immutable snapshot of a symbol table, carried by handle inside
/// decoded datums. Index is the symbol id; index 0 is a placeholder.
pub type SymtabSnapshot = Arc<[Box<str>]>;

pub const SYM_ION: SymbolId = 1;
pub const SYM_ION_1_0: SymbolId = 2;
pub const SYM_ION_SYMBOL_TABLE: SymbolId = 3;
pub const SYM_NAME: SymbolId = 4;
pub const SYM_VERSION: SymbolId = 5;
pub const SYM_IMPORTS: SymbolId = 6;
pub const SYM_SYMBOLS: SymbolId = 7;
pub const SYM_MAX_ID: SymbolId = 8;
pub const SYM_SHARED_SYMBOL_TABLE: SymbolId = 9;

/// First id available for user symbols.
pub const MIN_USER_ID: SymbolId = 10;

const SYSTEM: [&str; 10] = [
    "$0",
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
];

/// Mutable symbol table used while scanning or building a stream.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    strings: Vec<Box<str>>,
    by_name: HashMap<Box<str>, SymbolId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table holding only the system symbols.
    #[must_use]
    pub fn new() -> Self {
        let strings: Vec<Box<str>> = SYSTEM.iter().map(|s| Box::from(*s)).collect();
        let by_name = strings
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, s)| (s.clone(), i as SymbolId))
            .collect();
        Self { strings, by_name }
    }

    /// Drop all user symbols.
    pub fn reset(&mut self) {
        self.strings.truncate(MIN_USER_ID as usize);
        self.by_name.retain(|_, &mut id| id < MIN_USER_ID);
    }

    /// Highest assigned symbol id.
    #[must_use]
    pub fn max_id(&self) -> SymbolId {
        (self.strings.len() - 1) as SymbolId
    }

    /// Resolve a symbol id. Id 0 and out-of-range ids resolve to `None`.
    #[must_use]
    pub fn lookup(&self, sym: SymbolId) -> Option<&str> {
        if sym == 0 {
            return None;
        }
        self.strings.get(sym as usize).map(AsRef::as_ref)
    }

    /// Id of an already-interned string.
    #[must_use]
    pub fn symbolize(&self, s: &str) -> Option<SymbolId> {
        self.by_name.get(s).copied()
    }

    /// Intern a string, returning its (possibly pre-existing) id.
    pub fn intern(&mut self, s: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(s) {
            return id;
        }
        let id = self.strings.len() as SymbolId;
        self.strings.push(Box::from(s));
        self.by_name.insert(Box::from(s), id);
        id
    }

    /// Immutable snapshot for attachment to decoded datums.
    #[must_use]
    pub fn snapshot(&self) -> SymtabSnapshot {
        Arc::from(self.strings.clone().into_boxed_slice())
    }

    /// Whether `prefix` is a prefix of this table (same strings, same
    /// order). Encoding against a superset table never needs
    /// resymbolisation.
    #[must_use]
    pub fn contains(&self, prefix: &[Box<str>]) -> bool {
        prefix.len() <= self.strings.len() && self.strings[..prefix.len()] == *prefix
    }

    /// Iterate user symbols in id order.
    pub fn user_symbols(&self) -> impl Iterator<Item = (SymbolId, &str)> {
        self.strings
            .iter()
            .enumerate()
            .skip(MIN_USER_ID as usize)
            .map(|(i, s)| (i as SymbolId, s.as_ref()))
    }

    /// Consume any binary version marker or symbol-table annotation at
    /// the head of `buf`, updating this table, and return the remainder.
    ///
    /// A BVM resets the table. An update with an
    /// `imports: $ion_symbol_table` field appends to the existing
    /// table; otherwise the prior table is replaced.
    ///
    /// # Errors
    ///
    /// Fails on malformed headers, non-struct update payloads, or
    /// non-string entries in the `symbols` list.
    pub fn unmarshal<'a>(&mut self, buf: &'a [u8]) -> Result<&'a [u8]> {
        let mut buf = buf;
        loop {
            if tlv::is_bvm(buf) {
                self.reset();
                buf = &buf[4..];
                continue;
            }
            if tlv::type_of(buf) == Type::Annotation && !buf.is_empty() {
                let (sym, value, rest) = read_annotation(buf)?;
                if sym == SYM_ION_SYMBOL_TABLE {
                    self.apply_update(value)?;
                    buf = rest;
                    continue;
                }
            }
            return Ok(buf);
        }
    }

    fn apply_update(&mut self, value: &[u8]) -> Result<()> {
        if tlv::type_of(value) != Type::Struct {
            return Err(SiftError::Corrupt {
                detail: "symbol table update is not a struct",
            });
        }
        let (mut body, _) = tlv::contents(value)?;
        let mut append = false;
        let mut symbols: Option<&[u8]> = None;
        while !body.is_empty() {
            let (label, rest) = read_label(body)?;
            let size = tlv::size_of(rest)?;
            let field = &rest[..size];
            match label {
                SYM_IMPORTS => {
                    if tlv::type_of(field) == Type::Symbol {
                        let (import, _) = read_symbol(field)?;
                        append = import == SYM_ION_SYMBOL_TABLE;
                    }
                }
                SYM_SYMBOLS => {
                    if tlv::type_of(field) != Type::List {
                        return Err(SiftError::Corrupt {
                            detail: "symbols field is not a list",
                        });
                    }
                    symbols = Some(field);
                }
                _ => {}
            }
            body = &rest[size..];
        }
        if !append {
            self.reset();
        }
        if let Some(list) = symbols {
            let (mut items, _) = tlv::contents(list)?;
            while !items.is_empty() {
                let (s, rest) = read_string(items)?;
                self.intern(s);
                items = rest;
            }
        }
        Ok(())
    }
}

/// Resolve a symbol id against a snapshot.
#[must_use]
pub fn snapshot_lookup(st: &SymtabSnapshot, sym: SymbolId) -> Option<&str> {
    if sym == 0 {
        return None;
    }
    st.get(sym as usize).map(AsRef::as_ref)
}

/// Whether one snapshot is a prefix of another in either direction.
#[must_use]
pub fn snapshots_overlap(a: &SymtabSnapshot, b: &SymtabSnapshot) -> bool {
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn system_symbols_are_fixed() {
        let st = SymbolTable::new();
        assert_eq!(st.lookup(SYM_ION_SYMBOL_TABLE), Some("$ion_symbol_table"));
        assert_eq!(st.lookup(SYM_IMPORTS), Some("imports"));
        assert_eq!(st.lookup(0), None);
        assert_eq!(st.max_id(), 9);
    }

    #[test]
    fn intern_is_dense_and_idempotent() {
        let mut st = SymbolTable::new();
        let a = st.intern("a");
        let b = st.intern("b");
        assert_eq!(a, MIN_USER_ID);
        assert_eq!(b, MIN_USER_ID + 1);
        assert_eq!(st.intern("a"), a);
        assert_eq!(st.symbolize("b"), Some(b));
    }

    #[test]
    fn bvm_resets() {
        let mut st = SymbolTable::new();
        st.intern("gone");
        let buf = [0xE0, 0x01, 0x00, 0xEA, 0x0F];
        let rest = st.unmarshal(&buf).unwrap();
        assert_eq!(rest, &[0x0F]);
        assert_eq!(st.max_id(), 9);
        assert_eq!(st.symbolize("gone"), None);
    }

    fn symtab_update(symbols: &[&str], append: bool) -> Vec<u8> {
        let mut buf = Buffer::new();
        buf.begin_annotation(SYM_ION_SYMBOL_TABLE);
        buf.begin_struct();
        if append {
            buf.begin_field(SYM_IMPORTS);
            buf.write_symbol(SYM_ION_SYMBOL_TABLE);
        }
        buf.begin_field(SYM_SYMBOLS);
        buf.begin_list();
        for s in symbols {
            buf.write_string(s);
        }
        buf.end_list();
        buf.end_struct();
        buf.end_annotation();
        buf.into_bytes()
    }

    #[test]
    fn update_replaces_by_default() {
        let mut st = SymbolTable::new();
        st.intern("old");
        let rest_owner = symtab_update(&["a", "b"], false);
        let rest = st.unmarshal(&rest_owner).unwrap();
        assert!(rest.is_empty());
        assert_eq!(st.symbolize("old"), None);
        assert_eq!(st.symbolize("a"), Some(MIN_USER_ID));
        assert_eq!(st.symbolize("b"), Some(MIN_USER_ID + 1));
    }

    #[test]
    fn update_with_imports_appends() {
        let mut st = SymbolTable::new();
        st.intern("old");
        let buf = symtab_update(&["new"], true);
        st.unmarshal(&buf).unwrap();
        assert_eq!(st.symbolize("old"), Some(MIN_USER_ID));
        assert_eq!(st.symbolize("new"), Some(MIN_USER_ID + 1));
    }

    #[test]
    fn snapshot_prefix_relation() {
        let mut st = SymbolTable::new();
        st.intern("a");
        let small = st.snapshot();
        st.intern("b");
        let big = st.snapshot();
        assert!(st.contains(&small));
        assert!(snapshots_overlap(&small, &big));
        let mut other = SymbolTable::new();
        other.intern("z");
        assert!(!snapshots_overlap(&small, &other.snapshot()));
    }
}
