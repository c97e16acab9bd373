//! Self-describing binary document format.
//!
//! Values are TLV-encoded: a one-byte tag packing a 4-bit type code and
//! a 4-bit length code, an optional varuint length tail, then the body.
//! Structs compress field labels through a [`SymbolTable`]; a scan
//! consumes symbol-table updates embedded in the stream. Readers are
//! zero-copy; [`Datum`] pairs a span with the symbol table it was
//! decoded against and defines semantic equality across encodings.

pub mod buffer;
pub mod datum;
pub mod reader;
pub mod symtab;
pub mod timestamp;
pub mod tlv;
pub mod varint;

pub use buffer::{encode_tlv_into, tlv_header_len, Buffer};
pub use datum::{read_datum, Datum, FieldRef, ListIter, StructIter};
pub use reader::{
    read_annotation, read_blob_shared, read_bool, read_float, read_int, read_label, read_string,
    read_string_shared, read_symbol, read_time, read_uint,
};
pub use symtab::{
    snapshot_lookup, snapshots_overlap, SymbolId, SymbolTable, SymtabSnapshot, MIN_USER_ID,
    SYM_ION_SYMBOL_TABLE,
};
pub use timestamp::{DateTime, MICROS_PER_DAY, MICROS_PER_SEC};
pub use tlv::{contents, header_size_of, is_bvm, size_of, type_of, Type, BVM};
pub use varint::{read_varint, read_varuint, varuint_len, write_varint, write_varuint};
