//! Program construction.
//!
//! [`ProgramBuilder`] is the engine-side half of the planner/engine
//! contract: it emits instructions, allocates register slots, interns
//! dictionary entries and literals, and serialises the symbol-table
//! snapshot into the saved literal prefix. The planner proper is out of
//! scope; the drivers' own tests assemble programs through this.

use std::sync::Arc;

use sift_ion::{header_size_of, write_varuint, SymbolId, SymbolTable};

use crate::aggtable::{AggBuffer, AggHashTable};
use crate::bytecode::{BcError, Bytecode, DictEntry, HashSetTable, LitRef, Pattern, VmState};
use crate::dfa::DfaProgram;
use crate::ops::{Arg, Opcode, PAGE_SIZE};
use crate::reg::{BaseReg, BucketReg, HashReg, MaskReg, ScalarReg, ValueReg, SCRATCH_BASE};

/// One operand passed to [`ProgramBuilder::emit`]; must match the
/// opcode's declared layout kind for kind.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    K(u16),
    S(u16),
    V(u16),
    B(u16),
    H(u16),
    L(u16),
    Agg(u32),
    Dict(u16),
    Aux(u16),
    HashSet(u16),
    Sym(SymbolId),
    Lit(LitRef),
    U16(u16),
    I64(i64),
    F64(f64),
    U64(u64),
}

/// Incremental builder for a compiled program.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    next_cell: u32,
    dict: Vec<DictEntry>,
    hashsets: Vec<HashSetTable>,
    savedlit: Vec<u8>,
    symtab: Vec<(u32, u32)>,
    aux_count: usize,
    scratch_need: usize,
    agg: Option<Arc<AggBuffer>>,
    aggtable: Option<Arc<AggHashTable>>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, cells: usize) -> u16 {
        let slot = self.next_cell;
        self.next_cell += cells as u32;
        assert!(self.next_cell <= u32::from(u16::MAX), "register stack overflow");
        slot as u16
    }

    pub fn k_slot(&mut self) -> u16 {
        self.alloc(MaskReg::CELLS)
    }

    pub fn s_slot(&mut self) -> u16 {
        self.alloc(ScalarReg::CELLS)
    }

    pub fn v_slot(&mut self) -> u16 {
        self.alloc(ValueReg::CELLS)
    }

    pub fn b_slot(&mut self) -> u16 {
        self.alloc(BaseReg::CELLS)
    }

    pub fn h_slot(&mut self) -> u16 {
        self.alloc(HashReg::CELLS)
    }

    pub fn l_slot(&mut self) -> u16 {
        self.alloc(BucketReg::CELLS)
    }

    /// Serialise the symbol-table snapshot: every symbol's text is
    /// written into the literal prefix as an encoded string value, so
    /// `unsymbolize` (and the byte stage of the polymorphic
    /// comparator) can swap a symbol reference for a real string span.
    pub fn set_symtab(&mut self, st: &SymbolTable) {
        self.symtab.clear();
        self.symtab.push((0, 0)); // id 0 reserved
        let mut enc = sift_ion::Buffer::new();
        for id in 1..=st.max_id() {
            match st.lookup(id) {
                Some(text) => {
                    enc.clear();
                    enc.write_string(text);
                    let off = self.savedlit.len() as u32;
                    self.savedlit.extend_from_slice(enc.bytes());
                    self.symtab
                        .push((SCRATCH_BASE + off, enc.len() as u32));
                }
                None => self.symtab.push((0, 0)),
            }
        }
    }

    /// Intern a pre-encoded value into the literal prefix.
    pub fn literal(&mut self, encoded: &[u8]) -> LitRef {
        let header = header_size_of(encoded).expect("literal must be well-formed");
        let off = self.savedlit.len() as u32;
        self.savedlit.extend_from_slice(encoded);
        LitRef {
            offset: SCRATCH_BASE + off,
            len: encoded.len() as u32,
            tlv: encoded[0],
            header_len: header as u8,
        }
    }

    pub fn dict_str(&mut self, bytes: &[u8]) -> u16 {
        self.push_dict(DictEntry::Str(bytes.into()))
    }

    pub fn dict_pattern(&mut self, bytes: &[u8], wild: &[bool]) -> u16 {
        assert_eq!(bytes.len(), wild.len(), "pattern mask length mismatch");
        self.push_dict(DictEntry::Pattern(Pattern {
            bytes: bytes.into(),
            wild: wild.into(),
        }))
    }

    pub fn dict_dfa(&mut self, dfa: DfaProgram) -> u16 {
        self.push_dict(DictEntry::Dfa(dfa))
    }

    pub fn dict_ip_range(&mut self, min: u32, max: u32) -> u16 {
        self.push_dict(DictEntry::IpRange { min, max })
    }

    fn push_dict(&mut self, entry: DictEntry) -> u16 {
        let idx = self.dict.len();
        self.dict.push(entry);
        idx as u16
    }

    /// Register a planner-built hash table for `hashmember`/`hashlookup`.
    pub fn hashset(&mut self, entries: impl IntoIterator<Item = (u128, Option<LitRef>)>) -> u16 {
        let idx = self.hashsets.len();
        self.hashsets.push(HashSetTable {
            entries: entries.into_iter().collect(),
        });
        idx as u16
    }

    /// Declare the number of bound aux columns.
    pub fn aux_slots(&mut self, count: usize) {
        self.aux_count = count;
    }

    pub fn set_agg(&mut self, agg: Arc<AggBuffer>) {
        self.agg = Some(agg);
    }

    pub fn set_aggtable(&mut self, table: Arc<AggHashTable>) {
        self.aggtable = Some(table);
    }

    /// Emit a fixed-arity instruction.
    ///
    /// Panics when the operands do not match the opcode's layout; a
    /// mismatched emit is a programming error, not input corruption.
    pub fn emit(&mut self, op: Opcode, args: &[Operand]) {
        self.emit_va(op, args, &[]);
    }

    /// Emit an instruction with a variadic tail.
    pub fn emit_va(&mut self, op: Opcode, args: &[Operand], items: &[&[Operand]]) {
        let info = op.info();
        let layout: Vec<Arg> = info.out.iter().chain(info.input.iter()).copied().collect();
        assert_eq!(
            layout.len(),
            args.len(),
            "{}: expected {} operands, got {}",
            info.text,
            layout.len(),
            args.len()
        );
        self.scratch_need += info.scratch.bytes();
        self.code.extend_from_slice(&(op as u16).to_le_bytes());
        for (&kind, &operand) in layout.iter().zip(args) {
            self.encode_operand(info.text, kind, operand);
        }
        if info.va.is_empty() {
            assert!(items.is_empty(), "{}: unexpected variadic items", info.text);
            return;
        }
        self.code
            .extend_from_slice(&(items.len() as u16).to_le_bytes());
        for item in items {
            assert_eq!(
                info.va.len(),
                item.len(),
                "{}: malformed variadic item",
                info.text
            );
            for (&kind, &operand) in info.va.iter().zip(*item) {
                self.encode_operand(info.text, kind, operand);
            }
        }
    }

    fn encode_operand(&mut self, text: &str, kind: Arg, operand: Operand) {
        match (kind, operand) {
            (Arg::K, Operand::K(s))
            | (Arg::S, Operand::S(s))
            | (Arg::V, Operand::V(s))
            | (Arg::B, Operand::B(s))
            | (Arg::H, Operand::H(s))
            | (Arg::L, Operand::L(s))
            | (Arg::Dict, Operand::Dict(s))
            | (Arg::Aux, Operand::Aux(s))
            | (Arg::HashSet, Operand::HashSet(s))
            | (Arg::ImmU16, Operand::U16(s)) => {
                self.code.extend_from_slice(&s.to_le_bytes());
            }
            (Arg::Agg, Operand::Agg(off)) => {
                self.code.extend_from_slice(&off.to_le_bytes());
            }
            (Arg::Sym, Operand::Sym(sym)) => {
                // Varuint-encoded in a fixed 4-byte field; trailing
                // zero bytes are never reached by the decoder.
                let mut enc = Vec::with_capacity(4);
                write_varuint(&mut enc, u64::from(sym));
                assert!(enc.len() <= 4, "{text}: symbol id out of range");
                enc.resize(4, 0);
                self.code.extend_from_slice(&enc);
            }
            (Arg::Lit, Operand::Lit(lit)) => {
                self.code.extend_from_slice(&lit.offset.to_le_bytes());
                self.code.extend_from_slice(&lit.len.to_le_bytes());
                self.code.push(lit.tlv);
                self.code.push(lit.header_len);
            }
            (Arg::ImmI64, Operand::I64(v)) => {
                self.code.extend_from_slice(&v.to_le_bytes());
            }
            (Arg::ImmF64, Operand::F64(v)) => {
                self.code.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            (Arg::ImmU64, Operand::U64(v)) => {
                self.code.extend_from_slice(&v.to_le_bytes());
            }
            (kind, operand) => {
                panic!("{text}: operand {operand:?} does not match layout kind {kind:?}");
            }
        }
    }

    /// Finish the program.
    #[must_use]
    pub fn build(self) -> Bytecode {
        let scratch_cap = self.savedlit.len() + self.scratch_need.max(PAGE_SIZE);
        Bytecode {
            compiled: self.code,
            dict: self.dict,
            hashsets: self.hashsets,
            symtab: self.symtab,
            scratch: self.savedlit.clone(),
            savedlit: self.savedlit,
            auxvals: vec![Vec::new(); self.aux_count],
            vstack: vec![0; self.next_cell as usize],
            scratch_cap,
            auxpos: 0,
            err: BcError::Ok,
            errpc: 0,
            errinfo: 0,
            vmstate: VmState::default(),
            agg: self.agg,
            aggtable: self.aggtable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_slots_and_immediates() {
        let mut b = ProgramBuilder::new();
        let delims = b.b_slot();
        let mask = b.k_slot();
        let scalar = b.s_slot();
        let out = b.k_slot();
        b.emit(Opcode::Init, &[Operand::B(delims), Operand::K(mask)]);
        b.emit(
            Opcode::CmpLtI64Imm,
            &[
                Operand::K(out),
                Operand::S(scalar),
                Operand::I64(-5),
                Operand::K(mask),
            ],
        );
        b.emit(Opcode::RetK, &[Operand::K(out)]);
        let bc = b.build();

        // init(2+2+2) + cmplt(2+2+2+8+2) + retk(2+2) = 26 bytes.
        assert_eq!(bc.compiled.len(), 26);
        assert_eq!(bc.word(0), Opcode::Init as u16);
        assert_eq!(bc.word(6), Opcode::CmpLtI64Imm as u16);
        assert_eq!(bc.word64(12) as i64, -5);
    }

    #[test]
    fn symbol_operand_is_padded_varuint() {
        let mut b = ProgramBuilder::new();
        let base = b.b_slot();
        let mask = b.k_slot();
        let v = b.v_slot();
        let found = b.k_slot();
        b.emit(
            Opcode::FindSym,
            &[
                Operand::V(v),
                Operand::K(found),
                Operand::B(base),
                Operand::Sym(10),
                Operand::K(mask),
            ],
        );
        let bc = b.build();
        // Operand order: V, K, B, then the 4-byte symbol field.
        let sym_field = &bc.compiled[8..12];
        let (decoded, _) = sift_ion::read_varuint(sym_field).unwrap();
        assert_eq!(decoded, 10);
    }

    #[test]
    fn symtab_serialised_as_encoded_strings() {
        let mut st = SymbolTable::new();
        let a = st.intern("alpha");
        let mut b = ProgramBuilder::new();
        b.set_symtab(&st);
        let bc = b.build();
        let (off, len) = bc.symtab[a as usize];
        let buf = [0u8; 0];
        let encoded = bc.vmref(&buf, off, len).unwrap();
        let (text, rest) = sift_ion::read_string(encoded).unwrap();
        assert_eq!(text, "alpha");
        assert!(rest.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not match layout kind")]
    fn operand_kind_mismatch_panics() {
        let mut b = ProgramBuilder::new();
        let k = b.k_slot();
        b.emit(Opcode::RetK, &[Operand::S(k)]);
    }
}
