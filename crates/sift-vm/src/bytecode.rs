//! Compiled program image and per-VM evaluation state.
//!
//! A [`Bytecode`] owns the instruction stream, the register stack, the
//! literal/dictionary pool, a symbol-table snapshot, the scratch arena,
//! and the per-batch VM context. The instruction stream, dictionary,
//! symbol table, and aux columns are immutable for the duration of a
//! scan; the register stack, scratch, and error triple are mutated by
//! every batch.
//!
//! A single instance is not thread-safe. Parallel scans clone the
//! immutable image ([`Bytecode::clone_image`]) so each worker owns its
//! own stack and scratch; the aggregation buffer and bucket table are
//! the only shared (atomic/locked) state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::aggtable::{AggBuffer, AggHashTable};
use crate::dfa::DfaProgram;
use crate::reg::{BaseReg, HashReg, MaskReg, StringReg, SCRATCH_BASE};

/// VM error register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum BcError {
    #[default]
    Ok = 0,
    /// Value framing violated: bad TLV, truncated varuint, symbol id
    /// outside the table, reserved type code.
    Corrupt = 1,
    /// The current build cannot execute this opcode.
    NotSupported = 2,
    /// The opcode needs more scratch than remains; the driver grows the
    /// arena and resumes from the same PC.
    MoreScratch = 3,
    /// A `trap` opcode fired.
    Trap = 4,
}

/// Reference to a pre-encoded literal in the saved literal prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LitRef {
    /// Virtual offset (scratch-based).
    pub offset: u32,
    pub len: u32,
    /// TLV byte of the literal.
    pub tlv: u8,
    pub header_len: u8,
}

/// Wildcard pattern: `wild[i]` marks a position matching any character.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub bytes: Box<[u8]>,
    pub wild: Box<[bool]>,
}

/// One dictionary entry referenced by `Dict`-kind operands.
#[derive(Debug, Clone)]
pub enum DictEntry {
    Str(Box<[u8]>),
    Pattern(Pattern),
    Dfa(DfaProgram),
    IpRange { min: u32, max: u32 },
}

impl DictEntry {
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DictEntry::Str(b) => Some(b),
            _ => None,
        }
    }
}

/// Planner-built hash table probed by `hashmember`/`hashlookup`.
/// The value is the associated literal, when one exists.
#[derive(Debug, Clone, Default)]
pub struct HashSetTable {
    pub entries: HashMap<u128, Option<LitRef>>,
}

/// Per-batch context exchanged between drivers and terminal opcodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmState {
    /// Row delimiters for the current batch; `ret.b.k` replaces them.
    pub delims: BaseReg,
    /// Lanes live at batch entry (the tail batch may be partial).
    pub valid_lanes: MaskReg,
    /// Lanes that survived; written by the terminal opcodes.
    pub output_lanes: MaskReg,
    /// String output published by `ret.s.k`.
    pub sreg: StringReg,
    /// Hash output published by `ret.b.h.k`.
    pub hreg: HashReg,
}

/// A compiled program plus one worker's evaluation state.
#[derive(Debug)]
pub struct Bytecode {
    // Immutable for the duration of a scan.
    pub compiled: Vec<u8>,
    pub dict: Vec<DictEntry>,
    pub hashsets: Vec<HashSetTable>,
    /// Symbol id to the virtual span of its text in the literal prefix.
    pub symtab: Vec<(u32, u32)>,
    /// Saved literal prefix; scratch resets to a copy of this.
    pub savedlit: Vec<u8>,
    /// Aux column vectors, indexed by global row position.
    pub auxvals: Vec<Vec<(u32, u32)>>,

    // Mutated per batch.
    pub vstack: Vec<u64>,
    pub scratch: Vec<u8>,
    pub scratch_cap: usize,
    pub auxpos: usize,
    pub err: BcError,
    pub errpc: u32,
    pub errinfo: u64,
    pub vmstate: VmState,

    // Shared aggregation state, installed by the aggregate driver.
    pub agg: Option<Arc<AggBuffer>>,
    pub aggtable: Option<Arc<AggHashTable>>,
}

impl Bytecode {
    /// Little-endian u16 at `pc`.
    #[must_use]
    pub fn word(&self, pc: usize) -> u16 {
        u16::from_le_bytes([self.compiled[pc], self.compiled[pc + 1]])
    }

    /// Little-endian u32 at `pc`.
    #[must_use]
    pub fn word32(&self, pc: usize) -> u32 {
        u32::from_le_bytes(
            self.compiled[pc..pc + 4]
                .try_into()
                .expect("checked length"),
        )
    }

    /// Little-endian u64 at `pc`.
    #[must_use]
    pub fn word64(&self, pc: usize) -> u64 {
        u64::from_le_bytes(
            self.compiled[pc..pc + 8]
                .try_into()
                .expect("checked length"),
        )
    }

    /// f64 immediate at `pc`.
    #[must_use]
    pub fn f64imm(&self, pc: usize) -> f64 {
        f64::from_bits(self.word64(pc))
    }

    /// Literal reference operand at `pc`.
    #[must_use]
    pub fn litref(&self, pc: usize) -> LitRef {
        LitRef {
            offset: self.word32(pc),
            len: self.word32(pc + 4),
            tlv: self.compiled[pc + 8],
            header_len: self.compiled[pc + 9],
        }
    }

    /// Record an error; the first error wins.
    pub fn set_err(&mut self, err: BcError, pc: usize, info: u64) {
        if self.err == BcError::Ok {
            self.err = err;
            self.errpc = pc as u32;
            self.errinfo = info;
        }
    }

    pub fn clear_err(&mut self) {
        self.err = BcError::Ok;
        self.errpc = 0;
        self.errinfo = 0;
    }

    /// Reset scratch to the saved literal prefix.
    pub fn reset_scratch(&mut self) {
        self.scratch.truncate(self.savedlit.len());
    }

    /// Bytes still available in the arena this batch.
    #[must_use]
    pub fn scratch_remaining(&self) -> usize {
        self.scratch_cap.saturating_sub(self.scratch.len())
    }

    /// Append bytes to scratch, returning their virtual offset.
    /// Capacity must have been checked by the dispatcher.
    pub fn scratch_append(&mut self, bytes: &[u8]) -> u32 {
        let off = self.scratch.len() as u32;
        self.scratch.extend_from_slice(bytes);
        SCRATCH_BASE + off
    }

    /// Resolve a `(offset, length)` reference against the document
    /// buffer or the scratch arena.
    #[must_use]
    pub fn vmref<'a>(&'a self, buf: &'a [u8], offset: u32, len: u32) -> Option<&'a [u8]> {
        let len = len as usize;
        if offset >= SCRATCH_BASE {
            let start = (offset - SCRATCH_BASE) as usize;
            self.scratch.get(start..start + len)
        } else {
            let start = offset as usize;
            buf.get(start..start + len)
        }
    }

    /// Resolve a symbol id to its text span.
    #[must_use]
    pub fn symbol_text<'a>(&'a self, buf: &'a [u8], sym: u32) -> Option<&'a [u8]> {
        let &(off, len) = self.symtab.get(sym as usize)?;
        if len == 0 && sym != 0 {
            return None;
        }
        self.vmref(buf, off, len)
    }

    /// Clone the immutable image for another worker: same program,
    /// dictionary, literals, and shared aggregation handles; fresh
    /// register stack, scratch, and error state.
    #[must_use]
    pub fn clone_image(&self) -> Self {
        Self {
            compiled: self.compiled.clone(),
            dict: self.dict.clone(),
            hashsets: self.hashsets.clone(),
            symtab: self.symtab.clone(),
            savedlit: self.savedlit.clone(),
            auxvals: self.auxvals.clone(),
            vstack: vec![0; self.vstack.len()],
            scratch: self.savedlit.clone(),
            scratch_cap: self.scratch_cap,
            auxpos: 0,
            err: BcError::Ok,
            errpc: 0,
            errinfo: 0,
            vmstate: VmState::default(),
            agg: self.agg.clone(),
            aggtable: self.aggtable.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_bytecode() -> Bytecode {
        Bytecode {
            compiled: Vec::new(),
            dict: Vec::new(),
            hashsets: Vec::new(),
            symtab: Vec::new(),
            savedlit: Vec::new(),
            auxvals: Vec::new(),
            vstack: vec![0; 64],
            scratch: Vec::new(),
            scratch_cap: 256,
            auxpos: 0,
            err: BcError::Ok,
            errpc: 0,
            errinfo: 0,
            vmstate: VmState::default(),
            agg: None,
            aggtable: None,
        }
    }

    #[test]
    fn first_error_wins() {
        let mut bc = empty_bytecode();
        bc.set_err(BcError::Corrupt, 10, 1);
        bc.set_err(BcError::Trap, 20, 2);
        assert_eq!(bc.err, BcError::Corrupt);
        assert_eq!(bc.errpc, 10);
        assert_eq!(bc.errinfo, 1);
    }

    #[test]
    fn vmref_dispatches_on_virtual_base() {
        let mut bc = empty_bytecode();
        bc.scratch.extend_from_slice(b"scratchdata");
        let buf = b"documentbytes";
        assert_eq!(bc.vmref(buf, 0, 8).unwrap(), b"document");
        assert_eq!(bc.vmref(buf, SCRATCH_BASE, 7).unwrap(), b"scratch");
        assert!(bc.vmref(buf, 0, 100).is_none());
        assert!(bc.vmref(buf, SCRATCH_BASE + 8, 10).is_none());
    }

    #[test]
    fn scratch_reset_preserves_literal_prefix() {
        let mut bc = empty_bytecode();
        bc.savedlit = b"lit".to_vec();
        bc.scratch = b"lit".to_vec();
        bc.scratch_append(b"temp");
        assert_eq!(bc.scratch.len(), 7);
        bc.reset_scratch();
        assert_eq!(bc.scratch, b"lit");
    }

    #[test]
    fn clone_image_shares_nothing_mutable() {
        let mut bc = empty_bytecode();
        bc.compiled = vec![1, 2, 3, 4];
        bc.savedlit = b"x".to_vec();
        bc.scratch = b"xjunk".to_vec();
        bc.set_err(BcError::Trap, 2, 0);
        bc.auxpos = 9;
        let clone = bc.clone_image();
        assert_eq!(clone.compiled, bc.compiled);
        assert_eq!(clone.scratch, b"x");
        assert_eq!(clone.err, BcError::Ok);
        assert_eq!(clone.auxpos, 0);
    }
}
