//! Hashing and hash-table lookup opcodes.
//!
//! `hashvalue` folds a value's encoded bytes into a 128-bit lane hash
//! (xxh3); `hashvalue+` mixes an additional value into an existing
//! hash. `hashmember`/`hashlookup` probe tables the planner pre-built
//! into the program image.

use xxhash_rust::xxh3::{xxh3_128, xxh3_128_with_seed};

use crate::bytecode::{BcError, Bytecode};
use crate::reg::{lanes, HashReg, MaskReg, ValueReg};

fn lane_hash(bc: &Bytecode, buf: &[u8], v: &ValueReg, i: usize, seed: Option<u64>) -> Option<u128> {
    let mem = bc.vmref(buf, v.offsets[i], v.sizes[i])?;
    Some(match seed {
        Some(seed) => xxh3_128_with_seed(mem, seed),
        None => xxh3_128(mem),
    })
}

/// hashvalue: hash each lane's encoded bytes.
pub(crate) fn hashvalue(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = HashReg::default();
    for i in lanes(k.mask) {
        match lane_hash(bc, buf, &src, i, None) {
            Some(h) => out.set_value(i, h),
            None => {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break;
            }
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// hashvalue+: mix another value into an existing hash lane.
pub(crate) fn hashvalue_plus(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let prev = HashReg::load(&bc.vstack, bc.word(pc + 2));
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = prev;
    for i in lanes(k.mask) {
        match lane_hash(bc, buf, &src, i, Some(prev.lo[i])) {
            Some(h) => out.set_value(i, h),
            None => {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break;
            }
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 8
}

/// hashmember: test lane hashes against an immediate hash table.
pub(crate) fn hashmember(bc: &mut Bytecode, pc: usize) -> usize {
    let h = HashReg::load(&bc.vstack, bc.word(pc + 2));
    let table = bc.word(pc + 4) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(set) = bc.hashsets.get(table) else {
        bc.set_err(BcError::Corrupt, pc - 2, table as u64);
        return pc + 8;
    };
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if set.entries.contains_key(&h.value(i)) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// hashlookup: fetch the literal associated with each lane hash.
pub(crate) fn hashlookup(bc: &mut Bytecode, pc: usize) -> usize {
    let h = HashReg::load(&bc.vstack, bc.word(pc + 4));
    let table = bc.word(pc + 6) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(set) = bc.hashsets.get(table) else {
        bc.set_err(BcError::Corrupt, pc - 2, table as u64);
        return pc + 10;
    };
    let mut out = ValueReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if let Some(Some(lit)) = set.entries.get(&h.value(i)) {
            out.offsets[i] = lit.offset;
            out.sizes[i] = lit.len;
            out.type_l[i] = lit.tlv;
            out.header_size[i] = lit.header_len;
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}
