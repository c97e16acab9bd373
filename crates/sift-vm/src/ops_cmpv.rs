//! Polymorphic value comparison.
//!
//! `cmpv` and friends compare encoded values lane-wise, producing a
//! signed result in {-1, 0, 1} plus a mask of lanes that were
//! comparable. Each side's type code is first mapped to an internal
//! ordering key:
//!
//! - low nibble: ordering rank (used by sorting comparisons),
//! - `0x40`: non-comparable type,
//! - `0x80`: sorting semantics enabled.
//!
//! With matching keys, lanes fall through the stages null/bool (raw
//! TLV byte), numeric (i64/f64, mixed lanes promote the integer side),
//! then bytes after symbol resolution. With differing keys a lane is
//! masked out in matching mode or ordered by key difference in sorting
//! mode.

use std::cmp::Ordering;

use sift_ion::Type;

use crate::bytecode::{BcError, Bytecode, LitRef};
use crate::reg::{lanes, MaskReg, ScalarReg, ValueReg};

/// Matching-type predicate: no sorting semantics; only lanes whose
/// classes agree are comparable.
const KEYS_MATCHING: [u8; 16] = [
    0x00, 0x01, 0x02, 0x02, 0x02, 0x00, 0x03, 0x04, 0x04, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F,
];

/// Sorting predicate, NULLs before any other value.
const KEYS_NULLS_FIRST: [u8; 16] = [
    0x80, 0x81, 0x82, 0x82, 0x82, 0x80, 0x83, 0x84, 0x84, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// Sorting predicate, NULLs after any other value.
const KEYS_NULLS_LAST: [u8; 16] = [
    0x8F, 0x81, 0x82, 0x82, 0x82, 0x80, 0x83, 0x84, 0x84, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpvMode {
    Matching,
    SortNullsFirst,
    SortNullsLast,
}

impl CmpvMode {
    fn keys(self) -> &'static [u8; 16] {
        match self {
            CmpvMode::Matching => &KEYS_MATCHING,
            CmpvMode::SortNullsFirst => &KEYS_NULLS_FIRST,
            CmpvMode::SortNullsLast => &KEYS_NULLS_LAST,
        }
    }
}

/// One side of a lane comparison.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Side {
    pub offset: u32,
    pub size: u32,
    pub tlv: u8,
    pub hlen: u8,
}

impl Side {
    pub(crate) fn from_value(v: &ValueReg, lane: usize) -> Self {
        Self {
            offset: v.offsets[lane],
            size: v.sizes[lane],
            tlv: v.type_l[lane],
            hlen: v.header_size[lane],
        }
    }

    pub(crate) fn from_lit(lit: &LitRef) -> Self {
        Self {
            offset: lit.offset,
            size: lit.len,
            tlv: lit.tlv,
            hlen: lit.header_len,
        }
    }

    fn from_bool(value: bool) -> Self {
        Self {
            offset: 0,
            size: 1,
            tlv: (Type::Bool as u8) << 4 | u8::from(value),
            hlen: 1,
        }
    }

    fn type_code(&self) -> usize {
        (self.tlv >> 4) as usize
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    I(i64),
    F(f64),
}

impl Num {
    pub(crate) fn as_i64(self) -> i64 {
        match self {
            Num::I(v) => v,
            Num::F(v) => v as i64,
        }
    }

    pub(crate) fn as_f64(self) -> f64 {
        to_f64(self)
    }
}

fn magnitude(body: &[u8]) -> Option<u64> {
    if body.len() > 8 {
        return None;
    }
    let mut value: u64 = 0;
    for &b in body {
        value = (value << 8) | u64::from(b);
    }
    Some(value)
}

fn decode_num(bc: &Bytecode, buf: &[u8], side: &Side) -> Option<Num> {
    let mem = bc.vmref(buf, side.offset, side.size)?;
    let body = mem.get(side.hlen as usize..)?;
    match Type::from_tlv(side.tlv) {
        Type::Uint => {
            let mag = magnitude(body)?;
            Some(if mag <= i64::MAX as u64 {
                Num::I(mag as i64)
            } else {
                Num::F(mag as f64)
            })
        }
        Type::NegInt => {
            let mag = magnitude(body)?;
            Some(if mag <= (i64::MAX as u64) + 1 {
                Num::I((mag as i64).wrapping_neg())
            } else {
                Num::F(-(mag as f64))
            })
        }
        Type::Float => {
            let v = match body.len() {
                0 => 0.0,
                4 => f64::from(f32::from_be_bytes(body.try_into().ok()?)),
                8 => f64::from_be_bytes(body.try_into().ok()?),
                _ => return None,
            };
            Some(Num::F(v))
        }
        _ => None,
    }
}

fn cmp_num(a: Num, b: Num) -> Ordering {
    match (a, b) {
        (Num::I(x), Num::I(y)) => x.cmp(&y),
        // Mixed lanes promote the integer side to f64.
        (x, y) => to_f64(x).total_cmp(&to_f64(y)),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::I(v) => v as f64,
        Num::F(v) => v,
    }
}

/// Body bytes of a side, resolving symbols through the VM symbol table.
fn content_bytes<'a>(bc: &'a Bytecode, buf: &'a [u8], side: &Side) -> Option<&'a [u8]> {
    if Type::from_tlv(side.tlv) == Type::Symbol {
        let mem = bc.vmref(buf, side.offset, side.size)?;
        let body = mem.get(side.hlen as usize..)?;
        let sym = u32::try_from(magnitude(body)?).ok()?;
        let encoded = bc.symbol_text(buf, sym)?;
        let hlen = sift_ion::header_size_of(encoded).ok()?;
        return encoded.get(hlen..);
    }
    let mem = bc.vmref(buf, side.offset, side.size)?;
    mem.get(side.hlen as usize..)
}

/// Compare one lane. `None` means the lane is not comparable and must
/// be masked out.
pub(crate) fn cmpv_lane(
    bc: &Bytecode,
    buf: &[u8],
    l: &Side,
    r: &Side,
    mode: CmpvMode,
) -> Option<i32> {
    if l.size == 0 || r.size == 0 {
        return None;
    }
    let keys = mode.keys();
    let lkey = keys[l.type_code()];
    let rkey = keys[r.type_code()];
    if (lkey | rkey) & 0x40 != 0 {
        return None;
    }
    if lkey != rkey {
        // Differing classes only order under sorting semantics.
        if lkey & rkey & 0x80 != 0 {
            return Some(i32::from(lkey & 0x0F).cmp(&i32::from(rkey & 0x0F)) as i32);
        }
        return None;
    }
    let (lt, rt) = (l.type_code(), r.type_code());
    if lt <= 1 && rt <= 1 {
        // Null and bool compare by raw TLV byte.
        return Some(sign(i32::from(l.tlv) - i32::from(r.tlv)));
    }
    if (2..=4).contains(&lt) && (2..=4).contains(&rt) {
        let a = decode_num(bc, buf, l)?;
        let b = decode_num(bc, buf, r)?;
        return Some(cmp_num(a, b) as i32);
    }
    // Strings, timestamps, and anything else with matching classes
    // compare as byte sequences after symbol resolution.
    let a = content_bytes(bc, buf, l)?;
    let b = content_bytes(bc, buf, r)?;
    Some(a.cmp(b) as i32)
}

fn sign(v: i32) -> i32 {
    v.signum()
}

/// cmpv / sortcmpv@nf / sortcmpv@nl.
pub(crate) fn cmpv(bc: &mut Bytecode, buf: &[u8], pc: usize, mode: CmpvMode) -> usize {
    let lv = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let rv = ValueReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let l = Side::from_value(&lv, i);
        let r = Side::from_value(&rv, i);
        if let Some(res) = cmpv_lane(bc, buf, &l, &r, mode) {
            out.set_i64(i, i64::from(res));
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// cmpv.k and cmpv.k@imm: left value against a per-lane bool.
pub(crate) fn cmpv_k(bc: &mut Bytecode, buf: &[u8], pc: usize, imm: bool) -> usize {
    let lv = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let rmask = if imm {
        bc.word(pc + 6)
    } else {
        MaskReg::load(&bc.vstack, bc.word(pc + 6)).mask
    };
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let l = Side::from_value(&lv, i);
        let r = Side::from_bool(rmask & (1 << i) != 0);
        if let Some(res) = cmpv_lane(bc, buf, &l, &r, CmpvMode::Matching) {
            out.set_i64(i, i64::from(res));
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// cmpv.i64 / cmpv.f64 and their @imm forms: left value against a
/// scalar; only numeric lanes are comparable.
pub(crate) fn cmpv_scalar(
    bc: &mut Bytecode,
    buf: &[u8],
    pc: usize,
    imm: bool,
    float: bool,
) -> usize {
    let lv = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let (rhs_reg, k_off) = if imm {
        (None, pc + 14)
    } else {
        (Some(ScalarReg::load(&bc.vstack, bc.word(pc + 6))), pc + 8)
    };
    let imm_bits = if imm { bc.word64(pc + 6) } else { 0 };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let l = Side::from_value(&lv, i);
        if l.size == 0 {
            continue;
        }
        let Some(a) = decode_num(bc, buf, &l) else {
            continue;
        };
        let bits = rhs_reg.as_ref().map_or(imm_bits, |r| r.bits[i]);
        let b = if float {
            Num::F(f64::from_bits(bits))
        } else {
            Num::I(bits as i64)
        };
        out.set_i64(i, cmp_num(a, b) as i32 as i64);
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    if imm {
        pc + 16
    } else {
        pc + 10
    }
}

/// Decode a numeric side; shared with the unboxing opcodes.
pub(crate) fn decode_num_pub(bc: &Bytecode, buf: &[u8], side: &Side) -> Option<Num> {
    decode_num(bc, buf, side)
}

/// Semantic lane equality; shared with `arrayposition`.
pub(crate) fn values_equal_pub(bc: &Bytecode, buf: &[u8], l: &Side, r: &Side) -> bool {
    values_equal(bc, buf, l, r)
}

fn values_equal(bc: &Bytecode, buf: &[u8], l: &Side, r: &Side) -> bool {
    match cmpv_lane(bc, buf, l, r, CmpvMode::Matching) {
        Some(res) => res == 0,
        // Containers and blobs fall back to raw byte equality.
        None => match (
            bc.vmref(buf, l.offset, l.size),
            bc.vmref(buf, r.offset, r.size),
        ) {
            (Some(a), Some(b)) => !a.is_empty() && a == b,
            _ => false,
        },
    }
}

/// cmpeq.v: semantic value equality.
pub(crate) fn cmpeq_v(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let lv = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let rv = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let l = Side::from_value(&lv, i);
        let r = Side::from_value(&rv, i);
        if values_equal(bc, buf, &l, &r) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// cmpeq.v@imm: equality against a pool literal.
pub(crate) fn cmpeq_v_imm(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let lv = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let lit = bc.litref(pc + 4);
    let r = Side::from_lit(&lit);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 14));
    if bc.vmref(buf, lit.offset, lit.len).is_none() {
        bc.set_err(BcError::Corrupt, pc - 2, u64::from(lit.offset));
        return pc + 16;
    }
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let l = Side::from_value(&lv, i);
        if values_equal(bc, buf, &l, &r) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 16
}
