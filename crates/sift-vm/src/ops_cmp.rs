//! Same-type comparison opcodes.

use std::cmp::Ordering;

use crate::bytecode::{BcError, Bytecode};
use crate::reg::{lanes, BaseReg, MaskReg, ScalarReg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cmp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Cmp::Eq => ord == Ordering::Equal,
            Cmp::Lt => ord == Ordering::Less,
            Cmp::Le => ord != Ordering::Greater,
            Cmp::Gt => ord == Ordering::Greater,
            Cmp::Ge => ord != Ordering::Less,
        }
    }
}

/// cmp{eq,lt,le,gt,ge}.i64 and their @imm forms.
pub(crate) fn cmp_i64(bc: &mut Bytecode, pc: usize, imm: bool, cmp: Cmp) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let (b, imm_v, k_off) = if imm {
        (None, bc.word64(pc + 4) as i64, pc + 12)
    } else {
        (Some(ScalarReg::load(&bc.vstack, bc.word(pc + 4))), 0, pc + 6)
    };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let rhs = b.as_ref().map_or(imm_v, |r| r.i64(i));
        if cmp.holds(a.i64(i).cmp(&rhs)) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    if imm {
        pc + 14
    } else {
        pc + 8
    }
}

/// cmp{eq,lt,le,gt,ge}.f64 and their @imm forms. NaN compares as
/// unordered: no predicate holds.
pub(crate) fn cmp_f64(bc: &mut Bytecode, pc: usize, imm: bool, cmp: Cmp) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let (b, imm_v, k_off) = if imm {
        (None, bc.f64imm(pc + 4), pc + 12)
    } else {
        (
            Some(ScalarReg::load(&bc.vstack, bc.word(pc + 4))),
            0.0,
            pc + 6,
        )
    };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let rhs = b.as_ref().map_or(imm_v, |r| r.f64(i));
        if let Some(ord) = a.f64(i).partial_cmp(&rhs) {
            if cmp.holds(ord) {
                mask |= 1 << i;
            }
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    if imm {
        pc + 14
    } else {
        pc + 8
    }
}

/// cmp{lt,le,gt,ge}.str: lexicographic byte comparison of two string
/// slices.
pub(crate) fn cmp_str(bc: &mut Bytecode, buf: &[u8], pc: usize, cmp: Cmp) -> usize {
    let a = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let b = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let (Some(lhs), Some(rhs)) = (
            bc.vmref(buf, a.offsets[i], a.sizes[i]),
            bc.vmref(buf, b.offsets[i], b.sizes[i]),
        ) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        if cmp.holds(lhs.cmp(rhs)) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// cmpeq.slice: raw byte-span equality.
pub(crate) fn cmp_eq_slice(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    cmp_str(bc, buf, pc, Cmp::Eq)
}
