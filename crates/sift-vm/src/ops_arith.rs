//! Integer and float arithmetic, bitwise, and conversion opcodes.
//!
//! All handlers are portable tight loops over the lane arrays. Masked
//! lanes are overwritten with zero, which satisfies every register
//! invariant. Integer overflow wraps; float operations follow IEEE-754;
//! a zero divisor clears the lane from the output mask (MISSING), it
//! never raises.

use crate::bytecode::Bytecode;
use crate::reg::{lanes, MaskReg, ScalarReg};

// ── layout helpers ──────────────────────────────────────────────────────────
//
// Shapes follow the operand tables:
//   SK_SSK   out[S K]  in[S S K]        width 10
//   SK_SIK   out[S K]  in[S imm K]      width 16
//   S_SSK    out[S]    in[S S K]        width 8
//   S_SIK    out[S]    in[S imm K]      width 14
//   SK_SK    out[S K]  in[S K]          width 8
//   S_SK     out[S]    in[S K]          width 6

/// Binary op with mask output; `None` result clears the lane (MISSING).
fn binary_masked(
    bc: &mut Bytecode,
    pc: usize,
    imm: bool,
    f: impl Fn(u64, u64) -> Option<u64>,
) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let (b, k_off) = if imm {
        (None, pc + 14)
    } else {
        (Some(ScalarReg::load(&bc.vstack, bc.word(pc + 6))), pc + 8)
    };
    let imm_bits = if imm { bc.word64(pc + 6) } else { 0 };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let rhs = b.as_ref().map_or(imm_bits, |r| r.bits[i]);
        if let Some(v) = f(a.bits[i], rhs) {
            out.bits[i] = v;
            mask |= 1 << i;
        }
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

/// Binary op without a mask output (bitwise family, min/max).
fn binary_plain(bc: &mut Bytecode, pc: usize, imm: bool, f: impl Fn(u64, u64) -> u64) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let (b, k_off) = if imm {
        (None, pc + 12)
    } else {
        (Some(ScalarReg::load(&bc.vstack, bc.word(pc + 4))), pc + 6)
    };
    let imm_bits = if imm { bc.word64(pc + 4) } else { 0 };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let rhs = b.as_ref().map_or(imm_bits, |r| r.bits[i]);
        out.bits[i] = f(a.bits[i], rhs);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    if imm {
        pc + 14
    } else {
        pc + 8
    }
}

/// Unary op with mask output.
fn unary_masked(bc: &mut Bytecode, pc: usize, f: impl Fn(u64) -> Option<u64>) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if let Some(v) = f(a.bits[i]) {
            out.bits[i] = v;
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// Unary op without a mask output.
fn unary_plain(bc: &mut Bytecode, pc: usize, f: impl Fn(u64) -> u64) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.bits[i] = f(a.bits[i]);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

#[inline]
fn i(bits: u64) -> i64 {
    bits as i64
}

#[inline]
fn f(bits: u64) -> f64 {
    f64::from_bits(bits)
}

#[inline]
fn ib(v: i64) -> u64 {
    v as u64
}

#[inline]
fn fb(v: f64) -> u64 {
    v.to_bits()
}

// ── integer arithmetic ──────────────────────────────────────────────────────

pub(crate) fn abs_i64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(ib(i(a).wrapping_abs())))
}

pub(crate) fn neg_i64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(ib(i(a).wrapping_neg())))
}

pub(crate) fn sign_i64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(ib(i(a).signum())))
}

pub(crate) fn square_i64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(ib(i(a).wrapping_mul(i(a)))))
}

pub(crate) fn bitnot_i64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| !a)
}

pub(crate) fn bitcount_i64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| u64::from(a.count_ones()))
}

pub(crate) fn add_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(ib(i(a).wrapping_add(i(b)))))
}

pub(crate) fn sub_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(ib(i(a).wrapping_sub(i(b)))))
}

pub(crate) fn rsub_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(ib(i(b).wrapping_sub(i(a)))))
}

pub(crate) fn mul_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(ib(i(a).wrapping_mul(i(b)))))
}

pub(crate) fn div_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| {
        (i(b) != 0).then(|| ib(i(a).wrapping_div(i(b))))
    })
}

pub(crate) fn rdiv_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| {
        (i(a) != 0).then(|| ib(i(b).wrapping_div(i(a))))
    })
}

pub(crate) fn mod_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| {
        (i(b) != 0).then(|| ib(i(a).wrapping_rem(i(b))))
    })
}

pub(crate) fn rmod_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| {
        (i(a) != 0).then(|| ib(i(b).wrapping_rem(i(a))))
    })
}

/// addmul.i64@imm: out = a + b * imm.
pub(crate) fn addmul_i64_imm(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let b = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let imm = bc.word64(pc + 8) as i64;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 16));
    let mut out = ScalarReg::default();
    for i_lane in lanes(k.mask) {
        out.set_i64(
            i_lane,
            i(a.bits[i_lane]).wrapping_add(i(b.bits[i_lane]).wrapping_mul(imm)),
        );
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    pc + 18
}

pub(crate) fn min_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| ib(i(a).min(i(b))))
}

pub(crate) fn max_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| ib(i(a).max(i(b))))
}

pub(crate) fn and_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| a & b)
}

pub(crate) fn or_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| a | b)
}

pub(crate) fn xor_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| a ^ b)
}

pub(crate) fn sll_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| a << (b & 63))
}

pub(crate) fn sra_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| ib(i(a) >> (b & 63)))
}

pub(crate) fn srl_i64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| a >> (b & 63))
}

// ── float arithmetic ────────────────────────────────────────────────────────

pub(crate) fn abs_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(fb(f(a).abs())))
}

pub(crate) fn neg_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(fb(-f(a))))
}

pub(crate) fn sign_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| {
        let v = f(a);
        Some(fb(if v == 0.0 || v.is_nan() { v } else { v.signum() }))
    })
}

pub(crate) fn square_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| fb(f(a) * f(a)))
}

pub(crate) fn round_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| fb(f(a).round()))
}

pub(crate) fn roundeven_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| {
        let v = f(a);
        // Ties to even without relying on unstable intrinsics.
        let r = v.round();
        let adjusted = if (v - v.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
            r - v.signum()
        } else {
            r
        };
        fb(adjusted)
    })
}

pub(crate) fn trunc_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| fb(f(a).trunc()))
}

pub(crate) fn floor_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| fb(f(a).floor()))
}

pub(crate) fn ceil_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_plain(bc, pc, |a| fb(f(a).ceil()))
}

pub(crate) fn add_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(fb(f(a) + f(b))))
}

pub(crate) fn sub_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(fb(f(a) - f(b))))
}

pub(crate) fn rsub_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(fb(f(b) - f(a))))
}

pub(crate) fn mul_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| Some(fb(f(a) * f(b))))
}

pub(crate) fn div_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| (f(b) != 0.0).then(|| fb(f(a) / f(b))))
}

pub(crate) fn rdiv_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| (f(a) != 0.0).then(|| fb(f(b) / f(a))))
}

pub(crate) fn mod_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| (f(b) != 0.0).then(|| fb(f(a) % f(b))))
}

pub(crate) fn rmod_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_masked(bc, pc, imm, |a, b| (f(a) != 0.0).then(|| fb(f(b) % f(a))))
}

pub(crate) fn min_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| fb(f(a).min(f(b))))
}

pub(crate) fn max_f64(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    binary_plain(bc, pc, imm, |a, b| fb(f(a).max(f(b))))
}

/// Unary float math (sqrt, cbrt, exp, trig, logs).
pub(crate) fn unary_f64(bc: &mut Bytecode, pc: usize, op: fn(f64) -> f64) -> usize {
    unary_masked(bc, pc, |a| Some(fb(op(f(a)))))
}

/// Binary float math (atan2, hypot, pow).
pub(crate) fn binary_f64(bc: &mut Bytecode, pc: usize, op: fn(f64, f64) -> f64) -> usize {
    binary_masked(bc, pc, false, |a, b| Some(fb(op(f(a), f(b)))))
}

/// powuint.f64: integer exponent power.
pub(crate) fn powuint_f64(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let imm = bc.word64(pc + 4) as i64;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 12));
    let mut out = ScalarReg::default();
    for lane in lanes(k.mask) {
        let exp = i32::try_from(imm).unwrap_or(if imm < 0 { i32::MIN } else { i32::MAX });
        out.set_f64(lane, f(a.bits[lane]).powi(exp));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 14
}

// ── conversions ─────────────────────────────────────────────────────────────

pub(crate) fn cvt_k_to_i64(bc: &mut Bytecode, pc: usize) -> usize {
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let mut out = ScalarReg::default();
    for i_lane in lanes(k.mask) {
        out.set_i64(i_lane, 1);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 4
}

pub(crate) fn cvt_k_to_f64(bc: &mut Bytecode, pc: usize) -> usize {
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let mut out = ScalarReg::default();
    for i_lane in lanes(k.mask) {
        out.set_f64(i_lane, 1.0);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 4
}

pub(crate) fn cvt_i64_to_k(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut mask = 0u16;
    for i_lane in lanes(k.mask) {
        if a.i64(i_lane) != 0 {
            mask |= 1 << i_lane;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 6
}

pub(crate) fn cvt_f64_to_k(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut mask = 0u16;
    for i_lane in lanes(k.mask) {
        if a.f64(i_lane) != 0.0 {
            mask |= 1 << i_lane;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 6
}

pub(crate) fn cvt_i64_to_f64(bc: &mut Bytecode, pc: usize) -> usize {
    unary_masked(bc, pc, |a| Some(fb(i(a) as f64)))
}

pub(crate) fn cvt_f64_to_i64(bc: &mut Bytecode, pc: usize, round: fn(f64) -> f64) -> usize {
    unary_masked(bc, pc, move |a| {
        let v = round(f(a));
        if v.is_nan() {
            None
        } else {
            Some(ib(v as i64))
        }
    })
}

pub(crate) fn is_nan_f(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut mask = 0u16;
    for i_lane in lanes(k.mask) {
        if a.f64(i_lane).is_nan() {
            mask |= 1 << i_lane;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 6
}
