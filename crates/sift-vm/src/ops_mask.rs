//! Control, mask-algebra, and register-move opcodes.

use crate::bytecode::{BcError, Bytecode};
use crate::reg::{lanes, BaseReg, HashReg, MaskReg, ScalarReg, ValueReg};

pub(crate) fn init(bc: &mut Bytecode, pc: usize) -> usize {
    let delims = bc.word(pc);
    let mask = bc.word(pc + 2);
    bc.clear_err();
    let d = bc.vmstate.delims;
    d.store(&mut bc.vstack, delims);
    MaskReg {
        mask: bc.vmstate.valid_lanes.mask,
    }
    .store(&mut bc.vstack, mask);
    pc + 4
}

pub(crate) fn trap(bc: &mut Bytecode, pc: usize) -> usize {
    bc.set_err(BcError::Trap, pc - 2, 0);
    pc
}

pub(crate) fn ret(bc: &mut Bytecode, pc: usize) -> usize {
    bc.clear_err();
    bc.vmstate.output_lanes.mask = bc.vmstate.valid_lanes.mask;
    bc.auxpos += bc.vmstate.output_lanes.mask.count_ones() as usize;
    pc
}

pub(crate) fn ret_k(bc: &mut Bytecode, pc: usize) -> usize {
    let k = MaskReg::load(&bc.vstack, bc.word(pc));
    bc.vmstate.output_lanes = k;
    bc.auxpos += bc.vmstate.valid_lanes.mask.count_ones() as usize;
    pc + 2
}

pub(crate) fn ret_b_k(bc: &mut Bytecode, pc: usize) -> usize {
    let b = BaseReg::load(&bc.vstack, bc.word(pc));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    bc.vmstate.delims = b;
    bc.vmstate.output_lanes = k;
    bc.auxpos += bc.vmstate.valid_lanes.mask.count_ones() as usize;
    pc + 4
}

pub(crate) fn ret_s_k(bc: &mut Bytecode, pc: usize) -> usize {
    let s = BaseReg::load(&bc.vstack, bc.word(pc));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    bc.vmstate.sreg = s;
    bc.vmstate.output_lanes = k;
    bc.auxpos += bc.vmstate.valid_lanes.mask.count_ones() as usize;
    pc + 4
}

pub(crate) fn ret_b_h_k(bc: &mut Bytecode, pc: usize) -> usize {
    let b = BaseReg::load(&bc.vstack, bc.word(pc));
    let h = HashReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    bc.vmstate.delims = b;
    bc.vmstate.hreg = h;
    bc.vmstate.output_lanes = k;
    bc.auxpos += bc.vmstate.valid_lanes.mask.count_ones() as usize;
    pc + 6
}

pub(crate) fn broadcast0_k(bc: &mut Bytecode, pc: usize) -> usize {
    let off = bc.word(pc);
    MaskReg { mask: 0 }.store(&mut bc.vstack, off);
    pc + 2
}

pub(crate) fn broadcast1_k(bc: &mut Bytecode, pc: usize) -> usize {
    let off = bc.word(pc);
    MaskReg {
        mask: bc.vmstate.valid_lanes.mask,
    }
    .store(&mut bc.vstack, off);
    pc + 2
}

pub(crate) fn false_k(bc: &mut Bytecode, pc: usize) -> usize {
    let off = bc.word(pc);
    ValueReg::default().store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: 0 }.store(&mut bc.vstack, off);
    pc + 4
}

pub(crate) fn not_k(bc: &mut Bytecode, pc: usize) -> usize {
    let src = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let off = bc.word(pc);
    MaskReg {
        mask: !src.mask & bc.vmstate.valid_lanes.mask,
    }
    .store(&mut bc.vstack, off);
    pc + 4
}

pub(crate) fn mov_k(bc: &mut Bytecode, pc: usize) -> usize {
    let src = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let off = bc.word(pc);
    src.store(&mut bc.vstack, off);
    pc + 4
}

/// Two-operand mask algebra: and.k, andn.k, or.k, xor.k, xnor.k.
pub(crate) fn mask_binary(
    bc: &mut Bytecode,
    pc: usize,
    f: fn(u16, u16) -> u16,
) -> usize {
    let a = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let b = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mask = f(a.mask, b.mask) & bc.vmstate.valid_lanes.mask;
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 6
}

/// Lane-wise boolean comparison: cmplt.k and friends.
pub(crate) fn mask_compare(
    bc: &mut Bytecode,
    pc: usize,
    imm: bool,
    f: fn(bool, bool) -> bool,
) -> usize {
    let a = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let b = if imm {
        bc.word(pc + 4)
    } else {
        MaskReg::load(&bc.vstack, bc.word(pc + 4)).mask
    };
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = 0u16;
    for i in lanes(k.mask) {
        if f(a.mask & (1 << i) != 0, b & (1 << i) != 0) {
            out |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask: out }.store(&mut bc.vstack, off);
    pc + 8
}

pub(crate) fn zero_v(bc: &mut Bytecode, pc: usize) -> usize {
    let off = bc.word(pc);
    ValueReg::default().store(&mut bc.vstack, off);
    pc + 2
}

pub(crate) fn mov_v(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        out.offsets[i] = src.offsets[i];
        out.sizes[i] = src.sizes[i];
        out.type_l[i] = src.type_l[i];
        out.header_size[i] = src.header_size[i];
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

pub(crate) fn mov_v_k(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let off = bc.word(pc);
    src.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    k.store(&mut bc.vstack, off);
    pc + 8
}

/// mov.f64 / mov.i64 share one implementation: lanes are copied as raw
/// bits under the mask.
pub(crate) fn mov_s(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.bits[i] = src.bits[i];
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// blend.v: merge two value registers; the second input wins where its
/// mask is set.
pub(crate) fn blend_v(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let ak = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let b = ValueReg::load(&bc.vstack, bc.word(pc + 8));
    let bk = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let mut out = ValueReg::default();
    for i in 0..crate::reg::LANE_COUNT {
        let from = if bk.mask & (1 << i) != 0 {
            &b
        } else if ak.mask & (1 << i) != 0 {
            &a
        } else {
            continue;
        };
        out.offsets[i] = from.offsets[i];
        out.sizes[i] = from.sizes[i];
        out.type_l[i] = from.type_l[i];
        out.header_size[i] = from.header_size[i];
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg {
        mask: ak.mask | bk.mask,
    }
    .store(&mut bc.vstack, off);
    pc + 12
}

pub(crate) fn blend_f64(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let ak = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let b = ScalarReg::load(&bc.vstack, bc.word(pc + 8));
    let bk = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let mut out = ScalarReg::default();
    for i in 0..crate::reg::LANE_COUNT {
        if bk.mask & (1 << i) != 0 {
            out.bits[i] = b.bits[i];
        } else if ak.mask & (1 << i) != 0 {
            out.bits[i] = a.bits[i];
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg {
        mask: ak.mask | bk.mask,
    }
    .store(&mut bc.vstack, off);
    pc + 12
}

pub(crate) fn broadcast_i64(bc: &mut Bytecode, pc: usize) -> usize {
    let imm = bc.word64(pc + 2) as i64;
    let mut out = ScalarReg::default();
    for i in 0..crate::reg::LANE_COUNT {
        out.set_i64(i, imm);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 10
}

pub(crate) fn broadcast_f64(bc: &mut Bytecode, pc: usize) -> usize {
    let imm = bc.f64imm(pc + 2);
    let mut out = ScalarReg::default();
    for i in 0..crate::reg::LANE_COUNT {
        out.set_f64(i, imm);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 10
}
