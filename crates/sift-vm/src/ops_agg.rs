//! Aggregation opcodes.
//!
//! Non-grouped forms combine every live lane into one slot; grouped
//! (`aggslot*`) forms index the slot buffer through a bucket register
//! produced by `aggbucket`. Slot operands are byte offsets into the
//! shared [`AggBuffer`]; the combine primitives are atomic, so lanes
//! from concurrent workers interleave safely once a bucket exists.

use std::sync::Arc;

use crate::aggtable::AggBuffer;
use crate::bytecode::{BcError, Bytecode};
use crate::hll;
use crate::reg::{lanes, BucketReg, HashReg, MaskReg, ScalarReg};

/// The combine operation of a (grouped or plain) aggregation opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggOp {
    SumI64,
    SumF64,
    MinI64,
    MinF64,
    MaxI64,
    MaxF64,
    AndI64,
    OrI64,
    XorI64,
    /// Sum plus a count word in the adjacent cell.
    AvgI64,
    AvgF64,
}

fn agg_of(bc: &mut Bytecode, pc: usize) -> Option<Arc<AggBuffer>> {
    match &bc.agg {
        Some(agg) => Some(Arc::clone(agg)),
        None => {
            bc.set_err(BcError::Corrupt, pc - 2, 0);
            None
        }
    }
}

fn apply(agg: &AggBuffer, op: AggOp, cell: usize, bits: u64) {
    match op {
        AggOp::SumI64 => agg.add_i64(cell, bits as i64),
        AggOp::SumF64 => agg.add_f64(cell, f64::from_bits(bits)),
        AggOp::MinI64 => agg.min_i64(cell, bits as i64),
        AggOp::MinF64 => agg.min_f64(cell, f64::from_bits(bits)),
        AggOp::MaxI64 => agg.max_i64(cell, bits as i64),
        AggOp::MaxF64 => agg.max_f64(cell, f64::from_bits(bits)),
        AggOp::AndI64 => agg.and_u64(cell, bits),
        AggOp::OrI64 => agg.or_u64(cell, bits),
        AggOp::XorI64 => agg.xor_u64(cell, bits),
        AggOp::AvgI64 => {
            agg.add_i64(cell, bits as i64);
            agg.add_i64(cell + 1, 1);
        }
        AggOp::AvgF64 => {
            agg.add_f64(cell, f64::from_bits(bits));
            agg.add_i64(cell + 1, 1);
        }
    }
}

/// aggsum/aggmin/aggmax/aggand/aggor/aggxor over a scalar register.
pub(crate) fn agg_scalar(bc: &mut Bytecode, pc: usize, op: AggOp) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(agg) = agg_of(bc, pc) else { return pc + 8 };
    for i in lanes(k.mask) {
        apply(&agg, op, slot, src.bits[i]);
    }
    pc + 8
}

/// aggand.k / aggor.k: fold a mask register into a slot.
pub(crate) fn agg_mask(bc: &mut Bytecode, pc: usize, and: bool) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let src = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(agg) = agg_of(bc, pc) else { return pc + 8 };
    for i in lanes(k.mask) {
        let bit = src.mask & (1 << i) != 0;
        if and {
            agg.and_u64(slot, if bit { u64::MAX } else { 0 });
        } else {
            agg.or_u64(slot, u64::from(bit));
        }
    }
    pc + 8
}

/// aggcount: popcount of the live lanes.
pub(crate) fn agg_count(bc: &mut Bytecode, pc: usize) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let Some(agg) = agg_of(bc, pc) else { return pc + 6 };
    agg.add_i64(slot, i64::from(k.mask.count_ones()));
    pc + 6
}

/// aggapproxcount: fold lane hashes into the HLL registers.
pub(crate) fn agg_approx_count(bc: &mut Bytecode, pc: usize) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let h = HashReg::load(&bc.vstack, bc.word(pc + 4));
    let precision = bc.word(pc + 6);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(agg) = agg_of(bc, pc) else { return pc + 10 };
    for i in lanes(k.mask) {
        hll::update(&agg, slot, precision, h.lo[i]);
    }
    pc + 10
}

/// aggapproxcountmerge: byte-max a serialised register array (a string
/// slice lane) into the HLL slot.
pub(crate) fn agg_approx_count_merge(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let src = crate::reg::BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let precision = bc.word(pc + 6);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(agg) = agg_of(bc, pc) else { return pc + 10 };
    for i in lanes(k.mask) {
        let Some(registers) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        hll::merge(&agg, slot, precision, registers);
    }
    pc + 10
}

/// aggbucket: map lane hashes to bucket indices, appending new buckets
/// under the table lock. Lanes that cannot be placed are dropped from
/// the mask the driver sees via the bucket sentinel.
pub(crate) fn agg_bucket(bc: &mut Bytecode, pc: usize) -> usize {
    let h = HashReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let Some(table) = bc.aggtable.clone() else {
        bc.set_err(BcError::Corrupt, pc - 2, 0);
        return pc + 6;
    };
    let mut out = BucketReg::default();
    for i in 0..crate::reg::LANE_COUNT {
        out.indices[i] = u32::MAX;
        if k.mask & (1 << i) == 0 {
            continue;
        }
        if let Some(bucket) = table.bucket(h.lo[i]) {
            out.indices[i] = bucket;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// aggslot* scalar forms: the bucket register picks the slot group.
pub(crate) fn agg_slot_scalar(bc: &mut Bytecode, pc: usize, op: AggOp) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let buckets = BucketReg::load(&bc.vstack, bc.word(pc + 4));
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(agg) = agg_of(bc, pc) else { return pc + 10 };
    for i in lanes(k.mask) {
        if buckets.indices[i] == u32::MAX {
            continue;
        }
        let cell = agg.grouped_cell(slot, buckets.indices[i]);
        apply(&agg, op, cell, src.bits[i]);
    }
    pc + 10
}

/// aggslotand.k / aggslotor.k.
pub(crate) fn agg_slot_mask(bc: &mut Bytecode, pc: usize, and: bool) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let buckets = BucketReg::load(&bc.vstack, bc.word(pc + 4));
    let src = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(agg) = agg_of(bc, pc) else { return pc + 10 };
    for i in lanes(k.mask) {
        if buckets.indices[i] == u32::MAX {
            continue;
        }
        let cell = agg.grouped_cell(slot, buckets.indices[i]);
        let bit = src.mask & (1 << i) != 0;
        if and {
            agg.and_u64(cell, if bit { u64::MAX } else { 0 });
        } else {
            agg.or_u64(cell, u64::from(bit));
        }
    }
    pc + 10
}

/// aggslotcount.
pub(crate) fn agg_slot_count(bc: &mut Bytecode, pc: usize) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let buckets = BucketReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(agg) = agg_of(bc, pc) else { return pc + 8 };
    for i in lanes(k.mask) {
        if buckets.indices[i] == u32::MAX {
            continue;
        }
        agg.add_i64(agg.grouped_cell(slot, buckets.indices[i]), 1);
    }
    pc + 8
}

/// aggslotapproxcount.
pub(crate) fn agg_slot_approx_count(bc: &mut Bytecode, pc: usize) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let buckets = BucketReg::load(&bc.vstack, bc.word(pc + 4));
    let h = HashReg::load(&bc.vstack, bc.word(pc + 6));
    let precision = bc.word(pc + 8);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let Some(agg) = agg_of(bc, pc) else { return pc + 12 };
    for i in lanes(k.mask) {
        if buckets.indices[i] == u32::MAX {
            continue;
        }
        hll::update(&agg, agg.grouped_cell(slot, buckets.indices[i]), precision, h.lo[i]);
    }
    pc + 12
}

/// aggslotapproxcountmerge.
pub(crate) fn agg_slot_approx_count_merge(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let slot = bc.word32(pc) as usize / 8;
    let buckets = BucketReg::load(&bc.vstack, bc.word(pc + 4));
    let src = crate::reg::BaseReg::load(&bc.vstack, bc.word(pc + 6));
    let precision = bc.word(pc + 8);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let Some(agg) = agg_of(bc, pc) else { return pc + 12 };
    for i in lanes(k.mask) {
        if buckets.indices[i] == u32::MAX {
            continue;
        }
        let Some(registers) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        hll::merge(&agg, agg.grouped_cell(slot, buckets.indices[i]), precision, registers);
    }
    pc + 12
}
