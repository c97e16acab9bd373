//! Dispatch loop and row drivers.
//!
//! [`eval_batch`] runs one batch of up to [`LANE_COUNT`] rows through
//! the compiled program, growing scratch and resuming from the failing
//! PC on `MoreScratch`. The drivers own the batching loop: filter,
//! project, splat, dedup, and aggregate, mirroring the row-driver
//! protocols of §4.6.

use sift_error::SiftError;
use sift_ion::{size_of, tlv_header_len, varuint_len, write_varuint, SymbolId, Type};

use crate::bytecode::{BcError, Bytecode};
use crate::ops::{Opcode, PAGE_SIZE};
use crate::ops_agg::AggOp;
use crate::ops_arith as arith;
use crate::ops_cmp::Cmp;
use crate::ops_cmpv::CmpvMode;
use crate::ops_pattern::{Fold, Where};
use crate::ops_string::Side as TrimSide;
use crate::ops_time::DateField;
use crate::ops_value::{UnboxMode, ValueTest};
use crate::radix::RadixTree64;
use crate::reg::{BaseReg, LaneMask, ALL_LANES, LANE_COUNT};
use crate::{
    dfa, ops_agg, ops_box, ops_cmp, ops_cmpv, ops_geo, ops_hash, ops_mask, ops_pattern,
    ops_string, ops_time, ops_value,
};

/// Runtime SIMD capability label, reported in driver spans. The
/// portable loops below are written to auto-vectorise; there is no
/// hand-written vector code.
#[must_use]
pub fn simd_path_label() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return "avx2";
        }
        if is_x86_feature_detected!("sse2") {
            return "sse2";
        }
    }
    "scalar"
}

/// Execute instructions starting at `start_pc` until the end of the
/// stream or an error.
fn eval_from(bc: &mut Bytecode, buf: &[u8], start_pc: usize) {
    let len = bc.compiled.len();
    let mut pc = start_pc;
    while pc < len && bc.err == BcError::Ok {
        let tag = bc.word(pc);
        let Some(op) = Opcode::from_u16(tag) else {
            bc.set_err(BcError::NotSupported, pc, u64::from(tag));
            return;
        };
        pc += 2;
        // The dispatcher checks the declared scratch requirement before
        // the handler runs; handlers with page-sized requirements may
        // still report MoreScratch mid-batch.
        let need = op.info().scratch.bytes();
        if need > bc.scratch_remaining() {
            bc.set_err(BcError::MoreScratch, pc - 2, need as u64);
            return;
        }
        pc = dispatch(bc, buf, op, pc);
    }
}

/// Run one batch from PC 0, growing scratch and resuming on demand.
fn eval_batch(bc: &mut Bytecode, buf: &[u8]) -> Result<(), SiftError> {
    bc.clear_err();
    bc.reset_scratch();
    let mut start_pc = 0usize;
    loop {
        eval_from(bc, buf, start_pc);
        match bc.err {
            BcError::Ok => return Ok(()),
            BcError::MoreScratch => {
                let needed = (bc.errinfo as usize).max(PAGE_SIZE);
                bc.scratch_cap = bc
                    .scratch_cap
                    .max(bc.scratch.len() + needed)
                    .saturating_mul(2);
                start_pc = bc.errpc as usize;
                bc.clear_err();
            }
            BcError::Trap => {
                return Err(SiftError::Trap {
                    pc: bc.errpc as usize,
                })
            }
            err => {
                return Err(SiftError::Bytecode {
                    code: err as u16,
                    pc: bc.errpc as usize,
                    info: bc.errinfo,
                })
            }
        }
    }
}

fn load_delims(bc: &mut Bytecode, delims: &[(u32, u32)]) {
    let mut b = BaseReg::default();
    for (i, &(off, len)) in delims.iter().take(LANE_COUNT).enumerate() {
        b.offsets[i] = off;
        b.sizes[i] = len;
    }
    bc.vmstate.delims = b;
}

fn batch_mask(n: usize) -> LaneMask {
    ALL_LANES >> (LANE_COUNT - n)
}

/// Evaluate a single batch of up to [`LANE_COUNT`] row delimiters and
/// return the output-lane mask. Registers stay inspectable on the
/// stack afterwards; the row drivers below build on the same protocol.
///
/// # Errors
///
/// Propagates the VM error that aborted the batch.
pub fn run_batch(
    bc: &mut Bytecode,
    buf: &[u8],
    delims: &[(u32, u32)],
) -> Result<LaneMask, SiftError> {
    assert!(delims.len() <= LANE_COUNT, "batch wider than the lane count");
    if delims.is_empty() {
        return Ok(0);
    }
    load_delims(bc, delims);
    bc.vmstate.valid_lanes.mask = batch_mask(delims.len());
    bc.vmstate.output_lanes.mask = 0;
    eval_batch(bc, buf)?;
    Ok(bc.vmstate.output_lanes.mask)
}

/// Filter driver: evaluate the program per batch and compact the
/// surviving delimiters (and aux columns) in place, preserving order.
///
/// # Errors
///
/// Propagates the VM error that aborted the scan.
pub fn run_filter(
    bc: &mut Bytecode,
    buf: &[u8],
    delims: &mut Vec<(u32, u32)>,
) -> Result<usize, SiftError> {
    let total = delims.len();
    let span = tracing::debug_span!(
        "vectorized_batch",
        batch_size = total,
        simd_path = simd_path_label(),
        op = "filter",
    )
    .entered();

    let mut i = 0usize;
    let mut j = 0usize;
    while i < total {
        let n = (total - i).min(LANE_COUNT);
        let apos = bc.auxpos;
        load_delims(bc, &delims[i..i + n]);
        bc.vmstate.valid_lanes.mask = batch_mask(n);
        bc.vmstate.output_lanes.mask = 0;
        eval_batch(bc, buf)?;
        let mask = bc.vmstate.output_lanes.mask;
        for lane in 0..n {
            if mask & (1 << lane) != 0 {
                for column in &mut bc.auxvals {
                    column[j] = column[apos + lane];
                }
                delims[j] = delims[i + lane];
                j += 1;
            }
        }
        i += n;
    }
    delims.truncate(j);
    tracing::debug!(
        rows_in = total,
        rows_out = j,
        selectivity = if total == 0 { 0.0 } else { j as f64 / total as f64 },
        "filter complete"
    );
    drop(span);
    Ok(j)
}

/// One projection item: the output field symbol and the value slot the
/// program left the field in.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedField {
    pub sym: SymbolId,
    pub slot: u16,
}

/// Project driver: serialise one output struct per surviving lane into
/// `dst`, bounded by `capacity`. Missing fields are omitted; a batch
/// that does not fit is rolled back whole. Returns the bytes written
/// and rows consumed.
///
/// # Errors
///
/// Propagates the VM error that aborted the scan.
pub fn run_project(
    bc: &mut Bytecode,
    buf: &[u8],
    delims: &[(u32, u32)],
    dst: &mut Vec<u8>,
    capacity: usize,
    fields: &[ProjectedField],
) -> Result<(usize, usize), SiftError> {
    let span = tracing::debug_span!(
        "vectorized_batch",
        batch_size = delims.len(),
        simd_path = simd_path_label(),
        op = "project",
    )
    .entered();

    let mut rows = 0usize;
    while rows < delims.len() {
        let checkpoint = dst.len();
        let n = (delims.len() - rows).min(LANE_COUNT);
        load_delims(bc, &delims[rows..rows + n]);
        bc.vmstate.valid_lanes.mask = batch_mask(n);
        bc.vmstate.output_lanes.mask = 0;
        eval_batch(bc, buf)?;
        let mask = bc.vmstate.output_lanes.mask;

        for lane in 0..n {
            if mask & (1 << lane) == 0 {
                continue;
            }
            let mut content = 0usize;
            for field in fields {
                let v = crate::reg::ValueReg::load(&bc.vstack, field.slot);
                if v.sizes[lane] != 0 {
                    content += varuint_len(u64::from(field.sym)) + v.sizes[lane] as usize;
                }
            }
            let total = tlv_header_len(content) + content;
            if capacity.saturating_sub(dst.len()) < total {
                // Roll back the partial batch and stop at its start.
                dst.truncate(checkpoint);
                drop(span);
                return Ok((checkpoint, rows));
            }
            let mut header = [0u8; 11];
            let hlen = sift_ion::encode_tlv_into(&mut header, Type::Struct, content);
            dst.extend_from_slice(&header[..hlen]);
            for field in fields {
                let v = crate::reg::ValueReg::load(&bc.vstack, field.slot);
                if v.sizes[lane] == 0 {
                    continue;
                }
                write_varuint(dst, u64::from(field.sym));
                let Some(value) = bc.vmref(buf, v.offsets[lane], v.sizes[lane]) else {
                    return Err(SiftError::Bytecode {
                        code: BcError::Corrupt as u16,
                        pc: 0,
                        info: lane as u64,
                    });
                };
                dst.extend_from_slice(value);
            }
        }
        rows += n;
    }
    tracing::debug!(rows, bytes = dst.len(), "project complete");
    drop(span);
    Ok((dst.len(), rows))
}

/// Splat driver: expand each surviving lane's container into child
/// delimiters, recording the source lane of every output row in the
/// permutation vector. Returns `(input rows consumed, output rows)`.
///
/// # Errors
///
/// Propagates the VM error that aborted the scan.
pub fn run_splat(
    bc: &mut Bytecode,
    buf: &[u8],
    indelims: &[(u32, u32)],
    outdelims: &mut [(u32, u32)],
    perm: &mut [i32],
) -> Result<(usize, usize), SiftError> {
    let span = tracing::debug_span!(
        "vectorized_batch",
        batch_size = indelims.len(),
        simd_path = simd_path_label(),
        op = "splat",
    )
    .entered();

    let mut ipos = 0usize;
    let mut opos = 0usize;
    while ipos < indelims.len() && opos < outdelims.len() {
        let n = (indelims.len() - ipos).min(LANE_COUNT);
        load_delims(bc, &indelims[ipos..ipos + n]);
        bc.vmstate.valid_lanes.mask = batch_mask(n);
        bc.vmstate.output_lanes.mask = 0;
        eval_batch(bc, buf)?;
        let retmask = bc.vmstate.output_lanes.mask;
        let sreg = bc.vmstate.sreg;

        let mut output = opos;
        for lane in 0..n {
            if retmask & (1 << lane) == 0 {
                continue;
            }
            let mut start = sreg.offsets[lane];
            let mut remaining = sreg.sizes[lane];
            while remaining > 0 {
                if output == outdelims.len() || output == perm.len() {
                    drop(span);
                    return Ok((ipos, opos));
                }
                let Some(mem) = bc.vmref(buf, start, remaining) else {
                    return Err(SiftError::Bytecode {
                        code: BcError::Corrupt as u16,
                        pc: 0,
                        info: lane as u64,
                    });
                };
                let item = size_of(mem).map_err(|_| SiftError::Bytecode {
                    code: BcError::Corrupt as u16,
                    pc: 0,
                    info: lane as u64,
                })? as u32;
                outdelims[output] = (start, item);
                perm[output] = (lane + ipos) as i32;
                output += 1;
                start += item;
                remaining -= item;
            }
        }
        // Checkpoint the fully-splatted batch.
        opos = output;
        ipos += n;
    }
    tracing::debug!(rows_in = ipos, rows_out = opos, "splat complete");
    drop(span);
    Ok((ipos, opos))
}

/// Dedup driver: hash a designated slot per batch and drop lanes whose
/// hash is already present in the tree. The first occurrence of each
/// hash is retained, in input order.
///
/// # Errors
///
/// Propagates the VM error that aborted the scan.
pub fn run_dedup(
    bc: &mut Bytecode,
    buf: &[u8],
    delims: &mut Vec<(u32, u32)>,
    hashes: &mut Vec<u64>,
    tree: &mut RadixTree64,
    slot: u16,
) -> Result<usize, SiftError> {
    let span = tracing::debug_span!(
        "vectorized_batch",
        batch_size = delims.len(),
        simd_path = simd_path_label(),
        op = "dedup",
    )
    .entered();

    hashes.clear();
    let total = delims.len();
    let mut i = 0usize;
    let mut out = 0usize;
    while i < total {
        let n = (total - i).min(LANE_COUNT);
        let apos = bc.auxpos;
        load_delims(bc, &delims[i..i + n]);
        bc.vmstate.valid_lanes.mask = batch_mask(n);
        bc.vmstate.output_lanes.mask = 0;
        eval_batch(bc, buf)?;
        let outmask = bc.vmstate.output_lanes.mask;
        let lane_hashes = crate::reg::HashReg::load(&bc.vstack, slot);
        for lane in 0..n {
            if outmask & (1 << lane) == 0 {
                continue;
            }
            let hash = lane_hashes.lo[lane];
            if tree.insert(hash).is_none() {
                continue; // already present; first occurrence wins
            }
            delims[out] = delims[i + lane];
            hashes.push(hash);
            for column in &mut bc.auxvals {
                column[out] = column[apos + lane];
            }
            out += 1;
        }
        i += n;
    }
    delims.truncate(out);
    tracing::debug!(rows_in = total, rows_out = out, "dedup complete");
    drop(span);
    Ok(out)
}

/// Aggregate driver: evaluate every batch with the shared aggregation
/// buffer installed. Returns the number of rows consumed.
///
/// # Errors
///
/// Fails when no aggregation buffer is installed, or with the VM error
/// that aborted the scan.
pub fn run_aggregate(
    bc: &mut Bytecode,
    buf: &[u8],
    delims: &[(u32, u32)],
) -> Result<usize, SiftError> {
    if bc.agg.is_none() {
        return Err(SiftError::NotSupported {
            name: "aggregate without slot buffer",
        });
    }
    let span = tracing::debug_span!(
        "vectorized_batch",
        batch_size = delims.len(),
        simd_path = simd_path_label(),
        op = "aggregate",
    )
    .entered();

    let mut done = 0usize;
    while done < delims.len() {
        let n = (delims.len() - done).min(LANE_COUNT);
        load_delims(bc, &delims[done..done + n]);
        bc.vmstate.valid_lanes.mask = batch_mask(n);
        bc.vmstate.output_lanes.mask = 0;
        eval_batch(bc, buf)?;
        done += n;
    }
    tracing::debug!(rows = done, "aggregate complete");
    drop(span);
    Ok(done)
}

#[allow(clippy::too_many_lines)]
fn dispatch(bc: &mut Bytecode, buf: &[u8], op: Opcode, pc: usize) -> usize {
    use Opcode as O;
    match op {
        // control
        O::Init => ops_mask::init(bc, pc),
        O::Trap => ops_mask::trap(bc, pc),
        O::Ret => ops_mask::ret(bc, pc),
        O::RetK => ops_mask::ret_k(bc, pc),
        O::RetBK => ops_mask::ret_b_k(bc, pc),
        O::RetSK => ops_mask::ret_s_k(bc, pc),
        O::RetBHK => ops_mask::ret_b_h_k(bc, pc),

        // mask algebra
        O::Broadcast0K => ops_mask::broadcast0_k(bc, pc),
        O::Broadcast1K => ops_mask::broadcast1_k(bc, pc),
        O::FalseK => ops_mask::false_k(bc, pc),
        O::NotK => ops_mask::not_k(bc, pc),
        O::AndK => ops_mask::mask_binary(bc, pc, |a, b| a & b),
        O::AndnK => ops_mask::mask_binary(bc, pc, |a, b| !a & b),
        O::OrK => ops_mask::mask_binary(bc, pc, |a, b| a | b),
        O::XorK => ops_mask::mask_binary(bc, pc, |a, b| a ^ b),
        O::XnorK => ops_mask::mask_binary(bc, pc, |a, b| !(a ^ b)),
        O::MovK => ops_mask::mov_k(bc, pc),

        // moves
        O::ZeroV => ops_mask::zero_v(bc, pc),
        O::MovV => ops_mask::mov_v(bc, pc),
        O::MovVK => ops_mask::mov_v_k(bc, pc),
        O::MovF64 | O::MovI64 => ops_mask::mov_s(bc, pc),
        O::BlendV => ops_mask::blend_v(bc, pc),
        O::BlendF64 => ops_mask::blend_f64(bc, pc),
        O::BroadcastI64 => ops_mask::broadcast_i64(bc, pc),
        O::BroadcastF64 => ops_mask::broadcast_f64(bc, pc),

        // integer arithmetic
        O::AbsI64 => arith::abs_i64(bc, pc),
        O::NegI64 => arith::neg_i64(bc, pc),
        O::SignI64 => arith::sign_i64(bc, pc),
        O::SquareI64 => arith::square_i64(bc, pc),
        O::BitNotI64 => arith::bitnot_i64(bc, pc),
        O::BitCountI64 => arith::bitcount_i64(bc, pc),
        O::AddI64 => arith::add_i64(bc, pc, false),
        O::AddI64Imm => arith::add_i64(bc, pc, true),
        O::SubI64 => arith::sub_i64(bc, pc, false),
        O::SubI64Imm => arith::sub_i64(bc, pc, true),
        O::RsubI64Imm => arith::rsub_i64(bc, pc, true),
        O::MulI64 => arith::mul_i64(bc, pc, false),
        O::MulI64Imm => arith::mul_i64(bc, pc, true),
        O::DivI64 => arith::div_i64(bc, pc, false),
        O::DivI64Imm => arith::div_i64(bc, pc, true),
        O::RdivI64Imm => arith::rdiv_i64(bc, pc, true),
        O::ModI64 => arith::mod_i64(bc, pc, false),
        O::ModI64Imm => arith::mod_i64(bc, pc, true),
        O::RmodI64Imm => arith::rmod_i64(bc, pc, true),
        O::AddMulI64Imm => arith::addmul_i64_imm(bc, pc),
        O::MinValueI64 => arith::min_i64(bc, pc, false),
        O::MinValueI64Imm => arith::min_i64(bc, pc, true),
        O::MaxValueI64 => arith::max_i64(bc, pc, false),
        O::MaxValueI64Imm => arith::max_i64(bc, pc, true),
        O::AndI64 => arith::and_i64(bc, pc, false),
        O::AndI64Imm => arith::and_i64(bc, pc, true),
        O::OrI64 => arith::or_i64(bc, pc, false),
        O::OrI64Imm => arith::or_i64(bc, pc, true),
        O::XorI64 => arith::xor_i64(bc, pc, false),
        O::XorI64Imm => arith::xor_i64(bc, pc, true),
        O::SllI64 => arith::sll_i64(bc, pc, false),
        O::SllI64Imm => arith::sll_i64(bc, pc, true),
        O::SraI64 => arith::sra_i64(bc, pc, false),
        O::SraI64Imm => arith::sra_i64(bc, pc, true),
        O::SrlI64 => arith::srl_i64(bc, pc, false),
        O::SrlI64Imm => arith::srl_i64(bc, pc, true),

        // float arithmetic
        O::AbsF64 => arith::abs_f64(bc, pc),
        O::NegF64 => arith::neg_f64(bc, pc),
        O::SignF64 => arith::sign_f64(bc, pc),
        O::SquareF64 => arith::square_f64(bc, pc),
        O::RoundF64 => arith::round_f64(bc, pc),
        O::RoundEvenF64 => arith::roundeven_f64(bc, pc),
        O::TruncF64 => arith::trunc_f64(bc, pc),
        O::FloorF64 => arith::floor_f64(bc, pc),
        O::CeilF64 => arith::ceil_f64(bc, pc),
        O::AddF64 => arith::add_f64(bc, pc, false),
        O::AddF64Imm => arith::add_f64(bc, pc, true),
        O::SubF64 => arith::sub_f64(bc, pc, false),
        O::SubF64Imm => arith::sub_f64(bc, pc, true),
        O::RsubF64Imm => arith::rsub_f64(bc, pc, true),
        O::MulF64 => arith::mul_f64(bc, pc, false),
        O::MulF64Imm => arith::mul_f64(bc, pc, true),
        O::DivF64 => arith::div_f64(bc, pc, false),
        O::DivF64Imm => arith::div_f64(bc, pc, true),
        O::RdivF64Imm => arith::rdiv_f64(bc, pc, true),
        O::ModF64 => arith::mod_f64(bc, pc, false),
        O::ModF64Imm => arith::mod_f64(bc, pc, true),
        O::RmodF64Imm => arith::rmod_f64(bc, pc, true),
        O::MinValueF64 => arith::min_f64(bc, pc, false),
        O::MinValueF64Imm => arith::min_f64(bc, pc, true),
        O::MaxValueF64 => arith::max_f64(bc, pc, false),
        O::MaxValueF64Imm => arith::max_f64(bc, pc, true),
        O::SqrtF64 => arith::unary_f64(bc, pc, f64::sqrt),
        O::CbrtF64 => arith::unary_f64(bc, pc, f64::cbrt),
        O::ExpF64 => arith::unary_f64(bc, pc, f64::exp),
        O::Exp2F64 => arith::unary_f64(bc, pc, f64::exp2),
        O::Exp10F64 => arith::unary_f64(bc, pc, |v| 10f64.powf(v)),
        O::Expm1F64 => arith::unary_f64(bc, pc, f64::exp_m1),
        O::LnF64 => arith::unary_f64(bc, pc, f64::ln),
        O::Ln1pF64 => arith::unary_f64(bc, pc, f64::ln_1p),
        O::Log2F64 => arith::unary_f64(bc, pc, f64::log2),
        O::Log10F64 => arith::unary_f64(bc, pc, f64::log10),
        O::SinF64 => arith::unary_f64(bc, pc, f64::sin),
        O::CosF64 => arith::unary_f64(bc, pc, f64::cos),
        O::TanF64 => arith::unary_f64(bc, pc, f64::tan),
        O::AsinF64 => arith::unary_f64(bc, pc, f64::asin),
        O::AcosF64 => arith::unary_f64(bc, pc, f64::acos),
        O::AtanF64 => arith::unary_f64(bc, pc, f64::atan),
        O::Atan2F64 => arith::binary_f64(bc, pc, f64::atan2),
        O::HypotF64 => arith::binary_f64(bc, pc, f64::hypot),
        O::PowF64 => arith::binary_f64(bc, pc, f64::powf),
        O::PowUintF64 => arith::powuint_f64(bc, pc),

        // conversions
        O::CvtKToI64 => arith::cvt_k_to_i64(bc, pc),
        O::CvtKToF64 => arith::cvt_k_to_f64(bc, pc),
        O::CvtI64ToK => arith::cvt_i64_to_k(bc, pc),
        O::CvtF64ToK => arith::cvt_f64_to_k(bc, pc),
        O::CvtI64ToF64 => arith::cvt_i64_to_f64(bc, pc),
        O::CvtTruncF64ToI64 => arith::cvt_f64_to_i64(bc, pc, f64::trunc),
        O::CvtFloorF64ToI64 => arith::cvt_f64_to_i64(bc, pc, f64::floor),
        O::CvtCeilF64ToI64 => arith::cvt_f64_to_i64(bc, pc, f64::ceil),
        O::CvtI64ToStr => ops_string::cvt_i64_to_str(bc, pc),

        // same-type comparison
        O::CmpEqI64 => ops_cmp::cmp_i64(bc, pc, false, Cmp::Eq),
        O::CmpEqI64Imm => ops_cmp::cmp_i64(bc, pc, true, Cmp::Eq),
        O::CmpLtI64 => ops_cmp::cmp_i64(bc, pc, false, Cmp::Lt),
        O::CmpLtI64Imm => ops_cmp::cmp_i64(bc, pc, true, Cmp::Lt),
        O::CmpLeI64 => ops_cmp::cmp_i64(bc, pc, false, Cmp::Le),
        O::CmpLeI64Imm => ops_cmp::cmp_i64(bc, pc, true, Cmp::Le),
        O::CmpGtI64 => ops_cmp::cmp_i64(bc, pc, false, Cmp::Gt),
        O::CmpGtI64Imm => ops_cmp::cmp_i64(bc, pc, true, Cmp::Gt),
        O::CmpGeI64 => ops_cmp::cmp_i64(bc, pc, false, Cmp::Ge),
        O::CmpGeI64Imm => ops_cmp::cmp_i64(bc, pc, true, Cmp::Ge),
        O::CmpEqF64 => ops_cmp::cmp_f64(bc, pc, false, Cmp::Eq),
        O::CmpEqF64Imm => ops_cmp::cmp_f64(bc, pc, true, Cmp::Eq),
        O::CmpLtF64 => ops_cmp::cmp_f64(bc, pc, false, Cmp::Lt),
        O::CmpLtF64Imm => ops_cmp::cmp_f64(bc, pc, true, Cmp::Lt),
        O::CmpLeF64 => ops_cmp::cmp_f64(bc, pc, false, Cmp::Le),
        O::CmpLeF64Imm => ops_cmp::cmp_f64(bc, pc, true, Cmp::Le),
        O::CmpGtF64 => ops_cmp::cmp_f64(bc, pc, false, Cmp::Gt),
        O::CmpGtF64Imm => ops_cmp::cmp_f64(bc, pc, true, Cmp::Gt),
        O::CmpGeF64 => ops_cmp::cmp_f64(bc, pc, false, Cmp::Ge),
        O::CmpGeF64Imm => ops_cmp::cmp_f64(bc, pc, true, Cmp::Ge),
        O::CmpLtK => ops_mask::mask_compare(bc, pc, false, |a, b| !a & b),
        O::CmpLtKImm => ops_mask::mask_compare(bc, pc, true, |a, b| !a & b),
        O::CmpLeK => ops_mask::mask_compare(bc, pc, false, |a, b| !a | b),
        O::CmpLeKImm => ops_mask::mask_compare(bc, pc, true, |a, b| !a | b),
        O::CmpGtK => ops_mask::mask_compare(bc, pc, false, |a, b| a & !b),
        O::CmpGtKImm => ops_mask::mask_compare(bc, pc, true, |a, b| a & !b),
        O::CmpGeK => ops_mask::mask_compare(bc, pc, false, |a, b| a | !b),
        O::CmpGeKImm => ops_mask::mask_compare(bc, pc, true, |a, b| a | !b),
        O::CmpLtStr => ops_cmp::cmp_str(bc, buf, pc, Cmp::Lt),
        O::CmpLeStr => ops_cmp::cmp_str(bc, buf, pc, Cmp::Le),
        O::CmpGtStr => ops_cmp::cmp_str(bc, buf, pc, Cmp::Gt),
        O::CmpGeStr => ops_cmp::cmp_str(bc, buf, pc, Cmp::Ge),
        O::CmpEqSlice => ops_cmp::cmp_eq_slice(bc, buf, pc),

        // polymorphic comparison
        O::Cmpv => ops_cmpv::cmpv(bc, buf, pc, CmpvMode::Matching),
        O::SortCmpvNf => ops_cmpv::cmpv(bc, buf, pc, CmpvMode::SortNullsFirst),
        O::SortCmpvNl => ops_cmpv::cmpv(bc, buf, pc, CmpvMode::SortNullsLast),
        O::CmpvK => ops_cmpv::cmpv_k(bc, buf, pc, false),
        O::CmpvKImm => ops_cmpv::cmpv_k(bc, buf, pc, true),
        O::CmpvI64 => ops_cmpv::cmpv_scalar(bc, buf, pc, false, false),
        O::CmpvI64Imm => ops_cmpv::cmpv_scalar(bc, buf, pc, true, false),
        O::CmpvF64 => ops_cmpv::cmpv_scalar(bc, buf, pc, false, true),
        O::CmpvF64Imm => ops_cmpv::cmpv_scalar(bc, buf, pc, true, true),
        O::CmpEqV => ops_cmpv::cmpeq_v(bc, buf, pc),
        O::CmpEqVImm => ops_cmpv::cmpeq_v_imm(bc, buf, pc),

        // type introspection
        O::CheckTag => ops_value::checktag(bc, pc),
        O::TypeBits => ops_value::typebits(bc, pc),
        O::IsNanF => arith::is_nan_f(bc, pc),
        O::IsNullV => ops_value::value_test(bc, pc, ValueTest::IsNull),
        O::IsNotNullV => ops_value::value_test(bc, pc, ValueTest::IsNotNull),
        O::IsTrueV => ops_value::value_test(bc, pc, ValueTest::IsTrue),
        O::IsFalseV => ops_value::value_test(bc, pc, ValueTest::IsFalse),

        // field lookup & containers
        O::FindSym => ops_value::findsym(bc, buf, pc),
        O::FindSym2 => ops_value::findsym2(bc, buf, pc),
        O::Tuple => ops_value::tuple(bc, pc),
        O::Split => ops_value::split(bc, buf, pc),
        O::ArraySize => ops_value::arraysize(bc, buf, pc),
        O::ArrayPosition => ops_value::arrayposition(bc, buf, pc),
        O::ObjectSize => ops_value::objectsize(bc, buf, pc),
        O::Unpack => ops_value::unpack(bc, pc),

        // boxing & unboxing
        O::Unsymbolize => ops_value::unsymbolize(bc, buf, pc),
        O::UnboxCoerceF64 => ops_value::unbox_scalar(bc, buf, pc, UnboxMode::Coerce, true),
        O::UnboxCoerceI64 => ops_value::unbox_scalar(bc, buf, pc, UnboxMode::Coerce, false),
        O::UnboxCvtF64 => ops_value::unbox_scalar(bc, buf, pc, UnboxMode::Convert, true),
        O::UnboxCvtI64 => ops_value::unbox_scalar(bc, buf, pc, UnboxMode::Convert, false),
        O::BoxF64 => ops_box::box_f64(bc, pc),
        O::BoxI64 => ops_box::box_i64(bc, pc),
        O::BoxK => ops_box::box_k(bc, pc),
        O::BoxStr => ops_box::box_slice(bc, buf, pc, Type::String),
        O::BoxList => ops_box::box_slice(bc, buf, pc, Type::List),
        O::MakeList => ops_box::makelist(bc, buf, pc),
        O::MakeStruct => ops_box::makestruct(bc, buf, pc),
        O::LitRefOp => ops_value::litref(bc, pc),
        O::AuxVal => ops_value::auxval(bc, buf, pc),

        // temporal
        O::DateAddMonth => ops_time::date_add_months(bc, pc, false, 1),
        O::DateAddMonthImm => ops_time::date_add_months(bc, pc, true, 1),
        O::DateAddQuarter => ops_time::date_add_months(bc, pc, false, 3),
        O::DateAddYear => ops_time::date_add_months(bc, pc, false, 12),
        O::DateDiffMicrosecond => ops_time::date_diff_micros(bc, pc),
        O::DateDiffParam => ops_time::date_diff_param(bc, pc),
        O::DateDiffMQY => ops_time::date_diff_mqy(bc, pc),
        O::DateExtractMicrosecond => ops_time::date_extract(bc, pc, DateField::Microsecond),
        O::DateExtractMillisecond => ops_time::date_extract(bc, pc, DateField::Millisecond),
        O::DateExtractSecond => ops_time::date_extract(bc, pc, DateField::Second),
        O::DateExtractMinute => ops_time::date_extract(bc, pc, DateField::Minute),
        O::DateExtractHour => ops_time::date_extract(bc, pc, DateField::Hour),
        O::DateExtractDay => ops_time::date_extract(bc, pc, DateField::Day),
        O::DateExtractDow => ops_time::date_extract(bc, pc, DateField::Dow),
        O::DateExtractDoy => ops_time::date_extract(bc, pc, DateField::Doy),
        O::DateExtractMonth => ops_time::date_extract(bc, pc, DateField::Month),
        O::DateExtractQuarter => ops_time::date_extract(bc, pc, DateField::Quarter),
        O::DateExtractYear => ops_time::date_extract(bc, pc, DateField::Year),
        O::DateToUnixEpoch => ops_time::date_to_unix_epoch(bc, pc),
        O::DateToUnixMicro => ops_time::date_to_unix_micro(bc, pc),
        O::DateTruncMillisecond => ops_time::date_trunc(bc, pc, DateField::Millisecond),
        O::DateTruncSecond => ops_time::date_trunc(bc, pc, DateField::Second),
        O::DateTruncMinute => ops_time::date_trunc(bc, pc, DateField::Minute),
        O::DateTruncHour => ops_time::date_trunc(bc, pc, DateField::Hour),
        O::DateTruncDay => ops_time::date_trunc(bc, pc, DateField::Day),
        O::DateTruncDow => ops_time::date_trunc_dow(bc, pc),
        O::DateTruncMonth => ops_time::date_trunc(bc, pc, DateField::Month),
        O::DateTruncQuarter => ops_time::date_trunc(bc, pc, DateField::Quarter),
        O::DateTruncYear => ops_time::date_trunc(bc, pc, DateField::Year),
        O::UnboxTs => ops_time::unboxts(bc, buf, pc),
        O::BoxTs => ops_time::boxts(bc, pc),
        O::TimeBucketTs => ops_time::timebucket_ts(bc, pc),
        O::WidthBucketI64 => ops_time::widthbucket(bc, pc, false),
        O::WidthBucketF64 => ops_time::widthbucket(bc, pc, true),

        // geo
        O::GeoHash => ops_geo::geohash(bc, pc, false),
        O::GeoHashImm => ops_geo::geohash(bc, pc, true),
        O::GeoTileX => ops_geo::geotile_axis(bc, pc, false),
        O::GeoTileY => ops_geo::geotile_axis(bc, pc, true),
        O::GeoTileEs => ops_geo::geotile_es(bc, pc, false),
        O::GeoTileEsImm => ops_geo::geotile_es(bc, pc, true),
        O::GeoDistance => ops_geo::geodistance(bc, pc),

        // strings
        O::Alloc => ops_string::alloc(bc, pc),
        O::ConcatStr => ops_string::concatstr(bc, buf, pc),
        O::OctetLength => ops_string::octetlength(bc, pc),
        O::CharLength => ops_string::charlength(bc, buf, pc),
        O::Substr => ops_string::substr(bc, buf, pc),
        O::SplitPart => ops_string::split_part(bc, buf, pc),
        O::TrimWsLeft => ops_string::trim_ws(bc, buf, pc, TrimSide::Left),
        O::TrimWsRight => ops_string::trim_ws(bc, buf, pc, TrimSide::Right),
        O::TrimCharLeft => ops_string::trim_char(bc, buf, pc, TrimSide::Left),
        O::TrimCharRight => ops_string::trim_char(bc, buf, pc, TrimSide::Right),
        O::Skip1CharLeft => ops_string::skip_nchar(bc, buf, pc, TrimSide::Left, true),
        O::Skip1CharRight => ops_string::skip_nchar(bc, buf, pc, TrimSide::Right, true),
        O::SkipNCharLeft => ops_string::skip_nchar(bc, buf, pc, TrimSide::Left, false),
        O::SkipNCharRight => ops_string::skip_nchar(bc, buf, pc, TrimSide::Right, false),
        O::SLower => ops_string::case_convert(bc, buf, pc, false),
        O::SUpper => ops_string::case_convert(bc, buf, pc, true),
        O::CmpStrEqCs => ops_pattern::cmp_str_eq(bc, buf, pc, Fold::Cs),
        O::CmpStrEqCi => ops_pattern::cmp_str_eq(bc, buf, pc, Fold::Ci),
        O::CmpStrEqUtf8Ci => ops_pattern::cmp_str_eq(bc, buf, pc, Fold::Utf8Ci),
        O::CmpStrFuzzyA3 => ops_pattern::fuzzy(bc, buf, pc, false, false),
        O::CmpStrFuzzyUnicodeA3 => ops_pattern::fuzzy(bc, buf, pc, false, true),
        O::ContainsFuzzyA3 => ops_pattern::fuzzy(bc, buf, pc, true, false),
        O::ContainsFuzzyUnicodeA3 => ops_pattern::fuzzy(bc, buf, pc, true, true),
        O::ContainsPrefixCs => ops_pattern::contains(bc, buf, pc, Where::Prefix, Fold::Cs),
        O::ContainsPrefixCi => ops_pattern::contains(bc, buf, pc, Where::Prefix, Fold::Ci),
        O::ContainsPrefixUtf8Ci => ops_pattern::contains(bc, buf, pc, Where::Prefix, Fold::Utf8Ci),
        O::ContainsSuffixCs => ops_pattern::contains(bc, buf, pc, Where::Suffix, Fold::Cs),
        O::ContainsSuffixCi => ops_pattern::contains(bc, buf, pc, Where::Suffix, Fold::Ci),
        O::ContainsSuffixUtf8Ci => ops_pattern::contains(bc, buf, pc, Where::Suffix, Fold::Utf8Ci),
        O::ContainsSubstrCs => ops_pattern::contains(bc, buf, pc, Where::Substr, Fold::Cs),
        O::ContainsSubstrCi => ops_pattern::contains(bc, buf, pc, Where::Substr, Fold::Ci),
        O::ContainsSubstrUtf8Ci => ops_pattern::contains(bc, buf, pc, Where::Substr, Fold::Utf8Ci),
        O::EqPatternCs => ops_pattern::match_pattern(bc, buf, pc, true, Fold::Cs),
        O::EqPatternCi => ops_pattern::match_pattern(bc, buf, pc, true, Fold::Ci),
        O::EqPatternUtf8Ci => ops_pattern::match_pattern(bc, buf, pc, true, Fold::Utf8Ci),
        O::ContainsPatternCs => ops_pattern::match_pattern(bc, buf, pc, false, Fold::Cs),
        O::ContainsPatternCi => ops_pattern::match_pattern(bc, buf, pc, false, Fold::Ci),
        O::ContainsPatternUtf8Ci => ops_pattern::match_pattern(bc, buf, pc, false, Fold::Utf8Ci),
        O::IsSubnetOfIp4 => ops_pattern::is_subnet_of_ip4(bc, buf, pc),
        O::DfaT6 | O::DfaT6Z => ops_pattern::dfa(bc, buf, pc, Some(dfa::TINY6_STATES)),
        O::DfaT7 | O::DfaT7Z => ops_pattern::dfa(bc, buf, pc, Some(dfa::TINY7_STATES)),
        O::DfaT8 | O::DfaT8Z => ops_pattern::dfa(bc, buf, pc, Some(dfa::TINY8_STATES)),
        O::DfaL | O::DfaLZ => ops_pattern::dfa(bc, buf, pc, None),

        // hash & lookup
        O::HashValue => ops_hash::hashvalue(bc, buf, pc),
        O::HashValuePlus => ops_hash::hashvalue_plus(bc, buf, pc),
        O::HashMember => ops_hash::hashmember(bc, pc),
        O::HashLookup => ops_hash::hashlookup(bc, pc),

        // aggregation
        O::AggAndK => ops_agg::agg_mask(bc, pc, true),
        O::AggOrK => ops_agg::agg_mask(bc, pc, false),
        O::AggSumI64 => ops_agg::agg_scalar(bc, pc, AggOp::SumI64),
        O::AggSumF64 => ops_agg::agg_scalar(bc, pc, AggOp::SumF64),
        O::AggMinI64 => ops_agg::agg_scalar(bc, pc, AggOp::MinI64),
        O::AggMinF64 => ops_agg::agg_scalar(bc, pc, AggOp::MinF64),
        O::AggMaxI64 => ops_agg::agg_scalar(bc, pc, AggOp::MaxI64),
        O::AggMaxF64 => ops_agg::agg_scalar(bc, pc, AggOp::MaxF64),
        O::AggAndI64 => ops_agg::agg_scalar(bc, pc, AggOp::AndI64),
        O::AggOrI64 => ops_agg::agg_scalar(bc, pc, AggOp::OrI64),
        O::AggXorI64 => ops_agg::agg_scalar(bc, pc, AggOp::XorI64),
        O::AggCount => ops_agg::agg_count(bc, pc),
        O::AggApproxCount => ops_agg::agg_approx_count(bc, pc),
        O::AggApproxCountMerge => ops_agg::agg_approx_count_merge(bc, buf, pc),
        O::AggBucket => ops_agg::agg_bucket(bc, pc),
        O::AggSlotAndK => ops_agg::agg_slot_mask(bc, pc, true),
        O::AggSlotOrK => ops_agg::agg_slot_mask(bc, pc, false),
        O::AggSlotSumI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::SumI64),
        O::AggSlotSumF64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::SumF64),
        O::AggSlotAvgI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::AvgI64),
        O::AggSlotAvgF64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::AvgF64),
        O::AggSlotMinI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::MinI64),
        O::AggSlotMinF64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::MinF64),
        O::AggSlotMaxI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::MaxI64),
        O::AggSlotMaxF64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::MaxF64),
        O::AggSlotAndI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::AndI64),
        O::AggSlotOrI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::OrI64),
        O::AggSlotXorI64 => ops_agg::agg_slot_scalar(bc, pc, AggOp::XorI64),
        O::AggSlotCount => ops_agg::agg_slot_count(bc, pc),
        O::AggSlotApproxCount => ops_agg::agg_slot_approx_count(bc, pc),
        O::AggSlotApproxCountMerge => ops_agg::agg_slot_approx_count_merge(bc, buf, pc),
    }
}
