//! Boxing opcodes: serialise scalar registers into scratch and emit
//! value references.
//!
//! Every handler reserves its declared scratch requirement up front
//! (the dispatcher has already verified the batch-level requirement);
//! when a page-sized op still runs out mid-batch it rolls scratch back,
//! records `MoreScratch` with the shortfall in the info word, and the
//! driver grows the arena and resumes from the same PC.

use sift_ion::{header_size_of, tlv_header_len, Buffer, Type};

use crate::bytecode::{BcError, Bytecode};
use crate::reg::{lanes, BaseReg, MaskReg, ScalarReg, ValueReg};

/// Append `bytes` as one encoded value, producing its lane reference.
/// Returns `None` (after recording `MoreScratch`) when the arena is
/// exhausted.
fn emit_value(
    bc: &mut Bytecode,
    pc: usize,
    mark: usize,
    bytes: &[u8],
) -> Option<(u32, u32, u8, u8)> {
    if bytes.len() > bc.scratch_remaining() {
        bc.scratch.truncate(mark);
        bc.set_err(BcError::MoreScratch, pc - 2, bytes.len() as u64);
        return None;
    }
    let off = bc.scratch_append(bytes);
    let hlen = header_size_of(bytes).ok()? as u8;
    Some((off, bytes.len() as u32, bytes[0], hlen))
}

/// box.f64: always the canonical 9-byte float form, so every lane has
/// the same stride on both back-ends.
pub(crate) fn box_f64(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mark = bc.scratch.len();
    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        let mut bytes = [0u8; 9];
        bytes[0] = (Type::Float as u8) << 4 | 8;
        bytes[1..].copy_from_slice(&src.f64(i).to_be_bytes());
        let Some((off, len, tlv, hlen)) = emit_value(bc, pc, mark, &bytes) else {
            return pc + 6;
        };
        out.offsets[i] = off;
        out.sizes[i] = len;
        out.type_l[i] = tlv;
        out.header_size[i] = hlen;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// box.i64: minimal integer encoding, at most 9 bytes per lane.
pub(crate) fn box_i64(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mark = bc.scratch.len();
    let mut enc = Buffer::new();
    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        enc.clear();
        enc.write_int(src.i64(i));
        let encoded = enc.bytes().to_vec();
        let Some((off, len, tlv, hlen)) = emit_value(bc, pc, mark, &encoded) else {
            return pc + 6;
        };
        out.offsets[i] = off;
        out.sizes[i] = len;
        out.type_l[i] = tlv;
        out.header_size[i] = hlen;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// box.k: one bool byte per lane.
pub(crate) fn box_k(bc: &mut Bytecode, pc: usize) -> usize {
    let src = MaskReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mark = bc.scratch.len();
    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        let byte = [(Type::Bool as u8) << 4 | u8::from(src.mask & (1 << i) != 0)];
        let Some((off, len, tlv, hlen)) = emit_value(bc, pc, mark, &byte) else {
            return pc + 6;
        };
        out.offsets[i] = off;
        out.sizes[i] = len;
        out.type_l[i] = tlv;
        out.header_size[i] = hlen;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// box.str / box.list: wrap a byte slice as a string value or a
/// container body as a list value.
pub(crate) fn box_slice(bc: &mut Bytecode, buf: &[u8], pc: usize, ty: Type) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mark = bc.scratch.len();
    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        let Some(body) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            return pc + 6;
        };
        // The source may itself live in scratch; detach before writing.
        let body = body.to_vec();
        let mut bytes = Vec::with_capacity(tlv_header_len(body.len()) + body.len());
        let mut header = [0u8; 11];
        let n = sift_ion::encode_tlv_into(&mut header, ty, body.len());
        bytes.extend_from_slice(&header[..n]);
        bytes.extend_from_slice(&body);
        let Some((off, len, tlv, hlen)) = emit_value(bc, pc, mark, &bytes) else {
            return pc + 6;
        };
        out.offsets[i] = off;
        out.sizes[i] = len;
        out.type_l[i] = tlv;
        out.header_size[i] = hlen;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// makelist: per lane, a list of the variadic values whose item mask
/// covers the lane.
pub(crate) fn makelist(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    make_container(bc, buf, pc, false)
}

/// makestruct: like makelist, with a symbol label per item. The
/// planner emits items in ascending symbol order; absent values are
/// omitted from the struct.
pub(crate) fn makestruct(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    make_container(bc, buf, pc, true)
}

fn make_container(bc: &mut Bytecode, buf: &[u8], pc: usize, labelled: bool) -> usize {
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let count = bc.word(pc + 6) as usize;
    let items_at = pc + 8;
    let item_width = if labelled { 8 } else { 4 };
    let end_pc = items_at + count * item_width;
    let mark = bc.scratch.len();

    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        let mut body = Vec::new();
        for item in 0..count {
            let at = items_at + item * item_width;
            let (sym, v_at) = if labelled {
                let Ok((sym, _)) = sift_ion::read_label(&bc.compiled[at..at + 4]) else {
                    bc.set_err(BcError::Corrupt, pc - 2, item as u64);
                    return end_pc;
                };
                (Some(sym), at + 4)
            } else {
                (None, at)
            };
            let v = ValueReg::load(&bc.vstack, bc.word(v_at));
            let vk = MaskReg::load(&bc.vstack, bc.word(v_at + 2));
            if vk.mask & (1 << i) == 0 || v.sizes[i] == 0 {
                continue;
            }
            let Some(value) = bc.vmref(buf, v.offsets[i], v.sizes[i]) else {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                return end_pc;
            };
            if let Some(sym) = sym {
                sift_ion::write_varuint(&mut body, u64::from(sym));
            }
            body.extend_from_slice(value);
        }
        let ty = if labelled { Type::Struct } else { Type::List };
        let mut bytes = Vec::with_capacity(tlv_header_len(body.len()) + body.len());
        let mut header = [0u8; 11];
        let n = sift_ion::encode_tlv_into(&mut header, ty, body.len());
        bytes.extend_from_slice(&header[..n]);
        bytes.extend_from_slice(&body);
        let Some((off, len, tlv, hlen)) = emit_value(bc, pc, mark, &bytes) else {
            return end_pc;
        };
        out.offsets[i] = off;
        out.sizes[i] = len;
        out.type_l[i] = tlv;
        out.header_size[i] = hlen;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    end_pc
}
