//! Type introspection, struct field lookup, and container navigation.

use sift_ion::{header_size_of, read_label, size_of, Type};

use crate::bytecode::{BcError, Bytecode};
use crate::ops_cmpv::{values_equal_pub as values_equal, Side};
use crate::reg::{lanes, BaseReg, MaskReg, ScalarReg, ValueReg, LANE_COUNT};

fn is_null_tlv(tlv: u8) -> bool {
    Type::from_tlv(tlv) == Type::Null || tlv & 0x0F == 0x0F
}

/// checktag: pass through lanes whose TLV type is in the immediate
/// bit-set; clear the rest.
pub(crate) fn checktag(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let bits = bc.word(pc + 6);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = ValueReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let ty = src.type_l[i] >> 4;
        if src.sizes[i] != 0 && bits & (1 << ty) != 0 {
            out.offsets[i] = src.offsets[i];
            out.sizes[i] = src.sizes[i];
            out.type_l[i] = src.type_l[i];
            out.header_size[i] = src.header_size[i];
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// typebits: one bit per type code.
pub(crate) fn typebits(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        if src.sizes[i] != 0 {
            out.set_i64(i, 1 << (src.type_l[i] >> 4));
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ValueTest {
    IsNull,
    IsNotNull,
    IsTrue,
    IsFalse,
}

pub(crate) fn value_test(bc: &mut Bytecode, pc: usize, test: ValueTest) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if src.sizes[i] == 0 {
            continue;
        }
        let tlv = src.type_l[i];
        let hit = match test {
            ValueTest::IsNull => is_null_tlv(tlv),
            ValueTest::IsNotNull => !is_null_tlv(tlv),
            ValueTest::IsTrue => tlv == 0x11,
            ValueTest::IsFalse => tlv == 0x10,
        };
        if hit {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 6
}

/// findsym: single-pass ascending-label struct field lookup.
///
/// On a hit the output lane points at the field's value. On a miss the
/// output keeps the value of the last field whose label was below the
/// target, so `findsym2` can resume the walk from there.
pub(crate) fn findsym(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let srcb = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let Ok((symbol, _)) = read_label(&bc.compiled[pc + 6..pc + 10]) else {
        bc.set_err(BcError::Corrupt, pc - 2, 0);
        return pc + 12;
    };
    let srck = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let mut dstv = ValueReg::default();
    let mut retmask = 0u16;
    search(bc, buf, &srcb, srck.mask, symbol, pc, &mut dstv, &mut retmask, None);
    let off = bc.word(pc);
    dstv.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: retmask }.store(&mut bc.vstack, off);
    pc + 12
}

/// findsym2: sequenced lookup continuing after a previously resolved
/// field in the same struct.
pub(crate) fn findsym2(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let srcb = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let prev = ValueReg::load(&bc.vstack, bc.word(pc + 6));
    let _prevk = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Ok((symbol, _)) = read_label(&bc.compiled[pc + 10..pc + 14]) else {
        bc.set_err(BcError::Corrupt, pc - 2, 0);
        return pc + 16;
    };
    let srck = MaskReg::load(&bc.vstack, bc.word(pc + 14));
    let mut dstv = ValueReg::default();
    let mut retmask = 0u16;
    search(
        bc, buf, &srcb, srck.mask, symbol, pc, &mut dstv, &mut retmask,
        Some(&prev),
    );
    let off = bc.word(pc);
    dstv.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: retmask }.store(&mut bc.vstack, off);
    pc + 16
}

#[allow(clippy::too_many_arguments)]
fn search(
    bc: &mut Bytecode,
    buf: &[u8],
    srcb: &BaseReg,
    srcmask: u16,
    symbol: u32,
    pc: usize,
    dstv: &mut ValueReg,
    retmask: &mut u16,
    resume_after: Option<&ValueReg>,
) {
    'outer: for i in 0..LANE_COUNT {
        let base_start = srcb.offsets[i];
        let base_width = srcb.sizes[i];
        let start = match resume_after {
            Some(prev) if prev.offsets[i] != 0 || prev.sizes[i] != 0 => {
                prev.offsets[i] + prev.sizes[i]
            }
            _ => base_start,
        };
        dstv.offsets[i] = start;
        if srcmask & (1 << i) == 0 {
            continue;
        }
        let end = base_start.saturating_add(base_width);
        if start > end {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break 'outer;
        }
        let Some(mut mem) = bc.vmref(buf, start, end - start) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break 'outer;
        };
        let width = end - start;
        while !mem.is_empty() {
            let Ok((sym, rest)) = read_label(mem) else {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break 'outer;
            };
            mem = rest;
            if sym > symbol {
                break;
            }
            let Ok(vsize) = size_of(mem) else {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break 'outer;
            };
            let Ok(hlen) = header_size_of(mem) else {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break 'outer;
            };
            dstv.offsets[i] = start + width - mem.len() as u32;
            dstv.sizes[i] = vsize as u32;
            dstv.type_l[i] = mem[0];
            dstv.header_size[i] = hlen as u8;
            if sym == symbol {
                *retmask |= 1 << i;
                break;
            }
            mem = &mem[vsize..];
        }
    }
}

/// tuple: struct value to its body span.
pub(crate) fn tuple(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if Type::from_tlv(src.type_l[i]) != Type::Struct || src.sizes[i] == 0 {
            continue;
        }
        let hdr = u32::from(src.header_size[i]);
        out.offsets[i] = src.offsets[i] + hdr;
        out.sizes[i] = src.sizes[i] - hdr;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// split: yield the next element of a container body span and the
/// remainder.
pub(crate) fn split(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut outv = ValueReg::default();
    let mut rest = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if src.sizes[i] == 0 {
            continue;
        }
        let Some(mem) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let (Ok(vsize), Ok(hlen)) = (size_of(mem), header_size_of(mem)) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        outv.offsets[i] = src.offsets[i];
        outv.sizes[i] = vsize as u32;
        outv.type_l[i] = mem[0];
        outv.header_size[i] = hlen as u8;
        rest.offsets[i] = src.offsets[i] + vsize as u32;
        rest.sizes[i] = src.sizes[i] - vsize as u32;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    outv.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    rest.store(&mut bc.vstack, off);
    let off = bc.word(pc + 4);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

fn count_elements(mem: &[u8]) -> Option<i64> {
    let mut body = mem;
    let mut count = 0i64;
    while !body.is_empty() {
        let size = size_of(body).ok()?;
        body = &body[size..];
        count += 1;
    }
    Some(count)
}

fn count_fields(mem: &[u8]) -> Option<i64> {
    let mut body = mem;
    let mut count = 0i64;
    while !body.is_empty() {
        let (_, rest) = read_label(body).ok()?;
        let size = size_of(rest).ok()?;
        body = &rest[size..];
        count += 1;
    }
    Some(count)
}

/// arraysize: element count of a container body span.
pub(crate) fn arraysize(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let Some(mem) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        match count_elements(mem) {
            Some(n) => out.set_i64(i, n),
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

/// arrayposition: 1-based index of a value within a container body.
pub(crate) fn arrayposition(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let needle = ValueReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    'outer: for i in lanes(k.mask) {
        let Some(mem) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let target = Side::from_value(&needle, i);
        if target.size == 0 {
            continue;
        }
        let mut position = 1i64;
        let mut cursor = src.offsets[i];
        let mut body = mem;
        while !body.is_empty() {
            let (Ok(vsize), Ok(hlen)) = (size_of(body), header_size_of(body)) else {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break 'outer;
            };
            let element = Side {
                offset: cursor,
                size: vsize as u32,
                tlv: body[0],
                hlen: hlen as u8,
            };
            if values_equal(bc, buf, &element, &target) {
                out.set_i64(i, position);
                mask |= 1 << i;
                break;
            }
            cursor += vsize as u32;
            body = &body[vsize..];
            position += 1;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// objectsize: field count of a struct, element count of a list.
pub(crate) fn objectsize(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if src.sizes[i] == 0 || src.type_l[i] & 0x0F == 0x0F {
            continue;
        }
        let hdr = u32::from(src.header_size[i]);
        let Some(body) = bc.vmref(buf, src.offsets[i] + hdr, src.sizes[i] - hdr) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let count = match Type::from_tlv(src.type_l[i]) {
            Type::Struct => count_fields(body),
            Type::List | Type::Sexp => count_elements(body),
            _ => None,
        };
        if let Some(n) = count {
            out.set_i64(i, n);
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// unpack: body span of lanes whose type code matches the immediate.
pub(crate) fn unpack(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let want = bc.word(pc + 6) as u8 & 0x0F;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if src.sizes[i] == 0 || src.type_l[i] >> 4 != want || src.type_l[i] & 0x0F == 0x0F {
            continue;
        }
        let hdr = u32::from(src.header_size[i]);
        out.offsets[i] = src.offsets[i] + hdr;
        out.sizes[i] = src.sizes[i] - hdr;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// unsymbolize: swap symbol lanes for their interned string spans.
pub(crate) fn unsymbolize(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = src;
    for i in lanes(k.mask) {
        if Type::from_tlv(src.type_l[i]) != Type::Symbol || src.sizes[i] == 0 {
            continue;
        }
        let resolved = (|| {
            let mem = bc.vmref(buf, src.offsets[i], src.sizes[i])?;
            let body = mem.get(src.header_size[i] as usize..)?;
            let mut sym: u64 = 0;
            for &b in body {
                sym = (sym << 8) | u64::from(b);
            }
            let sym = u32::try_from(sym).ok()?;
            let &(off, len) = bc.symtab.get(sym as usize)?;
            let encoded = bc.vmref(buf, off, len)?;
            let hlen = header_size_of(encoded).ok()?;
            Some((off, len, encoded[0], hlen as u8))
        })();
        match resolved {
            Some((off, len, tlv, hlen)) => {
                out.offsets[i] = off;
                out.sizes[i] = len;
                out.type_l[i] = tlv;
                out.header_size[i] = hlen;
            }
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnboxMode {
    /// Numeric lanes only, lossy to the target width.
    Coerce,
    /// Numeric and bool lanes, lossy to the target width.
    Convert,
}

/// unbox.{coerce,cvt}.{i64,f64}.
pub(crate) fn unbox_scalar(
    bc: &mut Bytecode,
    buf: &[u8],
    pc: usize,
    mode: UnboxMode,
    float: bool,
) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let side = Side::from_value(&src, i);
        if side.size == 0 {
            continue;
        }
        if mode == UnboxMode::Convert && Type::from_tlv(side.tlv) == Type::Bool {
            let truth = i64::from(side.tlv == 0x11);
            if float {
                out.set_f64(i, truth as f64);
            } else {
                out.set_i64(i, truth);
            }
            mask |= 1 << i;
            continue;
        }
        let Some(num) = crate::ops_cmpv::decode_num_pub(bc, buf, &side) else {
            continue;
        };
        if float {
            out.set_f64(i, num.as_f64());
        } else {
            out.set_i64(i, num.as_i64());
        }
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// litref: broadcast a pool literal into every lane.
pub(crate) fn litref(bc: &mut Bytecode, pc: usize) -> usize {
    let lit = bc.litref(pc + 2);
    let mut out = ValueReg::default();
    for i in 0..LANE_COUNT {
        out.offsets[i] = lit.offset;
        out.sizes[i] = lit.len;
        out.type_l[i] = lit.tlv;
        out.header_size[i] = lit.header_len;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 12
}

/// auxval: load the next batch of an aux column.
pub(crate) fn auxval(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let aux = bc.word(pc + 4) as usize;
    let Some(column) = bc.auxvals.get(aux) else {
        bc.set_err(BcError::Corrupt, pc - 2, aux as u64);
        return pc + 6;
    };
    let window = &column[bc.auxpos.min(column.len())..];
    let mut lst = [(0u32, 0u32); LANE_COUNT];
    let n = window.len().min(LANE_COUNT);
    lst[..n].copy_from_slice(&window[..n]);
    let mut out = ValueReg::default();
    let mut mask = 0u16;
    for (i, &(off, len)) in lst.iter().take(n).enumerate() {
        out.offsets[i] = off;
        out.sizes[i] = len;
        if len == 0 {
            continue;
        }
        let Some(mem) = bc.vmref(buf, off, len) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            return pc + 6;
        };
        let Ok(hlen) = header_size_of(mem) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            return pc + 6;
        };
        out.type_l[i] = mem[0];
        out.header_size[i] = hlen as u8;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 6
}
