//! String opcodes: lengths, slicing, trimming, case conversion,
//! concatenation, and scratch allocation.
//!
//! String registers hold `(offset, length)` slices which may point into
//! the document buffer or scratch. Character positions are 1-based and
//! UTF-8 aware; lanes whose bytes are not valid UTF-8 are masked out of
//! character-level results.

use crate::bytecode::{BcError, Bytecode};
use crate::reg::{lanes, BaseReg, MaskReg, ScalarReg};

fn lane_bytes<'a>(bc: &'a Bytecode, buf: &'a [u8], s: &BaseReg, i: usize) -> Option<&'a [u8]> {
    bc.vmref(buf, s.offsets[i], s.sizes[i])
}

/// octetlength: byte length of each lane.
pub(crate) fn octetlength(bc: &mut Bytecode, pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.set_i64(i, i64::from(src.sizes[i]));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// characterlength: UTF-8 character count.
pub(crate) fn charlength(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let count = bytes.iter().filter(|&&b| b & 0xC0 != 0x80).count();
        out.set_i64(i, count as i64);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// substr: 1-based character start plus length, clamped to the value.
pub(crate) fn substr(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let start = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let count = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = BaseReg::default();
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        // Character boundaries: byte offsets of each character start,
        // plus the end sentinel.
        let boundaries: Vec<usize> = bytes
            .iter()
            .enumerate()
            .filter_map(|(at, &b)| (b & 0xC0 != 0x80).then_some(at))
            .chain(std::iter::once(bytes.len()))
            .collect();
        let chars = boundaries.len() - 1;
        let from = (start.i64(i).max(1) - 1).min(chars as i64) as usize;
        let take = count.i64(i).max(0) as usize;
        let to = (from + take).min(chars);
        out.offsets[i] = src.offsets[i] + boundaries[from] as u32;
        out.sizes[i] = (boundaries[to] - boundaries[from]) as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 10
}

/// split_part: 1-based nth field of a separator-delimited string.
pub(crate) fn split_part(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let dict = bc.word(pc + 6) as usize;
    let n = ScalarReg::load(&bc.vstack, bc.word(pc + 8));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let Some(sep) = bc.dict.get(dict).and_then(|d| d.as_bytes()).map(<[u8]>::to_vec) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 12;
    };
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let want = n.i64(i);
        if want < 1 || sep.is_empty() {
            continue;
        }
        let mut part = 1i64;
        let mut at = 0usize;
        loop {
            let end = memchr::memmem::find(&bytes[at..], &sep).map(|p| at + p);
            if part == want {
                let stop = end.unwrap_or(bytes.len());
                out.offsets[i] = src.offsets[i] + at as u32;
                out.sizes[i] = (stop - at) as u32;
                mask |= 1 << i;
                break;
            }
            match end {
                Some(p) => {
                    at = p + sep.len();
                    part += 1;
                }
                None => break,
            }
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 12
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// trim_ws_left / trim_ws_right.
pub(crate) fn trim_ws(bc: &mut Bytecode, buf: &[u8], pc: usize, side: Side) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = BaseReg::default();
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let is_ws = |b: u8| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C);
        let (skip_front, skip_back) = match side {
            Side::Left => (bytes.iter().take_while(|&&b| is_ws(b)).count(), 0),
            Side::Right => (0, bytes.iter().rev().take_while(|&&b| is_ws(b)).count()),
        };
        out.offsets[i] = src.offsets[i] + skip_front as u32;
        out.sizes[i] = src.sizes[i] - (skip_front + skip_back) as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// trim_char_left / trim_char_right: trim any of the dictionary's
/// characters (at most four, per the planner contract).
pub(crate) fn trim_char(bc: &mut Bytecode, buf: &[u8], pc: usize, side: Side) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let dict = bc.word(pc + 4) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(set) = bc.dict.get(dict).and_then(|d| d.as_bytes()).map(<[u8]>::to_vec) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 8;
    };
    let mut out = BaseReg::default();
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let hit = |b: &&u8| set.contains(b);
        let (skip_front, skip_back) = match side {
            Side::Left => (bytes.iter().take_while(hit).count(), 0),
            Side::Right => (0, bytes.iter().rev().take_while(hit).count()),
        };
        out.offsets[i] = src.offsets[i] + skip_front as u32;
        out.sizes[i] = src.sizes[i] - (skip_front + skip_back) as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 8
}

fn char_starts(bytes: &[u8]) -> impl DoubleEndedIterator<Item = usize> + '_ {
    bytes
        .iter()
        .enumerate()
        .filter_map(|(at, &b)| (b & 0xC0 != 0x80).then_some(at))
}

/// skip_1char / skip_nchar, both directions. The output mask clears
/// lanes with fewer characters than requested.
pub(crate) fn skip_nchar(
    bc: &mut Bytecode,
    buf: &[u8],
    pc: usize,
    side: Side,
    fixed_one: bool,
) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let (count_reg, k_off) = if fixed_one {
        (None, pc + 6)
    } else {
        (Some(ScalarReg::load(&bc.vstack, bc.word(pc + 6))), pc + 8)
    };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let n = count_reg.as_ref().map_or(1, |r| r.i64(i));
        if n < 0 {
            continue;
        }
        let n = n as usize;
        let total = char_starts(bytes).count();
        if n > total {
            continue;
        }
        let (cut_front, cut_back) = match side {
            Side::Left => (
                char_starts(bytes).nth(n).unwrap_or(bytes.len()),
                0,
            ),
            Side::Right => (
                0,
                bytes.len()
                    - char_starts(bytes)
                        .rev()
                        .nth(n.wrapping_sub(1))
                        .unwrap_or(bytes.len()),
            ),
        };
        out.offsets[i] = src.offsets[i] + cut_front as u32;
        out.sizes[i] = src.sizes[i] - (cut_front + cut_back) as u32;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    if fixed_one {
        pc + 8
    } else {
        pc + 10
    }
}

/// slower / supper: case conversion into scratch.
pub(crate) fn case_convert(bc: &mut Bytecode, buf: &[u8], pc: usize, upper: bool) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mark = bc.scratch.len();
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(bytes) = lane_bytes(bc, buf, &src, i) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let Ok(text) = std::str::from_utf8(bytes) else {
            continue;
        };
        let converted = if upper {
            text.to_uppercase()
        } else {
            text.to_lowercase()
        };
        if converted.len() > bc.scratch_remaining() {
            bc.scratch.truncate(mark);
            bc.set_err(BcError::MoreScratch, pc - 2, converted.len() as u64);
            return pc + 8;
        }
        out.offsets[i] = bc.scratch_append(converted.as_bytes());
        out.sizes[i] = converted.len() as u32;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// concatstr: variadic lane-wise concatenation into scratch.
pub(crate) fn concatstr(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let count = bc.word(pc + 4) as usize;
    let items_at = pc + 6;
    let end_pc = items_at + count * 4;
    let mark = bc.scratch.len();

    let mut sources = Vec::with_capacity(count);
    let mut mask = u16::MAX;
    for item in 0..count {
        let at = items_at + item * 4;
        sources.push(BaseReg::load(&bc.vstack, bc.word(at)));
        mask &= MaskReg::load(&bc.vstack, bc.word(at + 2)).mask;
    }
    mask &= bc.vmstate.valid_lanes.mask;

    let mut out = BaseReg::default();
    for i in lanes(mask) {
        let mut joined = Vec::new();
        for s in &sources {
            let Some(bytes) = lane_bytes(bc, buf, s, i) else {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                return end_pc;
            };
            joined.extend_from_slice(bytes);
        }
        if joined.len() > bc.scratch_remaining() {
            bc.scratch.truncate(mark);
            bc.set_err(BcError::MoreScratch, pc - 2, joined.len() as u64);
            return end_pc;
        }
        out.offsets[i] = bc.scratch_append(&joined);
        out.sizes[i] = joined.len() as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    end_pc
}

/// alloc: reserve a zeroed per-lane scratch span of the requested size.
pub(crate) fn alloc(bc: &mut Bytecode, pc: usize) -> usize {
    let size = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mark = bc.scratch.len();
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let n = size.i64(i);
        if n < 0 {
            continue;
        }
        let n = n as usize;
        if n > bc.scratch_remaining() {
            bc.scratch.truncate(mark);
            bc.set_err(BcError::MoreScratch, pc - 2, n as u64);
            return pc + 8;
        }
        let zeroes = vec![0u8; n];
        out.offsets[i] = bc.scratch_append(&zeroes);
        out.sizes[i] = n as u32;
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// cvt.i64tostr: decimal formatting into scratch.
pub(crate) fn cvt_i64_to_str(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = BaseReg::default();
    for i in lanes(k.mask) {
        let text = src.i64(i).to_string();
        out.offsets[i] = bc.scratch_append(text.as_bytes());
        out.sizes[i] = text.len() as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    pc + 8
}
