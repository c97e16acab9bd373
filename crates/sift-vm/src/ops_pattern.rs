//! Pattern, fuzzy, DFA, and subnet string predicates.
//!
//! The needle (or compiled pattern, automaton, or address range) comes
//! from the dictionary; the haystack is a string-slice register.
//! Case-insensitive variants fold ASCII only; the `utf8_ci` variants
//! fold full code points.

use crate::bytecode::{BcError, Bytecode, DictEntry, Pattern};
use crate::dfa::DfaProgram;
use crate::reg::{lanes, BaseReg, MaskReg, ScalarReg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fold {
    /// Case-sensitive bytes.
    Cs,
    /// ASCII case-insensitive.
    Ci,
    /// Unicode simple case folding.
    Utf8Ci,
}

fn bytes_eq(a: &[u8], b: &[u8], fold: Fold) -> bool {
    match fold {
        Fold::Cs => a == b,
        Fold::Ci => a.eq_ignore_ascii_case(b),
        Fold::Utf8Ci => match (std::str::from_utf8(a), std::str::from_utf8(b)) {
            (Ok(x), Ok(y)) => {
                x.chars().flat_map(char::to_lowercase).eq(y.chars().flat_map(char::to_lowercase))
            }
            _ => false,
        },
    }
}

/// Byte length of the prefix of `hay` matching `needle` under `fold`,
/// or `None` when it does not match.
fn prefix_len(hay: &[u8], needle: &[u8], fold: Fold) -> Option<usize> {
    match fold {
        Fold::Cs | Fold::Ci => {
            let head = hay.get(..needle.len())?;
            bytes_eq(head, needle, fold).then_some(needle.len())
        }
        Fold::Utf8Ci => {
            let hay = std::str::from_utf8(hay).ok()?;
            let needle = std::str::from_utf8(needle).ok()?;
            let mut folded = needle.chars().flat_map(char::to_lowercase);
            if folded.clone().next().is_none() {
                return Some(0);
            }
            let mut consumed = 0;
            for c in hay.chars() {
                for x in c.to_lowercase() {
                    match folded.next() {
                        Some(y) if x == y => {}
                        _ => return None,
                    }
                }
                consumed += c.len_utf8();
                if folded.clone().next().is_none() {
                    return Some(consumed);
                }
            }
            None
        }
    }
}

fn dict_bytes(bc: &Bytecode, idx: usize) -> Option<Vec<u8>> {
    bc.dict.get(idx).and_then(DictEntry::as_bytes).map(<[u8]>::to_vec)
}

/// cmp_str_eq_{cs,ci,utf8_ci}.
pub(crate) fn cmp_str_eq(bc: &mut Bytecode, buf: &[u8], pc: usize, fold: Fold) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let dict = bc.word(pc + 4) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(needle) = dict_bytes(bc, dict) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 8;
    };
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(hay) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        if bytes_eq(hay, &needle, fold) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Where {
    Prefix,
    Suffix,
    Substr,
}

/// contains_{prefix,suffix,substr}_{cs,ci,utf8_ci}: match and return
/// the remaining slice for chaining.
pub(crate) fn contains(bc: &mut Bytecode, buf: &[u8], pc: usize, at: Where, fold: Fold) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let dict = bc.word(pc + 6) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(needle) = dict_bytes(bc, dict) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 10;
    };
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(hay) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let matched = match at {
            Where::Prefix => prefix_len(hay, &needle, fold).map(|n| (n, hay.len() - n)),
            Where::Suffix => suffix_match(hay, &needle, fold).map(|keep| (0, keep)),
            Where::Substr => find_at(hay, &needle, fold).map(|(pos, n)| {
                let after = pos + n;
                (after, hay.len() - after)
            }),
        };
        if let Some((skip, remain)) = matched {
            out.offsets[i] = src.offsets[i] + skip as u32;
            out.sizes[i] = remain as u32;
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// Bytes kept in front of a matched suffix, or `None`.
fn suffix_match(hay: &[u8], needle: &[u8], fold: Fold) -> Option<usize> {
    match fold {
        Fold::Cs | Fold::Ci => {
            if hay.len() < needle.len() {
                return None;
            }
            let keep = hay.len() - needle.len();
            bytes_eq(&hay[keep..], needle, fold).then_some(keep)
        }
        Fold::Utf8Ci => {
            let text = std::str::from_utf8(hay).ok()?;
            text.char_indices()
                .map(|(at, _)| at)
                .chain(std::iter::once(hay.len()))
                .find(|&at| bytes_eq(&hay[at..], needle, fold))
        }
    }
}

/// First match position and matched byte length.
fn find_at(hay: &[u8], needle: &[u8], fold: Fold) -> Option<(usize, usize)> {
    match fold {
        Fold::Cs => memchr::memmem::find(hay, needle).map(|p| (p, needle.len())),
        Fold::Ci => (0..=hay.len().saturating_sub(needle.len()))
            .find(|&p| hay[p..p + needle.len()].eq_ignore_ascii_case(needle))
            .map(|p| (p, needle.len())),
        Fold::Utf8Ci => {
            let text = std::str::from_utf8(hay).ok()?;
            for (at, _) in text.char_indices().chain(std::iter::once((hay.len(), ' '))) {
                if let Some(n) = prefix_len(&hay[at..], needle, fold) {
                    return Some((at, n));
                }
            }
            None
        }
    }
}

/// eq_pattern / contains_pattern: wildcard positions match exactly one
/// character.
pub(crate) fn match_pattern(
    bc: &mut Bytecode,
    buf: &[u8],
    pc: usize,
    whole: bool,
    fold: Fold,
) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 4));
    let dict = bc.word(pc + 6) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(DictEntry::Pattern(pattern)) = bc.dict.get(dict) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 10;
    };
    let pattern = pattern.clone();
    let mut out = BaseReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(hay) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let matched = if whole {
            pattern_match_at(hay, &pattern, fold)
                .filter(|&n| n == hay.len())
                .map(|n| (n, 0))
        } else {
            (0..=hay.len())
                .find_map(|p| pattern_match_at(&hay[p..], &pattern, fold).map(|n| (p + n, hay.len() - p - n)))
        };
        if let Some((skip, remain)) = matched {
            out.offsets[i] = src.offsets[i] + skip as u32;
            out.sizes[i] = remain as u32;
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// Bytes of `hay` consumed by the pattern anchored at the front, or
/// `None`.
fn pattern_match_at(hay: &[u8], pattern: &Pattern, fold: Fold) -> Option<usize> {
    match fold {
        Fold::Cs | Fold::Ci => {
            if hay.len() < pattern.bytes.len() {
                return None;
            }
            for (i, (&p, &w)) in pattern.bytes.iter().zip(pattern.wild.iter()).enumerate() {
                if w {
                    continue;
                }
                let h = hay[i];
                let ok = if fold == Fold::Ci {
                    h.eq_ignore_ascii_case(&p)
                } else {
                    h == p
                };
                if !ok {
                    return None;
                }
            }
            Some(pattern.bytes.len())
        }
        Fold::Utf8Ci => {
            let text = std::str::from_utf8(hay).ok()?;
            let pat = std::str::from_utf8(&pattern.bytes).ok()?;
            let mut consumed = 0;
            let mut hay_chars = text.chars();
            for (pat_at, pc_char) in pat.char_indices() {
                let h = hay_chars.next()?;
                let wild = pattern.wild[pat_at];
                if !wild
                    && !h
                        .to_lowercase()
                        .eq(pc_char.to_lowercase())
                {
                    return None;
                }
                consumed += h.len_utf8();
            }
            Some(consumed)
        }
    }
}

/// cmp_str_fuzzy_A3 / contains_fuzzy_A3 and their unicode variants:
/// bounded Damerau-style distance against the dictionary needle, with
/// the per-lane threshold in a scalar register.
pub(crate) fn fuzzy(
    bc: &mut Bytecode,
    buf: &[u8],
    pc: usize,
    contains: bool,
    unicode: bool,
) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let threshold = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let dict = bc.word(pc + 6) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let Some(needle) = dict_bytes(bc, dict) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 10;
    };
    let needle_units = units(&needle, unicode);
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(hay) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        let bound = threshold.i64(i);
        if bound < 0 {
            continue;
        }
        let hay_units = units(hay, unicode);
        let distance = damerau(&hay_units, &needle_units, contains);
        if distance <= bound as usize {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 10
}

fn units(bytes: &[u8], unicode: bool) -> Vec<u32> {
    if unicode {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.chars().map(u32::from).collect(),
            Err(_) => bytes.iter().map(|&b| u32::from(b)).collect(),
        }
    } else {
        bytes.iter().map(|&b| u32::from(b)).collect()
    }
}

/// Damerau-Levenshtein distance (with adjacent transposition). In
/// substring mode the needle may start and end anywhere in the
/// haystack at no cost.
fn damerau(hay: &[u32], needle: &[u32], substring: bool) -> usize {
    let n = needle.len();
    let m = hay.len();
    if n == 0 {
        return 0;
    }
    // rows indexed by haystack position; dp[j] = distance for needle[..j]
    let mut prev2: Vec<usize> = Vec::new();
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut best = if substring { prev[n] } else { usize::MAX };
    for i in 1..=m {
        let mut current = vec![0usize; n + 1];
        current[0] = if substring { 0 } else { i };
        for j in 1..=n {
            let cost = usize::from(hay[i - 1] != needle[j - 1]);
            let mut d = (prev[j] + 1).min(current[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1
                && j > 1
                && hay[i - 1] == needle[j - 2]
                && hay[i - 2] == needle[j - 1]
            {
                d = d.min(prev2[j - 2] + 1);
            }
            current[j] = d;
        }
        if substring {
            best = best.min(current[n]);
        }
        prev2 = std::mem::replace(&mut prev, current);
    }
    if substring {
        best
    } else {
        prev[n]
    }
}

/// is_subnet_of_ip4: parse a dotted quad and test the dictionary range.
pub(crate) fn is_subnet_of_ip4(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let dict = bc.word(pc + 4) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let Some(&DictEntry::IpRange { min, max }) = bc.dict.get(dict) else {
        bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
        return pc + 8;
    };
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(bytes) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        if let Some(addr) = parse_ip4(bytes) {
            if (min..=max).contains(&addr) {
                mask |= 1 << i;
            }
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}


fn parse_ip4(bytes: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut addr: u32 = 0;
    let mut octets = 0;
    for part in text.split('.') {
        if part.is_empty() || part.len() > 3 || octets == 4 {
            return None;
        }
        let value: u32 = part.parse().ok()?;
        if value > 255 {
            return None;
        }
        addr = addr << 8 | value;
        octets += 1;
    }
    (octets == 4).then_some(addr)
}

/// dfa_tiny{6,7,8}[Z] / dfa_large[Z]: run a dictionary automaton.
/// `state_budget` is `None` for the large variants.
pub(crate) fn dfa(bc: &mut Bytecode, buf: &[u8], pc: usize, state_budget: Option<usize>) -> usize {
    let src = BaseReg::load(&bc.vstack, bc.word(pc + 2));
    let dict = bc.word(pc + 4) as usize;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let program: DfaProgram = match bc.dict.get(dict) {
        Some(DictEntry::Dfa(p)) => p.clone(),
        _ => {
            bc.set_err(BcError::Corrupt, pc - 2, dict as u64);
            return pc + 8;
        }
    };
    if let Some(budget) = state_budget {
        if program.state_count() > budget {
            bc.set_err(BcError::Corrupt, pc - 2, program.state_count() as u64);
            return pc + 8;
        }
    }
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        let Some(bytes) = bc.vmref(buf, src.offsets[i], src.sizes[i]) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        if program.matches(bytes) {
            mask |= 1 << i;
        }
    }
    let off = bc.word(pc);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}
#[cfg(test)]
mod tests {
    use super::*;

    fn d(a: &str, b: &str) -> usize {
        damerau(&units(a.as_bytes(), false), &units(b.as_bytes(), false), false)
    }

    #[test]
    fn edit_distance_with_transposition() {
        assert_eq!(d("kitten", "kitten"), 0);
        assert_eq!(d("sitting", "kitten"), 3);
        assert_eq!(d("", "abc"), 3);
        assert_eq!(d("abc", ""), 0); // empty needle matches anything
        // One adjacent transposition counts as a single edit.
        assert_eq!(d("acb", "abc"), 1);
    }

    #[test]
    fn substring_distance_ignores_flanks() {
        let hay = units(b"xxxkittenyyy", false);
        let needle = units(b"kitten", false);
        assert_eq!(damerau(&hay, &needle, true), 0);
        let hay = units(b"xxxkitchenyyy", false);
        assert_eq!(damerau(&hay, &needle, true), 2);
    }

    #[test]
    fn prefix_matching_folds() {
        assert_eq!(prefix_len(b"Hello World", b"hello", Fold::Ci), Some(5));
        assert_eq!(prefix_len(b"Hello World", b"hello", Fold::Cs), None);
        assert_eq!(prefix_len(b"Hello", b"", Fold::Utf8Ci), Some(0));
        assert_eq!(
            prefix_len("Äpfel und".as_bytes(), "äpfel".as_bytes(), Fold::Utf8Ci),
            Some("Äpfel".len())
        );
    }

    #[test]
    fn ip4_parsing() {
        assert_eq!(parse_ip4(b"192.168.1.10"), Some(0xC0A8_010A));
        assert_eq!(parse_ip4(b"0.0.0.0"), Some(0));
        assert_eq!(parse_ip4(b"256.0.0.1"), None);
        assert_eq!(parse_ip4(b"1.2.3"), None);
        assert_eq!(parse_ip4(b"1.2.3.4.5"), None);
        assert_eq!(parse_ip4(b"a.b.c.d"), None);
    }
}
