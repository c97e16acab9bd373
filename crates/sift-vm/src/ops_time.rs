//! Temporal opcodes.
//!
//! The unboxed timestamp representation is microseconds since the Unix
//! epoch in an `i64` scalar lane; `unboxts`/`boxts` convert to and from
//! the encoded timestamp form. Calendar arithmetic goes through the
//! civil-date conversions of the codec crate.

use sift_ion::timestamp::{
    day_of_week, day_of_year, days_from_civil, DateTime, MICROS_PER_DAY, MICROS_PER_SEC,
};
use sift_ion::{header_size_of, Type};

use crate::bytecode::{BcError, Bytecode};
use crate::reg::{lanes, MaskReg, ScalarReg, ValueReg};

const MICROS_PER_HOUR: i64 = 3_600 * MICROS_PER_SEC;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SEC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateField {
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Dow,
    Doy,
    Month,
    Quarter,
    Year,
}

fn extract(micros: i64, field: DateField) -> i64 {
    let dt = DateTime::from_unix_micros(micros);
    match field {
        DateField::Microsecond => i64::from(dt.micros),
        DateField::Millisecond => i64::from(dt.micros) / 1_000,
        DateField::Second => i64::from(dt.second),
        DateField::Minute => i64::from(dt.minute),
        DateField::Hour => i64::from(dt.hour),
        DateField::Day => i64::from(dt.day),
        DateField::Dow => i64::from(day_of_week(micros.div_euclid(MICROS_PER_DAY))),
        DateField::Doy => day_of_year(dt.year, dt.month, dt.day),
        DateField::Month => i64::from(dt.month),
        DateField::Quarter => i64::from((dt.month - 1) / 3 + 1),
        DateField::Year => i64::from(dt.year),
    }
}

fn truncate(micros: i64, field: DateField) -> i64 {
    match field {
        DateField::Microsecond => micros,
        DateField::Millisecond => micros.div_euclid(1_000) * 1_000,
        DateField::Second => micros.div_euclid(MICROS_PER_SEC) * MICROS_PER_SEC,
        DateField::Minute => micros.div_euclid(MICROS_PER_MINUTE) * MICROS_PER_MINUTE,
        DateField::Hour => micros.div_euclid(MICROS_PER_HOUR) * MICROS_PER_HOUR,
        DateField::Day => micros.div_euclid(MICROS_PER_DAY) * MICROS_PER_DAY,
        DateField::Dow => micros, // handled by datetrunc_dow
        DateField::Doy => micros,
        DateField::Month => {
            let dt = DateTime::from_unix_micros(micros);
            days_from_civil(dt.year, dt.month, 1) * MICROS_PER_DAY
        }
        DateField::Quarter => {
            let dt = DateTime::from_unix_micros(micros);
            let month = (dt.month - 1) / 3 * 3 + 1;
            days_from_civil(dt.year, month, 1) * MICROS_PER_DAY
        }
        DateField::Year => {
            let dt = DateTime::from_unix_micros(micros);
            days_from_civil(dt.year, 1, 1) * MICROS_PER_DAY
        }
    }
}

/// dateextract*: component of a timestamp lane.
pub(crate) fn date_extract(bc: &mut Bytecode, pc: usize, field: DateField) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.set_i64(i, extract(src.i64(i), field));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// datetrunc* (except dow, which carries an immediate).
pub(crate) fn date_trunc(bc: &mut Bytecode, pc: usize, field: DateField) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.set_i64(i, truncate(src.i64(i), field));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// datetruncdow: truncate to the most recent given weekday (0=Sunday).
pub(crate) fn date_trunc_dow(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let dow = i64::from(bc.word(pc + 4) % 7);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let micros = src.i64(i);
        let day = micros.div_euclid(MICROS_PER_DAY);
        let back = (i64::from(day_of_week(day)) - dow).rem_euclid(7);
        out.set_i64(i, (day - back) * MICROS_PER_DAY);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 8
}

fn add_months(micros: i64, months: i64) -> i64 {
    let dt = DateTime::from_unix_micros(micros);
    let total = i64::from(dt.year) * 12 + i64::from(dt.month) - 1 + months;
    let year = total.div_euclid(12) as i32;
    let month = (total.rem_euclid(12) + 1) as u8;
    // Clamp the day to the target month's length.
    let next = if month == 12 {
        days_from_civil(year + 1, 1, 1)
    } else {
        days_from_civil(year, month + 1, 1)
    };
    let first = days_from_civil(year, month, 1);
    let day = u8::try_from(i64::from(dt.day).min(next - first)).unwrap_or(1);
    let intraday = micros.rem_euclid(MICROS_PER_DAY);
    days_from_civil(year, month, day) * MICROS_PER_DAY + intraday
}

/// dateaddmonth / dateaddquarter / dateaddyear (+ the imm form):
/// calendar-aware month stepping, day-of-month clamped.
pub(crate) fn date_add_months(
    bc: &mut Bytecode,
    pc: usize,
    imm: bool,
    months_per_unit: i64,
) -> usize {
    let ts = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let (amount, k_off) = if imm {
        (None, pc + 14)
    } else {
        (Some(ScalarReg::load(&bc.vstack, bc.word(pc + 6))), pc + 8)
    };
    let imm_v = if imm { bc.word64(pc + 6) as i64 } else { 0 };
    let k = MaskReg::load(&bc.vstack, bc.word(k_off));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let n = amount.as_ref().map_or(imm_v, |r| r.i64(i));
        out.set_i64(i, add_months(ts.i64(i), n * months_per_unit));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    if imm {
        pc + 16
    } else {
        pc + 10
    }
}

/// datediffmicrosecond: signed microsecond difference.
pub(crate) fn date_diff_micros(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let b = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.set_i64(i, b.i64(i).wrapping_sub(a.i64(i)));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    pc + 10
}

/// datediffparam: difference in units of the immediate divisor
/// (microseconds per unit).
pub(crate) fn date_diff_param(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let b = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let unit = bc.word64(pc + 8) as i64;
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 16));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if unit <= 0 {
            continue;
        }
        out.set_i64(i, b.i64(i).wrapping_sub(a.i64(i)).div_euclid(unit));
        mask |= 1 << i;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 18
}

/// datediffmqy: month (0), quarter (1), or year (2) difference.
pub(crate) fn date_diff_mqy(bc: &mut Bytecode, pc: usize) -> usize {
    let a = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let b = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let which = bc.word(pc + 8);
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let divisor = match which {
        0 => 1,
        1 => 3,
        _ => 12,
    };
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let x = DateTime::from_unix_micros(a.i64(i));
        let y = DateTime::from_unix_micros(b.i64(i));
        let months = (i64::from(y.year) * 12 + i64::from(y.month))
            - (i64::from(x.year) * 12 + i64::from(x.month));
        out.set_i64(i, months / divisor);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    pc + 12
}

/// datetounixepoch: whole seconds since the epoch.
pub(crate) fn date_to_unix_epoch(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.set_i64(i, src.i64(i).div_euclid(MICROS_PER_SEC));
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// datetounixmicro: the unboxed form is already microseconds.
pub(crate) fn date_to_unix_micro(bc: &mut Bytecode, pc: usize) -> usize {
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

/// unboxts: decode timestamp lanes to epoch microseconds.
pub(crate) fn unboxts(bc: &mut Bytecode, buf: &[u8], pc: usize) -> usize {
    let src = ValueReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    let mut mask = 0u16;
    for i in lanes(k.mask) {
        if Type::from_tlv(src.type_l[i]) != Type::Timestamp || src.sizes[i] == 0 {
            continue;
        }
        let decoded = bc
            .vmref(buf, src.offsets[i], src.sizes[i])
            .and_then(|mem| mem.get(src.header_size[i] as usize..))
            .and_then(|body| sift_ion::timestamp::decode_body(body).ok());
        match decoded {
            Some(dt) => {
                out.set_i64(i, dt.to_unix_micros());
                mask |= 1 << i;
            }
            None => {
                bc.set_err(BcError::Corrupt, pc - 2, i as u64);
                break;
            }
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask }.store(&mut bc.vstack, off);
    pc + 8
}

/// boxts: encode microsecond lanes as timestamp values in scratch.
pub(crate) fn boxts(bc: &mut Bytecode, pc: usize) -> usize {
    let src = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 4));
    let mut enc = sift_ion::Buffer::new();
    let mut out = ValueReg::default();
    for i in lanes(k.mask) {
        let dt = DateTime::from_unix_micros(src.i64(i));
        enc.clear();
        enc.write_timestamp(&dt);
        let bytes = enc.bytes().to_vec();
        let off = bc.scratch_append(&bytes);
        let Ok(hlen) = header_size_of(&bytes) else {
            bc.set_err(BcError::Corrupt, pc - 2, i as u64);
            break;
        };
        out.offsets[i] = off;
        out.sizes[i] = bytes.len() as u32;
        out.type_l[i] = bytes[0];
        out.header_size[i] = hlen as u8;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 6
}

/// timebucket.ts: align a timestamp down to a bucket of the given
/// width in microseconds.
pub(crate) fn timebucket_ts(bc: &mut Bytecode, pc: usize) -> usize {
    let ts = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let interval = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let width = interval.i64(i);
        if width > 0 {
            let v = ts.i64(i);
            out.set_i64(i, v - v.rem_euclid(width));
        }
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 8
}

/// widthbucket.{i64,f64}: SQL width_bucket over equal-width buckets.
pub(crate) fn widthbucket(bc: &mut Bytecode, pc: usize, float: bool) -> usize {
    let value = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let lo = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let hi = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let count = ScalarReg::load(&bc.vstack, bc.word(pc + 8));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 10));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let n = if float {
            count.f64(i) as i64
        } else {
            count.i64(i)
        };
        if n <= 0 {
            continue;
        }
        let bucket = if float {
            let (v, a, b) = (value.f64(i), lo.f64(i), hi.f64(i));
            if b <= a {
                continue;
            }
            if v < a {
                0
            } else if v >= b {
                n + 1
            } else {
                (((v - a) / (b - a)) * n as f64).floor() as i64 + 1
            }
        } else {
            let (v, a, b) = (value.i64(i), lo.i64(i), hi.i64(i));
            if b <= a {
                continue;
            }
            if v < a {
                0
            } else if v >= b {
                n + 1
            } else {
                ((v - a) as i128 * n as i128 / (b - a) as i128) as i64 + 1
            }
        };
        out.set_i64(i, bucket);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_fields() {
        // 2023-06-15T12:30:45.123456Z
        let micros = 1_686_832_245_123_456i64;
        assert_eq!(extract(micros, DateField::Year), 2023);
        assert_eq!(extract(micros, DateField::Month), 6);
        assert_eq!(extract(micros, DateField::Day), 15);
        assert_eq!(extract(micros, DateField::Hour), 12);
        assert_eq!(extract(micros, DateField::Minute), 30);
        assert_eq!(extract(micros, DateField::Second), 45);
        assert_eq!(extract(micros, DateField::Millisecond), 123);
        assert_eq!(extract(micros, DateField::Microsecond), 123_456);
        assert_eq!(extract(micros, DateField::Quarter), 2);
        assert_eq!(extract(micros, DateField::Doy), 166);
        // 2023-06-15 was a Thursday.
        assert_eq!(extract(micros, DateField::Dow), 4);
    }

    #[test]
    fn truncate_fields() {
        let micros = 1_686_832_245_123_456i64;
        let day = truncate(micros, DateField::Day);
        assert_eq!(day % MICROS_PER_DAY, 0);
        let month = truncate(micros, DateField::Month);
        let dt = DateTime::from_unix_micros(month);
        assert_eq!((dt.month, dt.day, dt.hour), (6, 1, 0));
        let year = truncate(micros, DateField::Year);
        let dt = DateTime::from_unix_micros(year);
        assert_eq!((dt.month, dt.day), (1, 1));
    }

    #[test]
    fn month_stepping_clamps_days() {
        // 2024-01-31 + 1 month = 2024-02-29 (leap year clamp).
        let jan31 = days_from_civil(2024, 1, 31) * MICROS_PER_DAY;
        let feb = add_months(jan31, 1);
        let dt = DateTime::from_unix_micros(feb);
        assert_eq!((dt.year, dt.month, dt.day), (2024, 2, 29));
        // Negative steps work too.
        let dec31 = add_months(jan31, -1);
        let dt = DateTime::from_unix_micros(dec31);
        assert_eq!((dt.year, dt.month, dt.day), (2023, 12, 31));
    }
}
