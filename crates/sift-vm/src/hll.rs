//! Dense HyperLogLog registers for approximate distinct counting.
//!
//! The register array lives inside the aggregation slot buffer: a slot
//! with precision `p` spans `2^p` one-byte registers (`2^p / 8` cells).
//! Updating with a 64-bit hash takes the top `p` bits as the register
//! index and stores the maximum observed rank of the remaining bits.
//! Merging two register arrays is a byte-wise maximum; the estimator is
//! the standard bias-corrected harmonic mean.

use crate::aggtable::AggBuffer;

/// Cells occupied by an HLL slot of the given precision.
#[must_use]
pub const fn cells_for_precision(precision: u16) -> usize {
    (1usize << precision) / 8
}

/// Fold one 64-bit hash into the register array at `cell`.
pub fn update(agg: &AggBuffer, cell: usize, precision: u16, hash: u64) {
    let p = u32::from(precision);
    let index = (hash >> (64 - p)) as usize;
    let rest = hash << p;
    let rank = (rest.leading_zeros() + 1).min(64 - p + 1) as u8;
    agg.max_byte(cell + index / 8, index % 8, rank);
}

/// Merge a serialised register array (byte-wise maximum).
pub fn merge(agg: &AggBuffer, cell: usize, precision: u16, other: &[u8]) {
    let registers = 1usize << precision;
    for (i, &byte) in other.iter().take(registers).enumerate() {
        agg.max_byte(cell + i / 8, i % 8, byte);
    }
}

/// Estimate the distinct count from the register array at `cell`.
#[must_use]
pub fn estimate(agg: &AggBuffer, cell: usize, precision: u16) -> u64 {
    let m = (1usize << precision) as f64;
    let alpha = match precision {
        4 => 0.673,
        5 => 0.697,
        6 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m),
    };
    let mut sum = 0.0f64;
    let mut zeros = 0usize;
    for i in 0..(1usize << precision) {
        let byte = (agg.load(cell + i / 8) >> ((i % 8) * 8)) as u8;
        sum += 2.0f64.powi(-i32::from(byte));
        if byte == 0 {
            zeros += 1;
        }
    }
    let raw = alpha * m * m / sum;
    // Small-range correction: linear counting while registers are empty.
    let corrected = if raw <= 2.5 * m && zeros > 0 {
        m * (m / zeros as f64).ln()
    } else {
        raw
    };
    corrected as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash64(v: u64) -> u64 {
        xxhash_rust::xxh3::xxh3_64(&v.to_le_bytes())
    }

    #[test]
    fn estimate_is_close_for_known_cardinality() {
        let precision = 12u16;
        let agg = AggBuffer::new(cells_for_precision(precision), 0);
        let n = 10_000u64;
        for v in 0..n {
            update(&agg, 0, precision, hash64(v));
        }
        let est = estimate(&agg, 0, precision);
        let err = (est as f64 - n as f64).abs() / n as f64;
        assert!(err < 0.05, "estimate {est} too far from {n}");
    }

    #[test]
    fn duplicates_do_not_inflate() {
        let precision = 10u16;
        let agg = AggBuffer::new(cells_for_precision(precision), 0);
        for _ in 0..100 {
            for v in 0..50u64 {
                update(&agg, 0, precision, hash64(v));
            }
        }
        let est = estimate(&agg, 0, precision);
        assert!(est >= 40 && est <= 60, "estimate {est} should be near 50");
    }

    #[test]
    fn merge_is_union() {
        let precision = 10u16;
        let cells = cells_for_precision(precision);
        let a = AggBuffer::new(cells, 0);
        let b = AggBuffer::new(cells, 0);
        for v in 0..500u64 {
            update(&a, 0, precision, hash64(v));
        }
        for v in 250..750u64 {
            update(&b, 0, precision, hash64(v));
        }
        // Serialise b and merge into a.
        let mut serialised = vec![0u8; 1 << precision];
        for i in 0..(1usize << precision) {
            serialised[i] = (b.load(i / 8) >> ((i % 8) * 8)) as u8;
        }
        merge(&a, 0, precision, &serialised);
        let est = estimate(&a, 0, precision);
        assert!(
            (700..=800).contains(&est),
            "union estimate {est} should be near 750"
        );
    }
}
