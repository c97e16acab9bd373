//! Aggregation slot buffer and grouped-aggregation bucket table.
//!
//! The slot buffer is a caller-sized region of 64-bit cells shared by
//! every worker of a scan. Updates for an already-allocated bucket are
//! lock-free: each combine primitive (add, min, max, and, or, xor,
//! count) is implemented atomically for its scalar width. Bucket
//! insertion is the only serialised path, guarded by a short mutex.
//!
//! Slot layout is a planner/engine contract and opaque here: opcode
//! operands carry a byte offset, grouped variants additionally index by
//! `bucket * stride`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Identity value installed in a slot before the first batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggInit {
    Zero,
    MinI64,
    MaxI64,
    MinF64,
    MaxF64,
    AllOnes,
}

impl AggInit {
    #[must_use]
    pub fn bits(self) -> u64 {
        match self {
            AggInit::Zero => 0,
            AggInit::MinI64 => i64::MAX as u64,
            AggInit::MaxI64 => i64::MIN as u64,
            AggInit::MinF64 => f64::INFINITY.to_bits(),
            AggInit::MaxF64 => f64::NEG_INFINITY.to_bits(),
            AggInit::AllOnes => u64::MAX,
        }
    }
}

/// Shared aggregation slot buffer.
#[derive(Debug)]
pub struct AggBuffer {
    cells: Vec<AtomicU64>,
    /// Cells per bucket for grouped aggregates.
    bucket_stride: usize,
}

impl AggBuffer {
    /// A buffer of `cells` 64-bit cells, zero-initialised, with the
    /// given per-bucket stride (in cells; 0 for non-grouped programs).
    #[must_use]
    pub fn new(cells: usize, bucket_stride: usize) -> Self {
        Self {
            cells: (0..cells).map(|_| AtomicU64::new(0)).collect(),
            bucket_stride,
        }
    }

    #[must_use]
    pub fn bucket_stride(&self) -> usize {
        self.bucket_stride
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Install an operator identity before the first batch.
    pub fn init_slot(&self, cell: usize, init: AggInit) {
        self.cells[cell].store(init.bits(), Ordering::Relaxed);
    }

    /// Initialise the same identity in every bucket of a grouped slot.
    pub fn init_grouped_slot(&self, cell: usize, init: AggInit, buckets: usize) {
        for b in 0..buckets {
            self.init_slot(cell + b * self.bucket_stride, init);
        }
    }

    /// Cell index for a grouped access.
    #[must_use]
    pub fn grouped_cell(&self, cell: usize, bucket: u32) -> usize {
        cell + bucket as usize * self.bucket_stride
    }

    #[must_use]
    pub fn load(&self, cell: usize) -> u64 {
        self.cells[cell].load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn load_i64(&self, cell: usize) -> i64 {
        self.load(cell) as i64
    }

    #[must_use]
    pub fn load_f64(&self, cell: usize) -> f64 {
        f64::from_bits(self.load(cell))
    }

    /// Wrapping two's-complement add; serves both counters and i64 sums.
    pub fn add_i64(&self, cell: usize, value: i64) {
        self.cells[cell].fetch_add(value as u64, Ordering::Relaxed);
    }

    pub fn add_f64(&self, cell: usize, value: f64) {
        self.update(cell, |bits| (f64::from_bits(bits) + value).to_bits());
    }

    pub fn min_i64(&self, cell: usize, value: i64) {
        self.update(cell, |bits| (bits as i64).min(value) as u64);
    }

    pub fn max_i64(&self, cell: usize, value: i64) {
        self.update(cell, |bits| (bits as i64).max(value) as u64);
    }

    pub fn min_f64(&self, cell: usize, value: f64) {
        self.update(cell, |bits| f64::from_bits(bits).min(value).to_bits());
    }

    pub fn max_f64(&self, cell: usize, value: f64) {
        self.update(cell, |bits| f64::from_bits(bits).max(value).to_bits());
    }

    pub fn and_u64(&self, cell: usize, value: u64) {
        self.cells[cell].fetch_and(value, Ordering::Relaxed);
    }

    pub fn or_u64(&self, cell: usize, value: u64) {
        self.cells[cell].fetch_or(value, Ordering::Relaxed);
    }

    pub fn xor_u64(&self, cell: usize, value: u64) {
        self.cells[cell].fetch_xor(value, Ordering::Relaxed);
    }

    /// Byte-wise maximum within one cell; the HLL register update.
    pub fn max_byte(&self, cell: usize, byte_index: usize, value: u8) {
        let shift = byte_index * 8;
        self.update(cell, |bits| {
            let current = (bits >> shift) as u8;
            if value > current {
                (bits & !(0xFFu64 << shift)) | u64::from(value) << shift
            } else {
                bits
            }
        });
    }

    fn update(&self, cell: usize, f: impl Fn(u64) -> u64) {
        let slot = &self.cells[cell];
        let mut current = slot.load(Ordering::Relaxed);
        loop {
            let next = f(current);
            if next == current {
                return;
            }
            match slot.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Shared bucket table for grouped aggregation: 64-bit group hash to
/// dense bucket index. Probing is lock-free against a snapshot;
/// inserting a new bucket takes the mutex.
#[derive(Debug)]
pub struct AggHashTable {
    inner: Mutex<HashMap<u64, u32>>,
    capacity: usize,
}

impl AggHashTable {
    /// A table admitting at most `capacity` buckets (the planner sizes
    /// the slot buffer for exactly this many).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Bucket for `hash`, appending a new one on first sight.
    /// Returns `None` when the table is full.
    #[must_use]
    pub fn bucket(&self, hash: u64) -> Option<u32> {
        let mut map = self.inner.lock();
        if let Some(&bucket) = map.get(&hash) {
            return Some(bucket);
        }
        if map.len() >= self.capacity {
            return None;
        }
        let bucket = map.len() as u32;
        map.insert(hash, bucket);
        Some(bucket)
    }

    /// Number of allocated buckets.
    #[must_use]
    pub fn buckets(&self) -> usize {
        self.inner.lock().len()
    }

    /// Snapshot of `(hash, bucket)` pairs in bucket order.
    #[must_use]
    pub fn entries(&self) -> Vec<(u64, u32)> {
        let mut entries: Vec<(u64, u32)> = self.inner.lock().iter().map(|(&h, &b)| (h, b)).collect();
        entries.sort_by_key(|&(_, b)| b);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn identities() {
        let buf = AggBuffer::new(4, 0);
        buf.init_slot(0, AggInit::MinI64);
        buf.init_slot(1, AggInit::MaxF64);
        assert_eq!(buf.load_i64(0), i64::MAX);
        assert_eq!(buf.load_f64(1), f64::NEG_INFINITY);
    }

    #[test]
    fn sum_min_max() {
        let buf = AggBuffer::new(3, 0);
        buf.init_slot(1, AggInit::MinI64);
        buf.init_slot(2, AggInit::MaxI64);
        for v in [5i64, -2, 7] {
            buf.add_i64(0, v);
            buf.min_i64(1, v);
            buf.max_i64(2, v);
        }
        assert_eq!(buf.load_i64(0), 10);
        assert_eq!(buf.load_i64(1), -2);
        assert_eq!(buf.load_i64(2), 7);
    }

    #[test]
    fn float_accumulation() {
        let buf = AggBuffer::new(1, 0);
        buf.add_f64(0, 1.5);
        buf.add_f64(0, 2.25);
        assert_eq!(buf.load_f64(0), 3.75);
    }

    #[test]
    fn grouped_cells_use_stride() {
        let buf = AggBuffer::new(8, 2);
        assert_eq!(buf.grouped_cell(1, 0), 1);
        assert_eq!(buf.grouped_cell(1, 3), 7);
    }

    #[test]
    fn bucket_table_appends_once_per_hash() {
        let table = AggHashTable::new(4);
        assert_eq!(table.bucket(100), Some(0));
        assert_eq!(table.bucket(200), Some(1));
        assert_eq!(table.bucket(100), Some(0));
        assert_eq!(table.buckets(), 2);
    }

    #[test]
    fn bucket_table_refuses_past_capacity() {
        let table = AggHashTable::new(1);
        assert_eq!(table.bucket(1), Some(0));
        assert_eq!(table.bucket(2), None);
        assert_eq!(table.bucket(1), Some(0));
    }

    #[test]
    fn concurrent_sum_is_exact() {
        let buf = Arc::new(AggBuffer::new(1, 0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    buf.add_i64(0, 1);
                }
            }));
        }
        for h in handles {
            h.join().expect("worker should not panic");
        }
        assert_eq!(buf.load_i64(0), 4000);
    }
}
