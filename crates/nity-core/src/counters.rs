//! A concrete, allocation-free `Counters` implementation for std environments.
//!
//! The real ABI counter map is `BPF_MAP_TYPE_PERCPU_ARRAY`: each CPU gets its own copy
//! of the array so increments are uncontended, and a reader sums across CPUs. This
//! mirrors that shape with one `[AtomicU64; CounterId::COUNT]` row per
//! `std::thread::available_parallelism()` slot, round-robin-assigned to threads on
//! first use and cached thereafter, summed across rows on read.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use nity_common::CounterId;

use crate::traits::Counters;

thread_local! {
    static SLOT: Cell<Option<usize>> = Cell::new(None);
}

/// Per-CPU-shaped monotone counters.
pub struct PerCpuCounters {
    rows: Vec<[AtomicU64; CounterId::COUNT]>,
    next_slot: AtomicUsize,
}

impl PerCpuCounters {
    /// Create a counter set sized to the host's available parallelism.
    pub fn new() -> Self {
        let width = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_width(width)
    }

    /// Create a counter set with an explicit number of rows (mainly for tests).
    pub fn with_width(width: usize) -> Self {
        let width = width.max(1);
        let rows = (0..width)
            .map(|_| std::array::from_fn(|_| AtomicU64::new(0)))
            .collect();
        Self {
            rows,
            next_slot: AtomicUsize::new(0),
        }
    }

    fn my_slot(&self) -> usize {
        SLOT.with(|cell| {
            if let Some(slot) = cell.get() {
                return slot;
            }
            let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.rows.len();
            cell.set(Some(slot));
            slot
        })
    }

    /// Sum one counter across every row. Used by the metrics exporter surface.
    pub fn sum(&self, id: CounterId) -> u64 {
        self.rows
            .iter()
            .map(|row| row[id.index()].load(Ordering::Relaxed))
            .sum()
    }

    /// Sum every counter, in [`CounterId::ALL`] order. Convenient for a metrics scrape.
    pub fn snapshot(&self) -> [u64; CounterId::COUNT] {
        let mut out = [0u64; CounterId::COUNT];
        for (i, id) in CounterId::ALL.into_iter().enumerate() {
            out[i] = self.sum(id);
        }
        out
    }
}

impl Default for PerCpuCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters for PerCpuCounters {
    fn incr(&self, id: CounterId) {
        let slot = self.my_slot();
        self.rows[slot][id.index()].fetch_add(1, Ordering::Relaxed);
    }
}
