//! Bounded double-read of `(epoch, active_table)`.
//!
//! The agent's flip protocol writes the new slot table, bumps `epoch`, then flips
//! `active_table` (or brackets the flip with the epoch bump — either ordering is legal
//! as long as the bump is not reordered past the flip). A reader that takes the two
//! values from two unsynchronised map reads can observe a torn pair spanning the flip.
//! This routine re-reads the epoch after the table and, if it changed, re-reads both
//! once more — bounded at one extra round so the hot path never loops unboundedly.

use nity_common::ActiveTable;

use crate::traits::TableStore;

/// A self-consistent `(epoch, active_table)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochTable {
    pub epoch: u64,
    pub table: ActiveTable,
}

/// Perform the bounded double-read described above.
pub fn read_epoch_and_active_table(store: &dyn TableStore) -> EpochTable {
    let e1 = store.read_epoch();
    let t = store.read_active_table();
    let e2 = store.read_epoch();

    if e2 == e1 {
        return EpochTable { epoch: e2, table: t };
    }

    // The table may have flipped between our two epoch reads; take one more round.
    let t2 = store.read_active_table();
    let e3 = store.read_epoch();
    EpochTable { epoch: e3, table: t2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use nity_common::{BackendId, FallbackKey, RtControl};

    /// A `TableStore` whose epoch/active_table reads are scripted so tests can force
    /// the exact interleavings the bounded double-read is meant to survive.
    struct Scripted {
        epoch_reads: Cell<std::vec::IntoIter<u64>>,
        table_reads: Cell<std::vec::IntoIter<ActiveTable>>,
    }

    impl Scripted {
        fn new(epochs: Vec<u64>, tables: Vec<ActiveTable>) -> Self {
            Self {
                epoch_reads: Cell::new(epochs.into_iter()),
                table_reads: Cell::new(tables.into_iter()),
            }
        }
    }

    impl TableStore for Scripted {
        fn read_epoch(&self) -> u64 {
            let mut it = self.epoch_reads.take();
            let v = it.next().expect("scripted epoch reads exhausted");
            self.epoch_reads.set(it);
            v
        }
        fn read_active_table(&self) -> ActiveTable {
            let mut it = self.table_reads.take();
            let v = it.next().expect("scripted table reads exhausted");
            self.table_reads.set(it);
            v
        }
        fn last_agent_seen_ts(&self) -> u64 {
            0
        }
        fn slot_lookup(&self, _table: ActiveTable, _route_key: u64) -> Option<BackendId> {
            None
        }
        fn rt_control(&self, _route_group_key: u64) -> Option<RtControl> {
            None
        }
        fn fallback_size(&self, _route_group_key: u64) -> Option<u32> {
            None
        }
        fn fallback_backend(&self, _key: FallbackKey) -> Option<BackendId> {
            None
        }
    }

    #[test]
    fn stable_pair_returns_on_first_read() {
        let store = Scripted::new(vec![5, 5], vec![ActiveTable::A]);
        let got = read_epoch_and_active_table(&store);
        assert_eq!(got, EpochTable { epoch: 5, table: ActiveTable::A });
    }

    #[test]
    fn flip_between_reads_triggers_one_extra_round() {
        // e1=5 (pre-flip), active read lands on the just-flipped B, e2=6 (post-flip) —
        // the mismatch forces a re-read of both, landing on the coherent (6, B) pair.
        let store = Scripted::new(vec![5, 6, 6], vec![ActiveTable::B, ActiveTable::B]);
        let got = read_epoch_and_active_table(&store);
        assert_eq!(got, EpochTable { epoch: 6, table: ActiveTable::B });
    }
}
