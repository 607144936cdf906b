//! The dual slot tables and the active_table/epoch pair.
//!
//! `active_table` and `epoch` are deliberately two independent atomics rather than one
//! `arc_swap::ArcSwap<(u64, ActiveTable)>`. Bundling them would make every reader's
//! observation atomic by construction, which is not how the real `active_table` array
//! map and `epoch` array map behave — they are two separate map slots with no joint
//! atomicity guarantee, and `nity-core`'s bounded double-read exists specifically to
//! cope with that. Keeping them separate here is what makes this simulation an honest
//! stand-in for the real maps rather than a strictly-stronger one.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use nity_common::{ActiveTable, BackendId};

/// The two slot tables plus the selector pair that chooses between them.
pub struct SlotTables {
    table_a: DashMap<u64, BackendId>,
    table_b: DashMap<u64, BackendId>,
    active: AtomicU32,
    epoch: AtomicU64,
}

impl SlotTables {
    pub fn new() -> Self {
        Self {
            table_a: DashMap::with_capacity(nity_common::abi::MAX_SLOT_ENTRIES),
            table_b: DashMap::with_capacity(nity_common::abi::MAX_SLOT_ENTRIES),
            active: AtomicU32::new(ActiveTable::A as u32),
            epoch: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn read_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    #[inline]
    pub fn read_active(&self) -> ActiveTable {
        ActiveTable::from_raw(self.active.load(Ordering::Acquire))
    }

    #[inline]
    pub fn lookup(&self, table: ActiveTable, route_key: u64) -> Option<BackendId> {
        match table {
            ActiveTable::A => self.table_a.get(&route_key).map(|e| *e),
            ActiveTable::B => self.table_b.get(&route_key).map(|e| *e),
        }
    }

    /// Agent-side: populate an entry in the *inactive* table ahead of a flip. Callers
    /// are free to write to either table directly; this does not enforce which one is
    /// "inactive" because the agent may legitimately want to patch the live table too.
    pub fn populate(&self, table: ActiveTable, route_key: u64, backend: BackendId) {
        match table {
            ActiveTable::A => self.table_a.insert(route_key, backend),
            ActiveTable::B => self.table_b.insert(route_key, backend),
        };
    }

    pub fn remove(&self, table: ActiveTable, route_key: u64) {
        match table {
            ActiveTable::A => self.table_a.remove(&route_key),
            ActiveTable::B => self.table_b.remove(&route_key),
        };
    }

    /// Agent-side: bump the epoch. Must happen after populating the new table and
    /// before (or as part of) flipping `active`, per the documented flip protocol.
    pub fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Agent-side: flip which table is authoritative.
    pub fn set_active(&self, table: ActiveTable) {
        self.active.store(table as u32, Ordering::Release);
    }
}

impl Default for SlotTables {
    fn default() -> Self {
        Self::new()
    }
}
