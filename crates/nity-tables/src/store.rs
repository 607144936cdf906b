//! The simulation `TableStore`: everything the agent owns, in one process.

use nity_common::{ActiveTable, BackendId, FallbackKey, RtControl};
use nity_core::traits::TableStore;

use crate::control::{ControlTable, FallbackTables};
use crate::heartbeat::Heartbeat;
use crate::slot::SlotTables;

/// The agent-owned state, simulated in-process for tests and the harness binary.
///
/// This is the direct analog of the real pinned BPF maps: `nity-loader`'s `bpf`
/// feature swaps this out for a backend that talks to `aya` instead, behind the same
/// [`TableStore`] trait, so `nity-core`'s pipeline code never has to know which one
/// it's reading.
#[derive(Default)]
pub struct SimTableStore {
    pub slots: SlotTables,
    pub control: ControlTable,
    pub fallback: FallbackTables,
    pub heartbeat: Heartbeat,
}

impl SimTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableStore for SimTableStore {
    fn read_epoch(&self) -> u64 {
        self.slots.read_epoch()
    }

    fn read_active_table(&self) -> ActiveTable {
        self.slots.read_active()
    }

    fn last_agent_seen_ts(&self) -> u64 {
        self.heartbeat.read()
    }

    fn slot_lookup(&self, table: ActiveTable, route_key: u64) -> Option<BackendId> {
        self.slots.lookup(table, route_key)
    }

    fn rt_control(&self, route_group_key: u64) -> Option<RtControl> {
        self.control.get(route_group_key)
    }

    fn fallback_size(&self, route_group_key: u64) -> Option<u32> {
        self.fallback.size(route_group_key)
    }

    fn fallback_backend(&self, key: FallbackKey) -> Option<BackendId> {
        self.fallback.backend(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nity_common::AdmissionMode;

    #[test]
    fn reads_through_to_every_sub_table() {
        let store = SimTableStore::new();
        store.slots.populate(ActiveTable::A, 7, BackendId::new(1, 1));
        store.control.set(3, RtControl::new(AdmissionMode::Soft));
        store.fallback.set_backends(3, &[BackendId::new(9, 9)]);
        store.heartbeat.beat(42);

        assert_eq!(store.slot_lookup(ActiveTable::A, 7), Some(BackendId::new(1, 1)));
        assert_eq!(store.rt_control(3).unwrap().admission(), AdmissionMode::Soft);
        assert_eq!(store.fallback_backend(FallbackKey::new(3, 0)), Some(BackendId::new(9, 9)));
        assert_eq!(store.last_agent_seen_ts(), 42);
    }
}
