//! Minimal in-memory fakes shared by this crate's unit tests.
//!
//! These are intentionally simpler than `nity-tables`/`nity-conntrack` (no sharding, no
//! LRU eviction, no concurrency): they exist only to exercise `nity-core`'s pure logic
//! in isolation. The end-to-end scenarios in `nity-agent-sim` run against the real
//! simulation backends instead.

#![cfg(test)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use nity_common::{ActiveTable, BackendId, ConntrackVal, CounterId, FallbackKey, RtControl};

use crate::traits::{Conntrack, Counters, TableStore};

#[derive(Default)]
pub struct FakeStore {
    pub epoch: Cell<u64>,
    pub active: Cell<Option<ActiveTable>>,
    pub last_agent_seen_ts: Cell<u64>,
    pub slots_a: RefCell<HashMap<u64, BackendId>>,
    pub slots_b: RefCell<HashMap<u64, BackendId>>,
    pub rt_control: RefCell<HashMap<u64, RtControl>>,
    pub fallback_size: RefCell<HashMap<u64, u32>>,
    pub fallback_backends: RefCell<HashMap<FallbackKey, BackendId>>,
}

impl FakeStore {
    pub fn set_active(&mut self, table: ActiveTable, epoch: u64) {
        self.active.set(Some(table));
        self.epoch.set(epoch);
    }

    pub fn set_slot(&mut self, table: ActiveTable, route_key: u64, backend: BackendId) {
        match table {
            ActiveTable::A => self.slots_a.borrow_mut().insert(route_key, backend),
            ActiveTable::B => self.slots_b.borrow_mut().insert(route_key, backend),
        };
    }

    pub fn set_rt_control(&mut self, route_group_key: u64, ctl: RtControl) {
        self.rt_control.borrow_mut().insert(route_group_key, ctl);
    }

    pub fn set_fallback(&mut self, route_group_key: u64, backends: &[BackendId]) {
        self.fallback_size
            .borrow_mut()
            .insert(route_group_key, backends.len() as u32);
        for (idx, b) in backends.iter().enumerate() {
            self.fallback_backends
                .borrow_mut()
                .insert(FallbackKey::new(route_group_key, idx as u32), *b);
        }
    }
}

impl TableStore for FakeStore {
    fn read_epoch(&self) -> u64 {
        self.epoch.get()
    }

    fn read_active_table(&self) -> ActiveTable {
        self.active.get().unwrap_or(ActiveTable::A)
    }

    fn last_agent_seen_ts(&self) -> u64 {
        self.last_agent_seen_ts.get()
    }

    fn slot_lookup(&self, table: ActiveTable, route_key: u64) -> Option<BackendId> {
        match table {
            ActiveTable::A => self.slots_a.borrow().get(&route_key).copied(),
            ActiveTable::B => self.slots_b.borrow().get(&route_key).copied(),
        }
    }

    fn rt_control(&self, route_group_key: u64) -> Option<RtControl> {
        self.rt_control.borrow().get(&route_group_key).copied()
    }

    fn fallback_size(&self, route_group_key: u64) -> Option<u32> {
        self.fallback_size.borrow().get(&route_group_key).copied()
    }

    fn fallback_backend(&self, key: FallbackKey) -> Option<BackendId> {
        self.fallback_backends.borrow().get(&key).copied()
    }
}

#[derive(Default)]
pub struct FakeConntrack {
    entries: RefCell<HashMap<u64, ConntrackVal>>,
}

impl Conntrack for FakeConntrack {
    fn get(&self, flow_key: u64) -> Option<ConntrackVal> {
        self.entries.borrow().get(&flow_key).copied()
    }

    fn touch(&self, flow_key: u64, now_ns: u64, epoch_seen: u64) {
        if let Some(v) = self.entries.borrow_mut().get_mut(&flow_key) {
            v.last_seen_ns = now_ns;
            v.epoch_seen = epoch_seen;
        }
    }

    fn install(&self, flow_key: u64, val: ConntrackVal) {
        self.entries.borrow_mut().insert(flow_key, val);
    }
}

#[derive(Default)]
pub struct FakeCounters {
    counts: RefCell<HashMap<u32, u64>>,
}

impl FakeCounters {
    pub fn count(&self, id: CounterId) -> u64 {
        *self.counts.borrow().get(&(id as u32)).unwrap_or(&0)
    }
}

impl Counters for FakeCounters {
    fn incr(&self, id: CounterId) {
        *self.counts.borrow_mut().entry(id as u32).or_insert(0) += 1;
    }
}
