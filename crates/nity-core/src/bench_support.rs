//! In-memory fakes exposed (but not part of the public API surface) purely so
//! `benches/pipeline.rs` has something concrete to drive. Production callers use the
//! real `TableStore`/`Conntrack` implementations in `nity-tables`/`nity-conntrack`.
#![doc(hidden)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use nity_common::{ActiveTable, BackendId, ConntrackVal, CounterId, FallbackKey, RtControl};

use crate::traits::{Conntrack, Counters, TableStore};

pub struct BenchStore {
    epoch: AtomicU64,
    slots_a: HashMap<u64, BackendId>,
}

impl BenchStore {
    /// Populate `n` route keys in table A under a single synthetic route group.
    pub fn populated(n: u32) -> Self {
        let rg = nity_common::hash::route_group_key(0x0800_000A, 80u16.to_be(), 6);
        let mut slots_a = HashMap::with_capacity(n as usize);
        for slot in 0..n.min(nity_common::abi::SLOTS_TOTAL) {
            let rk = nity_common::hash::combine(rg, slot as u64);
            slots_a.insert(rk, BackendId::new(0x0100_000A + slot, 9000u16.to_be()));
        }
        Self {
            epoch: AtomicU64::new(1),
            slots_a,
        }
    }
}

impl TableStore for BenchStore {
    fn read_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }
    fn read_active_table(&self) -> ActiveTable {
        ActiveTable::A
    }
    fn last_agent_seen_ts(&self) -> u64 {
        u64::MAX / 2
    }
    fn slot_lookup(&self, _table: ActiveTable, route_key: u64) -> Option<BackendId> {
        self.slots_a.get(&route_key).copied()
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

#[derive(Default)]
pub struct BenchConntrack {
    entries: Mutex<HashMap<u64, ConntrackVal>>,
}

impl Conntrack for BenchConntrack {
    fn get(&self, flow_key: u64) -> Option<ConntrackVal> {
        self.entries.lock().unwrap().get(&flow_key).copied()
    }
    fn touch(&self, flow_key: u64, now_ns: u64, epoch_seen: u64) {
        if let Some(v) = self.entries.lock().unwrap().get_mut(&flow_key) {
            v.last_seen_ns = now_ns;
            v.epoch_seen = epoch_seen;
        }
    }
    fn install(&self, flow_key: u64, val: ConntrackVal) {
        self.entries.lock().unwrap().insert(flow_key, val);
    }
}

#[derive(Default)]
pub struct BenchCounters {
    counts: Mutex<HashMap<u32, u64>>,
}

impl Counters for BenchCounters {
    fn incr(&self, id: CounterId) {
        *self.counts.lock().unwrap().entry(id as u32).or_insert(0) += 1;
    }
}
