//! The simulated control-plane agent.
//!
//! This is explicitly not a production component: it exists so tests and the harness
//! binary can play the agent's role without a real control plane. Every write here
//! corresponds to a write the real agent is documented to make in §3/§5.

use nity_common::{ActiveTable, BackendId};
use nity_tables::SimTableStore;
use tracing::{debug, info};

/// Drives one [`SimTableStore`] the way a real control-plane agent would.
pub struct Agent<'a> {
    store: &'a SimTableStore,
}

impl<'a> Agent<'a> {
    pub fn new(store: &'a SimTableStore) -> Self {
        Self { store }
    }

    /// Seed a backend set for a route group across every slot `0..SLOTS_TOTAL`,
    /// assigning slots to backends round-robin. Writes into whichever table is
    /// currently *inactive*, mirroring how a real agent stages a new generation
    /// without disturbing live traffic.
    pub fn seed_route_group(&self, vip_be: u32, vport_be: u16, proto: u8, backends: &[BackendId]) {
        assert!(!backends.is_empty(), "seed_route_group requires at least one backend");
        let target = self.store.slots.read_active().other();
        let rg = nity_common::hash::route_group_key(vip_be, vport_be, proto);
        for slot in 0..nity_common::abi::SLOTS_TOTAL {
            let route_key = nity_common::hash::combine(rg, slot as u64);
            let backend = backends[slot as usize % backends.len()];
            self.store.slots.populate(target, route_key, backend);
        }
        debug!(route_group = rg, table = ?target, "seeded route group");
    }

    /// Perform the documented flip protocol: the caller has already populated the
    /// inactive table (e.g. via [`Agent::seed_route_group`]); this bumps the epoch and
    /// flips `active_table` to point at it.
    pub fn flip(&self) -> (u64, ActiveTable) {
        let new_active = self.store.slots.read_active().other();
        let epoch = self.store.slots.bump_epoch();
        self.store.slots.set_active(new_active);
        info!(epoch, table = ?new_active, "flipped active table");
        (epoch, new_active)
    }

    pub fn set_admission(&self, vip_be: u32, vport_be: u16, proto: u8, mode: nity_common::AdmissionMode) {
        let rg = nity_common::hash::route_group_key(vip_be, vport_be, proto);
        self.store.control.set(rg, nity_common::RtControl::new(mode));
    }

    pub fn set_fallback(&self, vip_be: u32, vport_be: u16, proto: u8, backends: &[BackendId]) {
        let rg = nity_common::hash::route_group_key(vip_be, vport_be, proto);
        self.store.fallback.set_backends(rg, backends);
    }

    /// Record a heartbeat as of `now_ns`.
    pub fn heartbeat(&self, now_ns: u64) {
        self.store.heartbeat.beat(now_ns);
    }
}
