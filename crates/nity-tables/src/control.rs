//! Per-route-group control records and fallback backend sets.

use dashmap::DashMap;
use nity_common::{BackendId, FallbackKey, RtControl};

/// `rt_control`, keyed by `route_group_key`.
#[derive(Default)]
pub struct ControlTable {
    records: DashMap<u64, RtControl>,
}

impl ControlTable {
    pub fn new() -> Self {
        Self {
            records: DashMap::with_capacity(nity_common::abi::MAX_ROUTE_GROUPS),
        }
    }

    pub fn get(&self, route_group_key: u64) -> Option<RtControl> {
        self.records.get(&route_group_key).map(|e| *e)
    }

    pub fn set(&self, route_group_key: u64, ctl: RtControl) {
        self.records.insert(route_group_key, ctl);
    }
}

/// `fallback_size` + `fallback_backends`, keyed by `route_group_key` (and index).
#[derive(Default)]
pub struct FallbackTables {
    sizes: DashMap<u64, u32>,
    backends: DashMap<FallbackKey, BackendId>,
}

impl FallbackTables {
    pub fn new() -> Self {
        Self {
            sizes: DashMap::with_capacity(nity_common::abi::MAX_ROUTE_GROUPS),
            backends: DashMap::with_capacity(nity_common::abi::MAX_FALLBACK_BACKENDS),
        }
    }

    pub fn size(&self, route_group_key: u64) -> Option<u32> {
        self.sizes.get(&route_group_key).map(|e| *e)
    }

    pub fn backend(&self, key: FallbackKey) -> Option<BackendId> {
        self.backends.get(&key).map(|e| *e)
    }

    /// Replace the entire dense fallback set for a route group.
    pub fn set_backends(&self, route_group_key: u64, backends: &[BackendId]) {
        self.sizes.insert(route_group_key, backends.len() as u32);
        for (idx, backend) in backends.iter().enumerate() {
            self.backends
                .insert(FallbackKey::new(route_group_key, idx as u32), *backend);
        }
    }
}
