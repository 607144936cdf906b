//! Fallback backend selection, used both for FAILSAFE mode and as a recovery path
//! when the active slot table is missing an entry.

use nity_common::{hash::mix, BackendId, FallbackKey};

use crate::traits::TableStore;

/// Pick a deterministic backend from `route_group_key`'s fallback set.
///
/// The set is expected to be densely keyed `[0, N)`; a hole in that range is a
/// configuration bug the core does not repair — it is surfaced to the caller as
/// `None` exactly like an absent or zero-sized set, and the caller counts
/// `map_lookup_fail`.
pub fn select_fallback(
    store: &dyn TableStore,
    route_group_key: u64,
    flow_key: u64,
) -> Option<BackendId> {
    let n = store.fallback_size(route_group_key)?;
    if n == 0 {
        return None;
    }

    let idx = (mix(flow_key) % n as u64) as u32;
    store.fallback_backend(FallbackKey::new(route_group_key, idx))
}
