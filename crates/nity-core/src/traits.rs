//! The capabilities the decision pipeline is built against.
//!
//! The pipeline never touches a concrete map type directly — it is generic over these
//! traits so the exact same code in [`crate::pipeline`] runs against the in-memory
//! simulation in `nity-tables`/`nity-conntrack` during tests and against a real,
//! `aya`-backed store when wired up by `nity-loader`. The kernel program in
//! `ebpf/nity-ebpf` cannot use `dyn Trait` (the verifier rejects indirect calls through
//! a vtable) and so re-expresses the same algorithm directly against its own map
//! handles; these traits exist for every environment that *can* afford dynamic
//! dispatch, which is every environment except the one inside the kernel.

use nity_common::{ActiveTable, BackendId, ConntrackVal, CounterId, FallbackKey, RtControl};

/// Read access to the maps the control-plane agent owns.
///
/// Each method here corresponds to exactly one map lookup in the real ABI (§6 of the
/// map schema) and must stay that granular: callers that need a coherent
/// `(epoch, active_table)` pair compose [`TableStore::read_epoch`] and
/// [`TableStore::read_active_table`] themselves via the bounded double-read in
/// [`crate::coherent`], rather than this trait handing back an already-paired value.
pub trait TableStore {
    /// Raw `epoch` map read.
    fn read_epoch(&self) -> u64;

    /// Raw `active_table` map read.
    fn read_active_table(&self) -> ActiveTable;

    /// `last_agent_seen_ts` map read. `0` means "never observed".
    fn last_agent_seen_ts(&self) -> u64;

    /// Lookup in `slot_table_A` or `slot_table_B`, selected by `table`.
    fn slot_lookup(&self, table: ActiveTable, route_key: u64) -> Option<BackendId>;

    /// `rt_control` lookup, keyed by `route_group_key`.
    fn rt_control(&self, route_group_key: u64) -> Option<RtControl>;

    /// `fallback_size` lookup, keyed by `route_group_key`.
    fn fallback_size(&self, route_group_key: u64) -> Option<u32>;

    /// `fallback_backends` lookup.
    fn fallback_backend(&self, key: FallbackKey) -> Option<BackendId>;
}

/// The per-flow stickiness cache (`conntrack_lru`).
///
/// Implementations are free to race concurrent installs for the same key (§5): the
/// last writer winning is an accepted outcome, not a bug, because slot selection is
/// deterministic from `flow_key` under a fixed epoch.
pub trait Conntrack {
    /// Look up the sticky entry for a flow, if one exists.
    fn get(&self, flow_key: u64) -> Option<ConntrackVal>;

    /// Refresh `last_seen_ns`/`epoch_seen` on an existing entry without touching the
    /// backend it points at. A no-op if the entry has since been evicted.
    fn touch(&self, flow_key: u64, now_ns: u64, epoch_seen: u64);

    /// Best-effort insert/overwrite. Failure (e.g. a transient allocation failure in a
    /// real `BPF_MAP_TYPE_LRU_HASH`) is never surfaced as an error to the caller; the
    /// next connect for the same flow simply re-selects.
    fn install(&self, flow_key: u64, val: ConntrackVal);
}

/// The per-CPU monotone counters (§4.7).
pub trait Counters {
    /// Increment the named counter by one on the calling CPU/thread's slot.
    fn incr(&self, id: CounterId);
}
