//! Wire-format ABI shared between the agent, the core, and the kernel program.
//!
//! Every struct here is `#[repr(C)]` with an explicit byte-order contract: fields
//! documented "NBO" stay in network byte order end to end and are never reinterpreted
//! through a cast of a different width. This is the single source of truth for the map
//! schema in use by `slot_table_{A,B}`, `conntrack_lru`, `rt_control`, and
//! `fallback_backends` — the kernel crate and the userspace simulation both build against
//! these exact definitions so there is never a second, hand-kept copy of the layout.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Schema major version. Bumped only on a map-layout-breaking change.
pub const SCHEMA_MAJOR: u32 = 0;
/// Schema minor version.
pub const SCHEMA_MINOR: u32 = 1;
/// Packed `(major << 16) | minor` schema version.
pub const SCHEMA_VERSION: u32 = (SCHEMA_MAJOR << 16) | SCHEMA_MINOR;

/// Fixed, power-of-two slot field. RFC0004 permits a per-route slot count; the MVP
/// fixes it globally so `slot = hash & SLOTS_MASK` is a single bitwise AND.
pub const SLOTS_TOTAL: u32 = 1024;
/// `SLOTS_TOTAL - 1`, valid only because `SLOTS_TOTAL` is a power of two.
pub const SLOTS_MASK: u32 = SLOTS_TOTAL - 1;

/// Failsafe mode escalates to HOLD once the heartbeat is at least this stale.
pub const FAILSAFE_T1_NS: u64 = 2 * 1_000_000_000;
/// Failsafe mode escalates to FALLBACK once the heartbeat is at least this stale.
pub const FAILSAFE_T2_NS: u64 = 10 * 1_000_000_000;

/// Bounded map capacities. Informational at this layer; real backends enforce them at
/// creation (`BPF_MAP_TYPE_HASH` `max_entries`, or the simulation's map pre-allocation).
pub const MAX_SLOT_ENTRIES: usize = 65_536;
pub const MAX_ROUTE_GROUPS: usize = 4_096;
pub const MAX_FALLBACK_BACKENDS: usize = 16_384;
pub const MAX_CONNTRACK_ENTRIES: usize = 65_536;

/// Which of the two slot tables the agent currently considers authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ActiveTable {
    A = 0,
    B = 1,
}

impl ActiveTable {
    /// Decode a raw map value, defaulting unknown values to `A` the way the kernel
    /// program treats any non-`B` value as `A`.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        if raw == ActiveTable::B as u32 {
            ActiveTable::B
        } else {
            ActiveTable::A
        }
    }

    /// Flip to the other table.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            ActiveTable::A => ActiveTable::B,
            ActiveTable::B => ActiveTable::A,
        }
    }
}

/// Per-route-group admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdmissionMode {
    Normal = 0,
    Soft = 1,
    Hard = 2,
}

impl AdmissionMode {
    #[inline]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => AdmissionMode::Soft,
            2 => AdmissionMode::Hard,
            _ => AdmissionMode::Normal,
        }
    }
}

/// Heartbeat-derived dataplane posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FailsafeMode {
    Normal = 0,
    Hold = 1,
    Fallback = 2,
}

/// One entry per counted event; index into the per-CPU `counters` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CounterId {
    ReqsTotal = 0,
    DenyTotal,
    RewriteTotal,
    ConntrackHit,
    ConntrackMiss,
    FallbackUsed,
    MapLookupFail,
    SchemaMismatch,
}

impl CounterId {
    /// Total number of distinct counter slots. Matches `NITY_C_MAX`.
    pub const COUNT: usize = 8;

    /// All variants, in map-index order.
    pub const ALL: [CounterId; Self::COUNT] = [
        CounterId::ReqsTotal,
        CounterId::DenyTotal,
        CounterId::RewriteTotal,
        CounterId::ConntrackHit,
        CounterId::ConntrackMiss,
        CounterId::FallbackUsed,
        CounterId::MapLookupFail,
        CounterId::SchemaMismatch,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as u32 as usize
    }
}

/// Backend endpoint identity. Stored in slot tables and fallback backend sets.
///
/// `ip4`/`port_be` are kept in network byte order so the dataplane can copy them
/// straight into the connect-time socket address without a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct BackendId {
    /// IPv4 address, network byte order.
    pub ip4: u32,
    /// L4 port, network byte order.
    pub port_be: u16,
    _pad: u16,
}

impl BackendId {
    pub const ZERO: BackendId = BackendId {
        ip4: 0,
        port_be: 0,
        _pad: 0,
    };

    pub fn new(ip4: u32, port_be: u16) -> Self {
        Self {
            ip4,
            port_be,
            _pad: 0,
        }
    }

    /// A backend is usable only when both fields are populated; an all-zero record is
    /// the documented guard against rewriting to a partially-initialised entry.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.ip4 != 0 && self.port_be != 0
    }
}

/// Conntrack LRU value: the sticky backend plus the bookkeeping used to keep the
/// `(epoch, active_table)` observation coherent (see [`crate::hash`] module docs and
/// `nity-core`'s coherent-read routine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct ConntrackVal {
    pub backend: BackendId,
    pub last_seen_ns: u64,
    pub epoch_seen: u64,
}

/// Per-route-group control record. Token-bucket fields are carried for forward
/// compatibility with SOFT enforcement but are not read by the core today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct RtControl {
    pub schema_version: u32,
    pub admission_mode: u8,
    _r0: u8,
    _r1: u16,
    pub tokens: u64,
    pub refill_rate_per_s: u64,
    pub burst: u64,
    pub backend_set_hash: u64,
    pub policy_flags: u64,
}

impl RtControl {
    pub fn new(admission_mode: AdmissionMode) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            admission_mode: admission_mode as u8,
            _r0: 0,
            _r1: 0,
            tokens: 0,
            refill_rate_per_s: 0,
            burst: 0,
            backend_set_hash: 0,
            policy_flags: 0,
        }
    }

    #[inline]
    pub fn schema_major(&self) -> u32 {
        self.schema_version >> 16
    }

    #[inline]
    pub fn admission(&self) -> AdmissionMode {
        AdmissionMode::from_raw(self.admission_mode)
    }
}

/// Key into `fallback_backends`: `(route_group_key, idx)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FallbackKey {
    pub route_group_key: u64,
    pub idx: u32,
    _pad: u32,
}

impl FallbackKey {
    pub fn new(route_group_key: u64, idx: u32) -> Self {
        Self {
            route_group_key,
            idx,
            _pad: 0,
        }
    }
}

const _: () = {
    assert!(core::mem::size_of::<BackendId>() == 8);
    assert!(core::mem::size_of::<ConntrackVal>() == 24);
    assert!(core::mem::size_of::<RtControl>() == 48);
    assert!(core::mem::size_of::<FallbackKey>() == 16);
};
