//! The connect-time decision pipeline, re-expressed directly against BPF map handles.
//!
//! This is a verifier-legal transcription of `nity_connect4` in
//! `original_source/bpf/programs/sockops_connect.c` and of the identical control flow
//! in `nity-core::pipeline::select`. It cannot reuse either: the C source is not Rust,
//! and `nity-core` is built against `dyn TableStore`/`dyn Conntrack`/`dyn Counters` —
//! indirect calls through a vtable are rejected by the BPF verifier, and `nity-common`
//! pulls in `thiserror`, which needs `std`. So the wire structs, the hash functions, and
//! the map definitions are restated here, kept bit-for-bit identical to
//! `nity_common::abi` and `nity_common::hash` by the `_INDEX`-style size asserts below.
//! Changing a layout or a hash constant in one crate without the other is an ABI break.
#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::bpf_sock_addr,
    macros::{cgroup_sock_addr, map},
    maps::{Array, HashMap, LruHashMap, PerCpuArray},
    programs::SockAddrContext,
};
use aya_log_ebpf::debug;

// ── ABI: wire structs, kept bit-for-bit identical to nity_common::abi ───────────────

/// Schema major version. Bumped only on a map-layout-breaking change.
const SCHEMA_MAJOR: u32 = 0;

/// Fixed, power-of-two slot field; `slot = mix(flow_key) & SLOTS_MASK`.
const SLOTS_MASK: u64 = 1024 - 1;

/// Failsafe mode escalates to HOLD once the heartbeat is at least this stale.
const FAILSAFE_T1_NS: u64 = 2 * 1_000_000_000;
/// Failsafe mode escalates to FALLBACK once the heartbeat is at least this stale.
const FAILSAFE_T2_NS: u64 = 10 * 1_000_000_000;

const TABLE_A: u32 = 0;
const TABLE_B: u32 = 1;

const ADMISSION_NORMAL: u8 = 0;
#[allow(dead_code)]
const ADMISSION_SOFT: u8 = 1;
const ADMISSION_HARD: u8 = 2;

const C_REQS_TOTAL: u32 = 0;
const C_DENY_TOTAL: u32 = 1;
const C_REWRITE_TOTAL: u32 = 2;
const C_CONNTRACK_HIT: u32 = 3;
const C_CONNTRACK_MISS: u32 = 4;
const C_FALLBACK_USED: u32 = 5;
const C_MAP_LOOKUP_FAIL: u32 = 6;
const C_SCHEMA_MISMATCH: u32 = 7;
const C_MAX: u32 = 8;

/// Mirrors `nity_common::abi::BackendId`.
#[repr(C)]
#[derive(Clone, Copy)]
struct BackendId {
    ip4: u32,
    port_be: u16,
    _pad: u16,
}

impl BackendId {
    #[inline(always)]
    fn is_usable(&self) -> bool {
        self.ip4 != 0 && self.port_be != 0
    }
}

/// Mirrors `nity_common::abi::ConntrackVal`.
#[repr(C)]
#[derive(Clone, Copy)]
struct ConntrackVal {
    backend: BackendId,
    last_seen_ns: u64,
    epoch_seen: u64,
}

/// Mirrors `nity_common::abi::RtControl`.
#[repr(C)]
#[derive(Clone, Copy)]
struct RtControl {
    schema_version: u32,
    admission_mode: u8,
    _r0: u8,
    _r1: u16,
    tokens: u64,
    refill_rate_per_s: u64,
    burst: u64,
    backend_set_hash: u64,
    policy_flags: u64,
}

/// Mirrors `nity_common::abi::FallbackKey`.
#[repr(C)]
#[derive(Clone, Copy)]
struct FallbackKey {
    route_group_key: u64,
    idx: u32,
    _pad: u32,
}

const _: () = {
    assert!(core::mem::size_of::<BackendId>() == 8);
    assert!(core::mem::size_of::<ConntrackVal>() == 24);
    assert!(core::mem::size_of::<RtControl>() == 48);
    assert!(core::mem::size_of::<FallbackKey>() == 16);
};

// ── Hasher: kept bit-for-bit identical to nity_common::hash ─────────────────────────

#[inline(always)]
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

#[inline(always)]
fn combine(a: u64, b: u64) -> u64 {
    mix(a ^ mix(b))
}

#[inline(always)]
fn route_group_key(vip_be: u32, vport_be: u16, proto: u8) -> u64 {
    let packed = ((vip_be as u64) << 32) | ((vport_be as u64) << 16) | (proto as u64);
    mix(packed)
}

#[inline(always)]
fn flow_key(src_ip_be: u32, src_port_host: u32, dst_ip_be: u32, dst_port_be: u16, proto: u8) -> u64 {
    let a = ((src_ip_be as u64) << 32) | (src_port_host as u64);
    let b = ((dst_ip_be as u64) << 32) | (dst_port_be as u64);
    combine(mix(a), b ^ (proto as u64))
}

// ── Maps: names and layouts match the §6 map schema in SPEC_FULL.md bit-for-bit ─────

#[map]
static SLOT_TABLE_A: HashMap<u64, BackendId> = HashMap::with_max_entries(65_536, 0);

#[map]
static SLOT_TABLE_B: HashMap<u64, BackendId> = HashMap::with_max_entries(65_536, 0);

#[map]
static ACTIVE_TABLE: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static EPOCH: Array<u64> = Array::with_max_entries(1, 0);

#[map]
static CONNTRACK_LRU: LruHashMap<u64, ConntrackVal> = LruHashMap::with_max_entries(65_536, 0);

#[map]
static LAST_AGENT_SEEN_TS: Array<u64> = Array::with_max_entries(1, 0);

#[map]
static RT_CONTROL: HashMap<u64, RtControl> = HashMap::with_max_entries(4_096, 0);

#[map]
static FALLBACK_SIZE: HashMap<u64, u32> = HashMap::with_max_entries(4_096, 0);

#[map]
static FALLBACK_BACKENDS: HashMap<FallbackKey, BackendId> = HashMap::with_max_entries(16_384, 0);

#[map]
static COUNTERS: PerCpuArray<u64> = PerCpuArray::with_max_entries(C_MAX, 0);

#[inline(always)]
fn incr_counter(id: u32) {
    if let Some(v) = COUNTERS.get_ptr_mut(id) {
        unsafe { *v = (*v).wrapping_add(1) };
    }
}

// ── Bounded (epoch, active_table) double-read — identical shape to
//    `nity_core::coherent::read_epoch_and_active_table` ────────────────────────────

#[inline(always)]
fn read_epoch_and_active_table() -> (u64, u32) {
    let e1 = EPOCH.get(0).copied().unwrap_or(0);
    let t = ACTIVE_TABLE.get(0).copied().unwrap_or(TABLE_A);
    let e2 = EPOCH.get(0).copied().unwrap_or(e1);

    if e2 == e1 {
        return (e2, t);
    }

    let t2 = ACTIVE_TABLE.get(0).copied().unwrap_or(t);
    let e3 = EPOCH.get(0).copied().unwrap_or(e2);
    (e3, t2)
}

#[inline(always)]
fn failsafe_is_fallback(now_ns: u64) -> bool {
    let last = LAST_AGENT_SEEN_TS.get(0).copied().unwrap_or(0);
    let age = if last == 0 { u64::MAX } else { now_ns.wrapping_sub(last) };
    age >= FAILSAFE_T2_NS
}

#[inline(always)]
fn select_fallback(route_group_key: u64, flow_key: u64) -> Option<BackendId> {
    let n = *FALLBACK_SIZE.get(&route_group_key)?;
    if n == 0 {
        return None;
    }
    let idx = (mix(flow_key) % (n as u64)) as u32;
    let key = FallbackKey { route_group_key, idx, _pad: 0 };
    FALLBACK_BACKENDS.get(&key).copied()
}

#[inline(always)]
fn select_slot(route_key: u64, active: u32) -> Option<BackendId> {
    let table = if active == TABLE_B { &SLOT_TABLE_B } else { &SLOT_TABLE_A };
    table.get(&route_key).copied()
}

// ── Entry point ──────────────────────────────────────────────────────────────────────

/// Attach type: `BPF_CGROUP_INET4_CONNECT` ("cgroup/connect4"). O(1) map lookups, no
/// loop over backends, bounded double-read — the same shape §5 of SPEC_FULL.md requires
/// of any runtime re-expressing this pipeline, kernel or not.
#[cgroup_sock_addr(connect4)]
pub fn nity_connect4(ctx: SockAddrContext) -> i32 {
    match try_connect4(&ctx) {
        Ok(allow) => allow as i32,
        Err(()) => 1, // fail-open: an unexpected verifier-legal error never drops traffic
    }
}

fn try_connect4(ctx: &SockAddrContext) -> Result<bool, ()> {
    incr_counter(C_REQS_TOTAL);

    let sa: *mut bpf_sock_addr = ctx.sock_addr;
    let (vip_be, vport_be, proto) = unsafe {
        let vip_be = (*sa).user_ip4;
        let vport_be = (*sa).user_port as u16;
        let proto = (*sa).protocol as u8;
        (vip_be, vport_be, proto)
    };

    let now_ns = unsafe { aya_ebpf::helpers::bpf_ktime_get_ns() };
    let route_group_key = route_group_key(vip_be, vport_be, proto);

    if let Some(ctl) = RT_CONTROL.get(&route_group_key) {
        let major = ctl.schema_version >> 16;
        if major != SCHEMA_MAJOR {
            incr_counter(C_SCHEMA_MISMATCH);
        }
        if ctl.admission_mode == ADMISSION_HARD {
            incr_counter(C_DENY_TOTAL);
            debug!(ctx, "denying connect, route group {} is in HARD admission", route_group_key);
            return Ok(false);
        }
        // NORMAL and SOFT (both != HARD) proceed; SOFT's token-bucket fields are reserved.
    }

    let (src_ip_be, src_port_host) = unsafe {
        let mut src_ip_be = (*sa).msg_src_ip4;
        let mut src_port_host = 0u32;
        if !(*sa).__bindgen_anon_1.sk.is_null() {
            let sk = (*sa).__bindgen_anon_1.sk;
            if (*sk).src_ip4 != 0 {
                src_ip_be = (*sk).src_ip4;
            }
            src_port_host = (*sk).src_port;
        }
        (src_ip_be, src_port_host)
    };

    let flow_key = flow_key(src_ip_be, src_port_host, vip_be, vport_be, proto);
    let (epoch_now, active) = read_epoch_and_active_table();

    let mut chosen: Option<BackendId> = None;

    if let Some(ct) = CONNTRACK_LRU.get_ptr_mut(&flow_key) {
        incr_counter(C_CONNTRACK_HIT);
        unsafe {
            chosen = Some((*ct).backend);
            (*ct).last_seen_ns = now_ns;
            (*ct).epoch_seen = epoch_now;
        }
    } else {
        incr_counter(C_CONNTRACK_MISS);

        let slot = mix(flow_key) & SLOTS_MASK;
        let route_key = combine(route_group_key, slot);
        let fallback_mode = failsafe_is_fallback(now_ns);

        let picked = if fallback_mode {
            match select_fallback(route_group_key, flow_key) {
                Some(b) => {
                    incr_counter(C_FALLBACK_USED);
                    Some(b)
                }
                None => None,
            }
        } else {
            match select_slot(route_key, active) {
                Some(b) => Some(b),
                None => match select_fallback(route_group_key, flow_key) {
                    Some(b) => {
                        incr_counter(C_FALLBACK_USED);
                        Some(b)
                    }
                    None => None,
                },
            }
        };

        match picked {
            Some(b) => chosen = Some(b),
            None => {
                incr_counter(C_MAP_LOOKUP_FAIL);
                debug!(ctx, "no route or fallback for route group {}, leaving destination unchanged", route_group_key);
            }
        }

        if let Some(b) = chosen {
            let val = ConntrackVal { backend: b, last_seen_ns: now_ns, epoch_seen: epoch_now };
            let _ = CONNTRACK_LRU.insert(&flow_key, &val, 0);
        }
    }

    if let Some(b) = chosen {
        if b.is_usable() {
            unsafe {
                (*sa).user_ip4 = b.ip4;
                (*sa).user_port = b.port_be as u32;
            }
            incr_counter(C_REWRITE_TOTAL);
        }
    }

    Ok(true)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
