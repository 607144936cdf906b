//! Deterministic key derivation.
//!
//! `mix`/`combine` are SplitMix64's finaliser, chosen for being cheap, allocation-free,
//! and stable across hosts and Rust versions — a hard requirement here since these
//! values are ABI, not just an internal cache key. Every value this module computes
//! must be reproducible from the same inputs indefinitely; changing the constants or
//! shift amounts is a key-derivation break, not a refactor.

/// SplitMix64 finaliser.
#[inline(always)]
pub fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Combine two 64-bit values into one, order-sensitive.
#[inline(always)]
pub fn combine(a: u64, b: u64) -> u64 {
    mix(a ^ mix(b))
}

/// `route_group_key = mix(vip_be << 32 | vport_be << 16 | proto)`.
///
/// `vip_be`/`vport_be` stay in network byte order; `proto` is host order (it is a small
/// protocol number, not a multi-byte field with an endianness concern).
#[inline(always)]
pub fn route_group_key(vip_be: u32, vport_be: u16, proto: u8) -> u64 {
    let packed = ((vip_be as u64) << 32) | ((vport_be as u64) << 16) | (proto as u64);
    mix(packed)
}

/// `route_key = combine(route_group_key, slot)`.
#[inline(always)]
pub fn route_key(vip_be: u32, vport_be: u16, proto: u8, slot: u32) -> u64 {
    combine(route_group_key(vip_be, vport_be, proto), slot as u64)
}

/// `flow_key`, preferring the full 5-tuple.
///
/// Documented reduction: when `src_port_host == 0` (the ephemeral port has not been
/// assigned by the kernel yet at connect-time), the key reduces to
/// `{src_ip, dst_ip, dst_port, proto}` — this function already takes `src_port_host`
/// as given, so callers that don't yet know the port simply pass `0` and get the
/// reduced key for free; no separate reduced-key function exists.
#[inline(always)]
pub fn flow_key(src_ip_be: u32, src_port_host: u32, dst_ip_be: u32, dst_port_be: u16, proto: u8) -> u64 {
    let a = ((src_ip_be as u64) << 32) | (src_port_host as u64);
    let b = ((dst_ip_be as u64) << 32) | (dst_port_be as u64);
    combine(mix(a), b ^ (proto as u64))
}
