//! The connect-time hook entry point.
//!
//! Binds [`crate::pipeline::select`] to a socket-address context: reads the inputs a
//! real `bpf_sock_addr` (or this crate's [`ConnectCtx`] stand-in) exposes, and writes
//! back only `user_ip4`/`user_port` on a rewrite. Returns the same allow(1)/deny(0)
//! shape the kernel program returns, expressed as a bool for readability in std code.

use nity_common::BackendId;

use crate::pipeline::{select, ConnectRequest, Verdict};
use crate::traits::{Conntrack, Counters, TableStore};

/// A connect-time socket-address context, mirroring the fields of `bpf_sock_addr` this
/// hook actually reads or writes. `user_ip4`/`user_port` are mutable because a
/// successful selection rewrites them in place; everything else is read-only input.
pub struct ConnectCtx {
    /// Destination IPv4, network byte order. Read as VIP, rewritten to the backend.
    pub user_ip4: u32,
    /// Destination port, network byte order, held in the low 16 bits of a u32 the way
    /// `bpf_sock_addr.user_port` does.
    pub user_port: u32,
    /// IANA protocol number, host order.
    pub protocol: u8,
    /// Best-effort source IP from the associated socket, network byte order. `0` if
    /// there is no associated socket or it hasn't been assigned one yet.
    pub sk_src_ip4: u32,
    /// Best-effort source port from the associated socket, host order. `0` means the
    /// ephemeral port has not been assigned by the kernel at this point in connect().
    pub sk_src_port: u32,
    /// Best-effort source IP from the connect message itself, used when no socket is
    /// attached yet. Network byte order.
    pub msg_src_ip4: u32,
}

/// Run the hook for one connect() attempt. Returns `true` to allow, `false` to deny,
/// matching the kernel program's `1`/`0` return convention.
pub fn connect4(
    store: &dyn TableStore,
    conntrack: &dyn Conntrack,
    counters: &dyn Counters,
    now_ns: u64,
    ctx: &mut ConnectCtx,
) -> bool {
    let src_ip_be = if ctx.sk_src_ip4 != 0 {
        ctx.sk_src_ip4
    } else {
        ctx.msg_src_ip4
    };

    let req = ConnectRequest {
        dst_ip_be: ctx.user_ip4,
        dst_port_be: ctx.user_port as u16,
        proto: ctx.protocol,
        src_ip_be,
        src_port_host: ctx.sk_src_port,
        now_ns,
    };

    match select(store, conntrack, counters, req) {
        Verdict::Deny => false,
        Verdict::AllowUnchanged => true,
        Verdict::AllowRewrite(backend) => {
            rewrite(ctx, backend);
            true
        }
    }
}

fn rewrite(ctx: &mut ConnectCtx, backend: BackendId) {
    ctx.user_ip4 = backend.ip4;
    ctx.user_port = backend.port_be as u32;
}
