//! ABI and hashing primitives shared by the nity connect-time load balancer crates.
//!
//! This crate is the single source of truth for the wire format the agent and the
//! dataplane agree on: the structs in [`abi`] back the real BPF maps bit-for-bit, and
//! the functions in [`hash`] are the only place `route_group_key`/`route_key`/
//! `flow_key` are derived. Every std crate in the workspace computes these values by
//! calling into this crate rather than re-deriving the formulas. The one exception is
//! `ebpf/nity-ebpf`: it is `no_std`/`no_main`, built outside this workspace for its own
//! `bpfel-unknown-none` target, so the kernel program restates the same structs and
//! functions itself, bit-for-bit, rather than depending on this crate — see its module
//! doc comment for the compile-time size asserts that keep the two copies honest.

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

pub mod abi;
pub mod hash;

pub use abi::{
    ActiveTable, AdmissionMode, BackendId, ConntrackVal, CounterId, FailsafeMode, FallbackKey,
    RtControl,
};
