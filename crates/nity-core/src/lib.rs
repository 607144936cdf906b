//! The connect-time load balancing decision pipeline.
//!
//! This crate holds every piece of the core that is pure enough to unit-test and
//! benchmark outside a kernel: the admission gate, the failsafe deriver, the bounded
//! coherent epoch/active-table read, fallback selection, and the composed selection
//! pipeline, all expressed against the [`traits`] so the same code runs against an
//! in-memory simulation or a real backend. `ebpf/nity-ebpf` re-expresses this same
//! algorithm directly against BPF map handles, since the in-kernel verifier does not
//! allow the dynamic dispatch used here.

#![warn(missing_docs)]

pub mod admission;
pub mod bench_support;
pub mod coherent;
pub mod counters;
pub mod error;
pub mod failsafe;
pub mod fallback;
pub mod hook;
pub mod pipeline;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use error::{CoreError, CoreResult};
pub use hook::{connect4, ConnectCtx};
pub use pipeline::{select, ConnectRequest, Verdict};
pub use traits::{Conntrack, Counters, TableStore};

/// Assert the compile-time constants this crate's key derivation and failsafe deriver
/// depend on still hold. `SLOTS_TOTAL` must stay a power of two (the hot path masks
/// rather than computing a modulo) and `FAILSAFE_T1_NS` must stay strictly below
/// `FAILSAFE_T2_NS` (otherwise the deriver in [`failsafe`] could jump straight past
/// HOLD). Both are `const` today, so this can never fail in practice, but a loader
/// binary that exposes these as runtime configuration in the future inherits the check
/// for free by calling this once at startup, matching the "assert size/alignment at
/// startup" discipline the ABI layer already applies to its wire structs.
pub fn validate_constants() -> CoreResult<()> {
    use nity_common::abi::{FAILSAFE_T1_NS, FAILSAFE_T2_NS, SLOTS_TOTAL};

    if !SLOTS_TOTAL.is_power_of_two() {
        return Err(CoreError::SlotsNotPowerOfTwo(SLOTS_TOTAL));
    }
    if FAILSAFE_T1_NS >= FAILSAFE_T2_NS {
        return Err(CoreError::FailsafeThresholdsOutOfOrder {
            t1_ns: FAILSAFE_T1_NS,
            t2_ns: FAILSAFE_T2_NS,
        });
    }
    Ok(())
}
