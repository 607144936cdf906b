//! Per-route-group admission gate.

use nity_common::abi::SCHEMA_MAJOR;
use nity_common::{AdmissionMode, CounterId};

use crate::traits::{Counters, TableStore};

/// Outcome of the admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    /// Traffic is allowed to proceed to selection.
    Proceed,
    /// The route group is in HARD admission; deny the connect outright.
    Deny,
}

/// Look up `rt_control` for `route_group_key` and decide whether to proceed.
///
/// A missing control record is treated as NORMAL (no admission effect) — the agent is
/// not required to pre-populate every route group before traffic flows. A schema major
/// mismatch never blocks traffic; it only increments `schema_mismatch` (the agent is
/// expected to refuse to run on an incompatible schema, not the dataplane).
pub fn admission_gate(
    store: &dyn TableStore,
    counters: &dyn Counters,
    route_group_key: u64,
) -> AdmissionVerdict {
    let Some(ctl) = store.rt_control(route_group_key) else {
        return AdmissionVerdict::Proceed;
    };

    if ctl.schema_major() != SCHEMA_MAJOR {
        counters.incr(CounterId::SchemaMismatch);
    }

    match ctl.admission() {
        AdmissionMode::Hard => {
            counters.incr(CounterId::DenyTotal);
            AdmissionVerdict::Deny
        }
        // SOFT has no enforcement in the core today; token-bucket fields are carried
        // on RtControl for when it does.
        AdmissionMode::Normal | AdmissionMode::Soft => AdmissionVerdict::Proceed,
    }
}
