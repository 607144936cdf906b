//! Heartbeat-derived failsafe posture.

use nity_common::abi::{FAILSAFE_T1_NS, FAILSAFE_T2_NS};
use nity_common::FailsafeMode;

/// Derive the current failsafe mode from the agent's last-seen timestamp.
///
/// `last == 0` means "never observed" and is treated as maximally stale, matching the
/// kernel program's `age = (last == 0) ? ~0ULL : (now - last)`.
#[inline]
pub fn derive_failsafe_mode(now_ns: u64, last: u64) -> FailsafeMode {
    let age = if last == 0 { u64::MAX } else { now_ns.saturating_sub(last) };

    if age >= FAILSAFE_T2_NS {
        FailsafeMode::Fallback
    } else if age >= FAILSAFE_T1_NS {
        FailsafeMode::Hold
    } else {
        FailsafeMode::Normal
    }
}
