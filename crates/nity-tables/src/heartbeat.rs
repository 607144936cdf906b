//! `last_agent_seen_ts`: the single-entry heartbeat array map.

use std::sync::atomic::{AtomicU64, Ordering};

/// The agent's heartbeat. `0` means "never observed", matching the real map's
/// zero-initialised state before the agent writes its first heartbeat.
#[derive(Default)]
pub struct Heartbeat(AtomicU64);

impl Heartbeat {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn read(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Agent-side: record that the agent is alive as of `now_ns`.
    #[inline]
    pub fn beat(&self, now_ns: u64) {
        self.0.store(now_ns, Ordering::Release);
    }
}
