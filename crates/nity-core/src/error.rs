//! Errors raised while assembling or configuring the pipeline (never on the hot path;
//! the pipeline itself has no fallible return — see [`crate::pipeline::Verdict`]).

use thiserror::Error;

/// Setup-time error for `nity-core` consumers.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configured slot-field constant was not a power of two.
    #[error("slots_total must be a power of two, got {0}")]
    SlotsNotPowerOfTwo(u32),

    /// A failsafe threshold pair was configured with T1 >= T2.
    #[error("failsafe T1 ({t1_ns}ns) must be less than T2 ({t2_ns}ns)")]
    FailsafeThresholdsOutOfOrder { t1_ns: u64, t2_ns: u64 },
}

/// Result type for `nity-core` setup paths.
pub type CoreResult<T> = Result<T, CoreError>;
