//! Errors surfaced by the loader binary's setup path.

use thiserror::Error;

/// Errors from attaching the program or wiring the simulation harness.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// `--features bpf` was built but `--cgroup`/`--map-dir` were not supplied.
    #[error("--cgroup and --map-dir are required when built with the bpf feature")]
    MissingBpfConfig,

    /// Attaching the program to the cgroup failed.
    #[error("failed to attach cgroup/connect4 program: {0}")]
    Attach(String),
}
