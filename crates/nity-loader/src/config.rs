//! CLI / environment configuration for the loader.

use clap::Parser;

/// nity: a connect-time L4 load balancer loader.
#[derive(Debug, Parser)]
#[command(name = "nity-loader", version, about)]
pub struct Config {
    /// cgroup2 mount point to attach `cgroup/connect4` to. Required with `--features bpf`.
    #[arg(long, env = "NITY_CGROUP")]
    pub cgroup: Option<std::path::PathBuf>,

    /// Directory to pin the maps described in the ABI (libbpf `LIBBPF_PIN_BY_NAME`
    /// convention). Required with `--features bpf`.
    #[arg(long, env = "NITY_MAP_DIR")]
    pub map_dir: Option<std::path::PathBuf>,

    /// Virtual IP to seed the bundled harness with, dotted-quad.
    #[arg(long, env = "NITY_VIP", default_value = "10.0.0.1")]
    pub vip: std::net::Ipv4Addr,

    /// Virtual port to seed the bundled harness with.
    #[arg(long, env = "NITY_VPORT", default_value_t = 80)]
    pub vport: u16,

    /// IANA protocol number (6 = TCP, 17 = UDP).
    #[arg(long, env = "NITY_PROTO", default_value_t = 6)]
    pub proto: u8,

    /// Log level, forwarded to `tracing_subscriber::EnvFilter` if `RUST_LOG` is unset.
    #[arg(long, env = "NITY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
