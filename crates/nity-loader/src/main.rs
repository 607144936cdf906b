//! `nity-loader`: attaches the connect-time hook, or — without the `bpf` feature —
//! runs the identical pipeline against the in-memory simulation so the whole stack is
//! exercisable without root or a Linux kernel.

mod config;
mod error;

use clap::Parser;
use config::Config;
use nity_agent_sim::Agent;
use nity_common::{AdmissionMode, BackendId};
use nity_conntrack::ConntrackCache;
use nity_core::counters::PerCpuCounters;
use nity_core::hook::{connect4, ConnectCtx};
use nity_tables::SimTableStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cfg = Config::parse();
    init_logging(&cfg.log_level);
    nity_core::validate_constants()?;

    #[cfg(feature = "bpf")]
    {
        return run_bpf(&cfg);
    }

    #[cfg(not(feature = "bpf"))]
    {
        run_simulation(&cfg)
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Non-bpf mode: seed one route group, drive a handful of connects through the real
/// pipeline against the in-memory simulation, and report what happened. This is the
/// mode `cargo run` exercises without any special privileges.
fn run_simulation(cfg: &Config) -> anyhow::Result<()> {
    info!("running against the in-memory table simulation (build with --features bpf to attach for real)");

    let store = SimTableStore::new();
    let conntrack = ConntrackCache::default();
    let counters = PerCpuCounters::new();
    let agent = Agent::new(&store);

    let vip_be = u32::from(cfg.vip).to_be();
    let vport_be = cfg.vport.to_be();

    agent.heartbeat(now_ns());
    agent.seed_route_group(
        vip_be,
        vport_be,
        cfg.proto,
        &[BackendId::new(u32::from(std::net::Ipv4Addr::new(10, 0, 1, 1)).to_be(), 9000u16.to_be())],
    );
    agent.flip();
    agent.set_admission(vip_be, vport_be, cfg.proto, AdmissionMode::Normal);

    for client in [
        std::net::Ipv4Addr::new(192, 168, 1, 2),
        std::net::Ipv4Addr::new(192, 168, 1, 2), // same client: should hit sticky path
        std::net::Ipv4Addr::new(192, 168, 1, 3),
    ] {
        let mut ctx = ConnectCtx {
            user_ip4: vip_be,
            user_port: vport_be as u32,
            protocol: cfg.proto,
            sk_src_ip4: u32::from(client).to_be(),
            sk_src_port: 0,
            msg_src_ip4: 0,
        };
        let allowed = connect4(&store, &conntrack, &counters, now_ns(), &mut ctx);
        info!(
            client = %client,
            allowed,
            rewritten_to = %std::net::Ipv4Addr::from(u32::from_be(ctx.user_ip4)),
            "connect"
        );
    }

    info!(snapshot = ?counters.snapshot(), "counters");
    Ok(())
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

#[cfg(feature = "bpf")]
fn run_bpf(cfg: &Config) -> anyhow::Result<()> {
    use aya::programs::{CgroupAttachMode, SockAddr};

    let (cgroup, _map_dir) = match (&cfg.cgroup, &cfg.map_dir) {
        (Some(c), Some(m)) => (c, m),
        _ => return Err(error::LoaderError::MissingBpfConfig.into()),
    };

    let mut ebpf = aya::Ebpf::load(aya::include_bytes_aligned!(concat!(
        env!("OUT_DIR"),
        "/nity-ebpf"
    )))?;

    let program: &mut SockAddr = ebpf
        .program_mut("nity_connect4")
        .ok_or_else(|| error::LoaderError::Attach("program nity_connect4 not found".into()))?
        .try_into()?;
    program.load()?;

    let cgroup_file = std::fs::File::open(cgroup)?;
    program.attach(cgroup_file, CgroupAttachMode::Single)?;

    info!(cgroup = %cgroup.display(), "attached cgroup/connect4 hook");

    // The agent's map writes happen out of process in the real deployment; this
    // process's job ends at attach + pin. Block so the program stays loaded.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}
