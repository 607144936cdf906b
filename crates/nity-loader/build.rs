//! Builds `ebpf/nity-ebpf` for `bpfel-unknown-none` and hands the resulting object
//! file to `OUT_DIR` so `main.rs` can `include_bytes!` it under the `bpf` feature.
//!
//! `ebpf/nity-ebpf` is not a member of this workspace (see the root `Cargo.toml`
//! comment) because it targets a different toolchain and, being `no_std`/`no_main`,
//! cannot share the workspace's ordinary dependency resolution. `aya-build` drives the
//! out-of-workspace `cargo build` for it the same way the upstream `aya` project's own
//! template does.

fn main() -> anyhow::Result<()> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    let ebpf_dir = std::path::Path::new(&manifest_dir).join("../../ebpf/nity-ebpf");

    println!("cargo:rerun-if-changed={}", ebpf_dir.display());

    if std::env::var("CARGO_FEATURE_BPF").is_err() {
        // Non-bpf builds (the default) never touch the kernel crate or its toolchain.
        return Ok(());
    }

    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .manifest_path(ebpf_dir.join("Cargo.toml"))
        .exec()?;
    let ebpf_package = packages
        .into_iter()
        .find(|p| p.name == "nity-ebpf")
        .ok_or_else(|| anyhow::anyhow!("nity-ebpf package not found"))?;

    aya_build::build_ebpf([ebpf_package])
}
