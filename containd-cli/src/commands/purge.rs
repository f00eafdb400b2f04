//! Orphaned cgroup cleanup

use anyhow::{Context, Result};
use tracing::info;

use containd_cgroup::purge_all;

use crate::cli::BackendKind;
use crate::commands::make_backend;

pub fn execute(kind: BackendKind) -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root. Try: sudo containd purge");
    }

    let backend = make_backend(kind);
    let removed = purge_all(backend.as_ref()).context("Purge sweep failed")?;

    info!("🧹 Purged {} orphaned cgroup node(s)", removed);
    Ok(())
}
