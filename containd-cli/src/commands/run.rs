//! Container execution logic

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use containd_core::{ContainerConfig, ContainerConfigUpdate, ContainerId};
use containd_namespace::HostKernel;
use containd_runtime::{CleanupPolicy, ConfigStore, Container, JsonFileStore};

use crate::cli::RunArgs;
use crate::commands::make_backend;

pub fn execute(args: RunArgs) -> Result<i32> {
    // Validate we're running as root
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root. Try: sudo containd run ...");
    }

    let id = match &args.id {
        Some(id) => ContainerId::new(id).context("Invalid container ID")?,
        None => ContainerId::generate(),
    };

    info!("📦 Container ID: {}", id);

    // A saved configuration under the same id is the baseline; flags given
    // on this invocation override it field by field
    let store = JsonFileStore::default_path()?;
    let mut config = match store.get(&id)? {
        Some(stored) => {
            debug!("Loaded saved configuration for {}", id);
            stored
        }
        None => {
            let rootfs = args
                .rootfs
                .clone()
                .context("--rootfs is required for a container without a saved configuration")?;
            ContainerConfig::new(rootfs)
        }
    };

    config.apply(ContainerConfigUpdate {
        rootfs: args.rootfs.clone(),
        pids_limit: args.pids,
        memory_limit: args.memory,
        ..Default::default()
    });
    config.validate().context("Invalid configuration")?;
    store.put(&id, &config)?;

    let policy = if args.retain_cgroup {
        CleanupPolicy::Retain
    } else {
        CleanupPolicy::Destroy
    };

    let mut container = Container::with_id(
        id,
        config,
        make_backend(args.backend),
        Arc::new(HostKernel::new()),
    )
    .with_cleanup_policy(policy);

    info!("🚀 Running: {}", args.command.join(" "));

    let status = container
        .run(&args.command)
        .context("Container run failed")?;

    if status == 0 {
        info!("✅ Container exited cleanly");
    } else {
        warn!("⚠️  Container exited with code: {}", status);
    }

    Ok(status)
}
