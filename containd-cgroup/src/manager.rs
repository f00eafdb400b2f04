//! Per-container cgroup lifecycle

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use containd_core::{ContainerId, Error, LimitValue, ProcessId, Result};

use crate::backend::{CgroupBackend, Controller};

/// Derive a container's cgroup path from its identity.
///
/// The path is a pure function of the id, so two containers with distinct
/// identities can never collide.
#[must_use]
pub fn group_path(id: &ContainerId) -> PathBuf {
    PathBuf::from(crate::CGROUP_ROOT)
        .join(crate::RUNTIME_GROUP)
        .join(id.as_str())
}

/// Manages one container's resource-group node.
///
/// The node is created before any workload process exists and destroyed (or
/// evacuated and left for a purge sweep) after the workload exits.
pub struct CgroupManager {
    id: ContainerId,
    path: PathBuf,
    backend: Arc<dyn CgroupBackend>,
}

impl CgroupManager {
    /// Create a manager for the container's node; does not touch the
    /// filesystem until [`create`](Self::create) is called.
    #[must_use]
    pub fn new(id: ContainerId, backend: Arc<dyn CgroupBackend>) -> Self {
        let path = group_path(&id);
        Self { id, path, backend }
    }

    /// The container this node belongs to
    #[must_use]
    pub const fn container_id(&self) -> &ContainerId {
        &self.id
    }

    /// Full path of the node
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the node for the memory and pids controllers (idempotent)
    pub fn create(&self) -> Result<()> {
        debug!("Creating cgroup at: {}", self.path.display());
        self.backend.create_group(&self.path, Controller::DEFAULT_SET)
    }

    /// Apply resource limits, joining the calling process to the node first
    /// so every descendant spawned afterwards inherits membership.
    pub fn apply_limits(&self, pids_limit: LimitValue, memory_limit: LimitValue) -> Result<()> {
        let pid = ProcessId::current();

        debug!(
            pid = pid.as_raw(),
            %pids_limit,
            %memory_limit,
            "Applying cgroup limits"
        );

        // Membership first: limits must already constrain the tree that the
        // workload is spawned into
        self.backend
            .write_control(&self.path, crate::PROCS_FILE, &pid.to_string())?;
        self.backend
            .write_control(&self.path, crate::PIDS_MAX_FILE, &pids_limit.to_string())?;
        self.backend
            .write_control(&self.path, crate::MEMORY_MAX_FILE, &memory_limit.to_string())
    }

    /// Read the process-count limit back from the control file
    pub fn pids_limit(&self) -> Result<LimitValue> {
        self.backend
            .read_control(&self.path, crate::PIDS_MAX_FILE)?
            .parse()
    }

    /// Read the memory limit back from the control file
    pub fn memory_limit(&self) -> Result<LimitValue> {
        self.backend
            .read_control(&self.path, crate::MEMORY_MAX_FILE)?
            .parse()
    }

    /// Pids currently belonging to the node
    pub fn member_pids(&self) -> Result<Vec<ProcessId>> {
        self.backend.member_pids(&self.path)
    }

    /// Move every member process back to the root group, so the node can be
    /// removed even while members are still alive.
    pub fn evacuate(&self) -> Result<()> {
        let root = Path::new(crate::CGROUP_ROOT);

        for pid in self.backend.member_pids(&self.path)? {
            debug!(pid = pid.as_raw(), "Evacuating process to root group");
            self.backend
                .write_control(root, crate::PROCS_FILE, &pid.to_string())?;
        }

        Ok(())
    }

    /// Remove the node.
    ///
    /// Fails with [`Error::CgroupBusy`] while members remain; callers in a
    /// cleanup path treat that as retryable, not as a run failure.
    pub fn destroy(&self) -> Result<()> {
        self.backend.remove_group(&self.path)
    }

    /// Evacuate then destroy; the cleanup-phase combination.
    pub fn evacuate_and_destroy(&self) -> Result<()> {
        self.evacuate()?;
        self.destroy()
    }
}

impl std::fmt::Debug for CgroupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CgroupManager")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Crash-recovery sweep: enumerate every containd node under the fixed root
/// and attempt to destroy each.
///
/// Independent of any single container's lifecycle, and idempotent: a second
/// invocation after full cleanup enumerates nothing and is a no-op.
///
/// Only the busy class is skipped (with a warning): members may still be
/// exiting, and the next sweep will collect the node. Every other removal
/// failure aborts the sweep, so a caller without the privileged identity
/// gets the backend's `PermissionDenied` instead of a successful-looking
/// count.
///
/// Returns the number of nodes removed.
pub fn purge_all(backend: &dyn CgroupBackend) -> Result<usize> {
    let root = PathBuf::from(crate::CGROUP_ROOT).join(crate::RUNTIME_GROUP);

    let mut removed = 0;
    for group in backend.list_groups(&root)? {
        match backend.remove_group(&group) {
            Ok(()) => {
                info!("Purged orphaned cgroup: {}", group.display());
                removed += 1;
            }
            Err(Error::CgroupBusy { path }) => {
                warn!("Skipping busy cgroup during purge: {}", path.display());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(removed)
}
