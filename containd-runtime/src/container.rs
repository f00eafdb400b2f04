//! Container lifecycle orchestration

use std::sync::Arc;

use tracing::{debug, info, warn};

use containd_cgroup::{CgroupBackend, CgroupManager};
use containd_core::{
    ContainerConfig, ContainerConfigUpdate, ContainerId, Error, Result,
};
use containd_namespace::{Jail, Kernel, NamespaceSet, ProcessStack};

/// Exit status the outer process reserves for a jail-setup failure
const JAIL_FAILURE_STATUS: i32 = 125;

/// Exit status the outer process reserves for an inner spawn-stage failure
const STAGE_FAILURE_STATUS: i32 = 126;

/// Exit status the inner process reserves for a failed image replacement
const EXEC_FAILURE_STATUS: i32 = 127;

/// Lifecycle states, one-directional; a terminated container is not
/// re-runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Identity and configuration exist, no kernel state yet
    Created,
    /// The cgroup node exists
    Provisioned,
    /// A `run` is in flight
    Running,
    /// The run finished (by success or failure)
    Terminated,
}

/// What happens to the cgroup node once the workload has exited.
///
/// Always destroying hampers post-crash diagnosis, so retention for a later
/// purge sweep is an explicit choice rather than a hardcoded behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Evacuate membership and remove the node immediately
    #[default]
    Destroy,
    /// Evacuate membership but leave the node for `purge_all`
    Retain,
}

/// Runs one command in an isolated process tree and guarantees teardown.
///
/// A given instance supports at most one in-flight `run`; concurrent or
/// re-entrant calls on the same instance are undefined and must be
/// serialized by the caller. Instances with distinct identities may run
/// concurrently with no coordination: their cgroup paths and namespace
/// instances are disjoint.
pub struct Container {
    id: ContainerId,
    config: ContainerConfig,
    state: ContainerState,
    cleanup_policy: CleanupPolicy,
    namespaces: NamespaceSet,
    cgroup: CgroupManager,
    kernel: Arc<dyn Kernel>,
}

impl Container {
    /// Create a container with a freshly generated identity.
    #[must_use]
    pub fn new(
        config: ContainerConfig,
        backend: Arc<dyn CgroupBackend>,
        kernel: Arc<dyn Kernel>,
    ) -> Self {
        Self::with_id(ContainerId::generate(), config, backend, kernel)
    }

    /// Create a container for an existing identity (e.g. loaded from a
    /// [`ConfigStore`](crate::ConfigStore)).
    #[must_use]
    pub fn with_id(
        id: ContainerId,
        config: ContainerConfig,
        backend: Arc<dyn CgroupBackend>,
        kernel: Arc<dyn Kernel>,
    ) -> Self {
        let cgroup = CgroupManager::new(id.clone(), backend);
        Self {
            id,
            config,
            state: ContainerState::Created,
            cleanup_policy: CleanupPolicy::default(),
            namespaces: NamespaceSet::isolation(),
            cgroup,
            kernel,
        }
    }

    /// Choose what happens to the cgroup node after the workload exits
    #[must_use]
    pub fn with_cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup_policy = policy;
        self
    }

    /// Override the outer spawn's namespace set
    #[must_use]
    pub fn with_namespaces(mut self, namespaces: NamespaceSet) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// The container's identity
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Path of the container's cgroup node
    #[must_use]
    pub fn cgroup_path(&self) -> &std::path::Path {
        self.cgroup.path()
    }

    /// Overwrite the fields supplied in `update`, leaving the rest intact.
    ///
    /// # Errors
    /// Fails once a run has started: configuration is immutable from then on.
    pub fn reconfigure(&mut self, update: ContainerConfigUpdate) -> Result<()> {
        match self.state {
            ContainerState::Created | ContainerState::Provisioned => {
                self.config.apply(update);
                Ok(())
            }
            ContainerState::Running | ContainerState::Terminated => Err(Error::InvalidConfig {
                message: format!(
                    "Container {} can no longer be reconfigured (state {:?})",
                    self.id, self.state
                ),
            }),
        }
    }

    /// Create the cgroup node, transitioning `Created → Provisioned`.
    ///
    /// Idempotent at the filesystem level: an orphaned node left by a crash
    /// under the same id is reused.
    pub fn provision(&mut self) -> Result<()> {
        if self.state != ContainerState::Created {
            return Err(Error::InvalidConfig {
                message: format!(
                    "Container {} cannot be provisioned in state {:?}",
                    self.id, self.state
                ),
            });
        }

        self.cgroup.create()?;
        self.state = ContainerState::Provisioned;
        Ok(())
    }

    /// Run `command` in isolation and block until it exits.
    ///
    /// Applies cgroup limits to the calling process, spawns the outer
    /// jailing process with the full namespace set, lets it exec the
    /// command in an inner process, reaps everything, then cleans up per
    /// the configured [`CleanupPolicy`].
    ///
    /// Returns the command's exit status. The statuses 125–127 are reserved
    /// for conveying jail-setup, inner-spawn, and exec failures out of the
    /// spawned processes and are surfaced as the corresponding errors; a
    /// workload deliberately exiting with one of them is indistinguishable.
    ///
    /// # Errors
    /// Any stage failure surfaces unchanged after best-effort teardown of
    /// whatever was already set up. Cleanup-phase cgroup removal failures
    /// are logged and never promoted over the run's own result.
    pub fn run(&mut self, command: &[String]) -> Result<i32> {
        match self.state {
            ContainerState::Created => self.provision()?,
            ContainerState::Provisioned => {}
            ContainerState::Running | ContainerState::Terminated => {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "Container {} is not runnable in state {:?}",
                        self.id, self.state
                    ),
                });
            }
        }

        self.config.validate()?;
        if command.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Command cannot be empty".to_string(),
            });
        }

        info!(id = %self.id, command = ?command, "Starting container run");
        self.state = ContainerState::Running;

        let result = self.run_isolated(command);

        self.state = ContainerState::Terminated;
        self.cleanup();

        match &result {
            Ok(status) => info!(id = %self.id, status, "Container run finished"),
            Err(e) => warn!(id = %self.id, error = %e, "Container run failed"),
        }

        result
    }

    /// The spawn sequence proper: limits, outer spawn, status mapping.
    fn run_isolated(&self, command: &[String]) -> Result<i32> {
        // Limits constrain the calling process first, so both spawned tiers
        // inherit group membership before the workload exists
        self.cgroup
            .apply_limits(self.config.pids_limit, self.config.memory_limit)?;

        let mut outer_stack = ProcessStack::with_size(self.config.outer_stack_size)?;

        let kernel = self.kernel.as_ref();
        let config = &self.config;
        let id = &self.id;

        let status = kernel.spawn(
            Box::new(move || outer_entry(kernel, config, id, command)),
            &mut outer_stack,
            &self.namespaces,
        )?;

        match status {
            JAIL_FAILURE_STATUS => Err(Error::JailSetup {
                message: "Jail setup failed in the outer process".to_string(),
            }),
            STAGE_FAILURE_STATUS => Err(Error::NamespaceSpawn {
                message: "Inner spawn stage failed in the outer process".to_string(),
            }),
            EXEC_FAILURE_STATUS => Err(Error::Exec {
                command: command[0].clone(),
                message: "Command missing or not executable".to_string(),
            }),
            code => Ok(code),
        }
    }

    /// Post-run cgroup handling. Best effort by design: removal may need to
    /// wait for asynchronous process exit outside this orchestrator's
    /// control, so failures here are recorded and the node is left for the
    /// purge sweep.
    fn cleanup(&self) {
        let outcome = match self.cleanup_policy {
            CleanupPolicy::Destroy => self.cgroup.evacuate_and_destroy(),
            CleanupPolicy::Retain => {
                debug!(id = %self.id, "Retaining cgroup node for a later purge sweep");
                self.cgroup.evacuate()
            }
        };

        if let Err(e) = outcome {
            warn!(
                id = %self.id,
                error = %e,
                "Cgroup cleanup failed; the purge sweep will collect the node"
            );
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("cleanup_policy", &self.cleanup_policy)
            .finish_non_exhaustive()
    }
}

/// Entry point of the outer jailing process.
///
/// Runs inside the freshly namespaced child: enters the jail, drives the
/// inner exec stage, and unwinds the jail's mounts strictly around the
/// workload's lifetime. Failures are conveyed to the orchestrator through
/// the reserved exit statuses, since no richer channel crosses the process
/// boundary.
fn outer_entry(
    kernel: &dyn Kernel,
    config: &ContainerConfig,
    id: &ContainerId,
    command: &[String],
) -> isize {
    let mut jail = Jail::new(kernel);

    if let Err(e) = jail.enter(config.rootfs(), id.as_str()) {
        eprintln!("containd: jail setup failed: {e}");
        // Unwind whatever was already mounted before exiting
        jail.teardown();
        return JAIL_FAILURE_STATUS as isize;
    }

    let status = match exec_stage(kernel, config.inner_stack_size, command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("containd: inner spawn failed: {e}");
            STAGE_FAILURE_STATUS
        }
    };

    jail.teardown();
    status as isize
}

/// Inner stage: a plain spawn whose child replaces its own image with the
/// command. No new namespaces here; the PID namespace was created at the
/// outer spawn only.
fn exec_stage(kernel: &dyn Kernel, stack_size: usize, command: &[String]) -> Result<i32> {
    let mut inner_stack = ProcessStack::with_size(stack_size)?;

    kernel.spawn(
        Box::new(move || match kernel.exec(command) {
            // Only simulated kernels return a status on success
            Ok(code) => code as isize,
            Err(e) => {
                eprintln!("containd: {e}");
                EXEC_FAILURE_STATUS as isize
            }
        }),
        &mut inner_stack,
        &NamespaceSet::exec_only(),
    )
}
