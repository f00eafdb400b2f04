//! Namespace set composition

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

/// The set of isolation domains a spawned process enters atomically at
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSet {
    /// New PID namespace (the child becomes PID 1)
    pub pid: bool,

    /// New network namespace
    pub network: bool,

    /// New mount namespace
    pub mount: bool,

    /// New UTS namespace (hostname)
    pub uts: bool,

    /// New IPC namespace
    pub ipc: bool,

    /// New user namespace (UID/GID mapping)
    pub user: bool,

    /// New cgroup namespace (own cgroup view)
    pub cgroup: bool,
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self::isolation()
    }
}

impl NamespaceSet {
    /// The full set used by the outer spawn: mount table, network, IPC,
    /// PID space, hostname, and own cgroup view.
    ///
    /// The user namespace stays off by default because it needs UID/GID map
    /// setup before the child can operate; enable it with
    /// [`with_user`](Self::with_user) once that setup exists.
    #[must_use]
    pub const fn isolation() -> Self {
        Self {
            pid: true,
            network: true,
            mount: true,
            uts: true,
            ipc: true,
            user: false,
            cgroup: true,
        }
    }

    /// The empty set used by the inner spawn, which is purely the exec
    /// boundary: the PID namespace is created at the outer spawn only.
    #[must_use]
    pub const fn exec_only() -> Self {
        Self {
            pid: false,
            network: false,
            mount: false,
            uts: false,
            ipc: false,
            user: false,
            cgroup: false,
        }
    }

    /// Enable or disable the PID namespace
    #[must_use]
    pub const fn with_pid(mut self, enable: bool) -> Self {
        self.pid = enable;
        self
    }

    /// Enable or disable the network namespace
    #[must_use]
    pub const fn with_network(mut self, enable: bool) -> Self {
        self.network = enable;
        self
    }

    /// Enable or disable the mount namespace
    #[must_use]
    pub const fn with_mount(mut self, enable: bool) -> Self {
        self.mount = enable;
        self
    }

    /// Enable or disable the UTS namespace
    #[must_use]
    pub const fn with_uts(mut self, enable: bool) -> Self {
        self.uts = enable;
        self
    }

    /// Enable or disable the IPC namespace
    #[must_use]
    pub const fn with_ipc(mut self, enable: bool) -> Self {
        self.ipc = enable;
        self
    }

    /// Enable or disable the user namespace
    #[must_use]
    pub const fn with_user(mut self, enable: bool) -> Self {
        self.user = enable;
        self
    }

    /// Enable or disable the cgroup namespace
    #[must_use]
    pub const fn with_cgroup(mut self, enable: bool) -> Self {
        self.cgroup = enable;
        self
    }

    /// Convert to clone flags for `clone(2)`
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();

        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        if self.user {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        if self.cgroup {
            flags |= CloneFlags::CLONE_NEWCGROUP;
        }

        flags
    }

    /// Check if any namespaces are enabled
    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.pid || self.network || self.mount || self.uts || self.ipc || self.user || self.cgroup
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<&'static str> {
        let mut namespaces = Vec::new();

        if self.pid {
            namespaces.push("pid");
        }
        if self.network {
            namespaces.push("net");
        }
        if self.mount {
            namespaces.push("mnt");
        }
        if self.uts {
            namespaces.push("uts");
        }
        if self.ipc {
            namespaces.push("ipc");
        }
        if self.user {
            namespaces.push("user");
        }
        if self.cgroup {
            namespaces.push("cgroup");
        }

        namespaces
    }
}
