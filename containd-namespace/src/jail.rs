//! Change-of-root jail setup and teardown
//!
//! Everything here runs inside the outer namespaced process: the root
//! change and the pseudo-filesystem mounts are process-local, inherited by
//! children spawned afterwards, and must be unwound before that process
//! exits.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use containd_core::Result;

use crate::kernel::Kernel;

/// A guest-local pseudo-filesystem mounted under the new root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoFs {
    /// Mount source label
    pub source: &'static str,
    /// Fixed target path relative to the new root
    pub target: &'static str,
    /// Filesystem type
    pub fstype: &'static str,
}

/// Pseudo-filesystems every jail mounts, in mount order: process info,
/// system state, devices.
pub const PSEUDO_FILESYSTEMS: &[PseudoFs] = &[
    PseudoFs {
        source: "proc",
        target: "/proc",
        fstype: "proc",
    },
    PseudoFs {
        source: "sysfs",
        target: "/sys",
        fstype: "sysfs",
    },
    PseudoFs {
        source: "devtmpfs",
        target: "/dev",
        fstype: "devtmpfs",
    },
];

/// Terminal type the sanitized guest environment carries
pub const GUEST_TERM: &str = "xterm-256color";

/// Command search path the sanitized guest environment carries
pub const GUEST_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin";

/// Jail state for one run: the ordered list of performed mounts, used to
/// unwind them in exactly reverse order.
///
/// Ephemeral; exists only inside the outer spawned process.
pub struct Jail<'k> {
    kernel: &'k dyn Kernel,
    mounted: Vec<PathBuf>,
}

impl<'k> Jail<'k> {
    /// Create a jail driven by the given kernel capability
    #[must_use]
    pub fn new(kernel: &'k dyn Kernel) -> Self {
        Self {
            kernel,
            mounted: Vec::new(),
        }
    }

    /// Full setup sequence: hostname, root change, pseudo-filesystem
    /// mounts, environment sanitization.
    ///
    /// On failure the mounts performed so far stay recorded, so the caller
    /// can still [`teardown`](Self::teardown) before surfacing the error.
    pub fn enter(&mut self, rootfs: &Path, hostname: &str) -> Result<()> {
        self.kernel.set_hostname(hostname)?;
        self.set_root(rootfs)?;
        self.mount_pseudo_filesystems()?;
        self.sanitize_environment()
    }

    /// Change the filesystem root; must precede any jail-local mount.
    fn set_root(&self, rootfs: &Path) -> Result<()> {
        debug!(root = %rootfs.display(), "Entering jail root");
        self.kernel.change_root(rootfs)
    }

    /// Mount guest-local pseudo-filesystem instances at their fixed paths
    /// under the new root.
    fn mount_pseudo_filesystems(&mut self) -> Result<()> {
        for fs in PSEUDO_FILESYSTEMS {
            let target = PathBuf::from(fs.target);
            self.kernel.mount(fs.source, &target, fs.fstype)?;
            self.mounted.push(target);
        }
        Ok(())
    }

    /// Clear all inherited environment variables, then set the minimal
    /// fixed set, so host secrets and paths never leak into the guest.
    fn sanitize_environment(&self) -> Result<()> {
        self.kernel.clear_environment()?;
        self.kernel.set_environment("TERM", GUEST_TERM);
        self.kernel.set_environment("PATH", GUEST_PATH);
        Ok(())
    }

    /// Mounts performed so far, in mount order
    #[must_use]
    pub fn mounted(&self) -> &[PathBuf] {
        &self.mounted
    }

    /// Unmount everything this jail mounted, in reverse order.
    ///
    /// Best effort: an unmount failure is logged and the remaining targets
    /// are still attempted, because teardown runs on the error path too and
    /// must never mask the triggering failure.
    pub fn teardown(&mut self) {
        while let Some(target) = self.mounted.pop() {
            if let Err(e) = self.kernel.unmount(&target) {
                warn!(target = %target.display(), error = %e, "Unmount failed during teardown");
            }
        }
    }
}

impl std::fmt::Debug for Jail<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jail")
            .field("mounted", &self.mounted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelEvent, MockKernel};

    #[test]
    fn test_enter_sequence() {
        let kernel = MockKernel::new();
        let mut jail = Jail::new(&kernel);

        jail.enter(Path::new("/var/lib/guest"), "guest-1").unwrap();

        let events = kernel.events();
        assert_eq!(
            events[0],
            KernelEvent::SetHostname("guest-1".to_string())
        );
        assert_eq!(
            events[1],
            KernelEvent::ChangeRoot(PathBuf::from("/var/lib/guest"))
        );
        // Root change strictly precedes every mount; mounts precede the
        // environment wipe
        assert_eq!(events[2], KernelEvent::Mount(PathBuf::from("/proc")));
        assert_eq!(events[3], KernelEvent::Mount(PathBuf::from("/sys")));
        assert_eq!(events[4], KernelEvent::Mount(PathBuf::from("/dev")));
        assert_eq!(events[5], KernelEvent::ClearEnvironment);

        assert_eq!(jail.mounted().len(), PSEUDO_FILESYSTEMS.len());
    }

    #[test]
    fn test_sanitized_environment_is_minimal() {
        let kernel = MockKernel::new();
        let mut jail = Jail::new(&kernel);

        jail.enter(Path::new("/guest"), "guest").unwrap();

        assert!(kernel.environment_cleared());
        let env = kernel.environment();
        assert_eq!(env.len(), 2);
        assert!(env.contains(&("TERM".to_string(), GUEST_TERM.to_string())));
        assert!(env.contains(&("PATH".to_string(), GUEST_PATH.to_string())));
    }

    #[test]
    fn test_teardown_unwinds_in_reverse_order() {
        let kernel = MockKernel::new();
        let mut jail = Jail::new(&kernel);

        jail.enter(Path::new("/guest"), "guest").unwrap();
        jail.teardown();

        assert!(kernel.active_mounts().is_empty());
        assert!(jail.mounted().is_empty());

        let unmounts: Vec<PathBuf> = kernel
            .events()
            .into_iter()
            .filter_map(|e| match e {
                KernelEvent::Unmount(target) => Some(target),
                _ => None,
            })
            .collect();

        let mut expected: Vec<PathBuf> = PSEUDO_FILESYSTEMS
            .iter()
            .map(|fs| PathBuf::from(fs.target))
            .collect();
        expected.reverse();
        assert_eq!(unmounts, expected);
    }

    #[test]
    fn test_partial_mount_failure_keeps_unwind_list() {
        let kernel = MockKernel::new();
        kernel.fail_mount(Path::new("/dev"));

        let mut jail = Jail::new(&kernel);
        let result = jail.enter(Path::new("/guest"), "guest");
        assert!(result.is_err());

        // /proc and /sys made it; /dev did not
        assert_eq!(jail.mounted().len(), 2);

        jail.teardown();
        assert!(kernel.active_mounts().is_empty());
    }
}
