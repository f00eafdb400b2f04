//! Injected capability interface over the native kernel-call surface
//!
//! This module uses `unsafe` for `clone(2)`, `clearenv(3)`, and environment
//! mutation, which is inherently unsafe but necessary for spawning onto a
//! caller-managed stack inside a fresh namespace set.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use nix::mount::{mount, umount, MsFlags};
use nix::sched;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, chroot, sethostname, Pid};
use tracing::{debug, warn};

use containd_core::{Error, Result};
use containd_security::require_root;

use crate::set::NamespaceSet;
use crate::stack::ProcessStack;

/// Entry point a spawned process begins execution at; the returned value
/// becomes the process's exit status.
pub type EntryPoint<'a> = Box<dyn FnMut() -> isize + 'a>;

/// The native kernel-call surface as an injected capability.
///
/// Everything the isolation engine asks of the kernel goes through this
/// trait, so tests can substitute [`MockKernel`] and simulate kernel
/// behaviour without elevated privilege.
pub trait Kernel: Send + Sync {
    /// Create a new process running `entry` on `stack`, entering
    /// `namespaces` atomically at creation, and block until it (and any
    /// reaped descendants) have terminated.
    ///
    /// Returns the child's exit status; a signal death is surfaced as
    /// `128 + signo`.
    fn spawn(
        &self,
        entry: EntryPoint<'_>,
        stack: &mut ProcessStack,
        namespaces: &NamespaceSet,
    ) -> Result<i32>;

    /// Mount a guest-local pseudo-filesystem instance at `target`
    fn mount(&self, source: &str, target: &Path, fstype: &str) -> Result<()>;

    /// Unmount the filesystem at `target`
    fn unmount(&self, target: &Path) -> Result<()>;

    /// Change the current process's filesystem root to `path` and reset the
    /// working directory to the new root's top
    fn change_root(&self, path: &Path) -> Result<()>;

    /// Set the hostname inside the current UTS namespace
    fn set_hostname(&self, name: &str) -> Result<()>;

    /// Drop every inherited environment variable
    fn clear_environment(&self) -> Result<()>;

    /// Set one environment variable
    fn set_environment(&self, key: &str, value: &str);

    /// Replace the current process image with `command`.
    ///
    /// The host kernel never returns on success; it only returns the
    /// [`Error::Exec`] describing why replacement failed. Simulated kernels
    /// return the workload's scripted exit status instead.
    fn exec(&self, command: &[String]) -> Result<i32>;
}

/// Production implementation calling the real kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostKernel;

impl HostKernel {
    /// Create a new host kernel handle
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Blocking reap loop; the spawn primitive does not auto-reap.
    fn reap(child: Pid) -> Result<i32> {
        loop {
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    debug!(pid = child.as_raw(), code, "Child exited");
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    warn!(pid = child.as_raw(), ?signal, "Child terminated by signal");
                    return Ok(128 + signal as i32);
                }
                Ok(status) => {
                    debug!(pid = child.as_raw(), ?status, "Child status, still waiting");
                }
                Err(Errno::EINTR) => {}
                Err(Errno::ECHILD) => {
                    // Something else reaped the child (e.g. SIGCHLD set to
                    // SIG_IGN was inherited); its real status is lost and
                    // must not be reported as a clean exit
                    warn!(pid = child.as_raw(), "Child reaped elsewhere, status lost");
                    return Err(Error::NamespaceSpawn {
                        message: format!(
                            "Process {} was reaped elsewhere, exit status lost",
                            child.as_raw()
                        ),
                    });
                }
                Err(e) => {
                    return Err(Error::NamespaceSpawn {
                        message: format!("Wait failed: {e}"),
                    });
                }
            }
        }
    }
}

impl Kernel for HostKernel {
    fn spawn(
        &self,
        entry: EntryPoint<'_>,
        stack: &mut ProcessStack,
        namespaces: &NamespaceSet,
    ) -> Result<i32> {
        // Creating namespaces is the privileged part; a plain clone for the
        // exec boundary is not
        if namespaces.has_any() {
            require_root("spawn namespaced process")?;
        }

        let flags = namespaces.to_clone_flags();

        debug!(
            namespaces = ?namespaces.enabled_namespaces(),
            stack_bytes = stack.size(),
            "Spawning process"
        );

        // SAFETY: the stack region is borrowed for the whole call and the
        // blocking reap below keeps it alive until the child is gone.
        let child = unsafe { sched::clone(entry, stack.as_mut_slice(), flags, Some(libc::SIGCHLD)) }
            .map_err(|e| Error::NamespaceSpawn {
                message: format!("clone failed: {e}"),
            })?;

        Self::reap(child)
    }

    fn mount(&self, source: &str, target: &Path, fstype: &str) -> Result<()> {
        require_root("mount pseudo-filesystem")?;

        debug!(source, target = %target.display(), fstype, "Mounting");

        mount(
            Some(source),
            target,
            Some(fstype),
            MsFlags::empty(),
            None::<&str>,
        )
        .map_err(|e| Error::JailSetup {
            message: format!("Failed to mount {fstype} at {}: {e}", target.display()),
        })
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        require_root("unmount pseudo-filesystem")?;

        debug!(target = %target.display(), "Unmounting");

        umount(target).map_err(|e| Error::JailSetup {
            message: format!("Failed to unmount {}: {e}", target.display()),
        })
    }

    fn change_root(&self, path: &Path) -> Result<()> {
        require_root("change filesystem root")?;

        debug!(root = %path.display(), "Changing root");

        chroot(path).map_err(|e| Error::JailSetup {
            message: format!("Failed to chroot into {}: {e}", path.display()),
        })?;

        // Process-local and inherited by children spawned afterwards
        chdir("/").map_err(|e| Error::JailSetup {
            message: format!("Failed to enter new root: {e}"),
        })
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        require_root("set hostname")?;

        sethostname(name).map_err(|e| Error::JailSetup {
            message: format!("Failed to set hostname: {e}"),
        })
    }

    fn clear_environment(&self) -> Result<()> {
        // SAFETY: called in the single-threaded jailing child, before exec
        let rc = unsafe { libc::clearenv() };
        if rc == 0 {
            Ok(())
        } else {
            Err(Error::JailSetup {
                message: "clearenv failed".to_string(),
            })
        }
    }

    fn set_environment(&self, key: &str, value: &str) {
        // SAFETY: same single-threaded child as clear_environment
        unsafe {
            std::env::set_var(key, value);
        }
    }

    fn exec(&self, command: &[String]) -> Result<i32> {
        let program = command.first().ok_or_else(|| Error::InvalidConfig {
            message: "Command cannot be empty".to_string(),
        })?;

        let program_c = CString::new(program.as_bytes()).map_err(|e| Error::Exec {
            command: program.clone(),
            message: format!("Invalid program name: {e}"),
        })?;

        let args_c = command
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<std::result::Result<Vec<CString>, _>>()
            .map_err(|e| Error::Exec {
                command: program.clone(),
                message: format!("Invalid argument: {e}"),
            })?;

        // Never returns on success
        match nix::unistd::execvp(&program_c, &args_c) {
            Ok(never) => match never {},
            Err(e) => Err(Error::Exec {
                command: program.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// One recorded kernel interaction, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    /// A process was spawned into the named namespaces
    Spawn {
        /// Enabled namespace names, as `NamespaceSet::enabled_namespaces`
        namespaces: Vec<&'static str>,
        /// Stack bytes handed to the primitive
        stack_size: usize,
    },
    /// Filesystem root changed
    ChangeRoot(PathBuf),
    /// Pseudo-filesystem mounted at the target
    Mount(PathBuf),
    /// Target unmounted
    Unmount(PathBuf),
    /// Hostname set inside the UTS namespace
    SetHostname(String),
    /// Inherited environment dropped
    ClearEnvironment,
    /// One environment variable set
    SetEnvironment(String),
    /// Process image replacement requested
    Exec(Vec<String>),
}

/// Mock kernel for testing (no privilege, no real processes)
///
/// Records every interaction as an ordered [`KernelEvent`] log, tracks the
/// active mount table, and runs spawn entry points inline in the calling
/// process so orchestration sequencing can be asserted directly.
#[derive(Clone, Default)]
pub struct MockKernel {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    events: Vec<KernelEvent>,
    active_mounts: Vec<PathBuf>,
    env: Vec<(String, String)>,
    env_cleared: bool,
    exec_status: i32,
    fail_mount_target: Option<PathBuf>,
    fail_change_root: bool,
    fail_exec: bool,
    fail_spawn: bool,
}

impl MockKernel {
    /// Create a new mock kernel
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the exit status the simulated workload terminates with
    pub fn set_exec_status(&self, code: i32) {
        self.state.lock().unwrap().exec_status = code;
    }

    /// Make mounting at `target` fail
    pub fn fail_mount(&self, target: &Path) {
        self.state.lock().unwrap().fail_mount_target = Some(target.to_path_buf());
    }

    /// Make the next root change fail
    pub fn fail_change_root(&self) {
        self.state.lock().unwrap().fail_change_root = true;
    }

    /// Make exec fail as if the target command were missing
    pub fn fail_exec(&self) {
        self.state.lock().unwrap().fail_exec = true;
    }

    /// Make the spawn primitive itself fail
    pub fn fail_spawn(&self) {
        self.state.lock().unwrap().fail_spawn = true;
    }

    /// Ordered log of recorded interactions
    #[must_use]
    pub fn events(&self) -> Vec<KernelEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Mounts currently active (mounted and not yet unmounted)
    #[must_use]
    pub fn active_mounts(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().active_mounts.clone()
    }

    /// Environment as the simulated guest would observe it
    #[must_use]
    pub fn environment(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().env.clone()
    }

    /// Whether the inherited environment was dropped
    #[must_use]
    pub fn environment_cleared(&self) -> bool {
        self.state.lock().unwrap().env_cleared
    }
}

impl std::fmt::Debug for MockKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockKernel").finish_non_exhaustive()
    }
}

impl Kernel for MockKernel {
    fn spawn(
        &self,
        mut entry: EntryPoint<'_>,
        stack: &mut ProcessStack,
        namespaces: &NamespaceSet,
    ) -> Result<i32> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_spawn {
                return Err(Error::NamespaceSpawn {
                    message: "Mock: spawn failure injected".to_string(),
                });
            }
            state.events.push(KernelEvent::Spawn {
                namespaces: namespaces.enabled_namespaces(),
                stack_size: stack.size(),
            });
        }

        // Entry runs inline; the lock is released so the entry can call
        // back into this kernel
        let code = entry();

        #[allow(clippy::cast_possible_truncation)]
        Ok(code as i32)
    }

    fn mount(&self, _source: &str, target: &Path, fstype: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.fail_mount_target.as_deref() == Some(target) {
            return Err(Error::JailSetup {
                message: format!("Mock: mount failure injected at {}", target.display()),
            });
        }

        tracing::debug!(target = %target.display(), fstype, "Mock: mounted");
        state.active_mounts.push(target.to_path_buf());
        state.events.push(KernelEvent::Mount(target.to_path_buf()));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        let index = state
            .active_mounts
            .iter()
            .rposition(|mounted| mounted == target)
            .ok_or_else(|| Error::JailSetup {
                message: format!("Mock: {} is not mounted", target.display()),
            })?;

        state.active_mounts.remove(index);
        state.events.push(KernelEvent::Unmount(target.to_path_buf()));
        Ok(())
    }

    fn change_root(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.fail_change_root {
            return Err(Error::JailSetup {
                message: format!("Mock: chroot failure injected for {}", path.display()),
            });
        }

        state.events.push(KernelEvent::ChangeRoot(path.to_path_buf()));
        Ok(())
    }

    fn set_hostname(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(KernelEvent::SetHostname(name.to_string()));
        Ok(())
    }

    fn clear_environment(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.env.clear();
        state.env_cleared = true;
        state.events.push(KernelEvent::ClearEnvironment);
        Ok(())
    }

    fn set_environment(&self, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.env.push((key.to_string(), value.to_string()));
        state
            .events
            .push(KernelEvent::SetEnvironment(key.to_string()));
    }

    fn exec(&self, command: &[String]) -> Result<i32> {
        let mut state = self.state.lock().unwrap();

        state.events.push(KernelEvent::Exec(command.to_vec()));

        if state.fail_exec {
            let program = command.first().cloned().unwrap_or_default();
            return Err(Error::Exec {
                command: program,
                message: "Mock: No such file or directory".to_string(),
            });
        }

        Ok(state.exec_status)
    }
}
