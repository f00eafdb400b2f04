//! Integration tests for the container orchestrator
//!
//! Everything here drives full runs through the mock kernel and mock cgroup
//! backend, so the whole sequence (limits, outer spawn, jail, inner exec,
//! teardown, cleanup) is exercised without privilege. The last test talks to
//! the real kernel and only runs as root.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use containd_cgroup::{
    group_path, purge_all, CgroupBackend, FsBackend, MockBackend, PIDS_MAX_FILE,
};
use containd_core::{ContainerConfig, ContainerId, Error, LimitValue};
use containd_namespace::{
    EntryPoint, HostKernel, Kernel, KernelEvent, MockKernel, NamespaceSet, ProcessStack,
};
use containd_runtime::{CleanupPolicy, Container, ContainerState};

fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

fn command(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

fn mock_setup() -> (Container, Arc<MockBackend>, Arc<MockKernel>, tempfile::TempDir) {
    let backend = Arc::new(MockBackend::new());
    let kernel = Arc::new(MockKernel::new());
    let rootfs = tempfile::tempdir().unwrap();
    let config = ContainerConfig::new(rootfs.path());

    let container = Container::new(config, backend.clone(), kernel.clone());
    (container, backend, kernel, rootfs)
}

#[test]
fn test_workload_exit_status_is_surfaced() {
    let (mut container, _, kernel, _rootfs) = mock_setup();
    kernel.set_exec_status(7);

    let status = container.run(&command(&["/bin/false-ish"])).unwrap();
    assert_eq!(status, 7);
    assert_eq!(container.state(), ContainerState::Terminated);
}

#[test]
fn test_full_run_sequence_and_teardown() {
    let (mut container, backend, kernel, _rootfs) = mock_setup();

    let status = container.run(&command(&["/bin/sh", "-c", "true"])).unwrap();
    assert_eq!(status, 0);

    // No mount survives the run
    assert!(kernel.active_mounts().is_empty());

    // Destroy policy removed the cgroup node
    assert!(!backend.has_group(container.cgroup_path()));

    let events = kernel.events();

    // Outer spawn enters namespaces; the inner one is a plain exec boundary
    let spawns: Vec<&KernelEvent> = events
        .iter()
        .filter(|e| matches!(e, KernelEvent::Spawn { .. }))
        .collect();
    assert_eq!(spawns.len(), 2);
    assert!(matches!(
        spawns[0],
        KernelEvent::Spawn { namespaces, .. } if !namespaces.is_empty()
    ));
    assert!(matches!(
        spawns[1],
        KernelEvent::Spawn { namespaces, .. } if namespaces.is_empty()
    ));

    // Exec happens after the environment wipe
    let clear_at = events
        .iter()
        .position(|e| matches!(e, KernelEvent::ClearEnvironment))
        .unwrap();
    let exec_at = events
        .iter()
        .position(|e| matches!(e, KernelEvent::Exec(_)))
        .unwrap();
    assert!(clear_at < exec_at);

    // Unmounts mirror the mounts in reverse
    let mounts: Vec<PathBuf> = events
        .iter()
        .filter_map(|e| match e {
            KernelEvent::Mount(t) => Some(t.clone()),
            _ => None,
        })
        .collect();
    let unmounts: Vec<PathBuf> = events
        .iter()
        .filter_map(|e| match e {
            KernelEvent::Unmount(t) => Some(t.clone()),
            _ => None,
        })
        .collect();
    let mut expected = mounts;
    expected.reverse();
    assert_eq!(unmounts, expected);
}

#[test]
fn test_exec_failure_is_an_error_with_full_teardown() {
    let (mut container, backend, kernel, _rootfs) = mock_setup();
    kernel.fail_exec();

    let result = container.run(&command(&["/bin/missing"]));
    assert!(matches!(result, Err(Error::Exec { .. })));

    // Teardown still ran on the failure path
    assert!(kernel.active_mounts().is_empty());
    assert!(!backend.has_group(container.cgroup_path()));
    assert_eq!(container.state(), ContainerState::Terminated);
}

#[test]
fn test_mount_failure_unwinds_partial_jail() {
    let (mut container, _, kernel, _rootfs) = mock_setup();
    kernel.fail_mount(std::path::Path::new("/dev"));

    let result = container.run(&command(&["/bin/sh"]));
    assert!(matches!(result, Err(Error::JailSetup { .. })));

    // /proc and /sys were mounted before the failure and must be gone
    assert!(kernel.active_mounts().is_empty());

    // The workload never came into existence
    assert!(!kernel
        .events()
        .iter()
        .any(|e| matches!(e, KernelEvent::Exec(_))));
}

#[test]
fn test_spawn_failure_is_fatal() {
    let (mut container, backend, kernel, _rootfs) = mock_setup();
    kernel.fail_spawn();

    let result = container.run(&command(&["/bin/sh"]));
    assert!(matches!(result, Err(Error::NamespaceSpawn { .. })));

    // Cleanup still removed the node
    assert!(!backend.has_group(container.cgroup_path()));
}

/// Kernel wrapper recording what the pids limit read back as at the moment
/// of the first (outer) spawn.
struct LimitObservingKernel {
    inner: MockKernel,
    backend: Arc<MockBackend>,
    group: PathBuf,
    observed: Mutex<Option<String>>,
}

impl Kernel for LimitObservingKernel {
    fn spawn(
        &self,
        entry: EntryPoint<'_>,
        stack: &mut ProcessStack,
        namespaces: &NamespaceSet,
    ) -> containd_core::Result<i32> {
        {
            let mut observed = self.observed.lock().unwrap();
            if observed.is_none() {
                *observed = self.backend.read_control(&self.group, PIDS_MAX_FILE).ok();
            }
        }
        self.inner.spawn(entry, stack, namespaces)
    }

    fn mount(
        &self,
        source: &str,
        target: &std::path::Path,
        fstype: &str,
    ) -> containd_core::Result<()> {
        self.inner.mount(source, target, fstype)
    }

    fn unmount(&self, target: &std::path::Path) -> containd_core::Result<()> {
        self.inner.unmount(target)
    }

    fn change_root(&self, path: &std::path::Path) -> containd_core::Result<()> {
        self.inner.change_root(path)
    }

    fn set_hostname(&self, name: &str) -> containd_core::Result<()> {
        self.inner.set_hostname(name)
    }

    fn clear_environment(&self) -> containd_core::Result<()> {
        self.inner.clear_environment()
    }

    fn set_environment(&self, key: &str, value: &str) {
        self.inner.set_environment(key, value);
    }

    fn exec(&self, cmd: &[String]) -> containd_core::Result<i32> {
        self.inner.exec(cmd)
    }
}

#[test]
fn test_limits_are_in_force_before_the_outer_spawn() {
    let backend = Arc::new(MockBackend::new());
    let id = ContainerId::new("limits-first").unwrap();
    let kernel = Arc::new(LimitObservingKernel {
        inner: MockKernel::new(),
        backend: backend.clone(),
        group: group_path(&id),
        observed: Mutex::new(None),
    });

    let rootfs = tempfile::tempdir().unwrap();
    let config = ContainerConfig::new(rootfs.path())
        .with_pids_limit(LimitValue::limited(8).unwrap());

    let mut container = Container::with_id(id, config, backend, kernel.clone());
    container.run(&command(&["/bin/sh"])).unwrap();

    let observed = kernel.observed.lock().unwrap().clone();
    assert_eq!(observed.as_deref(), Some("8"));
}

#[test]
fn test_concurrent_identities_do_not_interfere() {
    let backend = Arc::new(MockBackend::new());
    let rootfs = tempfile::tempdir().unwrap();

    let kernel_a = Arc::new(MockKernel::new());
    let kernel_b = Arc::new(MockKernel::new());
    kernel_a.set_exec_status(3);
    kernel_b.set_exec_status(4);

    let mut a = Container::with_id(
        ContainerId::new("pair-a").unwrap(),
        ContainerConfig::new(rootfs.path()),
        backend.clone(),
        kernel_a,
    );
    let mut b = Container::with_id(
        ContainerId::new("pair-b").unwrap(),
        ContainerConfig::new(rootfs.path()),
        backend.clone(),
        kernel_b,
    );

    assert_ne!(a.cgroup_path(), b.cgroup_path());

    assert_eq!(a.run(&command(&["/bin/a"])).unwrap(), 3);
    assert_eq!(b.run(&command(&["/bin/b"])).unwrap(), 4);

    assert!(!backend.has_group(a.cgroup_path()));
    assert!(!backend.has_group(b.cgroup_path()));
}

#[test]
fn test_retain_policy_leaves_node_for_purge() {
    let (container, backend, _kernel, _rootfs) = mock_setup();
    let mut container = container.with_cleanup_policy(CleanupPolicy::Retain);

    container.run(&command(&["/bin/sh"])).unwrap();

    // Node survives the run, evacuated of members
    assert!(backend.has_group(container.cgroup_path()));

    // The crash-recovery sweep collects it
    assert_eq!(purge_all(backend.as_ref()).unwrap(), 1);
    assert!(!backend.has_group(container.cgroup_path()));
}

#[test]
fn test_unprivileged_real_backend_fails_without_artifacts() {
    if is_root() {
        eprintln!("skipping: unprivileged-only test");
        return;
    }

    let rootfs = tempfile::tempdir().unwrap();
    let mut container = Container::new(
        ContainerConfig::new(rootfs.path()),
        Arc::new(FsBackend::new()),
        Arc::new(HostKernel::new()),
    );

    let result = container.run(&command(&["/bin/sh"]));
    assert!(matches!(result, Err(Error::PermissionDenied { .. })));

    // Nothing was created on the way to the refusal
    assert!(!container.cgroup_path().exists());
}

#[test]
fn test_real_run_in_empty_rootfs_fails_cleanly() {
    if !is_root() {
        eprintln!("skipping: requires root");
        return;
    }

    let rootfs = tempfile::tempdir().unwrap();
    for dir in ["proc", "sys", "dev"] {
        std::fs::create_dir(rootfs.path().join(dir)).unwrap();
    }

    // Real stacks need headroom the mock paths do not
    let config = ContainerConfig::new(rootfs.path())
        .with_outer_stack_size(1024 * 1024)
        .with_inner_stack_size(1024 * 1024);

    let mut container = Container::new(
        config,
        Arc::new(FsBackend::new()),
        Arc::new(HostKernel::new()),
    );

    // An empty rootfs has nothing to exec, so the run must fail, but it must
    // fail through the orchestrator with the cgroup node cleaned up
    let result = container.run(&command(&["/bin/sh"]));
    assert!(result.is_err());
    assert_eq!(container.state(), ContainerState::Terminated);
    assert!(!container.cgroup_path().exists());
}
