use std::sync::Arc;

use containd_cgroup::*;
use containd_core::*;

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

#[test]
fn test_mock_manager_lifecycle() {
    let backend = Arc::new(MockBackend::new());
    let id = ContainerId::generate();
    let manager = CgroupManager::new(id.clone(), backend.clone());

    manager.create().unwrap();
    assert!(backend.has_group(manager.path()));

    manager
        .apply_limits(
            LimitValue::limited(8).unwrap(),
            LimitValue::limited(512 << 20).unwrap(),
        )
        .unwrap();

    // Limits read back verbatim
    assert_eq!(manager.pids_limit().unwrap().to_string(), "8");
    assert_eq!(
        manager.memory_limit().unwrap().to_string(),
        (512u64 << 20).to_string()
    );

    manager.evacuate_and_destroy().unwrap();
    assert!(!backend.has_group(manager.path()));
}

#[test]
fn test_distinct_ids_never_share_a_node() {
    let backend = Arc::new(MockBackend::new());

    let first = CgroupManager::new(ContainerId::generate(), backend.clone());
    let second = CgroupManager::new(ContainerId::generate(), backend.clone());

    first.create().unwrap();
    second.create().unwrap();

    assert_ne!(first.path(), second.path());

    first
        .apply_limits(LimitValue::limited(1).unwrap(), LimitValue::Max)
        .unwrap();

    // The other container's node never saw the first one's limits
    assert!(second.pids_limit().is_err());
}

#[test]
fn test_unprivileged_apply_leaves_no_artifacts() {
    if is_root() {
        return; // only meaningful without the privileged identity
    }

    let id = ContainerId::generate();
    let manager = CgroupManager::new(id, Arc::new(FsBackend::new()));

    let result = manager.create();
    assert!(matches!(result, Err(Error::PermissionDenied { .. })));
    assert!(!manager.path().exists());
}

#[test]
fn test_unprivileged_purge_never_reports_removals() {
    if is_root() {
        return; // only meaningful without the privileged identity
    }

    // With no orphan nodes the sweep finds nothing; with any present it
    // must surface the denial. Either way it can never claim a removal.
    match purge_all(&FsBackend::new()) {
        Ok(count) => assert_eq!(count, 0),
        Err(e) => assert!(matches!(e, Error::PermissionDenied { .. })),
    }
}

// The real-kernel assertions share the fixed containd cgroup root, so they
// run as one sequential test to keep the purge sweep from racing a live
// lifecycle test in a sibling thread.
#[test]
fn test_real_cgroup_lifecycle_and_purge() {
    if !is_root() {
        eprintln!("skipping: requires root");
        return;
    }

    let backend = Arc::new(FsBackend::new());
    let manager = CgroupManager::new(ContainerId::generate(), backend.clone());

    manager.create().unwrap();
    // Second create of the same node is not an error
    manager.create().unwrap();

    manager
        .apply_limits(LimitValue::Max, LimitValue::limited(1 << 30).unwrap())
        .unwrap();

    assert_eq!(manager.pids_limit().unwrap(), LimitValue::Max);
    assert_eq!(
        manager.memory_limit().unwrap(),
        LimitValue::limited(1 << 30).unwrap()
    );

    // This test process joined the node; destroy must report busy first
    assert!(matches!(manager.destroy(), Err(Error::CgroupBusy { .. })));

    manager.evacuate_and_destroy().unwrap();
    assert!(!manager.path().exists());

    // Crash-recovery sweep: a memberless orphan node is removed on the
    // first pass and the second pass is a no-op
    let orphan = group_path(&ContainerId::generate());
    backend
        .create_group(&orphan, Controller::DEFAULT_SET)
        .unwrap();

    let removed = purge_all(backend.as_ref()).unwrap();
    assert!(removed >= 1);
    assert!(!orphan.exists());

    let again = purge_all(backend.as_ref()).unwrap();
    assert_eq!(again, 0);

    // Kernel enforcement: with pids.max = 1 and this process joined, a
    // fork must fail. Enforcement happens at fork time, so joining with
    // existing tasks above the limit still succeeds.
    let strict = CgroupManager::new(ContainerId::generate(), backend.clone());
    strict.create().unwrap();
    strict
        .apply_limits(LimitValue::limited(1).unwrap(), LimitValue::Max)
        .unwrap();

    let spawn_attempt = std::process::Command::new("/bin/true").spawn();
    assert!(spawn_attempt.is_err());

    strict.evacuate_and_destroy().unwrap();
    assert!(!strict.path().exists());
}
