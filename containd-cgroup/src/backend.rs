//! Resource backend trait for pluggable implementations

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use containd_core::{Error, ProcessId, Result};

/// A cgroup v2 controller managed for a container node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    /// Memory usage accounting and limits
    Memory,
    /// Process count limits
    Pids,
}

impl Controller {
    /// Name as it appears in `cgroup.subtree_control`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Pids => "pids",
        }
    }

    /// The controller set every container node manages
    pub const DEFAULT_SET: &'static [Self] = &[Self::Memory, Self::Pids];
}

/// Trait for cgroup management backends
///
/// This allows for different implementations:
/// - [`FsBackend`](crate::FsBackend) - Direct cgroup v2 filesystem writes (preferred)
/// - [`ToolBackend`](crate::ToolBackend) - Delegation to `cgcreate`/`cgdelete`
/// - [`MockBackend`] - In-memory tree for testing without privilege
///
/// # Thread Safety
/// All implementations must be `Send + Sync`; distinct containers may run
/// concurrently against the same backend.
pub trait CgroupBackend: Send + Sync {
    /// Create the resource-group node at `path` for the given controllers.
    ///
    /// Must be idempotent: orphaned nodes can persist across crashes, and a
    /// second create of the same path is not an error.
    fn create_group(&self, path: &Path, controllers: &[Controller]) -> Result<()>;

    /// Write `value` verbatim into the control file `file` under `path`
    fn write_control(&self, path: &Path, file: &str, value: &str) -> Result<()>;

    /// Read back the contents of the control file `file` under `path`
    fn read_control(&self, path: &Path, file: &str) -> Result<String>;

    /// Pids currently belonging to the node at `path`
    fn member_pids(&self, path: &Path) -> Result<Vec<ProcessId>>;

    /// Remove the node at `path`.
    ///
    /// Fails with [`Error::CgroupBusy`] while member processes remain; the
    /// caller must evacuate (or wait for members to exit) before retrying.
    /// Removing a node that no longer exists is a no-op.
    fn remove_group(&self, path: &Path) -> Result<()>;

    /// Enumerate container nodes directly under `root`
    fn list_groups(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Mock backend for testing (doesn't touch the cgroup filesystem)
///
/// Keeps an in-memory tree of groups, control values, and process
/// membership, so limit application, evacuation, and purge behaviour can be
/// exercised without root.
///
/// # Example
/// ```
/// use std::path::Path;
/// use containd_cgroup::{CgroupBackend, Controller, MockBackend};
///
/// let backend = MockBackend::new();
/// let path = Path::new("/sys/fs/cgroup/containd/demo");
///
/// backend.create_group(path, Controller::DEFAULT_SET).unwrap();
/// backend.write_control(path, "pids.max", "8").unwrap();
/// assert_eq!(backend.read_control(path, "pids.max").unwrap(), "8");
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Control values per group
    groups: BTreeMap<PathBuf, HashMap<String, String>>,
    /// Which group each known pid currently belongs to
    membership: HashMap<i32, PathBuf>,
    /// Ordered log of control writes as (path, file, value)
    write_log: Vec<(PathBuf, String, String)>,
    /// Paths whose removal should fail regardless of membership
    poisoned_removals: Vec<PathBuf>,
    /// Simulate a caller without the privileged identity
    deny_privileged: bool,
}

impl MockBackend {
    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a group exists in the mock tree
    #[must_use]
    pub fn has_group(&self, path: &Path) -> bool {
        self.state.lock().unwrap().groups.contains_key(path)
    }

    /// Number of groups currently in the mock tree
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    /// Place a pid into a group without going through `write_control`
    /// (simulates a pre-existing member, e.g. crash leftovers)
    pub fn seed_member(&self, path: &Path, pid: ProcessId) {
        let mut state = self.state.lock().unwrap();
        state.membership.insert(pid.as_raw(), path.to_path_buf());
    }

    /// Simulate a pid exiting
    pub fn drop_member(&self, pid: ProcessId) {
        let mut state = self.state.lock().unwrap();
        state.membership.remove(&pid.as_raw());
    }

    /// Make removal of `path` fail with a generic cgroup error
    pub fn poison_removal(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        state.poisoned_removals.push(path.to_path_buf());
    }

    /// Simulate losing the privileged identity: every mutating operation
    /// fails the way the host backends' guards do
    pub fn deny_privileged(&self) {
        let mut state = self.state.lock().unwrap();
        state.deny_privileged = true;
    }

    /// Ordered log of `(path, file, value)` control writes (for testing)
    #[must_use]
    pub fn write_log(&self) -> Vec<(PathBuf, String, String)> {
        self.state.lock().unwrap().write_log.clone()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl CgroupBackend for MockBackend {
    fn create_group(&self, path: &Path, _controllers: &[Controller]) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.deny_privileged {
            return Err(Error::PermissionDenied {
                operation: "create cgroup".to_string(),
            });
        }

        state.groups.entry(path.to_path_buf()).or_default();

        tracing::debug!(path = %path.display(), "Mock: created group");
        Ok(())
    }

    fn write_control(&self, path: &Path, file: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.deny_privileged {
            return Err(Error::PermissionDenied {
                operation: "write cgroup control file".to_string(),
            });
        }

        if file == crate::PROCS_FILE {
            // Writing a pid into cgroup.procs moves the process there
            let pid: i32 = value.trim().parse().map_err(|_| Error::Cgroup {
                message: format!("Mock: invalid pid written to {}: {value:?}", crate::PROCS_FILE),
            })?;
            state.membership.insert(pid, path.to_path_buf());
        } else {
            let group = state
                .groups
                .get_mut(path)
                .ok_or_else(|| Error::Cgroup {
                    message: format!("Mock: no such group: {}", path.display()),
                })?;
            group.insert(file.to_string(), value.to_string());
        }

        state
            .write_log
            .push((path.to_path_buf(), file.to_string(), value.to_string()));

        tracing::debug!(path = %path.display(), file, value, "Mock: wrote control");
        Ok(())
    }

    fn read_control(&self, path: &Path, file: &str) -> Result<String> {
        let state = self.state.lock().unwrap();

        if file == crate::PROCS_FILE {
            let pids: Vec<String> = state
                .membership
                .iter()
                .filter(|(_, group)| group.as_path() == path)
                .map(|(pid, _)| pid.to_string())
                .collect();
            return Ok(pids.join("\n"));
        }

        let group = state.groups.get(path).ok_or_else(|| Error::Cgroup {
            message: format!("Mock: no such group: {}", path.display()),
        })?;

        group
            .get(file)
            .cloned()
            .ok_or_else(|| Error::Cgroup {
                message: format!("Mock: control file not set: {file}"),
            })
    }

    fn member_pids(&self, path: &Path) -> Result<Vec<ProcessId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .membership
            .iter()
            .filter(|(_, group)| group.as_path() == path)
            .map(|(pid, _)| ProcessId::from_raw(*pid))
            .collect())
    }

    fn remove_group(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.deny_privileged {
            return Err(Error::PermissionDenied {
                operation: "remove cgroup".to_string(),
            });
        }

        if state.poisoned_removals.iter().any(|p| p == path) {
            return Err(Error::Cgroup {
                message: format!("Mock: removal poisoned: {}", path.display()),
            });
        }

        let has_members = state
            .membership
            .values()
            .any(|group| group.as_path() == path);
        if has_members {
            return Err(Error::CgroupBusy {
                path: path.to_path_buf(),
            });
        }

        state.groups.remove(path);

        tracing::debug!(path = %path.display(), "Mock: removed group");
        Ok(())
    }

    fn list_groups(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .keys()
            .filter(|path| path.parent() == Some(root))
            .cloned()
            .collect())
    }
}
