//! Direct cgroup v2 filesystem backend

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use containd_core::{Error, ProcessId, Result};
use containd_security::require_root;

use crate::backend::{CgroupBackend, Controller};

/// Production backend writing the cgroup v2 unified hierarchy directly.
///
/// Preferred over [`ToolBackend`](crate::ToolBackend): no external binaries,
/// and control values land exactly as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackend;

impl FsBackend {
    /// Create a new filesystem backend
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Enable the needed controllers in a parent's `cgroup.subtree_control`.
    ///
    /// Best effort: permission denial usually means the controllers are
    /// managed at a higher level, which is fine.
    fn enable_controllers(parent: &Path, controllers: &[Controller]) -> Result<()> {
        let control_file = parent.join("cgroup.subtree_control");

        if !control_file.exists() {
            debug!(
                "No subtree control at {}, skipping controller setup",
                parent.display()
            );
            return Ok(());
        }

        let current = fs::read_to_string(&control_file).unwrap_or_default();

        let missing: Vec<&str> = controllers
            .iter()
            .map(|c| c.as_str())
            .filter(|name| !current.contains(name))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        let to_enable: String = missing
            .iter()
            .map(|c| format!("+{c}"))
            .collect::<Vec<_>>()
            .join(" ");

        debug!("Enabling controllers in {}: {}", parent.display(), to_enable);

        match fs::write(&control_file, &to_enable) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!(
                    "Could not enable controllers in {} (managed at a higher level): {}",
                    parent.display(),
                    e
                );
                Ok(())
            }
            Err(e) => Err(Error::Cgroup {
                message: format!("Enable controllers in {}: {}", parent.display(), e),
            }),
        }
    }
}

impl CgroupBackend for FsBackend {
    fn create_group(&self, path: &Path, controllers: &[Controller]) -> Result<()> {
        require_root("create cgroup")?;

        let parent = path.parent().ok_or_else(|| Error::InvalidConfig {
            message: format!("Invalid cgroup path: {}", path.display()),
        })?;

        if !parent.exists() {
            debug!("Creating parent directory: {}", parent.display());
            fs::create_dir_all(parent).map_err(|e| Error::Cgroup {
                message: format!("Failed to create cgroup parent {}: {}", parent.display(), e),
            })?;
        }

        Self::enable_controllers(parent, controllers)?;

        // Idempotent: an orphaned node from a previous crash is reused
        if !path.exists() {
            debug!("Creating cgroup directory: {}", path.display());
            fs::create_dir(path).map_err(|e| Error::Cgroup {
                message: format!("Failed to create cgroup directory: {e}"),
            })?;
        }

        Ok(())
    }

    fn write_control(&self, path: &Path, file: &str, value: &str) -> Result<()> {
        require_root("write cgroup control file")?;

        let control = path.join(file);
        debug!(file = %control.display(), value, "Writing control file");

        fs::write(&control, value).map_err(|e| Error::Cgroup {
            message: format!("Failed to write {} = {value:?}: {e}", control.display()),
        })
    }

    fn read_control(&self, path: &Path, file: &str) -> Result<String> {
        let control = path.join(file);

        fs::read_to_string(&control)
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::Cgroup {
                message: format!("Failed to read {}: {}", control.display(), e),
            })
    }

    fn member_pids(&self, path: &Path) -> Result<Vec<ProcessId>> {
        let raw = self.read_control(path, crate::PROCS_FILE)?;

        Ok(raw
            .lines()
            .filter_map(|line| line.trim().parse::<i32>().ok())
            .map(ProcessId::from_raw)
            .collect())
    }

    fn remove_group(&self, path: &Path) -> Result<()> {
        require_root("remove cgroup")?;

        if !path.exists() {
            return Ok(());
        }

        // rmdir on a populated node fails with EBUSY; report it as the
        // retryable class so cleanup never promotes it to a run failure
        match fs::remove_dir(path) {
            Ok(()) => {
                debug!("Removed cgroup: {}", path.display());
                Ok(())
            }
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => Err(Error::CgroupBusy {
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cgroup {
                message: format!("Failed to remove cgroup {}: {}", path.display(), e),
            }),
        }
    }

    fn list_groups(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Cgroup {
                    message: format!("Failed to enumerate {}: {}", root.display(), e),
                });
            }
        };

        let mut groups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Error::Io)?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                groups.push(entry.path());
            } else {
                warn!(
                    "Unexpected non-directory under cgroup root: {}",
                    entry.path().display()
                );
            }
        }

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_blocks_unprivileged_create() {
        if containd_security::is_privileged() {
            return; // covered by the root-gated integration tests
        }

        let backend = FsBackend::new();
        let path = PathBuf::from(crate::CGROUP_ROOT)
            .join(crate::RUNTIME_GROUP)
            .join("unprivileged-test");

        let result = backend.create_group(&path, Controller::DEFAULT_SET);
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        // No partial state left behind
        assert!(!path.exists());
    }

    #[test]
    fn test_list_groups_missing_root_is_empty() {
        let backend = FsBackend::new();
        let groups = backend
            .list_groups(Path::new("/nonexistent/cgroup/root"))
            .unwrap();
        assert!(groups.is_empty());
    }
}
