//! Backend delegating node lifecycle to the libcgroup tools

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use containd_core::{Error, ProcessId, Result};
use containd_security::require_root;

use crate::backend::{CgroupBackend, Controller};
use crate::fs::FsBackend;

/// Fallback backend that shells out to `cgcreate`/`cgdelete` for node
/// lifecycle, for hosts where the tools own the hierarchy layout.
///
/// Control-file reads and writes still go through the filesystem; the tools
/// only cover creation and removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolBackend {
    fs: FsBackend,
}

impl ToolBackend {
    /// Create a new tool-delegating backend
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fs: FsBackend::new(),
        }
    }

    /// The `controllers:relpath` group argument the tools expect
    fn group_arg(path: &Path, controllers: &[Controller]) -> Result<String> {
        let relpath = path
            .strip_prefix(crate::CGROUP_ROOT)
            .map_err(|_| Error::InvalidConfig {
                message: format!(
                    "Cgroup path {} is not under {}",
                    path.display(),
                    crate::CGROUP_ROOT
                ),
            })?;

        let names: Vec<&str> = controllers.iter().map(|c| c.as_str()).collect();
        Ok(format!("{}:{}", names.join(","), relpath.display()))
    }

    fn run_tool(tool: &str, args: &[&str]) -> Result<()> {
        debug!(tool, ?args, "Delegating to cgroup tool");

        let output = Command::new(tool).args(args).output().map_err(|e| Error::Cgroup {
            message: format!("Failed to run {tool}: {e}"),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Cgroup {
                message: format!(
                    "{tool} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

impl CgroupBackend for ToolBackend {
    fn create_group(&self, path: &Path, controllers: &[Controller]) -> Result<()> {
        require_root("create cgroup")?;

        // cgcreate succeeds on an existing node, so create stays idempotent
        let group = Self::group_arg(path, controllers)?;
        Self::run_tool("cgcreate", &["-t", "root", "-a", "root", "-g", &group])
    }

    fn write_control(&self, path: &Path, file: &str, value: &str) -> Result<()> {
        self.fs.write_control(path, file, value)
    }

    fn read_control(&self, path: &Path, file: &str) -> Result<String> {
        self.fs.read_control(path, file)
    }

    fn member_pids(&self, path: &Path) -> Result<Vec<ProcessId>> {
        self.fs.member_pids(path)
    }

    fn remove_group(&self, path: &Path) -> Result<()> {
        require_root("remove cgroup")?;

        if !path.exists() {
            return Ok(());
        }

        // cgdelete reports live members as a generic failure; check first so
        // busy nodes surface as the retryable class
        if !self.fs.member_pids(path)?.is_empty() {
            return Err(Error::CgroupBusy {
                path: path.to_path_buf(),
            });
        }

        let group = Self::group_arg(path, Controller::DEFAULT_SET)?;
        Self::run_tool("cgdelete", &["-g", &group])
    }

    fn list_groups(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.fs.list_groups(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_arg_format() {
        let path = PathBuf::from(crate::CGROUP_ROOT)
            .join(crate::RUNTIME_GROUP)
            .join("abc123");

        let arg = ToolBackend::group_arg(&path, Controller::DEFAULT_SET).unwrap();
        assert_eq!(arg, "memory,pids:containd/abc123");
    }

    #[test]
    fn test_group_arg_rejects_foreign_path() {
        let result = ToolBackend::group_arg(Path::new("/tmp/evil"), Controller::DEFAULT_SET);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
