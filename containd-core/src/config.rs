//! Container configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, LimitValue, Result};

/// Default stack size for the outer (jailing) process
pub const DEFAULT_OUTER_STACK_SIZE: usize = 64 * 1024;

/// Default stack size for the inner (exec) process
pub const DEFAULT_INNER_STACK_SIZE: usize = 16 * 1024;

/// Resource and path settings for one container.
///
/// Immutable once a run starts; between runs, fields are overwritten only
/// through an explicit [`ContainerConfigUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Directory used as the guest root
    pub rootfs: PathBuf,

    /// Maximum number of processes in the container, or `max`
    pub pids_limit: LimitValue,

    /// Maximum memory in bytes, or `max`
    pub memory_limit: LimitValue,

    /// Stack size in bytes for the outer jailing process
    pub outer_stack_size: usize,

    /// Stack size in bytes for the inner exec process
    pub inner_stack_size: usize,
}

impl ContainerConfig {
    /// Create a configuration with default stack sizes and unlimited resources
    #[must_use]
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
            pids_limit: LimitValue::Max,
            memory_limit: LimitValue::Max,
            outer_stack_size: DEFAULT_OUTER_STACK_SIZE,
            inner_stack_size: DEFAULT_INNER_STACK_SIZE,
        }
    }

    /// Set the pids limit
    #[must_use]
    pub const fn with_pids_limit(mut self, limit: LimitValue) -> Self {
        self.pids_limit = limit;
        self
    }

    /// Set the memory limit in bytes
    #[must_use]
    pub const fn with_memory_limit(mut self, limit: LimitValue) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the outer stack size in bytes
    #[must_use]
    pub const fn with_outer_stack_size(mut self, size: usize) -> Self {
        self.outer_stack_size = size;
        self
    }

    /// Set the inner stack size in bytes
    #[must_use]
    pub const fn with_inner_stack_size(mut self, size: usize) -> Self {
        self.inner_stack_size = size;
        self
    }

    /// Validate the configuration ahead of a run.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the rootfs is not an existing
    /// directory or a stack size is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.rootfs.is_dir() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "rootfs path is not an existing directory: {}",
                    self.rootfs.display()
                ),
            });
        }

        if self.outer_stack_size == 0 || self.inner_stack_size == 0 {
            return Err(Error::InvalidConfig {
                message: "Stack sizes must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Apply an update, overwriting only the fields it supplies.
    pub fn apply(&mut self, update: ContainerConfigUpdate) {
        if let Some(rootfs) = update.rootfs {
            self.rootfs = rootfs;
        }
        if let Some(pids_limit) = update.pids_limit {
            self.pids_limit = pids_limit;
        }
        if let Some(memory_limit) = update.memory_limit {
            self.memory_limit = memory_limit;
        }
        if let Some(size) = update.outer_stack_size {
            self.outer_stack_size = size;
        }
        if let Some(size) = update.inner_stack_size {
            self.inner_stack_size = size;
        }
    }

    /// The guest root as a path
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }
}

/// Partial configuration for reconfiguring a container between runs.
///
/// `None` fields leave the current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfigUpdate {
    /// New guest root directory
    pub rootfs: Option<PathBuf>,
    /// New pids limit
    pub pids_limit: Option<LimitValue>,
    /// New memory limit
    pub memory_limit: Option<LimitValue>,
    /// New outer stack size
    pub outer_stack_size: Option<usize>,
    /// New inner stack size
    pub inner_stack_size: Option<usize>,
}
