//! CGroup v2 resource management with pluggable backends
//!
//! This crate provides a trait-based abstraction over CGroup v2 for container
//! resource management. Direct filesystem manipulation is the preferred
//! backend; delegation to the `cgcreate`/`cgdelete` tools is available as a
//! fallback, and a mock backend simulates the cgroup tree for tests that
//! cannot run privileged.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod fs;
pub mod manager;
pub mod tool;

pub use backend::{CgroupBackend, Controller, MockBackend};
pub use fs::FsBackend;
pub use manager::{group_path, purge_all, CgroupManager};
pub use tool::ToolBackend;

// Re-export commonly used types
pub use containd_core::{ContainerId, LimitValue, ProcessId};

/// Mount point of the cgroup v2 unified hierarchy
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Subdirectory under the cgroup root holding every containd node
pub const RUNTIME_GROUP: &str = "containd";

/// Process-membership control file (write a pid to join the group)
pub const PROCS_FILE: &str = "cgroup.procs";

/// Process-count limit control file
pub const PIDS_MAX_FILE: &str = "pids.max";

/// Memory limit control file
pub const MEMORY_MAX_FILE: &str = "memory.max";
