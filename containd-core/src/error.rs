//! Error types for containd

use std::path::PathBuf;
use thiserror::Error;

/// Containd error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller does not hold the privileged identity
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Missing or invalid rootfs path, malformed limit value, bad stack size
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// CGroup create/limit-write/destroy failure
    #[error("CGroup error: {message}")]
    Cgroup {
        /// Error message
        message: String,
    },

    /// CGroup node still has member processes; evacuate and retry
    #[error("CGroup busy, members remain: {path}")]
    CgroupBusy {
        /// Path of the busy node
        path: PathBuf,
    },

    /// Process-creation failure: invalid flag combination, resource exhaustion
    #[error("Namespace spawn error: {message}")]
    NamespaceSpawn {
        /// Error message
        message: String,
    },

    /// Root-change or mount failure inside the jailing process
    #[error("Jail setup error: {message}")]
    JailSetup {
        /// Error message
        message: String,
    },

    /// Target command missing or not executable
    #[error("Exec failed for {command}: {message}")]
    Exec {
        /// Command that could not replace the process image
        command: String,
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

impl Error {
    /// True for the cleanup-phase failure class that is retryable and must
    /// never be promoted over a run's own result.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CgroupBusy { .. })
    }
}

/// Result type alias for containd operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_retryable() {
        let err = Error::CgroupBusy {
            path: PathBuf::from("/sys/fs/cgroup/containd/abc"),
        };
        assert!(err.is_retryable());

        let err = Error::Cgroup {
            message: "boom".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_display_names_operation() {
        let err = Error::PermissionDenied {
            operation: "create cgroup".to_string(),
        };
        assert_eq!(err.to_string(), "Permission denied: create cgroup");
    }
}
