//! Privilege guard for containd
//!
//! Every namespace-, cgroup-, or root-manipulating entry point calls
//! [`require_root`] before doing anything else, so a non-privileged caller
//! fails immediately and leaves no partial state behind.

#![warn(missing_docs, clippy::all, clippy::pedantic)]

use containd_core::{Error, Result};

/// Check whether the calling process holds the privileged identity.
#[must_use]
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Guard clause for privileged operations.
///
/// # Errors
/// Returns [`Error::PermissionDenied`] naming `operation` when the caller
/// is not root. No side effects in either case.
pub fn require_root(operation: &str) -> Result<()> {
    if is_privileged() {
        Ok(())
    } else {
        tracing::debug!(operation, "privilege check failed");
        Err(Error::PermissionDenied {
            operation: operation.to_string(),
        })
    }
}
