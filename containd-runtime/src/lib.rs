//! Container orchestration for containd
//!
//! Ties the cgroup, namespace, and jail layers together: a [`Container`]
//! owns one identity and configuration, runs one command in isolation, and
//! guarantees teardown. The identifier-keyed [`ConfigStore`] collaborator
//! persists configurations between invocations without influencing the
//! isolation logic.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod container;
pub mod store;

pub use container::{CleanupPolicy, Container, ContainerState};
pub use store::{ConfigStore, JsonFileStore, MemoryStore};

// Re-export commonly used types
pub use containd_core::{ContainerConfig, ContainerConfigUpdate, ContainerId, LimitValue};
