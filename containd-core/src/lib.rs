//! Containd Core - Foundation types for the containd runtime
//!
//! This crate provides the identity, limit, and configuration types shared
//! by the cgroup, namespace, and runtime crates, plus the error taxonomy.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod limits;
pub mod types;

pub use config::{ContainerConfig, ContainerConfigUpdate};
pub use error::{Error, Result};
pub use limits::LimitValue;
pub use types::{ContainerId, ProcessId};
