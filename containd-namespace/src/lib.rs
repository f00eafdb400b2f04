//! Namespace isolation, process spawning, and jail setup
//!
//! This crate provides the process-isolation engine of containd:
//! - [`NamespaceSet`] - which isolation domains a spawned process enters
//! - [`ProcessStack`] - caller-managed stack memory for `clone(2)`
//! - [`Kernel`] - injected capability interface over the native kernel-call
//!   surface (spawn, mount, unmount, change-root, environment, exec), with a
//!   host implementation and a mock for privilege-free tests
//! - [`Jail`] - change-of-root, pseudo-filesystem mounts, and environment
//!   sanitization inside an already-namespaced process

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod jail;
pub mod kernel;
pub mod set;
pub mod stack;

pub use jail::{Jail, PseudoFs, PSEUDO_FILESYSTEMS};
pub use kernel::{EntryPoint, HostKernel, Kernel, KernelEvent, MockKernel};
pub use set::NamespaceSet;
pub use stack::ProcessStack;
