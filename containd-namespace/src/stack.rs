//! Caller-managed stack memory for spawned processes

use containd_core::{Error, Result};

/// An owned, fixed-size buffer serving as a new process's execution stack.
///
/// `clone(2)` does not duplicate the caller's stack copy-on-write the way
/// `fork(2)` does; the caller supplies the region, and the primitive derives
/// the downward-growing stack top from it. The region must outlive the
/// spawned child, which [`Kernel::spawn`](crate::Kernel::spawn) guarantees by
/// borrowing the stack mutably for the full duration of its blocking wait.
#[derive(Debug)]
pub struct ProcessStack {
    buf: Box<[u8]>,
}

impl ProcessStack {
    /// Reserve a stack region of `size` bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for a zero size.
    pub fn with_size(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig {
                message: "Stack size must be non-zero".to_string(),
            });
        }

        Ok(Self {
            buf: vec![0u8; size].into_boxed_slice(),
        })
    }

    /// Size of the region in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        self.buf.len()
    }

    /// The whole region, handed to the spawn primitive
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
