//! Memory registration.

mod registered;

use std::io;

pub use self::registered::*;
use crate::rdma::type_alias::*;

/// Scatter/gather element: a pointer, length, and local key triple that lets
/// the device access a piece of registered memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sge {
    /// Start address of the memory area.
    pub addr: u64,

    /// Length of the memory area in bytes.
    pub len: u32,

    /// Local key of the memory region containing the area.
    pub lkey: LKey,
}

impl Sge {
    /// Create a scatter/gather element.
    #[inline]
    pub fn new(addr: *const u8, len: usize, lkey: LKey) -> Self {
        Self {
            addr: addr as u64,
            len: len as u32,
            lkey,
        }
    }

    /// Return `true` if the element references no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Memory domain: the collaborator that registers memory with a device and
/// hands out local keys for it.
pub trait MemoryDomain: Send + Sync {
    /// Register `len` bytes starting at `addr`. Return the local key that
    /// work requests must carry to reference the memory.
    ///
    /// The memory must stay valid until it is deregistered.
    fn register(&self, addr: *mut u8, len: usize) -> io::Result<LKey>;

    /// Deregister the memory region identified by `lkey`.
    fn deregister(&self, lkey: LKey) -> io::Result<()>;
}
