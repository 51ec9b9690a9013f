use std::ops::Range;
use std::ptr::NonNull;
use std::sync::Arc;
use std::{fmt, io, slice};

use super::{MemoryDomain, Sge};
use crate::rdma::type_alias::*;

/// A wrapper around an owned memory area that is registered to a memory
/// domain. The memory area is allocated on the heap with `Box<[u8]>` and will
/// be deregistered and deallocated when this structure is dropped.
///
/// The device may write into the area at any time while it is registered, so
/// this type never hands out long-lived references. Accessors produce short
/// borrows from the raw allocation instead.
pub struct RegisteredMem {
    domain: Arc<dyn MemoryDomain>,
    buf: NonNull<u8>,
    len: usize,
    lkey: LKey,
}

// SAFETY: the allocation is uniquely owned, and every access goes through
// `&self` / `&mut self`.
unsafe impl Send for RegisteredMem {}
unsafe impl Sync for RegisteredMem {}

impl RegisteredMem {
    /// Allocate zeroed memory with the given length and register it.
    pub fn new(domain: Arc<dyn MemoryDomain>, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot register an empty memory area",
            ));
        }

        // This should use the global allocator
        let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
        // SAFETY: `Box::into_raw` never returns null.
        let buf = unsafe { NonNull::new_unchecked(raw as *mut u8) };
        match domain.register(buf.as_ptr(), len) {
            Ok(lkey) => Ok(Self {
                domain,
                buf,
                len,
                lkey,
            }),
            Err(e) => {
                // SAFETY: reconstructs the box leaked above, exactly once.
                drop(unsafe { Box::from_raw(raw) });
                Err(e)
            }
        }
    }

    /// Get the address of the allocated memory.
    #[inline]
    pub fn addr(&self) -> *mut u8 {
        self.buf.as_ptr()
    }

    /// Get the length of the allocated memory.
    #[allow(clippy::len_without_is_empty)]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Get the local key of the registration.
    #[inline]
    pub fn lkey(&self) -> LKey {
        self.lkey
    }

    /// Get a scatter/gather element that references the specified range.
    /// Return `None` if the range is out of bounds.
    #[inline]
    pub fn sge(&self, r: Range<usize>) -> Option<Sge> {
        if r.start > r.end || r.end > self.len {
            return None;
        }
        // SAFETY: in bounds of the allocation.
        let addr = unsafe { self.buf.as_ptr().add(r.start) };
        Some(Sge::new(addr, r.end - r.start, self.lkey))
    }

    /// Borrow the specified range. Return `None` if the range is out of bounds.
    #[inline]
    pub fn get(&self, r: Range<usize>) -> Option<&[u8]> {
        if r.start > r.end || r.end > self.len {
            return None;
        }
        // SAFETY: in bounds of the allocation, which lives as long as `self`.
        Some(unsafe { slice::from_raw_parts(self.buf.as_ptr().add(r.start), r.end - r.start) })
    }

    /// Mutably borrow the specified range. Return `None` if the range is out
    /// of bounds.
    #[inline]
    pub fn get_mut(&mut self, r: Range<usize>) -> Option<&mut [u8]> {
        if r.start > r.end || r.end > self.len {
            return None;
        }
        // SAFETY: in bounds of the allocation, and `&mut self` is exclusive.
        Some(unsafe {
            slice::from_raw_parts_mut(self.buf.as_ptr().add(r.start), r.end - r.start)
        })
    }
}

impl fmt::Debug for RegisteredMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMem")
            .field("addr", &self.buf)
            .field("len", &self.len)
            .field("lkey", &self.lkey)
            .finish()
    }
}

impl Drop for RegisteredMem {
    fn drop(&mut self) {
        if let Err(e) = self.domain.deregister(self.lkey) {
            log::warn!("rrud: cannot deregister memory (lkey {:#x}): {}", self.lkey, e);
        }
        // SAFETY: the box was leaked in `new` with the same length.
        drop(unsafe {
            Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.buf.as_ptr(),
                self.len,
            ))
        });
    }
}
