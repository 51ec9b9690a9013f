use std::io;
use std::sync::Arc;

use crate::rdma::mr::{MemoryDomain, RegisteredMem, Sge};

/// Fixed-size buffer pool carved out of one registered memory area.
///
/// Buffers are identified by their index. Getting and putting buffers never
/// allocates.
pub(crate) struct SegPool {
    mem: RegisteredMem,
    seg_size: usize,
    free: Vec<u32>,
}

impl SegPool {
    /// Allocate and register `count` buffers of `seg_size` bytes each.
    pub fn new(domain: Arc<dyn MemoryDomain>, count: usize, seg_size: usize) -> io::Result<Self> {
        let mem = RegisteredMem::new(domain, count * seg_size)?;
        // Reverse so that buffers are handed out in address order.
        let free = (0..count as u32).rev().collect();
        Ok(Self {
            mem,
            seg_size,
            free,
        })
    }

    /// Take a free buffer, or `None` if the pool is exhausted.
    #[inline]
    pub fn get(&mut self) -> Option<u32> {
        self.free.pop()
    }

    /// Return a buffer to the pool.
    #[inline]
    pub fn put(&mut self, idx: u32) {
        debug_assert!((idx as usize) < self.capacity());
        debug_assert!(!self.free.contains(&idx), "buffer {} returned twice", idx);
        self.free.push(idx);
    }

    /// Number of buffers currently free.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Total number of buffers.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mem.len() / self.seg_size
    }

    /// Size of every buffer.
    #[inline]
    pub fn seg_size(&self) -> usize {
        self.seg_size
    }

    #[inline]
    fn range(&self, idx: u32, off: usize, len: usize) -> std::ops::Range<usize> {
        let start = idx as usize * self.seg_size + off;
        debug_assert!(off + len <= self.seg_size);
        start..start + len
    }

    /// Borrow `len` bytes at `off` of buffer `idx`.
    #[inline]
    pub fn bytes(&self, idx: u32, off: usize, len: usize) -> &[u8] {
        let r = self.range(idx, off, len);
        self.mem.get(r).unwrap_or_default()
    }

    /// Mutably borrow the whole buffer `idx`.
    #[inline]
    pub fn bytes_mut(&mut self, idx: u32) -> &mut [u8] {
        let r = self.range(idx, 0, self.seg_size);
        self.mem.get_mut(r).unwrap_or_default()
    }

    /// Scatter/gather element referencing `len` bytes at `off` of buffer `idx`.
    #[inline]
    pub fn sge(&self, idx: u32, off: usize, len: usize) -> Sge {
        let r = self.range(idx, off, len);
        // SAFETY: `idx` was handed out by this pool, so the range is in bounds.
        Sge::new(unsafe { self.mem.addr().add(r.start) }, len, self.mem.lkey())
    }
}
