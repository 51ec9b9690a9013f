//! Receive queue: buffer posting in batches, lazy replenishment, and
//! harvesting of filled buffers by completion index.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::{fmt, io};

use super::error::UdError;
use super::pool::SegPool;
use crate::rdma::cq::Wc;
use crate::rdma::mr::MemoryDomain;
use crate::rdma::qp::{recv_err_explanation, UdQueuePair, GRH_SIZE};
use crate::rdma::wqe::RecvWqe;

static NEXT_RXQ_ID: AtomicU32 = AtomicU32::new(1);

/// Handle of a received buffer.
///
/// The handle is not `Clone`: whoever owns it owns the buffer. Give it back
/// to the receive dispatcher with [`RxDisposition::Recycle`], or, after
/// holding it, with [`Interface::release_recv`](crate::Interface::release_recv).
#[derive(Debug, PartialEq, Eq)]
pub struct RecvDesc {
    rxq: u32,
    buf: u32,
    len: u32,
}

impl RecvDesc {
    /// Length of the packet in the buffer, routing header area excluded.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Return `true` if the packet is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// What the receive dispatcher did with a packet.
#[derive(Debug)]
pub enum RxDisposition {
    /// The packet has been consumed; the buffer can be reused immediately.
    Recycle(RecvDesc),

    /// The dispatcher keeps the buffer until it releases it.
    Held,
}

/// Receive queue.
///
/// A slot is owned by the device while it holds a buffer; harvesting a
/// completion takes the buffer out of the slot the completion names.
pub(crate) struct RxQueue {
    id: u32,
    slots: Box<[Option<u32>]>,
    mask: u64,
    post_cursor: u64,
    completion_cursor: u64,
    posted: u32,
    max_batch: u32,
    pool: SegPool,
    batch: Vec<RecvWqe>,
    batch_bufs: Vec<u32>,
}

impl fmt::Debug for RxQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxQueue")
            .field("post_cursor", &self.post_cursor)
            .field("completion_cursor", &self.completion_cursor)
            .field("posted", &self.posted)
            .field("free_bufs", &self.free_bufs())
            .finish()
    }
}

impl RxQueue {
    pub fn new(
        domain: Arc<dyn MemoryDomain>,
        capacity: u32,
        max_batch: u32,
        nbufs: usize,
        seg_size: usize,
    ) -> io::Result<Self> {
        debug_assert!(capacity.is_power_of_two());
        Ok(Self {
            id: NEXT_RXQ_ID.fetch_add(1, Ordering::Relaxed),
            slots: vec![None; capacity as usize].into_boxed_slice(),
            mask: capacity as u64 - 1,
            post_cursor: 0,
            completion_cursor: 0,
            posted: 0,
            max_batch,
            pool: SegPool::new(domain, nbufs, seg_size)?,
            batch: Vec::with_capacity(max_batch as usize),
            batch_bufs: Vec::with_capacity(max_batch as usize),
        })
    }

    /// Number of buffers owned by the device.
    #[inline]
    pub fn posted(&self) -> u32 {
        self.posted
    }

    /// Capacity in buffers.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of buffers neither posted nor held.
    #[inline]
    pub fn free_bufs(&self) -> usize {
        self.pool.available()
    }

    /// Post up to one batch of buffers, never more than the free slots, with
    /// one doorbell. Stop early if the buffer pool runs dry.
    ///
    /// Return the number of buffers posted.
    pub fn post_batch(&mut self, qp: &mut dyn UdQueuePair) -> Result<u32, UdError> {
        let room = self.capacity() - self.posted;
        let want = room.min(self.max_batch) as u64;

        self.batch.clear();
        self.batch_bufs.clear();
        for i in 0..want {
            let slot = ((self.post_cursor + i) & self.mask) as usize;
            if self.slots[slot].is_some() {
                break;
            }
            let Some(buf) = self.pool.get() else {
                break;
            };
            self.batch_bufs.push(buf);
            self.batch.push(RecvWqe {
                sge: self.pool.sge(buf, 0, self.pool.seg_size()),
            });
        }

        let count = self.batch_bufs.len();
        if count == 0 {
            if want > 0 {
                log::debug!(
                    "rrud: failed to post receive buffers ({} free slots, pool exhausted)",
                    room
                );
            }
            return Ok(0);
        }

        if let Err(e) = qp.post_recv(&self.batch) {
            for &buf in &self.batch_bufs {
                self.pool.put(buf);
            }
            match recv_err_explanation(&e) {
                Some(msg) => log::error!("rrud: failed to post {} receives: {}", count, msg),
                None => log::error!("rrud: failed to post {} receives: {}", count, e),
            }
            return Err(UdError::Io(e));
        }

        for (i, &buf) in self.batch_bufs.iter().enumerate() {
            let slot = ((self.post_cursor + i as u64) & self.mask) as usize;
            self.slots[slot] = Some(buf);
        }
        self.post_cursor += count as u64;
        self.posted += count as u32;
        Ok(count as u32)
    }

    /// Post a batch if fewer than `threshold` buffers are posted.
    #[inline]
    pub fn replenish(&mut self, qp: &mut dyn UdQueuePair, threshold: u32) -> Result<u32, UdError> {
        if self.posted < threshold {
            self.post_batch(qp)
        } else {
            Ok(0)
        }
    }

    /// Take the buffer that `wc` reports filled out of its slot.
    pub fn harvest(&mut self, wc: &Wc) -> Option<u32> {
        let slot = (wc.wqe_counter() as u64 & self.mask) as usize;
        let Some(buf) = self.slots[slot].take() else {
            log::error!(
                "rrud: receive completion for empty slot {} (index {:#x})",
                slot,
                wc.wqe_counter()
            );
            return None;
        };
        self.posted -= 1;
        self.completion_cursor += 1;
        debug_assert!(self.completion_cursor <= self.post_cursor);
        Some(buf)
    }

    /// Wrap a harvested buffer holding a packet of `len` bytes after the
    /// routing header area.
    #[inline]
    pub fn desc(&self, buf: u32, len: usize) -> RecvDesc {
        RecvDesc {
            rxq: self.id,
            buf,
            len: len as u32,
        }
    }

    /// Borrow the packet a descriptor refers to.
    #[inline]
    pub fn packet(&self, desc: &RecvDesc) -> &[u8] {
        self.pool.bytes(desc.buf, GRH_SIZE, desc.len())
    }

    /// Borrow the routing header area of a harvested buffer.
    #[inline]
    pub fn grh(&self, buf: u32) -> &[u8] {
        self.pool.bytes(buf, 0, GRH_SIZE)
    }

    /// Return a harvested buffer to the pool.
    #[inline]
    pub fn recycle(&mut self, buf: u32) {
        self.pool.put(buf);
    }

    /// Return `true` if `desc` was handed out by this queue.
    #[inline]
    pub fn owns(&self, desc: &RecvDesc) -> bool {
        desc.rxq == self.id
    }

    /// Return a descriptor's buffer to the pool.
    pub fn release(&mut self, desc: RecvDesc) -> Result<(), UdError> {
        if !self.owns(&desc) {
            return Err(UdError::InvalidParam(
                "receive descriptor belongs to another interface".into(),
            ));
        }
        self.pool.put(desc.buf);
        Ok(())
    }
}
