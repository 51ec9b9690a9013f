//! Transmit queue: credit accounting, send work queue entry construction,
//! and ordered retirement of completed sends.

use std::collections::VecDeque;
use std::sync::Arc;
use std::{fmt, io};

use super::error::UdError;
use super::pool::SegPool;
use crate::rdma::cq::{Wc, WcStatus};
use crate::rdma::mr::{MemoryDomain, Sge};
use crate::rdma::qp::{send_err_explanation, PeerAddress, UdQueuePair, GLOBAL_QKEY};
use crate::rdma::type_alias::*;
use crate::rdma::wqe::*;

/// Local completion handle of a zero-copy send. Called exactly once with the
/// sequence number of the send and its completion status.
pub type Completion = Box<dyn FnOnce(Sn, Result<(), WcStatus>) + Send>;

/// A completion whose send has been retired but whose callback has not run.
pub(crate) struct DeferredComp {
    comp: Completion,
    sn: Sn,
    status: Result<(), WcStatus>,
}

impl DeferredComp {
    #[inline]
    pub fn fire(self) {
        (self.comp)(self.sn, self.status)
    }
}

/// A posted send that has not been retired yet.
struct InFlight {
    sn: Sn,
    num_bb: u16,
    skb: u32,
    comp: Option<Completion>,
}

/// Where the send buffer contents go in the work queue entry.
#[derive(Clone, Copy, PartialEq, Eq)]
enum SkbMode {
    /// Copied into the entry.
    Inline,
    /// Referenced by a data pointer segment.
    Pointer,
}

/// Transmit queue.
///
/// Capacity and credit are counted in building blocks. The write cursor `pi`
/// and the retire cursor `ci` never wrap; their low 16 bits are the hardware
/// entry index. Every in-flight send holds one software send buffer ("skb")
/// that keeps a copy of what was sent until the send is retired.
pub(crate) struct TxQueue {
    bb_max: u64,
    pi: u64,
    ci: u64,
    moderation: u32,
    unsignaled: u32,
    inflight: VecDeque<InFlight>,
    skbs: SegPool,
}

impl fmt::Debug for TxQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxQueue")
            .field("next_sn", &self.next_sn())
            .field("available", &self.available())
            .field("inflight", &self.inflight())
            .field("free_skbs", &self.free_skbs())
            .finish()
    }
}

/// Number of building blocks an entry with `inline_len` inline bytes and
/// `nsegs` data pointers occupies when sent to `peer`.
#[inline]
fn bbs(peer: &PeerAddress, inline_len: usize, nsegs: usize) -> usize {
    num_bb(CTRL_SEG_SIZE + peer.av_size() + inline_seg_size(inline_len) + nsegs * DATA_SEG_SIZE)
}

impl TxQueue {
    pub fn new(
        domain: Arc<dyn MemoryDomain>,
        bb_max: u32,
        moderation: u32,
        nskbs: usize,
        seg_size: usize,
    ) -> io::Result<Self> {
        Ok(Self {
            bb_max: bb_max as u64,
            pi: 0,
            ci: 0,
            moderation,
            unsignaled: 0,
            inflight: VecDeque::with_capacity(bb_max as usize),
            skbs: SegPool::new(domain, nskbs, seg_size)?,
        })
    }

    /// Number of building blocks that can still be posted.
    #[inline]
    pub fn available(&self) -> usize {
        (self.bb_max - (self.pi - self.ci)) as usize
    }

    /// Capacity in building blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bb_max as usize
    }

    /// Sequence number the next send will get.
    #[inline]
    pub fn next_sn(&self) -> Sn {
        self.pi
    }

    /// Number of posted but unretired sends.
    #[inline]
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Number of free send buffers.
    #[inline]
    pub fn free_skbs(&self) -> usize {
        self.skbs.available()
    }

    #[inline]
    fn check_credit(&self, num_bb: usize) -> Result<(), UdError> {
        if num_bb > self.available() {
            return Err(UdError::NoResource);
        }
        Ok(())
    }

    /// Post a short message: header and every slice of `parts` are copied
    /// into the work queue entry.
    pub fn post_short(
        &mut self,
        qp: &mut dyn UdQueuePair,
        peer: &PeerAddress,
        header: &[u8],
        parts: &[&[u8]],
    ) -> Result<Sn, UdError> {
        if parts.len() > MAX_INLINE_IOV {
            return Err(UdError::InvalidParam(format!(
                "{} slices exceed the inline gather limit {}",
                parts.len(),
                MAX_INLINE_IOV
            )));
        }
        let len = header.len() + parts.iter().map(|p| p.len()).sum::<usize>();
        if len > MAX_INLINE {
            return Err(UdError::InvalidParam(format!(
                "short message of {} bytes exceeds {}",
                len, MAX_INLINE
            )));
        }

        let num_bb = bbs(peer, len, 0);
        self.check_credit(num_bb)?;
        let skb = self.skbs.get().ok_or(UdError::NoResource)?;

        let buf = self.skbs.bytes_mut(skb);
        let mut off = header.len();
        buf[..off].copy_from_slice(header);
        for part in parts {
            buf[off..off + part.len()].copy_from_slice(part);
            off += part.len();
        }
        self.submit(qp, peer, skb, len, SkbMode::Inline, &[], num_bb, WqeFlags::EMPTY, None)
    }

    /// Post a buffered message: header and payload are copied into a send
    /// buffer, which the entry then carries inline if it fits or references
    /// otherwise.
    pub fn post_bcopy(
        &mut self,
        qp: &mut dyn UdQueuePair,
        peer: &PeerAddress,
        header: &[u8],
        payload: &[u8],
    ) -> Result<Sn, UdError> {
        let len = header.len() + payload.len();
        if len > self.skbs.seg_size() {
            return Err(UdError::InvalidParam(format!(
                "buffered message of {} bytes exceeds the segment size {}",
                len,
                self.skbs.seg_size()
            )));
        }

        let (mode, num_bb) = if len <= MAX_INLINE {
            (SkbMode::Inline, bbs(peer, len, 0))
        } else {
            (SkbMode::Pointer, bbs(peer, 0, 1))
        };
        self.check_credit(num_bb)?;
        let skb = self.skbs.get().ok_or(UdError::NoResource)?;

        let buf = self.skbs.bytes_mut(skb);
        buf[..header.len()].copy_from_slice(header);
        buf[header.len()..len].copy_from_slice(payload);
        self.submit(qp, peer, skb, len, mode, &[], num_bb, WqeFlags::EMPTY, None)
    }

    /// Post a buffered message whose payload is produced by `pack`, which
    /// writes into the send buffer after the header and returns the number
    /// of bytes written. Return the sequence number and the total length.
    pub fn post_bcopy_with(
        &mut self,
        qp: &mut dyn UdQueuePair,
        peer: &PeerAddress,
        header: &[u8],
        pack: &mut dyn FnMut(&mut [u8]) -> usize,
    ) -> Result<(Sn, usize), UdError> {
        let seg_size = self.skbs.seg_size();
        if header.len() > seg_size {
            return Err(UdError::InvalidParam(format!(
                "header of {} bytes exceeds the segment size {}",
                header.len(),
                seg_size
            )));
        }

        let num_bb = bbs(peer, 0, 1);
        self.check_credit(num_bb)?;
        let skb = self.skbs.get().ok_or(UdError::NoResource)?;

        let buf = self.skbs.bytes_mut(skb);
        buf[..header.len()].copy_from_slice(header);
        let packed = pack(&mut buf[header.len()..]);
        if packed > seg_size - header.len() {
            self.skbs.put(skb);
            return Err(UdError::InvalidParam(format!(
                "pack callback reported {} bytes, more than the {} available",
                packed,
                seg_size - header.len()
            )));
        }

        let len = header.len() + packed;
        let sn = self.submit(qp, peer, skb, len, SkbMode::Pointer, &[], num_bb, WqeFlags::EMPTY, None)?;
        Ok((sn, len))
    }

    /// Post a zero-copy message: the header is copied inline, and `iov`
    /// regions are referenced in place until `comp` is called.
    /// Zero-length regions are skipped.
    pub fn post_zcopy(
        &mut self,
        qp: &mut dyn UdQueuePair,
        peer: &PeerAddress,
        header: &[u8],
        iov: &[Sge],
        comp: Completion,
    ) -> Result<Sn, UdError> {
        if iov.len() > MAX_ZCOPY_IOV {
            return Err(UdError::InvalidParam(format!(
                "{} regions exceed the zero-copy limit {}",
                iov.len(),
                MAX_ZCOPY_IOV
            )));
        }
        if header.len() > MAX_ZCOPY_HEADER {
            return Err(UdError::InvalidParam(format!(
                "zero-copy header of {} bytes exceeds {}",
                header.len(),
                MAX_ZCOPY_HEADER
            )));
        }

        let mut segs = [Sge::new(std::ptr::null(), 0, 0); MAX_ZCOPY_IOV];
        let mut nsegs = 0;
        for sge in iov.iter().filter(|s| !s.is_empty()) {
            segs[nsegs] = *sge;
            nsegs += 1;
        }

        let num_bb = bbs(peer, header.len(), nsegs);
        self.check_credit(num_bb)?;
        let skb = self.skbs.get().ok_or(UdError::NoResource)?;

        self.skbs.bytes_mut(skb)[..header.len()].copy_from_slice(header);
        self.submit(
            qp,
            peer,
            skb,
            header.len(),
            SkbMode::Inline,
            &segs[..nsegs],
            num_bb,
            WqeFlags::SIGNALED,
            Some(comp),
        )
    }

    /// Post a control packet built by the layer above: inline if it fits,
    /// otherwise from a send buffer by pointer.
    pub fn post_ctl(
        &mut self,
        qp: &mut dyn UdQueuePair,
        peer: &PeerAddress,
        packet: &[u8],
        flags: WqeFlags,
    ) -> Result<Sn, UdError> {
        let len = packet.len();
        if len > self.skbs.seg_size() {
            return Err(UdError::InvalidParam(format!(
                "control packet of {} bytes exceeds the segment size {}",
                len,
                self.skbs.seg_size()
            )));
        }

        let (mode, num_bb) = if len <= MAX_INLINE {
            (SkbMode::Inline, bbs(peer, len, 0))
        } else {
            (SkbMode::Pointer, bbs(peer, 0, 1))
        };
        self.check_credit(num_bb)?;
        let skb = self.skbs.get().ok_or(UdError::NoResource)?;

        self.skbs.bytes_mut(skb)[..len].copy_from_slice(packet);
        self.submit(qp, peer, skb, len, mode, &[], num_bb, flags, None)
    }

    /// Build the work queue entry from send buffer `skb`, ring the doorbell,
    /// and account for the post. On failure the buffer is returned and no
    /// state changes.
    #[allow(clippy::too_many_arguments)]
    fn submit(
        &mut self,
        qp: &mut dyn UdQueuePair,
        peer: &PeerAddress,
        skb: u32,
        len: usize,
        mode: SkbMode,
        segs: &[Sge],
        num_bb: usize,
        mut flags: WqeFlags,
        comp: Option<Completion>,
    ) -> Result<Sn, UdError> {
        // Keep enough completions requested that a sender out of credit or
        // out of send buffers always has a completion coming. `skb` is
        // already taken, so an empty pool means this send holds the last one.
        let signaled = comp.is_some()
            || flags.contains(WqeFlags::SIGNALED)
            || self.unsignaled + 1 >= self.moderation
            || self.available() - num_bb < MAX_WQE_BBS
            || self.skbs.available() == 0;
        if signaled {
            flags |= WqeFlags::SIGNALED;
        }

        let sn = self.pi;
        let ret = {
            let payload = match mode {
                SkbMode::Inline if segs.is_empty() => Payload::Inline(self.skbs.bytes(skb, 0, len)),
                SkbMode::Inline => Payload::Gather {
                    inline: self.skbs.bytes(skb, 0, len),
                    segs,
                },
                SkbMode::Pointer => Payload::Buffered(self.skbs.sge(skb, 0, len)),
            };
            let wqe = SendWqe {
                index: sn as WqeIdx,
                flags,
                dest: peer,
                qkey: GLOBAL_QKEY,
                payload,
            };
            debug_assert_eq!(wqe.num_bb(), num_bb);
            debug_assert!(wqe.size() <= MAX_SEND_WQE_SIZE);
            qp.post_send(&wqe)
        };

        if let Err(e) = ret {
            self.skbs.put(skb);
            match send_err_explanation(&e) {
                Some(msg) => log::error!("rrud: failed to post send to {}: {}", peer, msg),
                None => log::error!("rrud: failed to post send to {}: {}", peer, e),
            }
            return Err(UdError::Io(e));
        }

        self.pi += num_bb as u64;
        self.unsignaled = if signaled { 0 } else { self.unsignaled + 1 };
        self.inflight.push_back(InFlight {
            sn,
            num_bb: num_bb as u16,
            skb,
            comp,
        });
        Ok(sn)
    }

    /// Retire every send up to and including the one `wc` completes. Sends
    /// posted before it were completed implicitly. Zero-copy completions of
    /// retired sends are handed to `sink` in submission order.
    ///
    /// Return the number of retired sends.
    pub fn complete(&mut self, wc: &Wc, sink: &mut dyn FnMut(DeferredComp)) -> usize {
        let offset = wc.wqe_counter().wrapping_sub(self.ci as WqeIdx) as u64;
        let completed = self.ci + offset;
        if completed >= self.pi {
            log::error!(
                "rrud: send completion for unposted entry {:#x} (ci {}, pi {})",
                wc.wqe_counter(),
                self.ci,
                self.pi
            );
            return 0;
        }

        let mut retired = 0;
        while self.inflight.front().is_some_and(|e| e.sn <= completed) {
            let Some(entry) = self.inflight.pop_front() else {
                break;
            };
            self.ci = entry.sn + entry.num_bb as u64;
            self.skbs.put(entry.skb);
            if let Some(comp) = entry.comp {
                let status = if entry.sn == completed {
                    wc.ok().map(|_| ())
                } else {
                    Ok(())
                };
                sink(DeferredComp {
                    comp,
                    sn: entry.sn,
                    status,
                });
            }
            retired += 1;
        }
        debug_assert!(self.available() <= self.capacity());
        retired
    }

    /// Retire every in-flight send as flushed. Used when the interface is
    /// closed with sends outstanding.
    pub fn flush(&mut self, sink: &mut dyn FnMut(DeferredComp)) -> usize {
        let mut flushed = 0;
        while let Some(entry) = self.inflight.pop_front() {
            self.skbs.put(entry.skb);
            if let Some(comp) = entry.comp {
                sink(DeferredComp {
                    comp,
                    sn: entry.sn,
                    status: Err(WcStatus::WrFlushErr),
                });
            }
            flushed += 1;
        }
        self.ci = self.pi;
        flushed
    }
}
