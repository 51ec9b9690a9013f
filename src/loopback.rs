//! In-process UD fabric.
//!
//! Queue pairs opened on one [`LoopbackFabric`] deliver datagrams to each
//! other by copying them straight into the receive buffers of the target
//! queue pair, and report completions the way a device would: receive
//! completions carry the routing header area, send completions are generated
//! only for signaled entries, and a send error moves the queue pair to the
//! error state where every later send is flushed.
//!
//! Memory must be registered with the fabric's [`MemoryDomain`] before it can
//! be sent from or received into.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::rdma::cq::{CompletionQueue, Wc, WcStatus};
use crate::rdma::gid::Gid;
use crate::rdma::mr::{MemoryDomain, Sge};
use crate::rdma::qp::{UdQueuePair, GRH_DGID_OFFSET, GRH_SIZE};
use crate::rdma::type_alias::*;
use crate::rdma::wqe::{Payload, RecvWqe, SendWqe, WqeFlags, MAX_SEND_WQE_SIZE};
use crate::ud::UdHardware;

/// Offset of the source GID inside a global routing header.
const GRH_SGID_OFFSET: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Region {
    addr: usize,
    len: usize,
}

#[derive(Debug, Default)]
struct CqState {
    entries: VecDeque<Wc>,
    armed: Option<bool>,
    events: u64,
}

impl CqState {
    fn push(&mut self, wc: Wc, solicited: bool) {
        self.entries.push_back(wc);
        if let Some(solicited_only) = self.armed {
            if !solicited_only || solicited {
                self.armed = None;
                self.events += 1;
            }
        }
    }
}

#[derive(Debug)]
struct QpState {
    lid: Lid,
    gid: Option<Gid>,
    recv: VecDeque<(WqeIdx, Sge)>,
    recv_counter: WqeIdx,
    tx_cq: CqState,
    rx_cq: CqState,
    error: bool,
    fail_next_send: Option<WcStatus>,
    fail_next_post: Option<i32>,
    corrupt_next_grh: bool,
    dropped: u64,
}

#[derive(Debug, Default)]
struct Fabric {
    next_lkey: LKey,
    next_qpn: Qpn,
    regions: HashMap<LKey, Region>,
    qps: HashMap<Qpn, QpState>,
}

impl Fabric {
    /// Check that `sge` lies in memory registered under its key.
    fn check(&self, sge: &Sge) -> Result<(), WcStatus> {
        let region = self.regions.get(&sge.lkey).ok_or(WcStatus::LocProtErr)?;
        let start = sge.addr as usize;
        let end = start + sge.len as usize;
        if start < region.addr || end > region.addr + region.len {
            return Err(WcStatus::LocProtErr);
        }
        Ok(())
    }

    /// Append the registered memory `sge` refers to.
    fn read(&self, sge: &Sge, out: &mut Vec<u8>) -> Result<(), WcStatus> {
        self.check(sge)?;
        // SAFETY: the range is inside a live registered region.
        let bytes = unsafe { std::slice::from_raw_parts(sge.addr as *const u8, sge.len as usize) };
        out.extend_from_slice(bytes);
        Ok(())
    }

    /// Gather the bytes a send work queue entry puts on the wire.
    fn gather(&self, payload: &Payload<'_>, out: &mut Vec<u8>) -> Result<(), WcStatus> {
        match payload {
            Payload::Inline(data) => out.extend_from_slice(data),
            Payload::Buffered(sge) => self.read(sge, out)?,
            Payload::Gather { inline, segs } => {
                out.extend_from_slice(inline);
                for sge in segs.iter() {
                    self.read(sge, out)?;
                }
            }
        }
        Ok(())
    }

    fn qp(&mut self, qpn: Qpn) -> io::Result<&mut QpState> {
        self.qps
            .get_mut(&qpn)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))
    }

    fn post_send(&mut self, src: Qpn, wqe: &SendWqe<'_>) -> io::Result<()> {
        let qp = self.qp(src)?;
        if let Some(errno) = qp.fail_next_post.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if wqe.size() > MAX_SEND_WQE_SIZE {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let signaled = wqe.flags.contains(WqeFlags::SIGNALED);
        let status = if qp.error {
            Err(WcStatus::WrFlushErr)
        } else if let Some(status) = qp.fail_next_send.take() {
            Err(status)
        } else {
            Ok(())
        };
        let (src_gid, corrupt) = (qp.gid, std::mem::take(&mut qp.corrupt_next_grh));

        let mut data = Vec::with_capacity(wqe.payload.byte_len());
        let status = status.and_then(|_| self.gather(&wqe.payload, &mut data));

        if let Err(status) = status {
            let qp = self.qp(src)?;
            qp.error = true;
            qp.tx_cq.push(Wc::send(wqe.index, status), false);
            return Ok(());
        }

        self.deliver(wqe, src_gid, corrupt, &data);
        if signaled {
            self.qp(src)?.tx_cq.push(Wc::send(wqe.index, WcStatus::Success), false);
        }
        Ok(())
    }

    /// Copy a datagram into the next receive buffer of its destination.
    /// Datagrams with no matching destination or no posted buffer are lost.
    fn deliver(&mut self, wqe: &SendWqe<'_>, src_gid: Option<Gid>, corrupt: bool, data: &[u8]) {
        let dest = wqe.dest;
        let Some(qp) = self.qps.get_mut(&dest.qpn()) else {
            log::trace!("rrud: loopback dropped datagram to unknown {}", dest);
            return;
        };
        let routable = match dest.grh() {
            Some(grh) => qp.gid == Some(grh.dgid) || corrupt,
            None => qp.lid == dest.lid(),
        };
        if !routable {
            qp.dropped += 1;
            return;
        }
        let Some((idx, sge)) = qp.recv.pop_front() else {
            qp.dropped += 1;
            return;
        };

        let solicited = wqe.flags.contains(WqeFlags::SOLICITED);
        if GRH_SIZE + data.len() > sge.len as usize {
            qp.rx_cq.push(Wc::recv(idx, WcStatus::LocLenErr, 0, false), solicited);
            return;
        }

        // SAFETY: the buffer was checked on posting and is owned by the
        // device until its completion is harvested.
        let buf = unsafe { std::slice::from_raw_parts_mut(sge.addr as *mut u8, sge.len as usize) };
        buf[..GRH_SIZE].fill(0);
        if let Some(grh) = dest.grh() {
            let mut dgid = *grh.dgid.as_bytes();
            if corrupt {
                dgid.iter_mut().for_each(|b| *b = !*b);
            }
            let sgid = src_gid.unwrap_or_default();
            buf[GRH_SGID_OFFSET..GRH_SGID_OFFSET + 16].copy_from_slice(sgid.as_bytes());
            buf[GRH_DGID_OFFSET..GRH_DGID_OFFSET + 16].copy_from_slice(&dgid);
        }
        buf[GRH_SIZE..GRH_SIZE + data.len()].copy_from_slice(data);

        let len = (GRH_SIZE + data.len()) as u32;
        qp.rx_cq.push(Wc::recv(idx, WcStatus::Success, len, dest.is_global()), solicited);
    }

    fn post_recv(&mut self, qpn: Qpn, wqes: &[RecvWqe]) -> io::Result<()> {
        if wqes.iter().any(|w| self.check(&w.sge).is_err()) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let qp = self.qp(qpn)?;
        for wqe in wqes {
            qp.recv.push_back((qp.recv_counter, wqe.sge));
            qp.recv_counter = qp.recv_counter.wrapping_add(1);
        }
        Ok(())
    }
}

/// An in-process fabric of UD queue pairs.
#[derive(Clone, Default)]
pub struct LoopbackFabric {
    inner: Arc<Mutex<Fabric>>,
}

impl LoopbackFabric {
    /// Create an empty fabric.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Fabric> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the memory domain of this fabric.
    pub fn domain(&self) -> Arc<dyn MemoryDomain> {
        Arc::new(self.clone())
    }

    /// Open a queue pair on a port with the given LID and optional GID.
    /// Return the hardware resources to build an interface on, and a handle
    /// to observe and perturb the queue pair.
    pub fn open(&self, lid: Lid, gid: Option<Gid>) -> (UdHardware, LoopbackPort) {
        let qpn = {
            let mut fabric = self.lock();
            fabric.next_qpn += 1;
            let qpn = fabric.next_qpn;
            fabric.qps.insert(
                qpn,
                QpState {
                    lid,
                    gid,
                    recv: VecDeque::new(),
                    recv_counter: 0,
                    tx_cq: CqState::default(),
                    rx_cq: CqState::default(),
                    error: false,
                    fail_next_send: None,
                    fail_next_post: None,
                    corrupt_next_grh: false,
                    dropped: 0,
                },
            );
            qpn
        };
        log::debug!("rrud: loopback opened qpn {:#x} on lid {}", qpn, lid);

        let hw = UdHardware {
            qp: Box::new(LoopbackQp {
                fabric: self.clone(),
                qpn,
            }),
            tx_cq: Box::new(LoopbackCq {
                fabric: self.clone(),
                qpn,
                dir: CqDir::Send,
            }),
            rx_cq: Box::new(LoopbackCq {
                fabric: self.clone(),
                qpn,
                dir: CqDir::Recv,
            }),
            domain: self.domain(),
            lid,
            gid,
        };
        let port = LoopbackPort {
            fabric: self.clone(),
            qpn,
        };
        (hw, port)
    }
}

impl MemoryDomain for LoopbackFabric {
    fn register(&self, addr: *mut u8, len: usize) -> io::Result<LKey> {
        if addr.is_null() || len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let mut fabric = self.lock();
        fabric.next_lkey += 1;
        let lkey = fabric.next_lkey;
        fabric.regions.insert(
            lkey,
            Region {
                addr: addr as usize,
                len,
            },
        );
        Ok(lkey)
    }

    fn deregister(&self, lkey: LKey) -> io::Result<()> {
        match self.lock().regions.remove(&lkey) {
            Some(_) => Ok(()),
            None => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }
}

struct LoopbackQp {
    fabric: LoopbackFabric,
    qpn: Qpn,
}

impl UdQueuePair for LoopbackQp {
    fn qp_num(&self) -> Qpn {
        self.qpn
    }

    fn post_send(&mut self, wqe: &SendWqe<'_>) -> io::Result<()> {
        self.fabric.lock().post_send(self.qpn, wqe)
    }

    fn post_recv(&mut self, wqes: &[RecvWqe]) -> io::Result<()> {
        self.fabric.lock().post_recv(self.qpn, wqes)
    }
}

impl Drop for LoopbackQp {
    fn drop(&mut self) {
        self.fabric.lock().qps.remove(&self.qpn);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CqDir {
    Send,
    Recv,
}

struct LoopbackCq {
    fabric: LoopbackFabric,
    qpn: Qpn,
    dir: CqDir,
}

impl LoopbackCq {
    fn with<R>(&self, f: impl FnOnce(&mut CqState) -> R) -> io::Result<R> {
        let mut fabric = self.fabric.lock();
        let qp = fabric.qp(self.qpn)?;
        Ok(match self.dir {
            CqDir::Send => f(&mut qp.tx_cq),
            CqDir::Recv => f(&mut qp.rx_cq),
        })
    }
}

impl CompletionQueue for LoopbackCq {
    fn try_poll(&mut self) -> io::Result<Option<Wc>> {
        self.with(|cq| cq.entries.pop_front())
    }

    fn arm(&mut self, solicited_only: bool) -> io::Result<()> {
        self.with(|cq| cq.armed = Some(solicited_only))
    }
}

/// Observation and fault injection handle of a loopback queue pair.
#[derive(Clone)]
pub struct LoopbackPort {
    fabric: LoopbackFabric,
    qpn: Qpn,
}

impl LoopbackPort {
    fn with<R>(&self, f: impl FnOnce(&mut QpState) -> R) -> Option<R> {
        self.fabric.lock().qps.get_mut(&self.qpn).map(f)
    }

    /// Get the queue pair number.
    pub fn qpn(&self) -> Qpn {
        self.qpn
    }

    /// Complete the next send with `status` and move the queue pair to the
    /// error state.
    pub fn fail_next_send(&self, status: WcStatus) {
        self.with(|qp| qp.fail_next_send = Some(status));
    }

    /// Make the next send post fail with the given OS error number.
    pub fn fail_next_post(&self, errno: i32) {
        self.with(|qp| qp.fail_next_post = Some(errno));
    }

    /// Corrupt the destination GID of the next globally routed datagram this
    /// queue pair sends.
    pub fn corrupt_next_grh(&self) {
        self.with(|qp| qp.corrupt_next_grh = true);
    }

    /// Number of datagrams lost because no receive buffer was posted.
    pub fn dropped(&self) -> u64 {
        self.with(|qp| qp.dropped).unwrap_or(0)
    }

    /// Number of receive buffers currently posted.
    pub fn recv_posted(&self) -> usize {
        self.with(|qp| qp.recv.len()).unwrap_or(0)
    }

    /// Number of events raised by the send completion queue.
    pub fn tx_events(&self) -> u64 {
        self.with(|qp| qp.tx_cq.events).unwrap_or(0)
    }

    /// Number of events raised by the receive completion queue.
    pub fn rx_events(&self) -> u64 {
        self.with(|qp| qp.rx_cq.events).unwrap_or(0)
    }

    /// Arming state of the receive completion queue: `Some(solicited_only)`
    /// if armed.
    pub fn rx_armed(&self) -> Option<bool> {
        self.with(|qp| qp.rx_cq.armed).flatten()
    }

    /// Arming state of the send completion queue.
    pub fn tx_armed(&self) -> Option<bool> {
        self.with(|qp| qp.tx_cq.armed).flatten()
    }

    /// Return `true` while the queue pair exists.
    pub fn is_open(&self) -> bool {
        self.with(|_| ()).is_some()
    }
}
