//! UD interface: one queue pair with its send and receive queues, driven by
//! explicit progress calls or by completion events.

mod builder;
mod stats;

use std::collections::VecDeque;
use std::ops::{BitOr, BitOrAssign, Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::{fmt, io};

pub use self::builder::*;
pub use self::stats::*;
use super::config::{Addressing, UdConfig};
use super::ep::Endpoint;
use super::error::UdError;
use super::rxq::{RecvDesc, RxDisposition, RxQueue};
use super::txq::{DeferredComp, TxQueue};
use crate::rdma::cq::{CompletionQueue, Wc, WcStatus};
use crate::rdma::gid::Gid;
use crate::rdma::qp::{UdAddress, UdQueuePair, GRH_DGID_OFFSET, GRH_SIZE};
use crate::rdma::type_alias::*;

/// Called once with the error that made the interface fail.
pub type FailureCallback = Box<dyn FnOnce(&UdError) + Send>;

/// Called after every event-driven progress.
pub type EventCallback = Box<dyn Fn() + Send + Sync>;

/// Lifecycle state of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfaceState {
    /// Built, no receive buffers posted yet.
    Uninitialized,

    /// Sending and receiving.
    Active,

    /// Failed. Sends are rejected; outstanding completions are still harvested.
    Draining,

    /// Resources released.
    Closed,
}

impl fmt::Display for IfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IfaceState::Uninitialized => "uninitialized",
            IfaceState::Active => "active",
            IfaceState::Draining => "draining",
            IfaceState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Completion queues to arm for event notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct ArmFlags(u8);

impl ArmFlags {
    pub const EMPTY: Self = Self(0);
    /// Notify on the next send completion.
    pub const SEND_COMP: Self = Self(1 << 0);
    /// Notify on the next received packet.
    pub const RECV: Self = Self(1 << 1);
    /// Notify on the next received packet with the solicited-event bit set.
    pub const RECV_SIG: Self = Self(1 << 2);

    /// Return `true` if all flags in `other` are set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ArmFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ArmFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Receive dispatcher of an interface.
///
/// The dispatcher runs inside the interface's critical section, so it must
/// not call back into the same interface. To answer a packet, keep it with
/// [`RxDisposition::Held`] and act on it after progress returns.
pub trait RecvHandler: Send {
    /// Handle one received packet. `desc` owns the buffer `packet` lives in.
    fn on_recv(&mut self, packet: &[u8], desc: RecvDesc) -> RxDisposition;
}

impl<F> RecvHandler for F
where
    F: FnMut(&[u8], RecvDesc) -> RxDisposition + Send,
{
    fn on_recv(&mut self, packet: &[u8], desc: RecvDesc) -> RxDisposition {
        self(packet, desc)
    }
}

static NEXT_THREAD_TOKEN: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_TOKEN: usize = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn thread_token() -> usize {
    THREAD_TOKEN.with(|t| *t)
}

/// Hardware resources and queues, present until the interface is closed.
/// Fields drop in order, so the queue pair goes before the buffers it uses.
struct IfaceRes {
    qp: Box<dyn UdQueuePair>,
    tx_cq: Box<dyn CompletionQueue>,
    rx_cq: Box<dyn CompletionQueue>,
    txq: TxQueue,
    rxq: RxQueue,
}

/// Mutable interface state, guarded by the interface lock.
struct IfaceCore {
    state: IfaceState,
    res: Option<IfaceRes>,
    handler: Box<dyn RecvHandler>,
    async_comps: VecDeque<DeferredComp>,
    pending_rx: VecDeque<RecvDesc>,
    stats: IfaceStats,
    failed: bool,
    pending_failure: Option<UdError>,
}

/// Why a received packet was dropped.
enum RxReject {
    Status(WcStatus),
    Grh(bool),
    Length(usize),
    Dgid,
}

impl fmt::Display for RxReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxReject::Status(st) => write!(f, "completion status {:?}", st),
            RxReject::Grh(true) => f.write_str("unexpected global routing header"),
            RxReject::Grh(false) => f.write_str("missing global routing header"),
            RxReject::Length(len) => write!(f, "bad length {}", len),
            RxReject::Dgid => f.write_str("destination GID mismatch"),
        }
    }
}

/// Check a receive completion against the interface configuration and
/// return the length of the packet after the routing header area.
fn validate_rx(
    cfg: &UdConfig,
    local_gid: Option<Gid>,
    rxq: &RxQueue,
    wc: &Wc,
    buf: u32,
) -> Result<usize, RxReject> {
    wc.ok().map_err(RxReject::Status)?;

    let global = cfg.addressing == Addressing::Global;
    if wc.grh_present() != global {
        return Err(RxReject::Grh(wc.grh_present()));
    }

    let len = wc.bytes();
    if len < GRH_SIZE + cfg.rx_min_len as usize || len > cfg.seg_size as usize {
        return Err(RxReject::Length(len));
    }

    if global && cfg.check_grh_dgid {
        let dgid = &rxq.grh(buf)[GRH_DGID_OFFSET..GRH_DGID_OFFSET + 16];
        if local_gid.map_or(true, |gid| &gid.as_bytes()[..] != dgid) {
            return Err(RxReject::Dgid);
        }
    }
    Ok(len - GRH_SIZE)
}

impl IfaceCore {
    /// Record the first fatal error and stop accepting sends.
    fn fail(&mut self, err: UdError) {
        if self.failed {
            log::debug!("rrud: error after interface failure: {}", err);
            return;
        }
        log::error!("rrud: interface failed: {}", err);
        self.failed = true;
        if self.state == IfaceState::Active {
            self.state = IfaceState::Draining;
        }
        self.pending_failure = Some(err);
    }

    fn init(&mut self, cfg: &UdConfig, arm: bool) -> Result<(), UdError> {
        if self.state != IfaceState::Uninitialized {
            return Err(UdError::InvalidParam(format!(
                "cannot initialize an interface that is {}",
                self.state
            )));
        }
        let Some(res) = self.res.as_mut() else {
            return Err(UdError::NotActive(self.state));
        };

        let threshold = cfg.rx_replenish_threshold();
        while res.rxq.posted() < threshold {
            let n = res.rxq.post_batch(res.qp.as_mut())?;
            if n == 0 {
                break;
            }
            self.stats.rx_posted += n as u64;
        }
        if arm {
            res.rx_cq.arm(true)?;
        }

        self.state = IfaceState::Active;
        log::debug!(
            "rrud: interface qpn {:#x} active, {} receives posted",
            res.qp.qp_num(),
            res.rxq.posted()
        );
        Ok(())
    }

    /// Harvest at most one receive completion. Replenish the receive queue
    /// when there is nothing to harvest.
    fn try_poll_rx(
        &mut self,
        cfg: &UdConfig,
        local_gid: Option<Gid>,
        deferred: bool,
    ) -> Result<usize, UdError> {
        let IfaceCore {
            state,
            res,
            handler,
            pending_rx,
            stats,
            ..
        } = self;
        let Some(res) = res.as_mut() else {
            return Ok(0);
        };

        let Some(wc) = res.rx_cq.try_poll()? else {
            if *state == IfaceState::Active {
                let n = res
                    .rxq
                    .replenish(res.qp.as_mut(), cfg.rx_replenish_threshold())?;
                stats.rx_posted += n as u64;
            }
            return Ok(0);
        };
        stats.rx_completions += 1;

        let Some(buf) = res.rxq.harvest(&wc) else {
            return Ok(1);
        };
        let len = match validate_rx(cfg, local_gid, &res.rxq, &wc, buf) {
            Ok(len) => len,
            Err(reason) => {
                log::trace!("rrud: dropped received packet: {}", reason);
                res.rxq.recycle(buf);
                stats.rx_dropped += 1;
                return Ok(1);
            }
        };

        let desc = res.rxq.desc(buf, len);
        if deferred {
            pending_rx.push_back(desc);
        } else {
            dispatch(handler.as_mut(), &mut res.rxq, stats, desc);
        }
        Ok(1)
    }

    fn poll_rx(&mut self, cfg: &UdConfig, local_gid: Option<Gid>, deferred: bool) -> usize {
        match self.try_poll_rx(cfg, local_gid, deferred) {
            Ok(n) => n,
            Err(e) => {
                self.fail(e);
                0
            }
        }
    }

    /// Harvest at most one send completion. Zero-copy completions of the
    /// retired sends go to `out`, or are deferred to the next progress.
    fn poll_tx(&mut self, deferred: bool, out: &mut Vec<DeferredComp>) -> usize {
        let IfaceCore {
            res,
            async_comps,
            stats,
            ..
        } = self;
        let Some(res) = res.as_mut() else {
            return 0;
        };

        let wc = match res.tx_cq.try_poll() {
            Ok(Some(wc)) => wc,
            Ok(None) => return 0,
            Err(e) => {
                self.fail(UdError::Io(e));
                return 0;
            }
        };
        stats.tx_completions += 1;

        let retired = if deferred {
            res.txq.complete(&wc, &mut |c| async_comps.push_back(c))
        } else {
            res.txq.complete(&wc, &mut |c| out.push(c))
        };
        stats.tx_retired += retired as u64;

        if let Err(status) = wc.ok() {
            self.fail(UdError::Fatal(status));
        }
        1
    }

    /// Dispatch work deferred by event-driven progress.
    fn dispatch_deferred(&mut self, out: &mut Vec<DeferredComp>) -> usize {
        let mut count = self.async_comps.len();
        out.extend(self.async_comps.drain(..));

        let IfaceCore {
            res,
            handler,
            pending_rx,
            stats,
            ..
        } = self;
        if let Some(res) = res.as_mut() {
            while let Some(desc) = pending_rx.pop_front() {
                dispatch(handler.as_mut(), &mut res.rxq, stats, desc);
                count += 1;
            }
        }
        count
    }

    fn progress(
        &mut self,
        cfg: &UdConfig,
        local_gid: Option<Gid>,
        out: &mut Vec<DeferredComp>,
    ) -> usize {
        if matches!(self.state, IfaceState::Uninitialized | IfaceState::Closed) {
            return 0;
        }

        let mut count = self.dispatch_deferred(out);
        if count > 0 {
            return count;
        }

        loop {
            let n = self.poll_rx(cfg, local_gid, false);
            count += n;
            if n == 0 || count >= cfg.rx_max_poll as usize {
                break;
            }
        }
        count + self.poll_tx(false, out)
    }

    fn async_progress(&mut self, cfg: &UdConfig, local_gid: Option<Gid>) -> usize {
        if matches!(self.state, IfaceState::Uninitialized | IfaceState::Closed) {
            return 0;
        }

        let mut count = 0;
        loop {
            let n = self.poll_rx(cfg, local_gid, true);
            count += n;
            if n == 0 || count >= cfg.async_max_poll as usize {
                break;
            }
        }
        count += self.poll_tx(true, &mut Vec::new());

        if self.state == IfaceState::Active {
            if let Some(res) = self.res.as_mut() {
                if let Err(e) = res.rx_cq.arm(true) {
                    self.fail(UdError::Io(e));
                }
            }
        }
        count
    }

    fn arm(&mut self, flags: ArmFlags) -> Result<(), UdError> {
        if self.state != IfaceState::Active {
            return Err(UdError::NotActive(self.state));
        }
        if !self.async_comps.is_empty() || !self.pending_rx.is_empty() {
            return Err(UdError::Busy);
        }
        let Some(res) = self.res.as_mut() else {
            return Err(UdError::NotActive(self.state));
        };

        if flags.contains(ArmFlags::SEND_COMP) {
            res.tx_cq.arm(false)?;
        }
        if flags.contains(ArmFlags::RECV) {
            res.rx_cq.arm(false)?;
        } else if flags.contains(ArmFlags::RECV_SIG) {
            res.rx_cq.arm(true)?;
        }
        log::trace!("rrud: armed events {:?}", flags);
        Ok(())
    }

    /// Run a send operation if the interface is active. A failed post fails
    /// the interface.
    fn send<R>(
        &mut self,
        op: impl FnOnce(&mut dyn UdQueuePair, &mut TxQueue, &mut IfaceStats) -> Result<R, UdError>,
    ) -> Result<R, UdError> {
        if self.state != IfaceState::Active {
            return Err(UdError::NotActive(self.state));
        }
        let Some(res) = self.res.as_mut() else {
            return Err(UdError::NotActive(self.state));
        };

        match op(res.qp.as_mut(), &mut res.txq, &mut self.stats) {
            Err(UdError::Io(e)) => {
                self.fail(UdError::Io(io::Error::new(e.kind(), e.to_string())));
                Err(UdError::Io(e))
            }
            Err(UdError::NoResource) => {
                self.stats.tx_no_resource += 1;
                Err(UdError::NoResource)
            }
            ret => ret,
        }
    }

    /// Flush outstanding sends, release held-back packets, and drop the
    /// hardware resources. Return the completions still to be fired.
    fn teardown(&mut self) -> Vec<DeferredComp> {
        let mut comps: Vec<_> = self.async_comps.drain(..).collect();
        if let Some(mut res) = self.res.take() {
            let flushed = res.txq.flush(&mut |c| comps.push(c));
            if flushed > 0 {
                log::debug!("rrud: flushed {} outstanding sends", flushed);
            }
            for desc in self.pending_rx.drain(..) {
                if let Err(e) = res.rxq.release(desc) {
                    log::warn!("rrud: failed to release pending receive: {}", e);
                }
            }
        }
        self.pending_rx.clear();
        self.state = IfaceState::Closed;
        comps
    }
}

/// Hand one packet to the receive dispatcher.
fn dispatch(
    handler: &mut dyn RecvHandler,
    rxq: &mut RxQueue,
    stats: &mut IfaceStats,
    desc: RecvDesc,
) {
    match handler.on_recv(rxq.packet(&desc), desc) {
        RxDisposition::Recycle(desc) => {
            if let Err(e) = rxq.release(desc) {
                log::warn!("rrud: receive dispatcher recycled a foreign buffer: {}", e);
            }
        }
        RxDisposition::Held => stats.rx_held += 1,
    }
}

struct IfaceShared {
    config: UdConfig,
    address: UdAddress,
    local_gid: Option<Gid>,
    core: Mutex<IfaceCore>,
    owner: AtomicUsize,
    on_failure: Mutex<Option<FailureCallback>>,
    on_event: Option<EventCallback>,
}

/// Exclusive access to the interface core. One progress or send call at a
/// time holds it.
struct Turn<'a> {
    shared: &'a IfaceShared,
    core: MutexGuard<'a, IfaceCore>,
}

impl Deref for Turn<'_> {
    type Target = IfaceCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl DerefMut for Turn<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.shared.owner.store(0, Ordering::Release);
    }
}

impl IfaceShared {
    /// Take the interface lock. Other threads wait; the holder calling back
    /// into the interface is a bug and panics instead of deadlocking.
    fn enter(&self) -> Turn<'_> {
        let me = thread_token();
        let core = match self.core.try_lock() {
            Ok(core) => core,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                if self.owner.load(Ordering::Acquire) == me {
                    panic!("rrud: interface re-entered from one of its own callbacks");
                }
                self.core.lock().unwrap_or_else(PoisonError::into_inner)
            }
        };
        self.owner.store(me, Ordering::Release);
        Turn { shared: self, core }
    }

    /// Leave the turn, then run the completions and the failure callback it
    /// produced.
    fn leave(&self, mut turn: Turn<'_>, comps: Vec<DeferredComp>) {
        turn.stats.zcopy_completions += comps.len() as u64;
        let failure = turn.pending_failure.take();
        drop(turn);

        comps.into_iter().for_each(DeferredComp::fire);
        if let Some(err) = failure {
            let cb = self
                .on_failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(cb) = cb {
                cb(&err);
            }
        }
    }
}

impl Drop for IfaceShared {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if core.state != IfaceState::Closed {
            core.teardown().into_iter().for_each(DeferredComp::fire);
        }
    }
}

/// A UD interface.
///
/// Cloning the interface gives another handle to the same queue pair. Calls
/// from different threads are serialized.
#[derive(Clone)]
pub struct Interface {
    inner: Arc<IfaceShared>,
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("address", &self.inner.address)
            .finish()
    }
}

impl Interface {
    /// Start building an interface.
    pub fn builder() -> IfaceBuilder {
        IfaceBuilder::new()
    }

    fn new(builder: IfaceBuilder, hw: UdHardware) -> Result<Self, UdError> {
        let cfg = builder.config;
        let local_gid = hw.gid;
        let gid = match cfg.addressing {
            Addressing::Global => Some(local_gid.ok_or_else(|| {
                UdError::InvalidParam("global addressing needs a port GID".into())
            })?),
            Addressing::Local => None,
        };

        let txq = TxQueue::new(
            hw.domain.clone(),
            cfg.tx_queue_len,
            cfg.tx_moderation,
            cfg.tx_bufs as usize,
            cfg.seg_size as usize,
        )?;
        let rxq = RxQueue::new(
            hw.domain,
            cfg.rx_queue_len,
            cfg.rx_max_batch,
            cfg.rx_bufs as usize,
            cfg.seg_size as usize,
        )?;
        let address = UdAddress::new(hw.qp.qp_num(), hw.lid, gid);

        let core = IfaceCore {
            state: IfaceState::Uninitialized,
            res: Some(IfaceRes {
                qp: hw.qp,
                tx_cq: hw.tx_cq,
                rx_cq: hw.rx_cq,
                txq,
                rxq,
            }),
            handler: builder.handler,
            async_comps: VecDeque::new(),
            pending_rx: VecDeque::new(),
            stats: IfaceStats::default(),
            failed: false,
            pending_failure: None,
        };
        Ok(Self {
            inner: Arc::new(IfaceShared {
                config: cfg,
                address,
                local_gid,
                core: Mutex::new(core),
                owner: AtomicUsize::new(0),
                on_failure: Mutex::new(builder.on_failure),
                on_event: builder.on_event,
            }),
        })
    }

    /// Fill the receive queue and make the interface active. If the event
    /// callback is set, also arm the receive completion queue.
    ///
    /// Fail with [`UdError::InvalidParam`] and no state change if the
    /// interface was already initialized. If posting receives or arming
    /// fails, the interface is closed.
    pub fn init(&self) -> Result<(), UdError> {
        let mut turn = self.inner.enter();
        let fresh = turn.state == IfaceState::Uninitialized;
        let ret = turn.init(&self.inner.config, self.inner.on_event.is_some());
        let comps = match &ret {
            Ok(()) => Vec::new(),
            Err(e) if !fresh => {
                log::warn!("rrud: {}", e);
                Vec::new()
            }
            Err(e) => {
                log::error!("rrud: interface initialization failed: {}", e);
                turn.teardown()
            }
        };
        self.inner.leave(turn, comps);
        ret
    }

    /// Make progress: dispatch work deferred by event-driven progress if
    /// there is any; otherwise harvest receive completions up to the
    /// configured limit and then one send completion.
    ///
    /// Return the number of events handled.
    pub fn progress(&self) -> usize {
        let mut turn = self.inner.enter();
        let mut comps = Vec::new();
        let count = turn.progress(&self.inner.config, self.inner.local_gid, &mut comps);
        self.inner.leave(turn, comps);
        count
    }

    /// Make progress on a completion event: harvest completions, deferring
    /// their dispatch to the next [`progress`](Self::progress), then re-arm
    /// the receive completion queue and call the event callback. Does
    /// nothing unless the interface is active or draining.
    ///
    /// Return the number of completions harvested.
    pub fn async_progress(&self) -> usize {
        let mut turn = self.inner.enter();
        let live = matches!(turn.state, IfaceState::Active | IfaceState::Draining);
        let count = turn.async_progress(&self.inner.config, self.inner.local_gid);
        self.inner.leave(turn, Vec::new());

        if live {
            if let Some(cb) = &self.inner.on_event {
                cb();
            }
        }
        count
    }

    /// Request a completion event for the next completion of the given
    /// kinds. Fail with [`UdError::Busy`] if deferred work is pending; call
    /// [`progress`](Self::progress) and retry.
    pub fn arm_events(&self, flags: ArmFlags) -> Result<(), UdError> {
        let mut turn = self.inner.enter();
        let ret = turn.arm(flags);
        self.inner.leave(turn, Vec::new());
        ret
    }

    /// Close the interface. Outstanding zero-copy sends complete with
    /// [`WcStatus::WrFlushErr`]. Closing twice is a no-op.
    pub fn close(&self) {
        let mut turn = self.inner.enter();
        if turn.state == IfaceState::Closed {
            return;
        }
        let comps = turn.teardown();
        log::debug!("rrud: interface qpn {:#x} closed", self.inner.address.qpn);
        self.inner.leave(turn, comps);
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> IfaceState {
        self.inner.enter().state
    }

    /// Get the address peers use to reach this interface.
    pub fn address(&self) -> UdAddress {
        self.inner.address
    }

    /// Get the queue pair number.
    pub fn qp_num(&self) -> Qpn {
        self.inner.address.qpn
    }

    /// Get the configuration.
    pub fn config(&self) -> &UdConfig {
        &self.inner.config
    }

    /// Get a snapshot of the counters.
    pub fn stats(&self) -> IfaceStats {
        self.inner.enter().stats
    }

    /// Transmit credit left, in building blocks. Zero once closed.
    pub fn tx_available(&self) -> usize {
        let turn = self.inner.enter();
        turn.res.as_ref().map_or(0, |res| res.txq.available())
    }

    /// Number of receive buffers owned by the device.
    pub fn rx_posted(&self) -> u32 {
        let turn = self.inner.enter();
        turn.res.as_ref().map_or(0, |res| res.rxq.posted())
    }

    /// Post a batch of receive buffers if fewer than `threshold` are posted.
    /// Return the number of buffers posted.
    pub fn replenish_rx(&self, threshold: u32) -> Result<u32, UdError> {
        let mut turn = self.inner.enter();
        let state = turn.state;
        let ret = match state {
            IfaceState::Active => {
                let IfaceCore { res, stats, .. } = &mut *turn;
                match res.as_mut() {
                    Some(res) => res.rxq.replenish(res.qp.as_mut(), threshold).map(|n| {
                        stats.rx_posted += n as u64;
                        n
                    }),
                    None => Err(UdError::NotActive(IfaceState::Closed)),
                }
            }
            state => Err(UdError::NotActive(state)),
        };
        self.inner.leave(turn, Vec::new());
        ret
    }

    /// Give back a buffer the receive dispatcher held.
    pub fn release_recv(&self, desc: RecvDesc) -> Result<(), UdError> {
        let mut turn = self.inner.enter();
        let state = turn.state;
        match turn.res.as_mut() {
            Some(res) => res.rxq.release(desc),
            None => Err(UdError::NotActive(state)),
        }
    }

    /// Read the packet of a held buffer. Return `None` if the buffer is not
    /// from this interface or the interface is closed.
    ///
    /// `f` runs inside the interface's critical section.
    pub fn read_recv<R>(&self, desc: &RecvDesc, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let turn = self.inner.enter();
        let res = turn.res.as_ref()?;
        if !res.rxq.owns(desc) {
            return None;
        }
        Some(f(res.rxq.packet(desc)))
    }

    /// Create an endpoint that sends to the interface at `addr`.
    pub fn connect(&self, addr: &UdAddress) -> Result<Endpoint, UdError> {
        Endpoint::new(self.clone(), addr)
    }

    /// Run a send operation on the transmit queue.
    pub(crate) fn send<R>(
        &self,
        op: impl FnOnce(&mut dyn UdQueuePair, &mut TxQueue, &mut IfaceStats) -> Result<R, UdError>,
    ) -> Result<R, UdError> {
        let mut turn = self.inner.enter();
        let ret = turn.send(op);
        self.inner.leave(turn, Vec::new());
        ret
    }
}
