use std::fmt;

use super::config::Addressing;
use super::error::UdError;
use super::iface::Interface;
use crate::rdma::cq::WcStatus;
use crate::rdma::mr::Sge;
use crate::rdma::qp::{PeerAddress, UdAddress};
use crate::rdma::type_alias::*;
use crate::rdma::wqe::WqeFlags;

/// Handle of a zero-copy send whose completion is still to come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InProgress(pub Sn);

/// Sending side of a UD interface bound to one remote interface.
///
/// Endpoints are cheap: they hold a handle to the interface and the resolved
/// address vector of the peer. Any number of them may share an interface.
#[derive(Clone)]
pub struct Endpoint {
    iface: Interface,
    peer: PeerAddress,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("local_qpn", &self.iface.qp_num())
            .field("peer", &self.peer)
            .finish()
    }
}

impl Endpoint {
    /// Resolve `addr` according to the interface's addressing mode.
    pub(crate) fn new(iface: Interface, addr: &UdAddress) -> Result<Self, UdError> {
        let addr = match iface.config().addressing {
            Addressing::Global if addr.gid.is_none() => {
                return Err(UdError::InvalidParam(format!(
                    "peer qpn {:#x} has no GID but the interface routes globally",
                    addr.qpn
                )));
            }
            Addressing::Global => *addr,
            Addressing::Local => addr.as_local(),
        };
        Ok(Self {
            iface,
            peer: PeerAddress::from(&addr),
        })
    }

    /// Create an endpoint with a user-designated address vector, e.g. one
    /// with custom routing parameters.
    pub fn with_peer(iface: Interface, peer: PeerAddress) -> Result<Self, UdError> {
        if peer.is_global() != (iface.config().addressing == Addressing::Global) {
            return Err(UdError::InvalidParam(format!(
                "peer {} does not match the interface addressing mode",
                peer
            )));
        }
        Ok(Self { iface, peer })
    }

    /// Get the interface this endpoint sends from.
    #[inline]
    pub fn iface(&self) -> &Interface {
        &self.iface
    }

    /// Get the resolved peer address.
    #[inline]
    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    /// Return `true` if this endpoint sends to the interface at `addr`.
    pub fn is_connected_to(&self, addr: &UdAddress) -> bool {
        self.peer.is_same_as(addr)
    }

    /// Send `header` and `payload` inline in the work queue entry.
    pub fn send_short(&self, header: &[u8], payload: &[u8]) -> Result<Sn, UdError> {
        self.send_short_iov(header, &[payload])
    }

    /// Send `header` and a gather list of byte slices inline in the work
    /// queue entry.
    pub fn send_short_iov(&self, header: &[u8], parts: &[&[u8]]) -> Result<Sn, UdError> {
        let peer = &self.peer;
        self.iface.send(|qp, txq, stats| {
            let sn = txq.post_short(qp, peer, header, parts)?;
            stats.short_ops += 1;
            stats.short_bytes += (header.len() + parts.iter().map(|p| p.len()).sum::<usize>()) as u64;
            Ok(sn)
        })
    }

    /// Send `header` and `payload` through a send buffer. The caller's
    /// memory may be reused as soon as this returns.
    pub fn send_buffered(&self, header: &[u8], payload: &[u8]) -> Result<Sn, UdError> {
        let peer = &self.peer;
        self.iface.send(|qp, txq, stats| {
            let sn = txq.post_bcopy(qp, peer, header, payload)?;
            stats.bcopy_ops += 1;
            stats.bcopy_bytes += (header.len() + payload.len()) as u64;
            Ok(sn)
        })
    }

    /// Send `header` followed by whatever `pack` writes into the send buffer.
    /// `pack` returns the number of bytes it wrote.
    ///
    /// Return the sequence number and the total length sent.
    pub fn send_buffered_with(
        &self,
        header: &[u8],
        mut pack: impl FnMut(&mut [u8]) -> usize,
    ) -> Result<(Sn, usize), UdError> {
        let peer = &self.peer;
        self.iface.send(|qp, txq, stats| {
            let (sn, len) = txq.post_bcopy_with(qp, peer, header, &mut pack)?;
            stats.bcopy_ops += 1;
            stats.bcopy_bytes += len as u64;
            Ok((sn, len))
        })
    }

    /// Send `header` inline followed by the registered regions in `iov`,
    /// read in place by the device. `comp` is called exactly once, in
    /// submission order with other zero-copy sends of this interface, when
    /// the regions may be reused.
    ///
    /// # Safety
    ///
    /// The memory `iov` refers to must stay valid and unmodified until
    /// `comp` is called.
    pub unsafe fn send_zerocopy(
        &self,
        header: &[u8],
        iov: &[Sge],
        comp: impl FnOnce(Sn, Result<(), WcStatus>) + Send + 'static,
    ) -> Result<InProgress, UdError> {
        let peer = &self.peer;
        self.iface.send(|qp, txq, stats| {
            let sn = txq.post_zcopy(qp, peer, header, iov, Box::new(comp))?;
            stats.zcopy_ops += 1;
            stats.zcopy_bytes +=
                (header.len() + iov.iter().map(|s| s.len as usize).sum::<usize>()) as u64;
            Ok(InProgress(sn))
        })
    }

    /// Send a control packet built by the layer above. With
    /// [`WqeFlags::SIGNALED`] the send requests a completion; with
    /// [`WqeFlags::SOLICITED`] it raises a solicited event at the peer.
    pub fn send_ctl(&self, packet: &[u8], flags: WqeFlags) -> Result<Sn, UdError> {
        let peer = &self.peer;
        self.iface.send(|qp, txq, stats| {
            let sn = txq.post_ctl(qp, peer, packet, flags)?;
            stats.ctl_ops += 1;
            Ok(sn)
        })
    }
}
