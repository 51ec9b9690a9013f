use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rdma::gid::Gid;
use crate::rdma::type_alias::*;
use crate::rdma::wqe::{AV_BASE_SIZE, AV_FULL_SIZE};

/// Interface address data that peers exchange to reach a UD queue pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdAddress {
    /// Queue pair number.
    pub qpn: Qpn,

    /// Port LID.
    pub lid: Lid,

    /// Port GID, present if the interface is reachable by global routing.
    pub gid: Option<Gid>,
}

impl UdAddress {
    /// Create an address with user-designated routing information.
    pub fn new(qpn: Qpn, lid: Lid, gid: Option<Gid>) -> Self {
        Self { qpn, lid, gid }
    }

    /// Return `true` if this address contains global routing information.
    pub fn is_global(&self) -> bool {
        self.gid.is_some()
    }

    /// Convert this address to a local routing one by removing its GID information.
    pub fn as_local(self) -> Self {
        Self { gid: None, ..self }
    }

    /// Serialize the address for transmission over an out-of-band channel.
    pub fn pack(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialize an address received over an out-of-band channel.
    pub fn unpack(buf: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(buf)
    }
}

/// Global routing part of an address vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrhAv {
    /// Destination GID.
    pub dgid: Gid,

    /// Hop limit of the routed packet.
    pub hop_limit: u8,

    /// Traffic class of the routed packet.
    pub traffic_class: u8,

    /// Flow label of the routed packet.
    pub flow_label: u32,
}

impl GrhAv {
    /// Create a global route to `dgid` with the default routing parameters.
    pub fn new(dgid: Gid) -> Self {
        Self {
            dgid,
            hop_limit: 0xFF,
            traffic_class: 0,
            flow_label: 0,
        }
    }
}

/// Resolved routing information for one remote UD queue pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    qpn: Qpn,
    lid: Lid,
    grh: Option<GrhAv>,
}

impl PeerAddress {
    /// Create a peer address.
    pub fn new(qpn: Qpn, lid: Lid, grh: Option<GrhAv>) -> Self {
        Self { qpn, lid, grh }
    }

    /// Get the remote queue pair number.
    #[inline]
    pub fn qpn(&self) -> Qpn {
        self.qpn
    }

    /// Get the remote port LID.
    #[inline]
    pub fn lid(&self) -> Lid {
        self.lid
    }

    /// Get the global route, if any.
    #[inline]
    pub fn grh(&self) -> Option<&GrhAv> {
        self.grh.as_ref()
    }

    /// Return `true` if packets to this peer carry a global routing header.
    #[inline]
    pub fn is_global(&self) -> bool {
        self.grh.is_some()
    }

    /// Size of the address vector a work queue entry needs for this peer.
    #[inline]
    pub fn av_size(&self) -> usize {
        if self.is_global() {
            AV_FULL_SIZE
        } else {
            AV_BASE_SIZE
        }
    }

    /// Return `true` if this peer is the interface identified by `addr`.
    pub fn is_same_as(&self, addr: &UdAddress) -> bool {
        if self.qpn != addr.qpn || self.lid != addr.lid {
            return false;
        }
        match (&self.grh, &addr.gid) {
            (Some(grh), Some(gid)) => grh.dgid == *gid,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}

impl From<&UdAddress> for PeerAddress {
    fn from(addr: &UdAddress) -> Self {
        Self::new(addr.qpn, addr.lid, addr.gid.map(GrhAv::new))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qpn {:#x} lid {}", self.qpn, self.lid)?;
        if let Some(grh) = &self.grh {
            write!(f, " gid {} hop {}", grh.dgid, grh.hop_limit)?;
        }
        Ok(())
    }
}
