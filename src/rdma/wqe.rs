//! Work queue entry layout of a UD queue pair.
//!
//! A send work queue entry consists of a control segment, a datagram segment
//! carrying the address vector, and then either one inline data segment or
//! data pointer segments. Entries occupy whole 64-byte building blocks.

use std::ops::{BitOr, BitOrAssign};

use super::mr::Sge;
use super::qp::PeerAddress;
use super::type_alias::*;

/// Size of a work queue building block.
pub const WQEBB_SIZE: usize = 64;

/// Alignment of every segment inside a work queue entry.
pub const WQE_SEG_SIZE: usize = 16;

/// Size of the control segment.
pub const CTRL_SEG_SIZE: usize = 16;

/// Size of an address vector without global routing information.
pub const AV_BASE_SIZE: usize = 16;

/// Size of an extended address vector carrying a global routing header.
pub const AV_FULL_SIZE: usize = 48;

/// Size of the byte-count header in front of inline data.
pub const INLINE_SEG_HDR_SIZE: usize = 4;

/// Size of a data pointer segment.
pub const DATA_SEG_SIZE: usize = 16;

/// Maximum size of one send work queue entry.
pub const MAX_SEND_WQE_SIZE: usize = 256;

/// Maximum number of building blocks one send work queue entry occupies.
pub const MAX_WQE_BBS: usize = MAX_SEND_WQE_SIZE / WQEBB_SIZE;

/// Maximum inline bytes (header included) that fit in one work queue entry
/// regardless of the address vector size.
pub const MAX_INLINE: usize =
    MAX_SEND_WQE_SIZE - CTRL_SEG_SIZE - AV_FULL_SIZE - INLINE_SEG_HDR_SIZE;

/// Maximum number of caller regions a zero-copy send may gather.
pub const MAX_ZCOPY_IOV: usize = 3;

/// Maximum header size of a zero-copy send.
pub const MAX_ZCOPY_HEADER: usize = MAX_SEND_WQE_SIZE
    - CTRL_SEG_SIZE
    - AV_FULL_SIZE
    - MAX_ZCOPY_IOV * DATA_SEG_SIZE
    - INLINE_SEG_HDR_SIZE;

/// Maximum number of byte slices an inline gather send may carry.
pub const MAX_INLINE_IOV: usize = 8;

#[inline]
const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

/// Send work queue entry flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct WqeFlags(u8);

impl WqeFlags {
    pub const EMPTY: Self = Self(0);
    /// Request a completion for this entry.
    pub const SIGNALED: Self = Self(1 << 0);
    /// Set the solicited-event bit in the packet.
    pub const SOLICITED: Self = Self(1 << 1);

    /// Return `true` if all flags in `other` are set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WqeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WqeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Payload representation of a send work queue entry.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Bytes copied into the entry itself.
    Inline(&'a [u8]),

    /// One registered buffer referenced by pointer.
    Buffered(Sge),

    /// Inline bytes followed by caller regions referenced by pointer.
    Gather { inline: &'a [u8], segs: &'a [Sge] },
}

impl Payload<'_> {
    /// Size of the data segments this payload occupies.
    pub fn seg_size(&self) -> usize {
        match self {
            Payload::Inline(data) => inline_seg_size(data.len()),
            Payload::Buffered(_) => DATA_SEG_SIZE,
            Payload::Gather { inline, segs } => {
                inline_seg_size(inline.len()) + segs.len() * DATA_SEG_SIZE
            }
        }
    }

    /// Total number of bytes the payload puts on the wire.
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Inline(data) => data.len(),
            Payload::Buffered(sge) => sge.len as usize,
            Payload::Gather { inline, segs } => {
                inline.len() + segs.iter().map(|s| s.len as usize).sum::<usize>()
            }
        }
    }
}

/// Size of an inline data segment carrying `len` bytes. Empty inline data
/// needs no segment at all.
#[inline]
pub fn inline_seg_size(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        align_up(INLINE_SEG_HDR_SIZE + len, WQE_SEG_SIZE)
    }
}

/// Compute the size of a send work queue entry.
#[inline]
pub fn wqe_size(dest: &PeerAddress, payload: &Payload<'_>) -> usize {
    CTRL_SEG_SIZE + dest.av_size() + payload.seg_size()
}

/// Compute the number of building blocks an entry of `size` bytes occupies.
#[inline]
pub fn num_bb(size: usize) -> usize {
    size.div_ceil(WQEBB_SIZE)
}

/// Send work queue entry.
#[derive(Debug, Clone, Copy)]
pub struct SendWqe<'a> {
    /// Wrapping index of the first building block of this entry.
    pub index: WqeIdx,

    /// Completion and event flags.
    pub flags: WqeFlags,

    /// Destination of the datagram.
    pub dest: &'a PeerAddress,

    /// Queue key the destination expects.
    pub qkey: QKey,

    /// Payload of the datagram.
    pub payload: Payload<'a>,
}

impl SendWqe<'_> {
    /// Size of this entry in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        wqe_size(self.dest, &self.payload)
    }

    /// Number of building blocks this entry occupies.
    #[inline]
    pub fn num_bb(&self) -> usize {
        num_bb(self.size())
    }
}

/// Receive work queue entry: one registered buffer the device may fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvWqe {
    pub sge: Sge,
}
