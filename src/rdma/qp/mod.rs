//! Unreliable datagram queue pair.

mod peer;

use std::io;

pub use self::peer::*;
use super::type_alias::*;
use super::wqe::{RecvWqe, SendWqe};

/// Queue key shared by every UD queue pair of this library.
pub const GLOBAL_QKEY: QKey = 0x114514;

/// Size of the global routing header area at the head of every UD receive
/// buffer. The device always reserves it, even if no header was received.
pub const GRH_SIZE: usize = 40;

/// Offset of the destination GID inside a global routing header.
pub const GRH_DGID_OFFSET: usize = 24;

/// Unreliable datagram queue pair: a pair of hardware work queues that can
/// address many peers.
///
/// Implementations must report completions for one work queue strictly in
/// post order. A send completion implicitly completes every unsignaled send
/// posted before it.
pub trait UdQueuePair: Send {
    /// Get the queue pair number.
    fn qp_num(&self) -> Qpn;

    /// Write one send work queue entry and ring the send doorbell.
    fn post_send(&mut self, wqe: &SendWqe<'_>) -> io::Result<()>;

    /// Write a batch of receive work queue entries and ring the receive
    /// doorbell once for the whole batch.
    fn post_recv(&mut self, wqes: &[RecvWqe]) -> io::Result<()>;
}

/// Explain receive posting errors.
pub(crate) fn recv_err_explanation(err: &io::Error) -> Option<&'static str> {
    match err.raw_os_error()? {
        libc::EINVAL => Some("invalid work request"),
        libc::ENOMEM => {
            Some("recv queue is full, or not enough resources to complete this operation")
        }
        libc::EFAULT => Some("invalid QP"),
        _ => None,
    }
}

/// Explain send posting errors.
pub(crate) fn send_err_explanation(err: &io::Error) -> Option<&'static str> {
    match err.raw_os_error()? {
        libc::EINVAL => Some("invalid work request"),
        libc::ENOMEM => {
            Some("send queue is full, or not enough resources to complete this operation")
        }
        libc::EFAULT => Some("invalid QP"),
        _ => None,
    }
}
