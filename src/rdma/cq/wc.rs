use std::fmt;

use thiserror::Error;

use crate::rdma::type_alias::*;

/// Opcode of a completion queue entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WcOpcode {
    /// Send request.
    Send,
    /// Receive request.
    Recv,
}

/// Status of a completion queue entry.
///
/// The documentation and error messages are heavily borrowed from [RDMAmojo](https://www.rdmamojo.com/2013/02/15/ibv_poll_cq/).
/// Only the statuses a UD queue pair can report are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WcStatus {
    /// **Operation completed successfully:** this means that the corresponding
    /// Work Request (and all of the unsignaled Work Requests that were posted
    /// previous to it) ended and the memory buffers that this Work Request
    /// refers to are ready to be (re)used.
    #[error("success")]
    Success,

    /// **Local Length Error:** this happens if a Work Request that was posted
    /// in a local Send Queue contains a message that is greater than the maximum
    /// message size that is supported by the RDMA device port that should send
    /// the message. This also may happen if a Work Request that was posted
    /// in a local Receive Queue isn't big enough for holding the incoming
    /// message.
    #[error("local length error")]
    LocLenErr,

    /// **Local QP Operation Error:** an internal QP consistency error was
    /// detected while processing this Work Request: this happens if a Work
    /// Request that was posted in a local Send Queue of a UD QP contains an
    /// Address Handle that is associated with a Protection Domain to a QP which
    /// is associated with a different Protection Domain.
    #[error("local QP operation error")]
    LocQpOpErr,

    /// **Local Protection Error:** the locally posted Work Request’s buffers
    /// in the scatter/gather list does not reference a Memory Region that is
    /// valid for the requested operation.
    #[error("local protection error")]
    LocProtErr,

    /// **Work Request Flushed Error:** a Work Request was in process or
    /// outstanding when the QP transitioned into the Error State.
    #[error("WR flush error")]
    WrFlushErr,

    /// **Remote Aborted Error:** for UD or UC QPs associated with a SRQ, the
    /// responder aborted the operation.
    #[error("remote aborted error")]
    RemAbortErr,

    /// **Fatal error:** a fatal error that may not be recoverable.
    #[error("fatal error")]
    FatalErr,

    /// **General Error:** other error which isn't one of the above errors.
    #[error("general error")]
    GeneralErr,
}

/// Work completion entry.
///
/// A completion carries the wrapping index of the work queue entry it
/// completes. For sends this is the index of the first building block of the
/// completed entry; every entry posted before it is implicitly completed as
/// well. For receives this is the receive queue index of the consumed buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Wc {
    opcode: WcOpcode,
    wqe_counter: WqeIdx,
    status: WcStatus,
    byte_len: u32,
    grh_present: bool,
}

impl Wc {
    /// Create a send completion.
    #[inline]
    pub fn send(wqe_counter: WqeIdx, status: WcStatus) -> Self {
        Self {
            opcode: WcOpcode::Send,
            wqe_counter,
            status,
            byte_len: 0,
            grh_present: false,
        }
    }

    /// Create a receive completion.
    #[inline]
    pub fn recv(wqe_counter: WqeIdx, status: WcStatus, byte_len: u32, grh_present: bool) -> Self {
        Self {
            opcode: WcOpcode::Recv,
            wqe_counter,
            status,
            byte_len,
            grh_present,
        }
    }

    /// Get the completion status.
    #[inline]
    pub fn status(&self) -> WcStatus {
        self.status
    }

    /// Get the completion status as a `Result`.
    ///
    /// - If the status is `Success`, return the number of bytes transferred.
    /// - Otherwise, return an error.
    #[inline]
    pub fn ok(&self) -> Result<usize, WcStatus> {
        match self.status {
            WcStatus::Success => Ok(self.bytes()),
            status => Err(status),
        }
    }

    /// Get the opcode of the work request.
    #[inline]
    pub fn opcode(&self) -> WcOpcode {
        self.opcode
    }

    /// Get the index of the completed work queue entry.
    #[inline]
    pub fn wqe_counter(&self) -> WqeIdx {
        self.wqe_counter
    }

    /// Get the number of bytes transferred, including the routing header
    /// area for receives.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.byte_len as usize
    }

    /// Return `true` if the received packet carries a global routing header.
    #[inline]
    pub fn grh_present(&self) -> bool {
        self.grh_present
    }
}

impl fmt::Debug for Wc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wc")
            .field("opcode", &self.opcode)
            .field("wqe_counter", &self.wqe_counter)
            .field("status", &self.status)
            .finish()
    }
}
