//! The UD prelude.
//!
//! The purpose of this module is to alleviate imports of common UD engine
//! functionalities.

pub use crate::rdma::cq::{CompletionQueue, Wc, WcStatus};
pub use crate::rdma::gid::Gid;
pub use crate::rdma::mr::{MemoryDomain, RegisteredMem, Sge};
pub use crate::rdma::qp::{UdAddress, UdQueuePair};
pub use crate::rdma::wqe::WqeFlags;
pub use crate::ud::{
    ArmFlags, Endpoint, IfaceBuilder, IfaceState, InProgress, Interface, RecvDesc, RxDisposition,
    UdConfig, UdError, UdHardware,
};
