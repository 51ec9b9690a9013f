//! Hardware-facing vocabulary of the UD engine: queue pair, completion queue,
//! and memory registration contracts, plus the work queue entry layout.

pub mod cq;
pub mod gid;
pub mod mr;
pub mod qp;
pub mod type_alias;
pub mod wqe;
