//! An unreliable-datagram (UD) send/receive engine for RDMA transports.
//!
//! `rrud` drives one UD queue pair per [`Interface`]: it accounts transmit
//! credit in work queue building blocks, builds inline, buffered, and
//! zero-copy send entries, retires completed sends in batches, and keeps the
//! receive queue stocked with buffers that it validates and hands to a
//! receive dispatcher.
//!
//! The device is reached through three small traits ([`UdQueuePair`],
//! [`CompletionQueue`], and [`MemoryDomain`]), so the engine can sit atop any
//! verbs binding. The [`loopback`] module provides an in-process fabric that
//! implements them for tests and demos.
//!
//! Like other resource holders of this library, [`Interface`] is an
//! `Arc`-based handle. Clone it to share the interface between threads;
//! calls are serialized internally.
//!
//! # Example
//!
//! ```rust
//! use rrud::loopback::LoopbackFabric;
//! use rrud::*;
//!
//! fn main() -> Result<(), UdError> {
//!     let fabric = LoopbackFabric::new();
//!     let (hw_a, _) = fabric.open(1, None);
//!     let (hw_b, _) = fabric.open(2, None);
//!
//!     let a = Interface::builder().build(hw_a)?;
//!     let b = Interface::builder()
//!         .on_recv(|packet: &[u8], desc: RecvDesc| {
//!             assert_eq!(packet, b"hello");
//!             RxDisposition::Recycle(desc)
//!         })
//!         .build(hw_b)?;
//!     a.init()?;
//!     b.init()?;
//!
//!     let ep = a.connect(&b.address())?;
//!     ep.send_short(b"hel", b"lo")?;
//!     assert_eq!(b.progress(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Warning
//!
//! **The interfaces are unstable and up to change!**

mod rdma;
mod ud;

pub use rdma::cq::*;
pub use rdma::gid::Gid;
pub use rdma::mr::*;
pub use rdma::qp::*;
pub use rdma::type_alias::*;
pub use rdma::wqe;
pub use ud::*;

/// In-process fabric for tests and demos.
pub mod loopback;

pub mod prelude;
