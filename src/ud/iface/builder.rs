use std::sync::Arc;

use super::{EventCallback, FailureCallback, Interface, RecvHandler};
use crate::rdma::cq::CompletionQueue;
use crate::rdma::gid::Gid;
use crate::rdma::mr::MemoryDomain;
use crate::rdma::qp::UdQueuePair;
use crate::rdma::type_alias::*;
use crate::ud::config::UdConfig;
use crate::ud::error::UdError;
use crate::ud::rxq::{RecvDesc, RxDisposition};

/// Hardware resources an interface drives. Created by the device layer; the
/// interface takes ownership and releases them when it is closed.
pub struct UdHardware {
    /// The UD queue pair.
    pub qp: Box<dyn UdQueuePair>,

    /// Completion queue of the send queue.
    pub tx_cq: Box<dyn CompletionQueue>,

    /// Completion queue of the receive queue.
    pub rx_cq: Box<dyn CompletionQueue>,

    /// Memory domain that registers send and receive buffers.
    pub domain: Arc<dyn MemoryDomain>,

    /// LID of the port the queue pair is bound to.
    pub lid: Lid,

    /// GID of the port the queue pair is bound to, if globally routable.
    pub gid: Option<Gid>,
}

/// Interface builder.
pub struct IfaceBuilder {
    /// Interface configuration.
    pub(super) config: UdConfig,

    /// Receive dispatcher.
    pub(super) handler: Box<dyn RecvHandler>,

    /// Called once when the interface fails.
    pub(super) on_failure: Option<FailureCallback>,

    /// Called after every event-driven progress.
    pub(super) on_event: Option<EventCallback>,
}

impl IfaceBuilder {
    /// Create a new interface builder with the default configuration and a
    /// receive handler that discards every packet.
    pub fn new() -> Self {
        Self {
            config: UdConfig::default(),
            handler: Box::new(|_: &[u8], desc: RecvDesc| RxDisposition::Recycle(desc)),
            on_failure: None,
            on_event: None,
        }
    }

    /// Set the configuration of this interface.
    pub fn config(mut self, config: UdConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the receive dispatcher of this interface.
    pub fn on_recv(mut self, handler: impl RecvHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Set the callback that reports the fatal error of this interface.
    /// It is called at most once, outside the interface's critical section.
    pub fn on_failure(mut self, f: impl FnOnce(&UdError) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Set the callback invoked after every event-driven progress.
    /// Setting it also arms the receive completion queue on initialization.
    pub fn on_event(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }

    /// Build an uninitialized interface on the given hardware resources.
    /// Call [`Interface::init`] to make it active.
    pub fn build(self, hw: UdHardware) -> Result<Interface, UdError> {
        self.config.validate()?;
        Interface::new(self, hw)
    }
}

impl Default for IfaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
