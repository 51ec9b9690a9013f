use std::io;

use thiserror::Error;

use super::config::ConfigError;
use super::iface::IfaceState;
use crate::rdma::cq::WcStatus;

/// UD engine error type.
///
/// [`UdError::NoResource`] is transient: the caller should retry the
/// operation later. [`UdError::InvalidParam`] and [`UdError::Busy`] are
/// rejected before any state changes. Every other variant means the interface
/// has failed and will not recover.
#[derive(Debug, Error)]
pub enum UdError {
    /// Out of transmit credit or software send buffers.
    #[error("no resources available")]
    NoResource,

    /// A size or count bound was violated.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Deferred events are pending, so arming would miss them.
    #[error("interface has unprocessed events")]
    Busy,

    /// The interface is not in the `Active` state.
    #[error("interface is {0}")]
    NotActive(IfaceState),

    /// A send completed with an error status.
    #[error("send completion error: {0}")]
    Fatal(#[from] WcStatus),

    /// A hardware operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The interface configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl UdError {
    /// Return `true` if this error leaves the interface unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UdError::NotActive(_) | UdError::Fatal(_) | UdError::Io(_)
        )
    }
}

