//! The UD send/receive engine.

pub mod config;
mod ep;
mod error;
mod iface;
mod pool;
mod rxq;
mod txq;

pub use self::config::{Addressing, ConfigError, UdConfig};
pub use self::ep::*;
pub use self::error::UdError;
pub use self::iface::*;
pub use self::rxq::{RecvDesc, RxDisposition};
pub use self::txq::Completion;
