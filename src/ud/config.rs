//! UD interface configuration.
//!
//! Configuration is loaded from a TOML file (the `[ud]` table, or the whole
//! document if there is none) and can then be overridden by `RRUD_UD_*`
//! environment variables, e.g. `RRUD_UD_RX_MAX_BATCH=32`.

use std::path::Path;
use std::str::FromStr;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rdma::qp::GRH_SIZE;
use crate::rdma::wqe::{MAX_INLINE, MAX_WQE_BBS};

/// Prefix of environment variables that override configuration fields.
pub const ENV_PREFIX: &str = "RRUD_UD_";

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file cannot be read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file is not valid TOML or has unknown fields.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A field has an unacceptable value.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Addressing mode of an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Addressing {
    /// Peers are on the same subnet and packets carry no global routing header.
    #[default]
    Local,

    /// Packets are globally routed (e.g., RoCE) and carry a global routing header.
    Global,
}

impl FromStr for Addressing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Addressing::Local),
            "global" => Ok(Addressing::Global),
            _ => Err(format!("unknown addressing mode `{}`", s)),
        }
    }
}

/// UD interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UdConfig {
    /// Transmit queue capacity in 64-byte building blocks. Power of two.
    pub tx_queue_len: u32,

    /// Request a send completion at least once per this many sends.
    pub tx_moderation: u32,

    /// Number of software send buffers. Every in-flight send holds one.
    pub tx_bufs: u32,

    /// Receive queue capacity in buffers. Power of two.
    pub rx_queue_len: u32,

    /// Maximum number of receive buffers posted with one doorbell.
    pub rx_max_batch: u32,

    /// Maximum number of receive completions handled by one progress call.
    pub rx_max_poll: u32,

    /// Maximum number of receive completions handled by one event-driven
    /// progress call.
    pub async_max_poll: u32,

    /// Receive buffer pool size. May exceed `rx_queue_len` so that held
    /// buffers do not starve the receive queue.
    pub rx_bufs: u32,

    /// Size of every send and receive buffer, including the routing header
    /// area of receive buffers.
    pub seg_size: u32,

    /// Addressing mode. Decides whether received packets must carry a global
    /// routing header.
    pub addressing: Addressing,

    /// Drop globally routed packets whose destination GID is not ours.
    pub check_grh_dgid: bool,

    /// Minimum packet length after the routing header area. Shorter packets
    /// are dropped.
    pub rx_min_len: u32,
}

impl Default for UdConfig {
    fn default() -> Self {
        Self {
            tx_queue_len: 256,
            tx_moderation: 64,
            tx_bufs: 256,
            rx_queue_len: 1024,
            rx_max_batch: 16,
            rx_max_poll: 16,
            async_max_poll: 64,
            rx_bufs: 1088,
            seg_size: 4096,
            addressing: Addressing::Local,
            check_grh_dgid: false,
            rx_min_len: 0,
        }
    }
}

/// Override `field` with the parsed value of environment variable `name`, if set.
fn env_override<T>(name: &'static str, field: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match env::var(&key) {
        Ok(val) => {
            *field = val.trim().parse().map_err(|e: T::Err| {
                ConfigError::Invalid {
                    field: name,
                    reason: format!("{}={}: {}", key, val, e.to_string()),
                }
            })?;
            log::debug!("rrud: config override {}={}", key, val);
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

impl UdConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let toml: toml::Value = toml::from_str(s)?;
        let table = match toml.get("ud") {
            Some(ud) => ud.clone(),
            None => toml,
        };
        Ok(table.try_into()?)
    }

    /// Load a configuration from a TOML file, apply environment overrides,
    /// and validate the result.
    pub fn load_toml(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(config_file)?;
        let mut config = Self::from_toml_str(&toml_str)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `RRUD_UD_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        env_override("TX_QUEUE_LEN", &mut self.tx_queue_len)?;
        env_override("TX_MODERATION", &mut self.tx_moderation)?;
        env_override("TX_BUFS", &mut self.tx_bufs)?;
        env_override("RX_QUEUE_LEN", &mut self.rx_queue_len)?;
        env_override("RX_MAX_BATCH", &mut self.rx_max_batch)?;
        env_override("RX_MAX_POLL", &mut self.rx_max_poll)?;
        env_override("ASYNC_MAX_POLL", &mut self.async_max_poll)?;
        env_override("RX_BUFS", &mut self.rx_bufs)?;
        env_override("SEG_SIZE", &mut self.seg_size)?;
        env_override("ADDRESSING", &mut self.addressing)?;
        env_override("CHECK_GRH_DGID", &mut self.check_grh_dgid)?;
        env_override("RX_MIN_LEN", &mut self.rx_min_len)?;
        Ok(())
    }

    /// Check that all fields are within their bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Send completions identify entries by a 16-bit counter, so no more
        // than half of its range may be outstanding.
        if !self.tx_queue_len.is_power_of_two()
            || (self.tx_queue_len as usize) < MAX_WQE_BBS
            || self.tx_queue_len > 1 << 15
        {
            return Err(ConfigError::invalid(
                "tx_queue_len",
                format!(
                    "{} is not a power of two in [{}, {}]",
                    self.tx_queue_len,
                    MAX_WQE_BBS,
                    1 << 15
                ),
            ));
        }
        if self.tx_moderation == 0 {
            return Err(ConfigError::invalid("tx_moderation", "must be positive"));
        }
        if self.tx_bufs == 0 {
            return Err(ConfigError::invalid("tx_bufs", "must be positive"));
        }
        if !self.rx_queue_len.is_power_of_two() || self.rx_queue_len > 1 << 15 {
            return Err(ConfigError::invalid(
                "rx_queue_len",
                format!("{} is not a power of two up to {}", self.rx_queue_len, 1 << 15),
            ));
        }
        if self.rx_max_batch == 0 || self.rx_max_batch > self.rx_queue_len {
            return Err(ConfigError::invalid(
                "rx_max_batch",
                format!("{} is not in [1, rx_queue_len]", self.rx_max_batch),
            ));
        }
        if self.rx_max_poll == 0 {
            return Err(ConfigError::invalid("rx_max_poll", "must be positive"));
        }
        if self.async_max_poll == 0 {
            return Err(ConfigError::invalid("async_max_poll", "must be positive"));
        }
        if self.rx_bufs == 0 {
            return Err(ConfigError::invalid("rx_bufs", "must be positive"));
        }
        if (self.seg_size as usize) <= MAX_INLINE.max(GRH_SIZE + self.rx_min_len as usize) {
            return Err(ConfigError::invalid(
                "seg_size",
                format!(
                    "{} cannot hold more than an inline send or the minimum packet",
                    self.seg_size
                ),
            ));
        }
        Ok(())
    }

    /// Receive queue occupancy below which the progress loop posts a new
    /// batch: replenish once at least one full batch of slots is free.
    #[inline]
    pub fn rx_replenish_threshold(&self) -> u32 {
        self.rx_queue_len - self.rx_max_batch + 1
    }
}
