use serde::Serialize;

/// Interface counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IfaceStats {
    /// Send completion entries harvested.
    pub tx_completions: u64,

    /// Sends retired, including implicitly completed ones.
    pub tx_retired: u64,

    /// Sends rejected for lack of credit or send buffers.
    pub tx_no_resource: u64,

    /// Receive completion entries harvested.
    pub rx_completions: u64,

    /// Received packets dropped by validation.
    pub rx_dropped: u64,

    /// Received packets the dispatcher kept.
    pub rx_held: u64,

    /// Receive buffers posted.
    pub rx_posted: u64,

    pub short_ops: u64,
    pub short_bytes: u64,
    pub bcopy_ops: u64,
    pub bcopy_bytes: u64,
    pub zcopy_ops: u64,
    pub zcopy_bytes: u64,
    pub ctl_ops: u64,

    /// Zero-copy completions delivered.
    pub zcopy_completions: u64,
}
