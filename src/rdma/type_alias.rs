/// [`u16`]: **Local identifier (LID)**, identifies a port on a switch or an HCA in the cluster.
pub type Lid = u16;

/// [`u32`]: **Queue pair number**, identifies a local queue pair.
pub type Qpn = u32;

/// [`u32`]: **Queue key**, identifies a unreliable datagram queue pair.
pub type QKey = u32;

/// [`u32`]: **Local key**, identifies a local memory region.
pub type LKey = u32;

/// [`u16`]: **Work queue entry index**, the wrapping hardware counter a
/// completion carries to identify the work queue entry it completes.
pub type WqeIdx = u16;

/// [`u64`]: **Sequence number**, identifies a send posted to a transmit queue.
/// Sequence numbers never wrap and grow monotonically with every post.
pub type Sn = u64;
