pub mod mem_context;

/// Point-in-time usage counters for the managed segment, header bytes
/// included on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemMetrics {
    pub available: u64,
    pub free: u64,
    pub allocated: u64,
}
