//! Snapshot of a pool's bookkeeping.

use std::fmt;

/// What a pool currently holds. Produced by [`Pool::stats`](crate::Pool::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks in the chain, the first one included.
    pub blocks: usize,
    /// Index of the first block new small allocations are tried against.
    pub current: usize,
    /// Bytes handed out from the blocks, alignment padding included.
    pub used_bytes: usize,
    /// Bytes still free in the blocks.
    pub unused_bytes: usize,
    /// Large allocations currently live.
    pub large_live: usize,
    /// Large records, live or waiting to be reused.
    pub large_records: usize,
    /// Registered cleanup records.
    pub cleanups: usize,
}

impl PoolStats {
    /// Total capacity of the block chain.
    pub fn capacity(&self) -> usize {
        self.used_bytes + self.unused_bytes
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks ({} used, {} unused), {}/{} large, {} cleanups",
            self.blocks,
            self.used_bytes,
            self.unused_bytes,
            self.large_live,
            self.large_records,
            self.cleanups
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary() {
        let stats = PoolStats {
            blocks: 2,
            current: 0,
            used_bytes: 100,
            unused_bytes: 28,
            large_live: 1,
            large_records: 3,
            cleanups: 0,
        };

        assert_eq!(128, stats.capacity());
        assert_eq!("2 blocks (100 used, 28 unused), 1/3 large, 0 cleanups", stats.to_string());
    }
}
