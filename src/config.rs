//! Pool configuration.

use crate::{
    cleanup::CLEANUP_RECORD_SIZE,
    error::{PoolError, PoolResult},
    large::LARGE_RECORD_SIZE,
    utils::align,
};

/// Size of every block when no other size is given.
pub const DEFAULT_POOL_SIZE: usize = 16 * 1024;

/// Alignment of every block requested from the provider.
pub const POOL_ALIGNMENT: usize = 16;

/// Smallest usable pool: enough room for the bookkeeping of two large allocations,
/// and for the largest bookkeeping record, a cleanup.
pub const MIN_POOL_SIZE: usize = {
    let records = if 2 * LARGE_RECORD_SIZE > CLEANUP_RECORD_SIZE {
        2 * LARGE_RECORD_SIZE
    } else {
        CLEANUP_RECORD_SIZE
    };

    align(records, POOL_ALIGNMENT)
};

/// How many large records are inspected for an empty slot before a new one is made.
pub const DEFAULT_LARGE_REUSE_SCAN: usize = 4;

/// How many times a block may fail to serve a request before scans skip it.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 4;

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Total size of every block in bytes.
    pub size: usize,

    /// Largest request served from the blocks. `None` means one page minus one byte.
    /// The effective value never exceeds [`PoolConfig::size`].
    pub max_alloc: Option<usize>,

    /// Number of large records scanned for a free slot.
    pub large_reuse_scan: usize,

    /// Failures after which a block is skipped by new small allocations.
    pub failure_threshold: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            max_alloc: None,
            large_reuse_scan: DEFAULT_LARGE_REUSE_SCAN,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with blocks of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Sets the block size.
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sets the small allocation ceiling.
    #[must_use]
    pub fn with_max_alloc(mut self, max: usize) -> Self {
        self.max_alloc = Some(max);
        self
    }

    /// Sets how many large records are scanned for reuse.
    #[must_use]
    pub fn with_large_reuse_scan(mut self, records: usize) -> Self {
        self.large_reuse_scan = records;
        self
    }

    /// Sets the failure threshold used to skip exhausted blocks.
    #[must_use]
    pub fn with_failure_threshold(mut self, failures: usize) -> Self {
        self.failure_threshold = failures;
        self
    }

    /// Checks the configuration can back a pool.
    pub fn validate(&self) -> PoolResult<()> {
        if self.size < MIN_POOL_SIZE {
            return Err(PoolError::InvalidConfig(format!(
                "pool size {} is below the minimum of {MIN_POOL_SIZE} bytes",
                self.size
            )));
        }

        if self.max_alloc == Some(0) {
            return Err(PoolError::InvalidConfig("max_alloc must be positive".into()));
        }

        Ok(())
    }

    /// The largest request served from the blocks, given the provider's page size.
    pub fn max_alloc(&self, page_size: usize) -> usize {
        let ceiling = self.max_alloc.unwrap_or(page_size - 1);
        ceiling.min(self.size)
    }
}
