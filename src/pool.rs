//! The pool: a region allocator released all at once.
//!
//! Small requests (up to [`Pool::max`]) are bump-allocated from a chain of blocks
//! of equal size. Bigger requests, and every request with an explicit alignment,
//! go straight to the [`RawMemory`] provider and are tracked in a list of large
//! records so they can be freed early, reset or dropped with the pool.
//!
//! ```text
//!        Pool
//! +----------------+      blocks (Vec, chain order)
//! | blocks  -------|----> +-------+ +-------+ +-------+
//! | current = 1    |      | Block | | Block | | Block |
//! | large   ---+   |      +-------+ +-------+ +-------+
//! | cleanup ---|-+ |        ^ records live in block memory
//! +------------|-|-+        |
//!              | +--------> Cleanup -> Cleanup -> None
//!              +----------> Large -> Large -> Large -> None
//!                             |
//!                             v
//!                       provider memory
//! ```
//!
//! The bookkeeping records of both side lists are bump-allocated from the pool
//! itself. Every pointer handed out stays valid until it is freed (large ones only),
//! the pool is reset, or the pool is dropped.

use std::{ffi::CStr, fmt, mem, ptr::NonNull};

use crate::{
    block::Block,
    cleanup::{CLEANUP_RECORD_SIZE, Cleanup, CleanupFile, Handler},
    config::{POOL_ALIGNMENT, PoolConfig},
    error::{PoolError, PoolResult},
    file::FileHandle,
    kernel::{self, RawMemory, System},
    large::{LARGE_RECORD_SIZE, Large},
    list::List,
    log::Diagnostics,
    stats::PoolStats,
};

/// A region allocator. See the [module documentation](self).
///
/// The pool is not synchronised: it can be moved to another thread but not shared.
pub struct Pool<M: RawMemory = System> {
    /// Chain of blocks. The first one is created with the pool.
    blocks: Vec<Block>,
    /// First block small allocations are tried against.
    current: usize,
    /// Largest request served from the blocks.
    max: usize,
    large: List<Large>,
    cleanup: List<Cleanup>,
    config: PoolConfig,
    memory: M,
    log: Diagnostics,
}

// All the memory reachable from a pool is exclusively owned by it, and cleanup
// handlers are plain functions, so moving a pool moves everything with it.
unsafe impl<M: RawMemory + Send> Send for Pool<M> {}

impl Pool<System> {
    /// Creates a pool whose blocks are `size` bytes, backed by the [`System`] provider.
    pub fn new(size: usize, log: Diagnostics) -> PoolResult<Self> {
        Self::with_config(PoolConfig::new(size), log)
    }

    /// Creates a pool from `config`, backed by the [`System`] provider.
    pub fn with_config(config: PoolConfig, log: Diagnostics) -> PoolResult<Self> {
        Self::with_memory(config, log, System)
    }
}

impl<M: RawMemory> Pool<M> {
    /// Creates a pool from `config` on top of `memory`.
    ///
    /// The first block is requested right away; failing to get it fails the creation.
    pub fn with_memory(config: PoolConfig, log: Diagnostics, memory: M) -> PoolResult<Self> {
        config.validate()?;

        let size = config.size;
        let start = kernel::memalign(&memory, POOL_ALIGNMENT, size, &log)
            .ok_or(PoolError::OutOfMemory { size })?;

        let max = config.max_alloc(memory.page_size());

        tracing::debug!(parent: log.span(), ptr = ?start, size, max, "create pool");

        Ok(Self {
            blocks: vec![Block::new(start, size)],
            current: 0,
            max,
            large: List::new(),
            cleanup: List::new(),
            config,
            memory,
            log,
        })
    }

    /// Allocates `size` bytes aligned to the word size of the computer.
    /// The content is uninitialised.
    pub fn allocate(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        if size <= self.max {
            return self.allocate_small(size, true);
        }

        self.allocate_large(size)
    }

    /// Allocates `size` bytes without any alignment padding. Meant for byte data
    /// such as strings.
    pub fn allocate_unaligned(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        if size <= self.max {
            return self.allocate_small(size, false);
        }

        self.allocate_large(size)
    }

    /// Same as [`Pool::allocate`], with the `size` bytes zero filled.
    pub fn allocate_zeroed(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let p = self.allocate(size)?;

        unsafe { p.as_ptr().write_bytes(0, size) };

        Ok(p)
    }

    /// Allocates `size` bytes whose address is a multiple of `alignment`, whatever
    /// the size. The memory comes from the provider and can be given back with
    /// [`Pool::free`].
    pub fn allocate_aligned(&mut self, size: usize, alignment: usize) -> PoolResult<NonNull<u8>> {
        if !alignment.is_power_of_two() {
            return Err(PoolError::InvalidAlignment { alignment });
        }

        // The provider wants at least pointer alignment.
        let alignment = alignment.max(mem::size_of::<*const u8>());

        let p = kernel::memalign(&self.memory, alignment, size, &self.log)
            .ok_or(PoolError::OutOfMemory { size })?;

        self.track_large(p)
    }

    /// Gives a large allocation back to the provider before the pool goes away.
    ///
    /// Returns `false` when `p` is not a live large allocation of this pool, e.g.
    /// when it was bump-allocated from a block; those are only released with the pool.
    pub fn free(&mut self, p: NonNull<u8>) -> bool {
        if !self.large.forget(p) {
            return false;
        }

        tracing::trace!(parent: self.log.span(), ptr = ?p, "free");

        unsafe { self.memory.free(p) };

        true
    }

    /// Registers a cleanup record with `size` bytes of data allocated from the pool.
    ///
    /// The record does nothing until a handler is installed with
    /// [`Cleanup::set_handler`]. Records run newest first.
    pub fn cleanup_add(&mut self, size: usize) -> PoolResult<&mut Cleanup> {
        let data = match size {
            0 => None,
            _ => Some(self.allocate(size)?),
        };

        self.push_cleanup(data)
    }

    /// Registers the built-in file handler for `fd`: closing it, or with `delete`
    /// removing `name` first. `name` is copied into the pool.
    pub fn cleanup_add_file(&mut self, fd: FileHandle, name: &CStr, delete: bool) -> PoolResult<&mut Cleanup> {
        let bytes = name.to_bytes_with_nul();
        let copy = self.allocate_unaligned(bytes.len())?;
        let data = self.allocate(mem::size_of::<CleanupFile>())?;

        unsafe {
            copy.as_ptr().copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            data.cast::<CleanupFile>().write(CleanupFile::new(fd, copy.cast()));
        }

        let cleanup = self.push_cleanup(Some(data))?;
        let handler = if delete { Handler::DeleteFile } else { Handler::CloseFile };

        unsafe { cleanup.set_handler(handler) };

        Ok(cleanup)
    }

    /// Closes `fd` right away if a close-file cleanup is registered for it, so it
    /// is not closed again when the pool goes away.
    pub fn run_cleanup_file(&mut self, fd: FileHandle) {
        let log = &self.log;

        for cleanup in self.cleanup.iter_mut() {
            if cleanup.closes().is_some_and(|file| file.fd() == fd) {
                cleanup.run(log);
                return;
            }
        }
    }

    /// Makes every block fully available again and releases every large allocation.
    ///
    /// Pending cleanup handlers run first (newest first) since their records live in
    /// the blocks being recycled. Blocks are kept, so a pool reset between requests
    /// does not go back to the provider for small allocations.
    pub fn reset(&mut self) {
        tracing::debug!(parent: self.log.span(), blocks = self.blocks.len(), "reset pool");

        self.run_cleanups();
        self.release_large();

        for block in &mut self.blocks {
            block.rewind();
        }

        self.current = 0;
    }

    /// Runs the cleanups and releases everything. Same as dropping the pool.
    pub fn destroy(self) {
        drop(self)
    }

    /// Largest request served from the blocks.
    #[inline]
    pub fn max(&self) -> usize {
        self.max
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.log
    }

    /// Whether `p` points inside one of the pool's blocks.
    pub fn contains(&self, p: *const u8) -> bool {
        self.blocks.iter().any(|block| block.contains(p))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            blocks: self.blocks.len(),
            current: self.current,
            used_bytes: self.blocks.iter().map(Block::used).sum(),
            unused_bytes: self.blocks.iter().map(Block::unused).sum(),
            large_live: self.large.live(),
            large_records: self.large.len(),
            cleanups: self.cleanup.len(),
        }
    }

    /// Bump-allocates from the first block, starting at `current`, with room left.
    fn allocate_small(&mut self, size: usize, aligned: bool) -> PoolResult<NonNull<u8>> {
        for block in &mut self.blocks[self.current..] {
            if let Some(p) = block.bump(size, aligned) {
                return Ok(p);
            }
        }

        self.allocate_block(size)
    }

    /// Appends a new block, as big as the first one, and allocates `size` from it.
    ///
    /// Every block the request went past gets a failure; blocks with too many
    /// failures are skipped by the next requests.
    fn allocate_block(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let psize = self.config.size;

        let start = kernel::memalign(&self.memory, POOL_ALIGNMENT, psize, &self.log)
            .ok_or(PoolError::OutOfMemory { size: psize })?;

        let mut block = Block::new(start, psize);

        let Some(p) = block.bump(size, true) else {
            unsafe { self.memory.free(start) };
            return Err(PoolError::OutOfMemory { size });
        };

        let tail = self.blocks.len() - 1;

        for index in self.current..tail {
            let failed = &mut self.blocks[index].failed;

            if *failed > self.config.failure_threshold {
                self.current = index + 1;
            }

            *failed += 1;
        }

        tracing::trace!(
            parent: self.log.span(),
            ptr = ?start,
            blocks = self.blocks.len() + 1,
            current = self.current,
            "new block"
        );

        self.blocks.push(block);

        Ok(p)
    }

    /// Allocates `size` bytes from the provider and keeps track of them.
    fn allocate_large(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let p = kernel::alloc(&self.memory, size, &self.log).ok_or(PoolError::OutOfMemory { size })?;

        if self.large.reuse(p, self.config.large_reuse_scan) {
            return Ok(p);
        }

        self.track_large(p)
    }

    /// Links a new large record for `p`. If the record can't be allocated, `p` is
    /// given back to the provider.
    fn track_large(&mut self, p: NonNull<u8>) -> PoolResult<NonNull<u8>> {
        let record = match self.allocate_small(LARGE_RECORD_SIZE, true) {
            Ok(record) => record,
            Err(err) => {
                unsafe { self.memory.free(p) };
                return Err(err);
            }
        };

        unsafe { self.large.push(Large { alloc: Some(p) }, record) };

        Ok(p)
    }

    fn push_cleanup(&mut self, data: Option<NonNull<u8>>) -> PoolResult<&mut Cleanup> {
        let record = self.allocate_small(CLEANUP_RECORD_SIZE, true)?;
        let node = unsafe { self.cleanup.push(Cleanup::new(data), record) };

        tracing::debug!(parent: self.log.span(), record = ?node, "add cleanup");

        Ok(unsafe { &mut (*node.as_ptr()).data })
    }

    fn run_cleanups(&mut self) {
        let log = &self.log;

        for cleanup in self.cleanup.iter_mut() {
            cleanup.run(log);
        }

        self.cleanup.clear();
    }

    fn release_large(&mut self) {
        let (log, memory) = (&self.log, &self.memory);

        for p in self.large.take_live() {
            tracing::trace!(parent: log.span(), ptr = ?p, "free");

            unsafe { memory.free(p) };
        }

        self.large.clear();
    }
}

impl<M: RawMemory> Drop for Pool<M> {
    fn drop(&mut self) {
        self.run_cleanups();
        self.release_large();

        let (log, memory) = (&self.log, &self.memory);

        for block in self.blocks.drain(..) {
            tracing::debug!(parent: log.span(), ptr = ?block.start(), unused = block.unused(), "free");

            unsafe { memory.free(block.start()) };
        }
    }
}

impl<M: RawMemory> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("max", &self.max)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::ALIGNMENT, kernel::Tracked};

    fn pool(size: usize) -> Pool<Tracked> {
        Pool::with_memory(PoolConfig::new(size), Diagnostics::disabled(), Tracked::new()).unwrap()
    }

    #[test]
    fn create_sets_max() {
        let small = pool(1024);
        assert_eq!(1024, small.max());

        let big = pool(64 * 1024);
        assert_eq!(kernel::page_size() - 1, big.max());
        assert_eq!(1, big.block_count());
        assert_eq!(1, big.memory().usage().live);
    }

    #[test]
    fn create_fails_without_memory() {
        let result = Pool::with_memory(PoolConfig::new(4096), Diagnostics::disabled(), Tracked::with_budget(100));
        assert_eq!(Some(PoolError::OutOfMemory { size: 4096 }), result.err());
    }

    #[test]
    fn small_allocations_come_from_the_first_block() {
        let mut pool = pool(4096);

        let a = pool.allocate(10).unwrap();
        let b = pool.allocate(10).unwrap();

        assert!(pool.contains(a.as_ptr()));
        assert!(pool.contains(b.as_ptr()));
        assert_eq!(0, a.as_ptr() as usize % ALIGNMENT);
        assert_eq!(0, b.as_ptr() as usize % ALIGNMENT);
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 10);
        assert_eq!(1, pool.block_count());
    }

    #[test]
    fn unaligned_allocations_are_packed() {
        let mut pool = pool(4096);

        let a = pool.allocate_unaligned(3).unwrap();
        let b = pool.allocate_unaligned(3).unwrap();

        assert_eq!(3, b.as_ptr() as usize - a.as_ptr() as usize);
    }

    #[test]
    fn zeroed_allocation() {
        let mut pool = pool(4096);

        let dirty = pool.allocate(64).unwrap();
        unsafe { dirty.as_ptr().write_bytes(0xFF, 64) };
        pool.reset();

        let p = pool.allocate_zeroed(64).unwrap();
        assert_eq!(dirty, p);

        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn full_block_grows_the_chain() {
        let mut pool = pool(4096);

        pool.allocate(3000).unwrap();
        let p = pool.allocate(2000).unwrap();

        assert_eq!(2, pool.block_count());
        assert!(pool.blocks[1].contains(p.as_ptr()));
        assert_eq!(2, pool.memory().usage().live);

        // The tail block is not counted when the chain grows past it.
        assert_eq!(0, pool.blocks[0].failed);

        pool.allocate(3000).unwrap();
        assert_eq!(3, pool.block_count());
        assert_eq!(1, pool.blocks[0].failed);
        assert_eq!(0, pool.blocks[1].failed);
    }

    #[test]
    fn exhausted_blocks_are_skipped() {
        let mut pool = Pool::with_memory(
            PoolConfig::new(1024).with_failure_threshold(1),
            Diagnostics::disabled(),
            Tracked::new(),
        )
        .unwrap();

        // Every request fills a block, so every growth passes over all older ones.
        for _ in 0..6 {
            pool.allocate(1000).unwrap();
        }

        // Block 0 went past the threshold first, then block 1.
        assert_eq!(6, pool.block_count());
        assert_eq!(2, pool.stats().current);

        pool.reset();
        assert_eq!(0, pool.stats().current);
        assert!(pool.blocks.iter().all(|block| block.failed == 0));
    }

    #[test]
    fn failed_growth_is_reported() {
        let mut pool = pool(1024);
        pool.allocate(1000).unwrap();

        let live = pool.memory().usage().live_bytes;
        pool.memory.set_budget(Some(live));

        assert_eq!(Err(PoolError::OutOfMemory { size: 1024 }), pool.allocate(100));
        assert_eq!(1, pool.block_count());
    }

    #[test]
    fn large_allocation_bypasses_blocks() {
        let mut pool = pool(4096);

        let p = pool.allocate(5000).unwrap();

        assert!(!pool.contains(p.as_ptr()));
        assert_eq!(1, pool.stats().large_live);
        assert_eq!(2, pool.memory().usage().live);
    }

    #[test]
    fn free_releases_large_allocation_and_keeps_slot() {
        let mut pool = pool(4096);

        let p = pool.allocate(5000).unwrap();
        assert!(pool.free(p));
        assert!(!pool.free(p));

        let stats = pool.stats();
        assert_eq!(0, stats.large_live);
        assert_eq!(1, stats.large_records);
        assert_eq!(1, pool.memory().usage().live);

        // The emptied record is reused rather than a new one made.
        pool.allocate(6000).unwrap();
        assert_eq!(1, pool.stats().large_records);
    }

    #[test]
    fn free_declines_block_memory() {
        let mut pool = pool(4096);

        let p = pool.allocate(100).unwrap();
        assert!(!pool.free(p));
    }

    #[test]
    fn reuse_scan_is_bounded() {
        let mut pool = Pool::with_memory(
            PoolConfig::new(4096).with_large_reuse_scan(1),
            Diagnostics::disabled(),
            Tracked::new(),
        )
        .unwrap();

        let oldest = pool.allocate(5000).unwrap();
        pool.allocate(5000).unwrap();
        assert!(pool.free(oldest));

        // The empty record is second in the list, out of reach of the scan.
        pool.allocate(5000).unwrap();
        assert_eq!(3, pool.stats().large_records);
    }

    #[test]
    fn large_failure_leaks_nothing() {
        let mut pool = pool(4096);
        let live = pool.memory().usage().live_bytes;
        pool.memory.set_budget(Some(live + 4000));

        assert_eq!(Err(PoolError::OutOfMemory { size: 5000 }), pool.allocate(5000));
        assert_eq!(0, pool.stats().large_records);
    }

    const MIN: usize = crate::MIN_POOL_SIZE;

    #[test]
    fn failed_record_releases_raw_memory() {
        let mut pool = Pool::with_memory(PoolConfig::new(MIN), Diagnostics::disabled(), Tracked::new()).unwrap();
        let base = pool.memory().usage().live_bytes;

        // Fill the only block so the record needs a new one, then leave room for
        // the large allocation but not for a block.
        pool.allocate(MIN).unwrap();
        pool.memory.set_budget(Some(base + 100));

        assert_eq!(Err(PoolError::OutOfMemory { size: MIN }), pool.allocate_aligned(100, 64));
        assert_eq!(base, pool.memory().usage().live_bytes);
    }

    #[test]
    fn aligned_allocation() {
        let mut pool = pool(4096);

        for alignment in [1, 2, 64, 256, 8192] {
            let p = pool.allocate_aligned(10, alignment).unwrap();

            assert_eq!(0, p.as_ptr() as usize % alignment);
            assert!(!pool.contains(p.as_ptr()));
        }

        assert_eq!(5, pool.stats().large_live);
        assert_eq!(Err(PoolError::InvalidAlignment { alignment: 24 }), pool.allocate_aligned(10, 24));
    }

    #[test]
    fn reset_releases_large_and_rewinds_blocks() {
        let mut pool = pool(4096);

        let first = pool.allocate(3000).unwrap();
        pool.allocate(3000).unwrap();
        pool.allocate(5000).unwrap();
        pool.allocate_aligned(16, 64).unwrap();

        pool.reset();

        let stats = pool.stats();
        assert_eq!(2, stats.blocks);
        assert_eq!(0, stats.used_bytes);
        assert_eq!(0, stats.large_records);
        assert_eq!(2, pool.memory().usage().live);

        assert_eq!(first, pool.allocate(3000).unwrap());
        pool.allocate(3000).unwrap();
        assert_eq!(2, pool.block_count());
    }

    #[test]
    fn cleanup_data_lives_in_the_pool() {
        let mut pool = pool(4096);

        let cleanup = pool.cleanup_add(32).unwrap();
        let data = cleanup.data().unwrap();
        assert!(cleanup.handler().is_none());
        assert!(pool.contains(data.as_ptr()));

        assert!(pool.cleanup_add(0).unwrap().data().is_none());
        assert_eq!(2, pool.stats().cleanups);
    }

    #[cfg(unix)]
    #[test]
    fn early_file_cleanup_is_disabled() {
        let mut fds = [0; 2];
        assert_eq!(0, unsafe { libc::pipe(fds.as_mut_ptr()) });

        let mut pool = pool(4096);
        pool.cleanup_add_file(fds[1], c"pipe", false).unwrap();
        assert!(pool.cleanup.iter().all(|c| c.closes().is_some()));

        pool.run_cleanup_file(fds[1]);
        assert!(pool.cleanup.iter().all(|c| c.handler().is_none()));
        assert_eq!(1, pool.stats().cleanups);

        unsafe { libc::close(fds[0]) };
    }

    #[test]
    fn drop_releases_everything() {
        let memory = Tracked::new();
        let usage = {
            let mut pool = Pool::with_memory(PoolConfig::new(1024), Diagnostics::disabled(), &memory).unwrap();

            for _ in 0..10 {
                pool.allocate(700).unwrap();
            }
            pool.allocate(10_000).unwrap();
            pool.allocate_aligned(10, 4096).unwrap();
            pool.cleanup_add(2000).unwrap();

            memory.usage()
        };

        assert_eq!(10 + 2 + 1, usage.live);
        assert_eq!(0, memory.usage().live);
    }

    #[test]
    fn debug_format() {
        let pool = pool(1024);
        let debug = format!("{pool:?}");

        assert!(debug.contains("Pool"));
        assert!(debug.contains("max"));
    }
}
