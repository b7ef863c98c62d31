//! # poolalloc
//!
//! A region allocator: a [`Pool`] serves many small allocations and a few large
//! ones, and everything is released at once when the pool is reset or dropped.
//! Pools fit request or session scoped work, e.g. one pool per incoming request.
//!
//! The pool also owns deferred cleanups for resources that are not memory, such as
//! open files or temporary files, which run when the pool goes away.
//!
//! ```text
//!   Pool::allocate(size)
//!         |
//!         +-- size <= max --> bump from the block chain (grows by one block if full)
//!         |
//!         +-- size >  max --> provider allocation, tracked as a large record
//! ```
//!
//! # Example
//! ```
//! use poolalloc::{Diagnostics, Pool};
//!
//! let mut pool = Pool::new(4096, Diagnostics::new("request")).unwrap();
//!
//! let header = pool.allocate(64).unwrap();
//! let body = pool.allocate(64 * 1024).unwrap(); // Too big for a block.
//!
//! assert!(pool.contains(header.as_ptr()));
//! assert!(!pool.contains(body.as_ptr()));
//!
//! // Large allocations can be given back early, block memory can't.
//! assert!(pool.free(body));
//! assert!(!pool.free(header));
//!
//! pool.destroy();
//! ```
//!
//! Pointers handed out by a pool are raw: they stay valid until the pool is reset or
//! dropped (or, for large allocations, freed), and it is up to the caller not to use
//! them past that point. A pool is not synchronised; share it behind a lock if needed.

mod block;
pub mod cleanup;
pub mod config;
mod error;
pub mod file;
pub mod kernel;
mod large;
mod list;
mod log;
mod pool;
mod stats;
mod utils;

pub use block::ALIGNMENT;
pub use cleanup::{Cleanup, CleanupFile, CleanupFn, Handler};
pub use config::{DEFAULT_POOL_SIZE, MIN_POOL_SIZE, POOL_ALIGNMENT, PoolConfig};
pub use error::{PoolError, PoolResult};
pub use file::FileHandle;
pub use kernel::{RawMemory, System, Tracked, Usage};
pub use log::Diagnostics;
pub use pool::Pool;
pub use stats::PoolStats;
