//! One pool per request, reset between requests so the blocks are reused.

use std::slice;

use poolalloc::{Diagnostics, Pool, PoolConfig};
use tracing_subscriber::EnvFilter;

/// Copies `s` into the pool and returns a view of the copy.
///
/// # Safety
/// The view must not outlive the next reset of `pool`.
unsafe fn alloc_str<'a>(pool: &mut Pool, s: &str) -> &'a str {
    let p = pool.allocate_unaligned(s.len()).expect("pool exhausted");

    unsafe {
        p.as_ptr().copy_from_nonoverlapping(s.as_ptr(), s.len());
        std::str::from_utf8_unchecked(slice::from_raw_parts(p.as_ptr(), s.len()))
    }
}

fn handle_request(pool: &mut Pool, request: &str) {
    let parsed: Vec<&str> = request
        .split_whitespace()
        .map(|part| unsafe { alloc_str(pool, part) })
        .collect();

    println!("Processing: {parsed:?}");
    println!("  {}", pool.stats());
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = PoolConfig::new(1024).with_max_alloc(512);
    let mut pool = Pool::with_config(config, Diagnostics::new("connection")).expect("pool");

    for request in ["GET /api/users HTTP/1.1", "POST /api/data HTTP/1.1", "DELETE /api/users/42 HTTP/1.1"] {
        handle_request(&mut pool, request);
        pool.reset();
    }

    println!("Request pool example completed with {} block(s)", pool.block_count());
}
