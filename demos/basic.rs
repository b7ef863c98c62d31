use std::ptr::NonNull;

use poolalloc::{Diagnostics, Pool};

fn log_alloc(pool: &Pool, addr: NonNull<u8>, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?} (in a block: {})", pool.contains(addr.as_ptr()));
}

fn main() {
    let mut pool = Pool::new(4096, Diagnostics::disabled()).expect("pool");

    let addr1 = pool.allocate(3000).expect("first allocation");
    log_alloc(&pool, addr1, 3000);

    // Does not fit what is left of the first block, a second one is added.
    let addr2 = pool.allocate(2000).expect("second allocation");
    log_alloc(&pool, addr2, 2000);

    // Bigger than any block can serve, so it comes straight from the provider.
    let addr3 = pool.allocate(5000).expect("large allocation");
    log_alloc(&pool, addr3, 5000);

    println!("{}", pool.stats());

    println!("Freeing the large allocation: {}", pool.free(addr3));
    println!("Freeing block memory: {}", pool.free(addr1));

    pool.destroy();
}
