//! A temporary file removed and closed together with the pool that created it.

#[cfg(unix)]
fn main() {
    use std::{ffi::CString, fs::File, os::fd::IntoRawFd, os::unix::ffi::OsStrExt};

    use poolalloc::{Diagnostics, Pool};

    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let path = std::env::temp_dir().join(format!("poolalloc-{}.tmp", std::process::id()));
    let fd = File::create(&path).expect("create temp file").into_raw_fd();
    let name = CString::new(path.as_os_str().as_bytes()).expect("path without NUL");

    let mut pool = Pool::new(4096, Diagnostics::new("upload")).expect("pool");
    pool.cleanup_add_file(fd, &name, true).expect("register cleanup");

    println!("{} exists: {}", path.display(), path.exists());
    pool.destroy();
    println!("{} exists: {}", path.display(), path.exists());
}

#[cfg(not(unix))]
fn main() {
    println!("This example only runs on unix");
}
