//! Filesystem primitives used by the built-in cleanup handlers.

use std::{ffi::CStr, io};

/// Native handle of an open file.
#[cfg(unix)]
pub type FileHandle = std::os::fd::RawFd;

/// Native handle of an open file.
#[cfg(windows)]
pub type FileHandle = std::os::windows::io::RawHandle;

/// Closes `fd`. The handle is gone afterwards even if an error is reported.
#[cfg(unix)]
pub fn close_file(fd: FileHandle) -> io::Result<()> {
    match unsafe { libc::close(fd) } {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

/// Removes the file called `name`.
#[cfg(unix)]
pub fn delete_file(name: &CStr) -> io::Result<()> {
    match unsafe { libc::unlink(name.as_ptr()) } {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

/// Closes `fd`. The handle is gone afterwards even if an error is reported.
#[cfg(windows)]
pub fn close_file(fd: FileHandle) -> io::Result<()> {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};

    unsafe { CloseHandle(HANDLE(fd)).map_err(|_| io::Error::last_os_error()) }
}

/// Removes the file called `name`.
#[cfg(windows)]
pub fn delete_file(name: &CStr) -> io::Result<()> {
    use windows::{Win32::Storage::FileSystem::DeleteFileA, core::PCSTR};

    unsafe { DeleteFileA(PCSTR(name.as_ptr().cast())).map_err(|_| io::Error::last_os_error()) }
}
