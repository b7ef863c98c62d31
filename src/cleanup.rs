//! Deferred actions run when a pool goes away.
//!
//! A [`Cleanup`] record pairs a [`Handler`] with a block of pool memory holding the
//! handler's data. Records are kept newest first and each handler runs at most once:
//! either early, through [`Pool::run_cleanup_file`](crate::Pool::run_cleanup_file),
//! or when the pool is reset or dropped.

use std::{ffi::{CStr, c_char}, io, ptr::NonNull};

use crate::{
    file::{self, FileHandle},
    list::node_size,
    log::Diagnostics,
};

/// Bytes the pool must bump-allocate to register one cleanup record.
pub(crate) const CLEANUP_RECORD_SIZE: usize = node_size::<Cleanup>();

/// Signature of a caller-provided cleanup action. `data` is the memory reserved by
/// [`Pool::cleanup_add`](crate::Pool::cleanup_add), `None` when no data was asked for.
pub type CleanupFn = unsafe fn(data: Option<NonNull<u8>>, log: &Diagnostics);

/// What a cleanup record does when it runs.
#[derive(Debug, Clone, Copy)]
pub enum Handler {
    /// Calls the given function with the record's data.
    Custom(CleanupFn),
    /// Closes the file described by the [`CleanupFile`] in the record's data.
    CloseFile,
    /// Removes the file described by the [`CleanupFile`] in the record's data, then
    /// closes it.
    DeleteFile,
}

impl Handler {
    /// # Safety
    /// `data` must hold what this handler expects.
    unsafe fn run(self, data: Option<NonNull<u8>>, log: &Diagnostics) {
        match self {
            Handler::Custom(f) => unsafe { f(data, log) },
            Handler::CloseFile => {
                if let Some(file) = data {
                    close(unsafe { file.cast::<CleanupFile>().as_ref() }, log);
                }
            }
            Handler::DeleteFile => {
                if let Some(file) = data {
                    delete_and_close(unsafe { file.cast::<CleanupFile>().as_ref() }, log);
                }
            }
        }
    }
}

/// A deferred action registered on a pool.
#[derive(Debug)]
pub struct Cleanup {
    handler: Option<Handler>,
    data: Option<NonNull<u8>>,
}

impl Cleanup {
    pub(crate) fn new(data: Option<NonNull<u8>>) -> Self {
        Self { handler: None, data }
    }

    /// Memory reserved for the handler, owned by the pool.
    #[inline]
    pub fn data(&self) -> Option<NonNull<u8>> {
        self.data
    }

    #[inline]
    pub fn handler(&self) -> Option<Handler> {
        self.handler
    }

    /// Installs the action to run.
    ///
    /// # Safety
    /// For [`Handler::CloseFile`] and [`Handler::DeleteFile`], [`Cleanup::data`] must
    /// hold an initialised [`CleanupFile`]. For [`Handler::Custom`], the function must
    /// be sound to call with [`Cleanup::data`] when the record runs.
    pub unsafe fn set_handler(&mut self, handler: Handler) {
        self.handler = Some(handler);
    }

    /// Prevents the record from running.
    pub fn disable(&mut self) {
        self.handler = None;
    }

    /// Runs the handler unless it already ran or was disabled.
    pub(crate) fn run(&mut self, log: &Diagnostics) {
        if let Some(handler) = self.handler.take() {
            tracing::debug!(parent: log.span(), record = ?(self as *const Self), "run cleanup");

            unsafe { handler.run(self.data, log) }
        }
    }

    /// The file this record closes, if it runs the close handler.
    pub(crate) fn closes(&self) -> Option<&CleanupFile> {
        match (self.handler, self.data) {
            (Some(Handler::CloseFile), Some(data)) => Some(unsafe { data.cast::<CleanupFile>().as_ref() }),
            _ => None,
        }
    }
}

/// Data of the built-in file handlers.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CleanupFile {
    fd: FileHandle,
    name: NonNull<c_char>,
}

impl CleanupFile {
    /// # Safety
    /// `name` must point to a NUL-terminated string that outlives the record, which
    /// is the case when it is allocated from the same pool.
    pub unsafe fn new(fd: FileHandle, name: NonNull<c_char>) -> Self {
        Self { fd, name }
    }

    #[inline]
    pub fn fd(&self) -> FileHandle {
        self.fd
    }

    pub fn name(&self) -> &CStr {
        unsafe { CStr::from_ptr(self.name.as_ptr()) }
    }
}

/// Closes the file. Failures are logged, never returned.
pub fn close(file: &CleanupFile, log: &Diagnostics) {
    tracing::debug!(parent: log.span(), fd = ?file.fd, "file cleanup");

    if let Err(err) = file::close_file(file.fd) {
        tracing::error!(parent: log.span(), name = ?file.name(), error = %err, "close() failed");
    }
}

/// Removes the file, tolerating that it is already gone, then closes it.
/// Failures are logged, never returned.
pub fn delete_and_close(file: &CleanupFile, log: &Diagnostics) {
    tracing::debug!(parent: log.span(), fd = ?file.fd, name = ?file.name(), "file cleanup");

    match file::delete_file(file.name()) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            tracing::error!(parent: log.span(), name = ?file.name(), error = %err, "unlink() failed");
        }
        _ => {}
    }

    close(file, log);
}
