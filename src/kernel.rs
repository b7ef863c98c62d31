use std::{
    cell::RefCell,
    collections::HashMap,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::log::Diagnostics;

/// Virtual memory page size of the computer. This is usually 4096.
/// This value should be a constant, but we can't do that since we
/// don't know the value at compile time. Zero means not computed yet.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// This trait provides an abstraction over the raw memory the pool is built on.
/// The pool itself has nothing to do with the concrete implementations / APIs
/// offered by each platform, it only needs these three primitives.
///
/// Every method reports exhaustion as `None`; the provider never panics and never
/// retries.
pub trait RawMemory {
    /// Request `size` bytes with the platform's default alignment.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Request `size` bytes whose address is a multiple of `alignment`.
    /// `alignment` is a power of two and at least the size of a pointer.
    fn allocate_aligned(&self, alignment: usize, size: usize) -> Option<NonNull<u8>>;

    /// Returns memory obtained from [`RawMemory::allocate`] or
    /// [`RawMemory::allocate_aligned`] back to the provider.
    ///
    /// # Safety
    /// `ptr` must come from this provider and must not be freed twice.
    unsafe fn free(&self, ptr: NonNull<u8>);

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size(&self) -> usize {
        page_size()
    }
}

impl<M: RawMemory + ?Sized> RawMemory for &M {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    fn allocate_aligned(&self, alignment: usize, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate_aligned(alignment, size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        unsafe { (**self).free(ptr) }
    }

    fn page_size(&self) -> usize {
        (**self).page_size()
    }
}

/// The platform allocator: `malloc`/`posix_memalign`/`free` on unix and the
/// process heap on windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

/// Wrapper to calculate the computer's page size once.
#[inline]
pub fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = platform_page_size();
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// Allocates `size` bytes from `memory`, logging exhaustion on `log`.
pub fn alloc<M: RawMemory + ?Sized>(memory: &M, size: usize, log: &Diagnostics) -> Option<NonNull<u8>> {
    let p = memory.allocate(size);

    match p {
        Some(p) => tracing::trace!(parent: log.span(), ptr = ?p, size, "malloc"),
        None => tracing::error!(parent: log.span(), size, "malloc() failed"),
    }

    p
}

/// Same as [`alloc`] but the memory is zero filled.
pub fn calloc<M: RawMemory + ?Sized>(memory: &M, size: usize, log: &Diagnostics) -> Option<NonNull<u8>> {
    let p = alloc(memory, size, log)?;

    unsafe { p.as_ptr().write_bytes(0, size) };

    Some(p)
}

/// Aligned counterpart of [`alloc`].
pub fn memalign<M: RawMemory + ?Sized>(
    memory: &M,
    alignment: usize,
    size: usize,
    log: &Diagnostics,
) -> Option<NonNull<u8>> {
    let p = memory.allocate_aligned(alignment, size);

    match p {
        Some(p) => tracing::trace!(parent: log.span(), ptr = ?p, size, alignment, "memalign"),
        None => tracing::error!(parent: log.span(), size, alignment, "memalign() failed"),
    }

    p
}

#[cfg(unix)]
fn platform_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
}

#[cfg(windows)]
fn platform_page_size() -> usize {
    use std::mem::MaybeUninit;
    use windows::Win32::System::SystemInformation;

    unsafe {
        let mut system_info = MaybeUninit::uninit();
        SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

        system_info.assume_init().dwPageSize as usize
    }
}

#[cfg(unix)]
mod unix {
    use super::{RawMemory, System};

    use std::{os::raw::c_void, ptr::{self, NonNull}};

    impl RawMemory for System {
        fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
            unsafe { NonNull::new(libc::malloc(size).cast()) }
        }

        fn allocate_aligned(&self, alignment: usize, size: usize) -> Option<NonNull<u8>> {
            let mut addr: *mut c_void = ptr::null_mut();

            unsafe {
                match libc::posix_memalign(&mut addr, alignment, size) {
                    0 => NonNull::new(addr.cast()),
                    _ => None,
                }
            }
        }

        unsafe fn free(&self, ptr: NonNull<u8>) {
            unsafe { libc::free(ptr.as_ptr().cast()) }
        }
    }
}

#[cfg(windows)]
mod win32 {
    use super::{RawMemory, System};

    use std::{mem, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::Memory;

    use crate::utils::{align_ptr, checked_align};

    /// The process heap has no aligned allocation primitive, so every block is
    /// over-allocated and the original address is stored right before the one we
    /// hand out:
    ///
    /// ```text
    /// +---------+-------------+---------------------------+
    /// | padding | raw address |        user memory        |
    /// +---------+-------------+---------------------------+
    ///                         ^ aligned
    /// ```
    const HEADER: usize = mem::size_of::<usize>();

    impl RawMemory for System {
        fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
            // Same guarantee as `HeapAlloc` on 64-bit targets.
            self.allocate_aligned(2 * HEADER, size)
        }

        fn allocate_aligned(&self, alignment: usize, size: usize) -> Option<NonNull<u8>> {
            let total = checked_align(size.checked_add(HEADER)?, HEADER)?.checked_add(alignment)?;

            unsafe {
                let heap = Memory::GetProcessHeap().ok()?;
                let raw = Memory::HeapAlloc(heap, Memory::HEAP_FLAGS(0), total).cast::<u8>();

                if raw.is_null() {
                    return None;
                }

                let user = align_ptr(raw.add(HEADER), alignment);
                user.sub(HEADER).cast::<usize>().write_unaligned(raw as usize);

                NonNull::new(user)
            }
        }

        unsafe fn free(&self, ptr: NonNull<u8>) {
            unsafe {
                let raw = ptr.as_ptr().sub(HEADER).cast::<usize>().read_unaligned() as *const c_void;

                if let Ok(heap) = Memory::GetProcessHeap() {
                    let _ = Memory::HeapFree(heap, Memory::HEAP_FLAGS(0), Some(raw));
                }
            }
        }
    }
}

/// Snapshot of the accounting kept by [`Tracked`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Allocations handed out and not yet freed.
    pub live: usize,
    /// Bytes held by the live allocations.
    pub live_bytes: usize,
    /// Highest value `live_bytes` ever reached.
    pub peak_bytes: usize,
    /// Requests refused because of the budget or the inner provider.
    pub failures: usize,
}

/// A provider wrapper that accounts for every raw allocation and can enforce a
/// byte budget. Useful to check that a pool never leaks, and to exercise the
/// exhaustion paths.
#[derive(Debug, Default)]
pub struct Tracked<M = System> {
    inner: M,
    budget: Option<usize>,
    sizes: RefCell<HashMap<usize, usize>>,
    usage: RefCell<Usage>,
}

impl Tracked<System> {
    /// Tracks the [`System`] provider without a budget.
    pub fn new() -> Self {
        Self::wrap(System)
    }

    /// Tracks the [`System`] provider, refusing requests once `bytes` are live.
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ..Self::new()
        }
    }
}

impl<M: RawMemory> Tracked<M> {
    pub fn wrap(inner: M) -> Self {
        Self {
            inner,
            budget: None,
            sizes: RefCell::default(),
            usage: RefCell::default(),
        }
    }

    /// Changes the budget. `None` removes it.
    pub fn set_budget(&mut self, bytes: Option<usize>) {
        self.budget = bytes;
    }

    pub fn usage(&self) -> Usage {
        *self.usage.borrow()
    }

    fn admit(&self, size: usize) -> bool {
        let mut usage = self.usage.borrow_mut();

        match self.budget {
            Some(budget) if usage.live_bytes.checked_add(size).is_none_or(|total| total > budget) => {
                usage.failures += 1;
                false
            }
            _ => true,
        }
    }

    fn record(&self, p: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let mut usage = self.usage.borrow_mut();

        match p {
            Some(p) => {
                self.sizes.borrow_mut().insert(p.as_ptr() as usize, size);
                usage.live += 1;
                usage.live_bytes += size;
                usage.peak_bytes = usage.peak_bytes.max(usage.live_bytes);
            }
            None => usage.failures += 1,
        }

        p
    }
}

impl<M: RawMemory> RawMemory for Tracked<M> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if !self.admit(size) {
            return None;
        }

        self.record(self.inner.allocate(size), size)
    }

    fn allocate_aligned(&self, alignment: usize, size: usize) -> Option<NonNull<u8>> {
        if !self.admit(size) {
            return None;
        }

        self.record(self.inner.allocate_aligned(alignment, size), size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        if let Some(size) = self.sizes.borrow_mut().remove(&(ptr.as_ptr() as usize)) {
            let mut usage = self.usage.borrow_mut();
            usage.live -= 1;
            usage.live_bytes -= size;
        }

        unsafe { self.inner.free(ptr) }
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }
}
