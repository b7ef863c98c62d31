use std::{mem, ptr::NonNull};

use crate::utils::align;


/// Alignment of every pointer returned by [`Block::bump`] when asked for an aligned
/// allocation. This is the word size of the computer, enough for any scalar field.
pub const ALIGNMENT: usize = mem::size_of::<usize>();

/// One contiguous span of raw memory from which small allocations are bump-allocated.
///
/// The span itself is owned by the pool; the block only records how much of it is
/// used. Offsets are relative to `start`, which the pool always requests aligned to
/// [`crate::POOL_ALIGNMENT`], so aligning an offset aligns the address.
///
/// ```text
/// start                    last                     end
///   |                        |                        |
///   v                        v                        v
///   +------------------------+------------------------+
///   |   handed out (bumped)  |         free           |
///   +------------------------+------------------------+
/// ```
pub(crate) struct Block {
    /// First byte of the span.
    start: NonNull<u8>,
    /// Offset of the first unused byte. Only grows until [`Block::rewind`].
    last: usize,
    /// Size of the span, offset one-past its end.
    end: usize,
    /// Number of times a request skipped this block and was served by a new one.
    pub failed: usize,
}

impl Block {
    /// Describes the span of `size` bytes starting at `start`, all of it unused.
    pub fn new(start: NonNull<u8>, size: usize) -> Self {
        Self {
            start,
            last: 0,
            end: size,
            failed: 0,
        }
    }

    #[inline]
    pub fn start(&self) -> NonNull<u8> {
        self.start
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.last
    }

    #[inline]
    pub fn unused(&self) -> usize {
        self.end - self.last
    }

    /// Tries to carve `size` bytes out of the free part of the span. With `aligned`
    /// the returned pointer is a multiple of [`ALIGNMENT`], otherwise no padding is
    /// introduced at all.
    pub fn bump(&mut self, size: usize, aligned: bool) -> Option<NonNull<u8>> {
        let offset = if aligned { align(self.last, ALIGNMENT) } else { self.last };

        if offset > self.end || self.end - offset < size {
            return None;
        }

        self.last = offset + size;

        unsafe { Some(self.start.add(offset)) }
    }

    /// Makes the whole span available again.
    pub fn rewind(&mut self) {
        self.last = 0;
        self.failed = 0;
    }

    /// Whether `ptr` points inside this block's span.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.start.as_ptr() as usize;
        let addr = ptr as usize;

        addr >= start && addr < start + self.end
    }
}
