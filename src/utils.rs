//! Alignment helpers shared by the block chain and the provider.
//! These are functions that don't particularly belong to any concrete module of the program.


/// It aligns `to_be_aligned` up to a multiple of `alignment`.
///
/// `alignment` must be a power of two. This is used to round the minimum pool size
/// and the raw requests made on windows, where we over-allocate and align by hand.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`], but `None` instead of wrapping around when the aligned value
/// does not fit in a `usize`.
#[cfg_attr(not(windows), allow(dead_code))]
#[inline]
pub const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(alignment - 1) {
        Some(padded) => Some(padded & !(alignment - 1)),
        None => None,
    }
}

/// Same as [`align`] but for a pointer. Returns the first address at or after
/// `ptr` which is a multiple of `alignment`.
///
/// The result keeps the provenance of `ptr`, so it can be dereferenced as long as it
/// stays inside the original allocation.
#[cfg_attr(not(windows), allow(dead_code))]
#[inline]
pub fn align_ptr(ptr: *mut u8, alignment: usize) -> *mut u8 {
    let addr = ptr as usize;
    ptr.wrapping_add(align(addr, alignment) - addr)
}



#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn align_pointer_size() {
        let aligments = vec![(1..8, 8), (9..16, 16), (17..24, 24), (25..32, 32)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(expected, align(size, mem::size_of::<usize>()));
            }
        }
    }

    #[test]
    fn align_page_size() {
        // For testing purposes we are assuming the page size is 4096
        let aligments = vec![(1..4096, 4096), (4097..8192, 8192)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(expected, align(size, 4096))
            }
        }
    }

    #[test]
    fn aligned_values_are_unchanged() {
        assert_eq!(0, align(0, 16));
        assert_eq!(32, align(32, 16));
    }

    #[test]
    fn checked_align_detects_overflow() {
        assert_eq!(Some(16), checked_align(9, 8));
        assert_eq!(Some(usize::MAX - 7), checked_align(usize::MAX - 7, 8));
        assert_eq!(None, checked_align(usize::MAX - 3, 8));
    }

    #[test]
    fn align_ptr_moves_forward_only() {
        let mut buf = [0u8; 64];
        let base = buf.as_mut_ptr();

        for offset in 0..32 {
            let p = base.wrapping_add(offset);
            let aligned = align_ptr(p, 16);

            assert_eq!(0, aligned as usize % 16);
            assert!(aligned >= p);
            assert!((aligned as usize) - (p as usize) < 16);
        }
    }
}
