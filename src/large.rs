use std::ptr::NonNull;

use crate::list::{List, node_size};


/// Bytes the pool must bump-allocate to track one large allocation.
pub(crate) const LARGE_RECORD_SIZE: usize = node_size::<Large>();

/// Record of an allocation that bypassed the blocks and came straight from the
/// provider.
///
/// Freeing the allocation empties the record instead of unlinking it; records are
/// pool memory themselves and can't be given back individually, so the slot is
/// reused by a later large allocation instead.
pub(crate) struct Large {
    /// The live allocation, or `None` once it was freed.
    pub alloc: Option<NonNull<u8>>,
}

impl List<Large> {
    /// Stores `p` in the first empty record among the first `scan` ones.
    /// Returns whether a slot was found.
    pub fn reuse(&mut self, p: NonNull<u8>, scan: usize) -> bool {
        for large in self.iter_mut().take(scan) {
            if large.alloc.is_none() {
                large.alloc = Some(p);
                return true;
            }
        }

        false
    }

    /// Empties the record holding `p`. Returns whether there was one.
    pub fn forget(&mut self, p: NonNull<u8>) -> bool {
        for large in self.iter_mut() {
            if large.alloc == Some(p) {
                large.alloc = None;
                return true;
            }
        }

        false
    }

    /// Takes every live allocation out of the list, leaving the records empty.
    pub fn take_live(&mut self) -> impl Iterator<Item = NonNull<u8>> + '_ {
        self.iter_mut().filter_map(|large| large.alloc.take())
    }

    /// Number of records currently holding an allocation.
    pub fn live(&self) -> usize {
        self.iter().filter(|large| large.alloc.is_some()).count()
    }
}
