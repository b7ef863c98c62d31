use std::{marker::PhantomData, mem, ptr::NonNull};


/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Size of a node holding `T`, i.e. what has to be allocated before calling
/// [`List::push`].
pub(crate) const fn node_size<T>() -> usize {
    mem::size_of::<Node<T>>()
}

pub(crate) struct Node<T> {
    /// Pointer to the next node of the list
    pub next: Link<Self>,
    /// Element of the node
    pub data: T,
}

/// Singly linked list whose nodes live in memory the list does not own.
///
/// The pool keeps its large and cleanup records here, and those records are
/// allocated from the pool itself. Newest nodes come first, which is the order
/// records are scanned and cleanups run.
///
/// ```text
/// head
///  |
///  v
/// +------+    +------+    +------+
/// | Node | -> | Node | -> | Node | -> None
/// +------+    +------+    +------+
/// ```
pub(crate) struct List<T> {
    head: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

pub(crate) struct Iter<'a, T> {
    current: Link<Node<T>>,
    marker: PhantomData<&'a T>,
}

pub(crate) struct IterMut<'a, T> {
    current: Link<Node<T>>,
    marker: PhantomData<&'a mut T>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pushes a new node in front of the list.
    ///
    /// The list can not make allocations itself since its nodes are part of the
    /// allocator's bookkeeping. Therefor, it has to receive the `addr` where this
    /// node has to be written.
    ///
    /// **SAFETY**: `addr` must be valid for writes of a [`Node<T>`], suitably
    /// aligned, and stay valid until the list is cleared or dropped.
    pub unsafe fn push(&mut self, data: T, addr: NonNull<u8>) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: self.head,
                data,
            });
        }

        self.head = Some(node);
        self.len += 1;

        node
    }

    /// Forgets every node. The memory they live in is not touched.
    pub fn clear(&mut self) {
        self.head = None;
        self.len = 0;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            current: self.head,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;

            Some(&(*node.as_ptr()).data)
        }
    }
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;

            Some(&mut (*node.as_ptr()).data)
        }
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
