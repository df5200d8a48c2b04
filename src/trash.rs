//! The trash stack (spec.md §4.8): an MPSC intrusive stack of released
//! pointers awaiting reclaim by their owning thread, guarded by one mutex.
//! Grounded on `examples/original_source/src/lib/trash.c`, with
//! `parking_lot::Mutex` standing in for the source's own mutex wrapper
//! (the pool layers above already depend on `parking_lot`).
//!
//! Each trashed block is at least one machine word, so its own first bytes
//! double as the next-pointer — the same trick `slot_pool`'s free stack
//! uses, just applied to a raw untyped block instead of a known-layout
//! slot. The source also threads a permanent sentinel node through the list
//! so push/pop never special-case "list is empty"; `Option<NonNull<u8>>`
//! (a null head pointer) gives the same thing for free here, so the
//! sentinel isn't carried over.

use std::ptr::NonNull;

use parking_lot::Mutex;

/// An MPSC stack of raw pointers. Any number of threads may [`push`](Self::push)
/// concurrently with the single owning thread's [`pop`](Self::pop).
pub struct Trash {
    head: Mutex<*mut u8>,
}

// SAFETY: all access goes through `head`'s mutex; the raw pointer itself is
// never dereferenced without holding the lock.
unsafe impl Send for Trash {}
unsafe impl Sync for Trash {}

impl Trash {
    pub const fn new() -> Self {
        Self { head: Mutex::new(std::ptr::null_mut()) }
    }

    /// Pushes `ptr` onto the stack.
    ///
    /// # Safety
    /// `ptr` must be valid for at least `size_of::<*mut u8>()` bytes of
    /// exclusive access until it is popped back out, and must not already be
    /// on this or any other trash stack.
    pub unsafe fn push(&self, ptr: NonNull<u8>) {
        let mut head = self.head.lock();
        // SAFETY: caller guarantees `ptr` is writable for one word.
        unsafe { ptr.as_ptr().cast::<*mut u8>().write_unaligned(*head) };
        *head = ptr.as_ptr();
    }

    /// Pops the most recently pushed pointer, if any.
    pub fn pop(&self) -> Option<NonNull<u8>> {
        let mut head = self.head.lock();
        let top = NonNull::new(*head)?;
        // SAFETY: every pointer in the stack was pushed via `push`, which
        // guarantees one word of writable (hence readable) storage.
        let next = unsafe { top.as_ptr().cast::<*mut u8>().read_unaligned() };
        *head = next;
        Some(top)
    }

    /// The number of pointers currently on the stack. Racy under concurrent
    /// push/pop from other threads by design — callers (e.g. `flush`) are
    /// expected to treat it as a snapshot, not a precise count.
    pub fn size(&self) -> usize {
        let head = self.head.lock();
        let mut count = 0;
        let mut cursor = *head;
        while let Some(node) = NonNull::new(cursor) {
            count += 1;
            // SAFETY: every node linked from `head` was pushed via `push`.
            cursor = unsafe { node.as_ptr().cast::<*mut u8>().read_unaligned() };
        }
        count
    }

    /// Walks every pointer currently on the stack under the lock, without
    /// removing them. Used by diagnostics; `f` must not push or pop.
    pub fn foreach(&self, mut f: impl FnMut(NonNull<u8>)) {
        let head = self.head.lock();
        let mut cursor = *head;
        while let Some(node) = NonNull::new(cursor) {
            // SAFETY: same as `size`.
            let next = unsafe { node.as_ptr().cast::<*mut u8>().read_unaligned() };
            f(node);
            cursor = next;
        }
    }
}

impl Default for Trash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_word() -> NonNull<u8> {
        let boxed: Box<usize> = Box::new(0);
        NonNull::new(Box::into_raw(boxed)).unwrap().cast()
    }

    unsafe fn free_word(ptr: NonNull<u8>) {
        drop(unsafe { Box::from_raw(ptr.cast::<usize>().as_ptr()) });
    }

    #[test]
    fn push_pop_is_lifo() {
        let trash = Trash::new();
        let a = leaked_word();
        let b = leaked_word();
        unsafe {
            trash.push(a);
            trash.push(b);
        }
        assert_eq!(trash.pop(), Some(b));
        assert_eq!(trash.pop(), Some(a));
        assert_eq!(trash.pop(), None);
        unsafe {
            free_word(a);
            free_word(b);
        }
    }

    #[test]
    fn size_and_foreach_see_every_pending_entry() {
        let trash = Trash::new();
        let ptrs: Vec<_> = (0..5).map(|_| leaked_word()).collect();
        for &p in &ptrs {
            unsafe { trash.push(p) };
        }
        assert_eq!(trash.size(), 5);
        let mut seen = 0;
        trash.foreach(|_| seen += 1);
        assert_eq!(seen, 5);

        while let Some(p) = trash.pop() {
            unsafe { free_word(p) };
        }
    }
}
