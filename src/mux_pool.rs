//! The multiplexer pool (spec.md §4.5): routes a size request to one of 128
//! size classes, each an [`AlignedPool`] materialized lazily on first use.
//! Grounded on `examples/original_source/src/lib/mux.c`.

use std::mem::size_of;
use std::ptr::NonNull;

use crate::aligned_pool::{AlignedPool, Tag, TAG_SIZE};
use crate::config::Appetite;
use crate::reply::{PoolResult, Reply};
use crate::signature::{Signature, SIG_MUXP};

pub const NUM_CLASSES: usize = 128;

fn encode_tag(mux_ptr: NonNull<MuxPool>) -> Tag {
    let mut tag = [0u8; TAG_SIZE];
    tag[0..4].copy_from_slice(&SIG_MUXP.bytes());
    tag[4..4 + size_of::<usize>()].copy_from_slice(&(mux_ptr.as_ptr() as usize).to_le_bytes());
    tag
}

fn decode_tag(tag: Tag) -> (Signature, usize) {
    let sig = Signature::new(tag[0..4].try_into().unwrap());
    let ptr = usize::from_le_bytes(tag[4..4 + size_of::<usize>()].try_into().unwrap());
    (sig, ptr)
}

/// The multiplexer pool itself. Must live behind a stable address (a `Box`
/// or a field of an already-boxed owner) for the whole time it hands out
/// memory: lazily-created size classes carry a raw back-pointer to it in
/// their tag, written the moment each class is first materialized.
pub struct MuxPool {
    classes: Vec<Option<Box<AlignedPool>>>,
    step: usize,
    appetite: Appetite,
    min_page_density: usize,
    /// Type-erased back-pointer to the owning lazy pool, set once by
    /// `LazyPool::new`. Kept as `NonNull<()>` rather than `NonNull<LazyPool>`
    /// so this module doesn't need to depend on `lazy_pool` (which itself
    /// depends on this one).
    owner: Option<NonNull<()>>,
}

impl MuxPool {
    pub fn new(appetite: Appetite, min_page_density: usize) -> Self {
        let mut classes = Vec::with_capacity(NUM_CLASSES);
        classes.resize_with(NUM_CLASSES, || None);
        Self {
            classes,
            step: size_of::<usize>(),
            appetite,
            min_page_density,
            owner: None,
        }
    }

    /// Sets the owning lazy pool's back-pointer. Must be called exactly
    /// once, before any `acquire`, by whoever embeds this multiplexer.
    pub fn set_owner(&mut self, owner: NonNull<()>) {
        self.owner = Some(owner);
    }

    pub fn owner(&self) -> Option<NonNull<()>> {
        self.owner
    }

    fn class_index(&self, size: usize) -> PoolResult<usize> {
        if size == 0 {
            return Err(Reply::Disallowed);
        }
        let idx = (size + self.step - 1) / self.step - 1;
        if idx >= NUM_CLASSES {
            return Err(Reply::RangeFail);
        }
        Ok(idx)
    }

    /// `acquire(size) -> ptr`: lazily creates the owning size class on first
    /// use, tagged with this multiplexer's signature and back-pointer.
    pub fn acquire(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let idx = self.class_index(size)?;
        if self.classes[idx].is_none() {
            let granularity = self.step * (idx + 1);
            let self_ptr = NonNull::from(&*self);
            let pool = AlignedPool::new(self.appetite, granularity, self.min_page_density, Some(encode_tag(self_ptr)))?;
            self.classes[idx] = Some(pool);
        }
        self.classes[idx].as_mut().expect("just inserted").acquire()
    }

    /// `release(ptr)`: identical to an aligned-pool release — the footer
    /// chain alone is enough to find the owning class, so this never needs
    /// to touch `self.classes`.
    pub fn release(&mut self, ptr: NonNull<u8>) -> PoolResult<()> {
        // SAFETY: ptr must have come from a prior `acquire` on some
        // multiplexer (caller obligation; a foreign pointer surfaces as
        // `NotFound` rather than being dereferenced blindly).
        let mut pool = unsafe { AlignedPool::query(ptr)? };
        unsafe { pool.as_mut().release(ptr) }
    }

    /// `query(ptr) -> (multiplexer, size)`: recovers the owning aligned
    /// pool, checks its tag's signature word against `SIG_MUXP`, and on
    /// match returns the multiplexer back-pointer and the class's
    /// granularity.
    ///
    /// # Safety
    /// The returned `NonNull<MuxPool>` is only valid for as long as the
    /// multiplexer that produced the tag is still alive at its original
    /// address.
    pub unsafe fn query(ptr: NonNull<u8>) -> PoolResult<(NonNull<MuxPool>, usize)> {
        // SAFETY: forwarded verbatim from the caller's obligation above.
        let pool = unsafe { AlignedPool::query(ptr)? };
        let tag = unsafe { pool.as_ref() }.gettag().ok_or(Reply::NotFound)?;
        let (sig, mux_addr) = decode_tag(tag);
        if sig != SIG_MUXP {
            return Err(Reply::NotFound);
        }
        let granularity = unsafe { pool.as_ref() }.granularity();
        let mux_ptr = NonNull::new(mux_addr as *mut MuxPool).ok_or(Reply::Corrupt)?;
        Ok((mux_ptr, granularity))
    }

    pub fn check(&self) -> PoolResult<()> {
        for class in self.classes.iter().flatten() {
            class.check()?;
        }
        Ok(())
    }
}
