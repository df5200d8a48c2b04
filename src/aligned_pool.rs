//! The aligned pool (spec.md §4.4): fixed-size allocation with O(1) owner
//! lookup from any interior address. Grounded on
//! `examples/original_source/src/lib/algn.c`.
//!
//! Every slot lives on a hardware page carrying, near its tail, an
//! "ALIG"-tagged footer nested inside the page pool's own reduced writable
//! zone. The footer's payload is a handle to the slot node that owns the
//! page; the slot node in turn carries a back-pointer to this `AlignedPool`
//! instance (stashed in its `extra` field), so any address on any page this
//! pool handed out resolves back to `&AlignedPool` in two pointer chases —
//! no hashed lookup table.

use std::ptr::NonNull;

use crate::config::Appetite;
use crate::footer::FooterSpec;
use crate::page_pool::PagePool;
use crate::platform;
use crate::reply::{PoolResult, Reply};
use crate::signature::SIG_ALIG;
use crate::slot_pool::{SlotBacking, SlotNode, SlotPool};
use crate::vector_pool::NodeHandle;

/// An optional 16-byte opaque payload a higher layer can stash per pool.
/// The multiplexer pool fills this with its own signature word and a
/// back-pointer to itself (spec.md §4.5); this module never interprets the
/// bytes itself.
pub const TAG_SIZE: usize = 16;
pub type Tag = [u8; TAG_SIZE];

type SlotHandle = NodeHandle<SlotNode<NonNull<AlignedPool>>>;

struct PageBacking {
    page_pool: PagePool,
    /// Set once, immediately after this pool is boxed, before any node is
    /// created — see [`AlignedPool::new`]. Never read before then.
    self_ptr: NonNull<AlignedPool>,
}

impl SlotBacking<NonNull<AlignedPool>> for PageBacking {
    fn make_node(&mut self, _granularity: usize, _capacity: usize) -> PoolResult<(NonNull<u8>, NonNull<AlignedPool>)> {
        let page = self.page_pool.acquire_page()?;
        Ok((page, self.self_ptr))
    }

    unsafe fn destroy_node(
        &mut self,
        storage: NonNull<u8>,
        _granularity: usize,
        _capacity: usize,
        _extra: &mut NonNull<AlignedPool>,
    ) {
        // A page handed back here was committed by this same page pool and
        // nothing else shares it; failure indicates a corrupted pool, which
        // the teardown signature (inherited from the slot pool's `SlotBacking`
        // contract) has no channel to report, so it's treated the same as
        // any other invariant violation in this codebase: a panic.
        self.page_pool
            .release_page(storage)
            .expect("releasing a page this pool committed");
    }
}

/// The aligned pool itself. Always heap-allocated via [`AlignedPool::new`]
/// so its address is stable for the self-pointer every page footer carries.
pub struct AlignedPool {
    slots: SlotPool<NonNull<AlignedPool>, PageBacking>,
    tag: Option<Tag>,
    footer: FooterSpec<SlotHandle>,
}

impl AlignedPool {
    /// `mkpool(appetite, granularity, tag?)`. Computes node capacity as
    /// `footer_offset / granularity` against the page pool's own reduced
    /// writable zone; rejects a resulting density below `min_page_density`
    /// or above what a `u32` index can address.
    pub fn new(
        appetite: Appetite,
        granularity: usize,
        min_page_density: usize,
        tag: Option<Tag>,
    ) -> PoolResult<Box<Self>> {
        if granularity == 0 {
            return Err(Reply::Disallowed);
        }
        let page_pool = PagePool::new(appetite)?;
        let writable_zone = page_pool.granularity();
        let footer = FooterSpec::new(writable_zone, SIG_ALIG)?;
        // Capacity must leave the footer's own bytes untouched: slots are
        // packed from offset 0 (spec.md §4.4, "slots occupy
        // `[page_base, footer_offset)`"), so the node's usable span is
        // `footer_offset`, not the full writable zone the footer sits inside.
        let capacity = footer.footer_offset() / granularity;
        if capacity < min_page_density || capacity > u32::MAX as usize {
            return Err(Reply::RangeFail);
        }

        let backing = PageBacking {
            page_pool,
            self_ptr: NonNull::dangling(),
        };
        let slots = SlotPool::new(granularity, capacity, backing)?;

        let mut boxed = Box::new(AlignedPool { slots, tag, footer });
        let self_ptr = NonNull::from(boxed.as_ref());
        boxed.slots.backing_mut().self_ptr = self_ptr;
        Ok(boxed)
    }

    pub fn granularity(&self) -> usize {
        self.slots.granularity()
    }

    pub fn gettag(&self) -> Option<Tag> {
        self.tag
    }

    /// `acquire() -> ptr`: forward to the slot pool; on a freshly minted
    /// page, write this pool's footer exactly once.
    pub fn acquire(&mut self) -> PoolResult<NonNull<u8>> {
        let (ptr, handle, is_new_node) = self.slots.acquire()?;
        if is_new_node {
            let page_base = self.mask_to_page(ptr);
            // SAFETY: `page_base` is the base of a page this call's slot
            // pool just committed via `PagePool::acquire_page`, writable for
            // the page pool's reduced writable-zone length.
            unsafe { self.footer.write(page_base, handle) };
        }
        Ok(ptr)
    }

    /// `release(ptr)`: read the footer to recover the owning slot node,
    /// then forward to the slot pool.
    pub fn release(&mut self, ptr: NonNull<u8>) -> PoolResult<()> {
        let page_base = self.mask_to_page(ptr);
        // SAFETY: page_base is the base of a page previously acquired
        // through this pool (caller obligation — foreign pointers yield
        // `NotFound` rather than UB, since the signature check runs first).
        let handle = unsafe { self.footer.read(page_base)? };
        // SAFETY: `handle` was produced by this pool's own slot pool.
        unsafe { self.slots.release(ptr, handle) }
    }

    /// `query(ptr) -> &AlignedPool`: read the footer; on signature mismatch,
    /// `NotFound`. On a match, follow the slot node's back-pointer to
    /// recover the (possibly different, if this pool is one of several
    /// sharing the same footer layout) owning instance.
    ///
    /// # Safety
    /// `ptr` must not outlive the `AlignedPool` it resolves to; callers that
    /// only hold `&mut AlignedPool` references elsewhere must not alias them
    /// with the returned reference.
    pub unsafe fn query(ptr: NonNull<u8>) -> PoolResult<NonNull<AlignedPool>> {
        let page_base = (ptr.as_ptr() as usize & !(platform::page_size() - 1)) as *mut u8;
        // The footer's *layout* (offset, size) depends only on the page
        // pool's writable zone, which is identical for every aligned pool on
        // this platform, so a throwaway spec with no live pool behind it is
        // enough to compute where to look.
        let probe: FooterSpec<SlotHandle> = FooterSpec::new(PagePool::writable_zone_hint()?, SIG_ALIG)?;
        // SAFETY: page_base is caller-supplied; a signature mismatch is
        // reported as `NotFound`, not dereferenced further.
        let handle = unsafe { probe.read(page_base)? };
        // SAFETY: handle came from a footer this module wrote; its node is
        // still alive because its owning page is still committed.
        Ok(unsafe { handle.as_ref() }.extra)
    }

    fn mask_to_page(&self, ptr: NonNull<u8>) -> *mut u8 {
        let page_size = platform::page_size();
        (ptr.as_ptr() as usize & !(page_size - 1)) as *mut u8
    }

    pub fn check(&self) -> PoolResult<()> {
        self.slots.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_roundtrip() {
        let mut pool = AlignedPool::new(Appetite::Frugal, 64, 2, None).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        pool.release(a).unwrap();
        pool.check().unwrap();
        pool.release(b).unwrap();
        pool.check().unwrap();
    }

    #[test]
    fn query_recovers_owning_pool() {
        let mut pool = AlignedPool::new(Appetite::Frugal, 64, 2, Some([7u8; 16])).unwrap();
        let ptr = pool.acquire().unwrap();
        let recovered = unsafe { AlignedPool::query(ptr) }.unwrap();
        assert_eq!(unsafe { recovered.as_ref() }.gettag(), Some([7u8; 16]));
    }

    #[test]
    fn rangefail_when_granularity_too_coarse() {
        // A granularity larger than the whole writable zone leaves no room
        // for even `min_page_density` slots.
        let huge = 1usize << 30;
        let result = AlignedPool::new(Appetite::Frugal, huge, 2, None);
        assert_eq!(result.map(|_| ()), Err(Reply::RangeFail));
    }
}
