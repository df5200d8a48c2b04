//! The page pool (spec.md §4.3): reserves OS address-space ranges and hands
//! out individual hardware pages. Grounded on
//! `examples/original_source/src/lib/pg.c`.
//!
//! Each region node reserves one `vm_granularity()` range, partitions it
//! into `vm_granularity / page_size` hardware pages, and tracks which are
//! committed with a free-index stack and a parallel commit-flag array — a
//! plain `Vec`, unlike the slot pool's in-band free-stack, because pages
//! aren't committed (hence not writable) until handed out, so nothing can
//! be stored inside them ahead of time.
//!
//! Region nodes are ordinary `Box`-owned Rust values inside this pool's
//! [`VecPool`]. The source bootstraps region-node storage through a
//! dedicated secondary slot pool to avoid the C allocator depending on
//! itself; in Rust, `Box`/`Vec` go through the *global* allocator, not this
//! crate's own pools, so that circularity doesn't exist here and the
//! secondary bootstrap pool is intentionally not carried over (see
//! DESIGN.md).

use std::ptr::NonNull;

use crate::config::Appetite;
use crate::footer::FooterSpec;
use crate::platform;
use crate::reply::{PoolResult, Reply};
use crate::signature::SIG_PAGE;
use crate::vector_pool::{MakeNode, NodeHandle, VecPool};

/// Per-region bookkeeping: one reserved `vm_granularity()` address range,
/// partitioned into hardware pages.
pub struct RegionNode {
    base: NonNull<u8>,
    page_size: usize,
    npages: usize,
    free_pages: Vec<u32>,
    committed: Vec<bool>,
}

impl RegionNode {
    fn is_full(&self) -> bool {
        self.free_pages.is_empty()
    }
    fn is_empty(&self) -> bool {
        self.free_pages.len() == self.npages
    }

    /// The region's reserved base address, for diagnostics and tests.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
}

struct RegionFactory {
    page_size: usize,
    vm_granularity: usize,
}

impl MakeNode<RegionNode> for RegionFactory {
    fn make_node(&mut self) -> PoolResult<RegionNode> {
        // SAFETY: the returned address is released exactly once, when this
        // region node's `is_empty` triggers teardown in `PagePool::release`.
        let base = unsafe { platform::reserve()? };
        let npages = self.vm_granularity / self.page_size;
        // Descending order so the first page handed out is index 0 (cosmetic
        // convention, matching the slot pool's free-stack initialization).
        let free_pages = (0..npages as u32).rev().collect();
        Ok(RegionNode {
            base: NonNull::new(base).ok_or(Reply::ResourceFail)?,
            page_size: self.page_size,
            npages,
            free_pages,
            committed: vec![false; npages],
        })
    }
}

/// The page pool itself.
pub struct PagePool {
    vec: VecPool<RegionNode, RegionFactory>,
    appetite: Appetite,
    page_size: usize,
    footer: FooterSpec<NodeHandle<RegionNode>>,
}

impl PagePool {
    pub fn new(appetite: Appetite) -> PoolResult<Self> {
        let page_size = platform::page_size();
        let vm_granularity = platform::vm_granularity();
        if vm_granularity == 0 || vm_granularity % page_size != 0 {
            return Err(Reply::Inconsistent);
        }
        let footer = FooterSpec::new(page_size, SIG_PAGE)?;
        Ok(Self {
            vec: VecPool::new(1, RegionFactory { page_size, vm_granularity })?,
            appetite,
            page_size,
            footer,
        })
    }

    /// The number of bytes of each page available to upper layers once the
    /// page pool's own footer is carved out of the tail. This is what
    /// spec.md §4.3/§4.4 calls the page pool's "granularity" as exposed to
    /// the aligned-pool layer.
    pub fn granularity(&self) -> usize {
        self.footer.footer_offset()
    }

    /// Computes the same writable-zone size [`Self::granularity`] reports,
    /// without reserving any address space. The layout depends only on
    /// `platform::page_size()`, so an aligned pool's `query` can recompute
    /// where a foreign page's footer *would* live without going through a
    /// live `PagePool` instance.
    pub fn writable_zone_hint() -> PoolResult<usize> {
        let footer: FooterSpec<NodeHandle<RegionNode>> = FooterSpec::new(platform::page_size(), SIG_PAGE)?;
        Ok(footer.footer_offset())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Acquire algorithm (spec.md §4.3): get an available region, pop a
    /// free page index, commit it, write its footer, mark it acquired.
    pub fn acquire_page(&mut self) -> PoolResult<NonNull<u8>> {
        let (mut handle, _is_new) = self.vec.get_node()?;
        // SAFETY: handle was just returned by this pool's own VecPool.
        let region = unsafe { handle.as_mut() };

        let index = region.free_pages.pop().ok_or(Reply::Corrupt)?;
        let page_addr = unsafe { region.base.as_ptr().add(index as usize * self.page_size) };

        // SAFETY: page_addr is page-aligned, inside the region's live
        // reservation, and not currently committed.
        unsafe { platform::commit(page_addr)? };
        region.committed[index as usize] = true;

        // SAFETY: the committed page is writable for `page_size` bytes, the
        // full writable zone this footer spec was built against.
        unsafe { self.footer.write(page_addr, handle) };

        let is_full_now = region.is_full();
        // SAFETY: handle came from this pool's VecPool this call.
        unsafe { self.vec.acquire(handle, is_full_now)? };

        Ok(NonNull::new(page_addr).expect("commit succeeded, page_addr is non-null"))
    }

    /// Release algorithm (spec.md §4.3): read the footer to recover the
    /// region, decommit or reset per appetite, push the index back.
    pub fn release_page(&mut self, page_addr: NonNull<u8>) -> PoolResult<()> {
        let page_base = self.mask_to_page(page_addr);
        // SAFETY: page_base is the base of a page this pool committed and
        // wrote a footer into during `acquire_page`.
        let mut handle = unsafe { self.footer.read(page_base)? };
        // SAFETY: handle is the back-pointer this pool itself wrote.
        let region = unsafe { handle.as_mut() };

        if region.base.as_ptr() > page_base || {
            let region_end = unsafe { region.base.as_ptr().add(self.page_size * region.npages) };
            page_base >= region_end
        } {
            return Err(Reply::Corrupt);
        }
        let index = (page_base as usize - region.base.as_ptr() as usize) / self.page_size;

        match self.appetite {
            // SAFETY: page_base is committed and within the live reservation.
            Appetite::Frugal => unsafe { platform::decommit(page_base)? },
            Appetite::Greedy => unsafe { platform::reset(page_base)? },
        }
        region.committed[index] = false;
        let was_full = region.is_full();
        region.free_pages.push(index as u32);
        let is_empty_now = region.is_empty();

        // SAFETY: handle came from this pool's VecPool.
        unsafe { self.vec.release(handle, was_full, is_empty_now)? };

        if is_empty_now {
            // SAFETY: region is empty and torn down exactly once here.
            let boxed = unsafe { self.vec.take_empty(handle)? };
            // SAFETY: boxed.base was produced by this factory's `reserve`
            // call and is released exactly once.
            unsafe { platform::release(boxed.base.as_ptr())? };
        }
        Ok(())
    }

    fn mask_to_page(&self, ptr: NonNull<u8>) -> *mut u8 {
        let addr = ptr.as_ptr() as usize;
        (addr & !(self.page_size - 1)) as *mut u8
    }

    /// `chkpool`: every region's free-index stack has unique, in-range
    /// entries and `npages - free.len()` pages are marked committed.
    pub fn check(&self) -> PoolResult<()> {
        self.vec.check(|region| {
            let mut seen = vec![false; region.npages];
            for &idx in &region.free_pages {
                let idx = idx as usize;
                if idx >= region.npages || seen[idx] {
                    return Err(Reply::Corrupt);
                }
                seen[idx] = true;
            }
            let committed_count = region.committed.iter().filter(|&&c| c).count();
            if committed_count != region.npages - region.free_pages.len() {
                return Err(Reply::Corrupt);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_roundtrip() {
        let mut pool = PagePool::new(Appetite::Frugal).unwrap();
        let page = pool.acquire_page().unwrap();
        unsafe {
            page.as_ptr().write(7);
            assert_eq!(page.as_ptr().read(), 7);
        }
        pool.release_page(page).unwrap();
        pool.check().unwrap();
    }

    #[test]
    fn scenario_a_sequential_page_pool() {
        // spec.md §8 Scenario A, scaled down from 1,024 pages for test speed.
        let mut pool = PagePool::new(Appetite::Frugal).unwrap();
        let mut pages = Vec::new();
        for i in 0..64u8 {
            let p = pool.acquire_page().unwrap();
            unsafe {
                std::ptr::write_bytes(p.as_ptr(), i, 1);
            }
            pages.push((p, i));
        }
        for (p, i) in &pages {
            unsafe {
                assert_eq!(p.as_ptr().read(), *i);
            }
        }
        for (p, _) in pages {
            pool.release_page(p).unwrap();
        }
        pool.check().unwrap();
    }

    #[test]
    fn foreign_pointer_is_not_found() {
        let pool = PagePool::new(Appetite::Frugal).unwrap();
        let foreign = vec![0u8; pool.page_size];
        let result = unsafe { pool.footer.read(pool.mask_to_page(NonNull::new(foreign.as_ptr() as *mut u8).unwrap())) };
        assert_eq!(result.map(|_| ()), Err(Reply::NotFound));
    }
}
