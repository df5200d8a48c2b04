//! The lazy pool (spec.md §4.6): keeps cross-thread `release` cheap by
//! never running a size class's actual release logic on the releasing
//! thread — it only pushes the pointer onto the owning lazy pool's trash,
//! letting that pool's own thread reclaim it later. Grounded on
//! `examples/original_source/src/lib/lazy.c`.

use std::ptr::NonNull;

use crate::config::Appetite;
use crate::mux_pool::MuxPool;
use crate::reply::{PoolResult, Reply};
use crate::trash::Trash;

/// One thread's multiplexer plus its inbound trash. Always heap-allocated
/// via [`LazyPool::new`] so the multiplexer's owner back-pointer (set once,
/// right after boxing) stays valid for the pool's whole lifetime.
pub struct LazyPool {
    mux: MuxPool,
    trash: Trash,
    reclaim_ratio: usize,
    /// Type-erased back-pointer to the owning parallel pool, if any. Set by
    /// `ParallelPool` right after minting a fresh per-thread lazy pool;
    /// unused (stays `None`) when a `LazyPool` is used standalone.
    parallel_owner: Option<NonNull<()>>,
}

impl LazyPool {
    pub fn new(appetite: Appetite, min_page_density: usize, reclaim_ratio: usize) -> Box<Self> {
        let mux = MuxPool::new(appetite, min_page_density);
        let mut boxed = Box::new(Self {
            mux,
            trash: Trash::new(),
            reclaim_ratio,
            parallel_owner: None,
        });
        let self_ptr = NonNull::from(boxed.as_ref()).cast::<()>();
        boxed.mux.set_owner(self_ptr);
        boxed
    }

    pub fn set_parallel_owner(&mut self, owner: NonNull<()>) {
        self.parallel_owner = Some(owner);
    }

    pub fn parallel_owner(&self) -> Option<NonNull<()>> {
        self.parallel_owner
    }

    /// `acquire(size)`: drains up to `reclaim_ratio` pending trash entries
    /// (unconditionally — not only when the trash happens to be non-empty),
    /// then forwards to the multiplexer.
    pub fn acquire(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        self.reclaim(self.reclaim_ratio)?;
        self.mux.acquire(size)
    }

    /// `release(ptr)`: recovers the owning lazy pool (which may be a
    /// different thread's) via the footer/tag chain and pushes onto *its*
    /// trash — this is the one cross-thread operation in the whole stack.
    ///
    /// # Safety
    /// `ptr` must have come from a prior `acquire` on some still-live lazy
    /// pool.
    pub unsafe fn release(ptr: NonNull<u8>) -> PoolResult<()> {
        // SAFETY: forwarded from this function's own contract.
        let (owner, _size) = unsafe { Self::query(ptr)? };
        // SAFETY: `owner` is a lazy pool alive for as long as `ptr` remains
        // outstanding, which holds by the caller's contract; `Trash::push`
        // only needs shared access, which cross-thread release relies on.
        unsafe { owner.as_ref().trash.push(ptr) };
        Ok(())
    }

    /// `reclaim(goal)`: pops up to `goal` pointers from this thread's own
    /// trash and releases each through the multiplexer. Stops early, not an
    /// error, once the trash runs dry. Returns the number actually reclaimed.
    pub fn reclaim(&mut self, goal: usize) -> PoolResult<usize> {
        let mut n = 0;
        while n < goal {
            let Some(ptr) = self.trash.pop() else { break };
            self.mux.release(ptr)?;
            n += 1;
        }
        Ok(n)
    }

    /// `flush()`: reclaims a snapshot of the current trash size. New
    /// cross-thread pushes arriving mid-flush are deliberately not chased —
    /// spec.md documents this as an accepted race, not a bug.
    pub fn flush(&mut self) -> PoolResult<usize> {
        let goal = self.trash.size();
        self.reclaim(goal)
    }

    /// `query(ptr) -> (lazy_pool, size)`: forwards to the multiplexer, then
    /// follows its owner back-pointer.
    ///
    /// # Safety
    /// Same obligation as [`Self::release`].
    pub unsafe fn query(ptr: NonNull<u8>) -> PoolResult<(NonNull<LazyPool>, usize)> {
        // SAFETY: forwarded from this function's own contract.
        let (mux_ptr, size) = unsafe { MuxPool::query(ptr)? };
        // SAFETY: `mux_ptr` was recovered from a footer this crate wrote and
        // is alive for as long as `ptr` is outstanding.
        let owner = unsafe { mux_ptr.as_ref() }.owner().ok_or(Reply::Corrupt)?;
        Ok((owner.cast::<LazyPool>(), size))
    }

    pub fn check(&self) -> PoolResult<()> {
        self.mux.check()
    }
}
