//! The parallel pool (spec.md §4.7): gives every thread its own lazy pool
//! so hot-path acquire/release never contend. Grounded on
//! `examples/original_source/src/lib/para.c`, with the TLS record itself
//! built on the teacher's thread-local pattern
//! (`examples/vanyastaff-nebula/.../arena/local.rs`).
//!
//! spec.md §9 flags the source's TLS record lifecycle as UNBOUND → BOUND →
//! "should-be FREED on thread exit", noting the C implementation has no
//! thread-exit hook at all — a documented leak. Rust's `thread_local!`
//! destroys its contents when the thread exits, so storing the per-thread
//! `Box<LazyPool>` directly in the thread-local closes that gap with no
//! extra bookkeeping.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;

use crate::config::Appetite;
use crate::lazy_pool::LazyPool;
use crate::reply::{PoolResult, Reply};

thread_local! {
    // Keyed by the owning `ParallelPool`'s address so one process can run
    // several independent parallel pools (the façade's default instance,
    // plus whatever a test or embedder constructs) without them sharing
    // TLS state.
    static RECORDS: RefCell<HashMap<usize, Box<LazyPool>>> = RefCell::new(HashMap::new());
}

pub struct ParallelPool {
    appetite: Appetite,
    min_page_density: usize,
    reclaim_ratio: usize,
}

impl ParallelPool {
    pub fn new(appetite: Appetite, min_page_density: usize, reclaim_ratio: usize) -> Self {
        Self {
            appetite,
            min_page_density,
            reclaim_ratio,
        }
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// UNBOUND → BOUND: returns this thread's lazy pool, minting it (and
    /// stamping it with this parallel pool's back-pointer) on first use.
    fn with_record<R>(&self, f: impl FnOnce(&mut LazyPool) -> R) -> R {
        RECORDS.with(|records| {
            let mut map = records.borrow_mut();
            let lazy = map.entry(self.id()).or_insert_with(|| {
                let mut lazy = LazyPool::new(self.appetite, self.min_page_density, self.reclaim_ratio);
                lazy.set_parallel_owner(NonNull::from(self).cast());
                lazy
            });
            f(lazy.as_mut())
        })
    }

    /// `acquire(size)`: look up (or create) this thread's TLS record, then
    /// forward.
    pub fn acquire(&self, size: usize) -> PoolResult<NonNull<u8>> {
        self.with_record(|lazy| lazy.acquire(size))
    }

    /// `release(ptr)`: forwards straight to the lazy layer, which routes the
    /// pointer to its origin thread's trash via the footer/tag chain —
    /// cross-thread by design.
    ///
    /// # Safety
    /// `ptr` must have come from a prior `acquire` on some still-live
    /// parallel pool.
    pub unsafe fn release(ptr: NonNull<u8>) -> PoolResult<()> {
        unsafe { LazyPool::release(ptr) }
    }

    /// `query(ptr) -> size`: recovers the owning lazy pool; succeeds only if
    /// its back-pointer names *this* parallel pool, else `NotFound`.
    ///
    /// # Safety
    /// `ptr` must have come from a prior `acquire` on some still-live lazy
    /// pool (not necessarily this one — a mismatch is a normal `NotFound`,
    /// not undefined behavior).
    pub unsafe fn query(&self, ptr: NonNull<u8>) -> PoolResult<usize> {
        // SAFETY: forwarded from this function's own contract.
        let (lazy_ptr, size) = unsafe { LazyPool::query(ptr)? };
        // SAFETY: lazy_ptr was recovered from a footer/tag chain this crate
        // wrote and is alive for as long as `ptr` remains outstanding.
        let owner = unsafe { lazy_ptr.as_ref() }.parallel_owner().ok_or(Reply::NotFound)?;
        if owner.as_ptr() as usize != self.id() {
            return Err(Reply::NotFound);
        }
        Ok(size)
    }

    /// `reclaim`, `flush`, `chkpool`: operate on this thread's TLS record
    /// only, per spec.md §4.7.
    pub fn reclaim(&self, goal: usize) -> PoolResult<usize> {
        self.with_record(|lazy| lazy.reclaim(goal))
    }

    pub fn flush(&self) -> PoolResult<usize> {
        self.with_record(|lazy| lazy.flush())
    }

    pub fn check(&self) -> PoolResult<()> {
        self.with_record(|lazy| lazy.check())
    }
}

impl Drop for ParallelPool {
    fn drop(&mut self) {
        // Best-effort: only this thread's record is reachable from here.
        // Every other thread's copy is cleaned up by `thread_local!`'s own
        // destructor when that thread exits.
        let id = self.id();
        let _ = RECORDS.try_with(|records| {
            records.borrow_mut().remove(&id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_and_query_roundtrip() {
        let pool = ParallelPool::new(Appetite::Frugal, 2, 4);
        let ptr = pool.acquire(32).unwrap();
        let size = unsafe { pool.query(ptr) }.unwrap();
        assert!(size >= 32);
        unsafe { ParallelPool::release(ptr).unwrap() };
        pool.check().unwrap();
    }

    #[test]
    fn query_rejects_foreign_parallel_pool() {
        let a = ParallelPool::new(Appetite::Frugal, 2, 4);
        let b = ParallelPool::new(Appetite::Frugal, 2, 4);
        let ptr = a.acquire(32).unwrap();
        assert_eq!(unsafe { b.query(ptr) }, Err(Reply::NotFound));
        unsafe { ParallelPool::release(ptr).unwrap() };
        a.reclaim(10).unwrap();
    }

    #[test]
    fn cross_thread_release_lands_on_origin_trash() {
        let pool = std::sync::Arc::new(ParallelPool::new(Appetite::Frugal, 2, 100));
        let ptr = pool.acquire(32).unwrap();
        let addr = ptr.as_ptr() as usize;

        let handle = std::thread::spawn(move || {
            let ptr = NonNull::new(addr as *mut u8).unwrap();
            unsafe { ParallelPool::release(ptr).unwrap() };
        });
        handle.join().unwrap();

        // Reclaimed from the *origin* thread's trash, not the releasing one.
        let reclaimed = pool.reclaim(10).unwrap();
        assert_eq!(reclaimed, 1);
    }
}
