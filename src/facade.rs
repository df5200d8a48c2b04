//! The façade / default instance (spec.md §4.9, §6): a process-wide
//! parallel pool reachable through free functions, matching
//! `examples/original_source/src/lib/default.c`'s `ramdefault_thepool`
//! lazy-init-once discipline — but via `std::sync::OnceLock` instead of a
//! hand-rolled double-checked-lock global, the same pattern the teacher
//! uses for its own process-wide config (`examples/vanyastaff-nebula/
//! .../src/config.rs`'s `GLOBAL_CONFIG`).
//!
//! Requests outside the pooled size range (`RangeFail`) fall back to a
//! supplementary allocator, defaulting to Rust's global allocator rather
//! than the C runtime's `malloc`/`free` the source defaults to — there's no
//! "the C runtime" to delegate to from safe Rust, and `std::alloc` is the
//! idiomatic stand-in.

use std::alloc::Layout;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::config::Options;
use crate::parallel_pool::ParallelPool;
use crate::reply::{PoolResult, Reply};

pub type SupplementaryMalloc = unsafe fn(usize) -> *mut u8;
pub type SupplementaryFree = unsafe fn(*mut u8);

/// # Safety
/// Allocates `size` bytes with the header this module's matching
/// [`default_free`] expects to find just before the returned pointer.
unsafe fn default_malloc(size: usize) -> *mut u8 {
    let header = size_of::<usize>();
    let Ok(layout) = Layout::from_size_align(header + size, header) else {
        return std::ptr::null_mut();
    };
    // SAFETY: layout has nonzero size whenever `size > 0`, which `acquire`
    // below already guarantees before ever reaching the fallback path.
    let raw = unsafe { std::alloc::alloc(layout) };
    if raw.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: raw is valid for `header` bytes, aligned to `header`.
    unsafe { (raw as *mut usize).write(size) };
    unsafe { raw.add(header) }
}

/// # Safety
/// `ptr` must have come from [`default_malloc`], not yet freed.
unsafe fn default_free(ptr: *mut u8) {
    let header = size_of::<usize>();
    // SAFETY: every pointer this module passes here was produced by
    // `default_malloc`, which always leaves this header in place.
    let raw = unsafe { ptr.sub(header) };
    let size = unsafe { (raw as *const usize).read() };
    if let Ok(layout) = Layout::from_size_align(header + size, header) {
        // SAFETY: `raw`/`layout` exactly mirror the allocating call.
        unsafe { std::alloc::dealloc(raw, layout) };
    }
}

struct GlobalPool {
    pool: ParallelPool,
    options: Options,
    malloc: SupplementaryMalloc,
    free: SupplementaryFree,
}

impl GlobalPool {
    fn report(&self, reply: Reply, site: &'static str) {
        self.options.report(reply, site);
    }
}

static FACADE: OnceLock<GlobalPool> = OnceLock::new();

fn facade() -> &'static GlobalPool {
    FACADE.get_or_init(|| {
        let options = Options::default();
        GlobalPool {
            pool: ParallelPool::new(options.appetite, options.min_page_density, options.default_reclaim_goal),
            options,
            malloc: default_malloc,
            free: default_free,
        }
    })
}

/// `initialize(options, supplementary_malloc?, supplementary_free?)`. Must
/// be called before the default instance is first touched by [`acquire`];
/// returns `Inconsistent` if the default instance was already materialized
/// (by an earlier `initialize` or an earlier `acquire`/`discard`/...).
pub fn initialize(
    options: Options,
    supplementary_malloc: Option<SupplementaryMalloc>,
    supplementary_free: Option<SupplementaryFree>,
) -> PoolResult<()> {
    let pool = ParallelPool::new(options.appetite, options.min_page_density, options.default_reclaim_goal);
    FACADE
        .set(GlobalPool {
            pool,
            options,
            malloc: supplementary_malloc.unwrap_or(default_malloc),
            free: supplementary_free.unwrap_or(default_free),
        })
        .map_err(|_| Reply::Inconsistent)
}

/// `acquire(size) -> ptr`: forwards to the default parallel pool; on
/// `RangeFail` (size outside every size class), falls back to the
/// supplementary allocator.
pub fn acquire(size: usize) -> PoolResult<NonNull<u8>> {
    if size == 0 {
        crate::reply::note(Reply::Disallowed, "facade::acquire");
        return Err(Reply::Disallowed);
    }
    let f = facade();
    let ptr = match f.pool.acquire(size) {
        Err(Reply::RangeFail) => {
            // SAFETY: `size` is nonzero, per the guard above.
            let raw = unsafe { (f.malloc)(size) };
            NonNull::new(raw).ok_or(Reply::ResourceFail).inspect_err(|&e| {
                f.report(e, "facade::acquire");
            })?
        }
        Err(e) => {
            f.report(e, "facade::acquire");
            return Err(e);
        }
        Ok(ptr) => ptr,
    };
    if f.options.zero_mem {
        // SAFETY: `ptr` was just handed back as `size` fresh, exclusively
        // owned bytes by whichever branch above produced it.
        unsafe { crate::utils::secure_zero(ptr.as_ptr(), size) };
    }
    Ok(ptr)
}

/// `calloc(size) -> ptr`: composed as acquire + zero-fill.
pub fn calloc(size: usize) -> PoolResult<NonNull<u8>> {
    let ptr = acquire(size)?;
    // SAFETY: `acquire` just handed back exclusive ownership of `size`
    // freshly-allocated bytes.
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };
    Ok(ptr)
}

/// `discard(ptr) -> reply`: queries the default pool; if it recognizes
/// `ptr`, releases it; otherwise forwards to the supplementary `free`.
///
/// # Safety
/// `ptr` must have come from a prior [`acquire`]/[`calloc`] on this same
/// process's default instance, not yet discarded.
pub unsafe fn discard(ptr: NonNull<u8>) -> PoolResult<()> {
    let f = facade();
    match unsafe { f.pool.query(ptr) } {
        Ok(size) => {
            if let Some(pattern) = f.options.mark_freed {
                // SAFETY: `size` is this block's live extent per the query
                // above, still exclusively owned until `release` below.
                unsafe { crate::utils::fill_pattern(ptr.as_ptr(), size, pattern) };
            }
            unsafe { ParallelPool::release(ptr) }
        }
        Err(Reply::NotFound) => {
            // SAFETY: not recognized by the default pool, so per this
            // module's `acquire` it must have come from the supplementary
            // allocator instead.
            unsafe { (f.free)(ptr.as_ptr()) };
            Ok(())
        }
        Err(e) => {
            f.report(e, "facade::discard");
            Err(e)
        }
    }
}

pub fn reclaim(goal: usize) -> PoolResult<usize> {
    if goal == 0 {
        return Err(Reply::Disallowed);
    }
    facade().pool.reclaim(goal)
}

pub fn flush() -> PoolResult<usize> {
    facade().pool.flush()
}

/// `query(ptr) -> size`: `NotFound` if `ptr` wasn't handed out by the
/// default pool (e.g. it came from the supplementary fallback).
///
/// # Safety
/// Same obligation as [`discard`].
pub unsafe fn query(ptr: NonNull<u8>) -> PoolResult<usize> {
    unsafe { facade().pool.query(ptr) }
}

pub fn check() -> PoolResult<()> {
    facade().pool.check()
}

/// An adapter dropping the default instance in as `#[global_allocator]`.
/// Handles over-alignment (beyond `align_of::<usize>()`) by over-allocating
/// and stashing the real slot pointer in a header just before the address
/// handed to the caller, since the multiplexer's linear size classes (step,
/// 2·step, 3·step, ...) don't all land on a power-of-two boundary the way a
/// binned allocator's classes would.
#[cfg(feature = "global")]
pub struct GlobalAllocAdapter;

#[cfg(feature = "global")]
unsafe impl std::alloc::GlobalAlloc for GlobalAllocAdapter {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.size() == 0 {
            return NonNull::dangling().as_ptr();
        }
        if layout.align() <= align_of::<usize>() {
            return acquire(layout.size()).map_or(std::ptr::null_mut(), |p| p.as_ptr());
        }
        let header = size_of::<usize>();
        let total = layout.size() + layout.align() - 1 + header;
        let Ok(base) = acquire(total) else {
            return std::ptr::null_mut();
        };
        let raw = base.as_ptr() as usize;
        let aligned = (raw + header + layout.align() - 1) & !(layout.align() - 1);
        // SAFETY: `aligned - header` lies within the `total`-byte block
        // `acquire` just handed back, writable for one word.
        unsafe { ((aligned - header) as *mut usize).write(raw) };
        aligned as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let real = if layout.align() <= align_of::<usize>() {
            ptr
        } else {
            let header = size_of::<usize>();
            // SAFETY: this pointer was handed out by `alloc` above with the
            // same over-alignment branch, which always leaves this header.
            let stored = unsafe { ((ptr as usize - header) as *const usize).read() };
            stored as *mut u8
        };
        if let Some(nn) = NonNull::new(real) {
            // SAFETY: `nn` came from this adapter's own `acquire` call.
            let _ = unsafe { discard(nn) };
        }
    }
}
