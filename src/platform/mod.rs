//! The platform virtual-memory shim consumed by the page pool: page size,
//! VM allocation granularity, and reserve/commit/decommit/reset/release.
//!
//! Grounded on `examples/vanyastaff-nebula/.../syscalls/direct.rs`'s
//! `#[cfg(unix)]`/`#[cfg(windows)]` split over `libc`/`winapi`, narrowed to
//! exactly the operations spec.md §6's platform contract names (this crate
//! has no need for `madvise`'s full flag set or NUMA queries, so those are
//! dropped rather than carried over unused).

use crate::reply::Reply;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as imp;
    } else if #[cfg(windows)] {
        mod windows;
        use windows as imp;
    } else {
        compile_error!("ramkit's platform module supports unix and windows only");
    }
}

/// The hardware page size, in bytes. Always a power of two.
#[inline]
pub fn page_size() -> usize {
    imp::page_size()
}

/// The OS's coarse VM allocation unit (`mmap`/`VirtualAlloc` granularity),
/// always a positive multiple of `page_size()`.
#[inline]
pub fn vm_granularity() -> usize {
    imp::vm_granularity()
}

/// Reserves one `vm_granularity()`-sized address range without committing
/// any physical memory to it.
///
/// # Safety
/// The returned pointer must eventually be passed to [`release`] exactly
/// once, and to no other platform call after that.
pub unsafe fn reserve() -> Result<*mut u8, Reply> {
    unsafe { imp::reserve() }
}

/// Commits the single hardware page at `page_addr` (which must lie within a
/// range previously returned by [`reserve`]) so it can be read and written.
///
/// # Safety
/// `page_addr` must be `page_size()`-aligned and inside a live reservation.
pub unsafe fn commit(page_addr: *mut u8) -> Result<(), Reply> {
    unsafe { imp::commit(page_addr) }
}

/// Decommits the single hardware page at `page_addr`, returning its
/// physical backing to the OS (frugal appetite).
///
/// # Safety
/// `page_addr` must be `page_size()`-aligned, committed, and inside a live
/// reservation.
pub unsafe fn decommit(page_addr: *mut u8) -> Result<(), Reply> {
    unsafe { imp::decommit(page_addr) }
}

/// Advises the OS that the page at `page_addr` is unused without releasing
/// its backing (greedy appetite): `madvise(MADV_DONTNEED)` on Unix, a no-op
/// `VirtualAlloc` reset on Windows.
///
/// # Safety
/// `page_addr` must be `page_size()`-aligned, committed, and inside a live
/// reservation.
pub unsafe fn reset(page_addr: *mut u8) -> Result<(), Reply> {
    unsafe { imp::reset(page_addr) }
}

/// Unmaps one `vm_granularity()`-sized range previously returned by
/// [`reserve`].
///
/// # Safety
/// `addr` must be exactly a pointer previously returned by `reserve`, not
/// yet released.
pub unsafe fn release(addr: *mut u8) -> Result<(), Reply> {
    unsafe { imp::release(addr) }
}
