//! Unix backing for the platform shim: `mmap`/`munmap`/`mprotect`/
//! `madvise` via `libc`, grounded on
//! `examples/vanyastaff-nebula/.../syscalls/direct.rs`'s unix branch.

use std::sync::OnceLock;

use crate::reply::Reply;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

pub(super) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf with a well-known, always-valid name; libc
        // documents a negative return only for unsupported names.
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n > 0 {
            n as usize
        } else {
            4096
        }
    })
}

pub(super) fn vm_granularity() -> usize {
    // Linux/macOS/BSD mmap's allocation granularity is the page size itself;
    // unlike Windows there's no separate coarser "allocation granularity".
    page_size()
}

/// SAFETY: `mmap`'s own contract — `addr` hint of `NULL` lets the kernel
/// pick, `PROT_NONE`/anonymous/private keeps this a pure reservation on
/// platforms where `MAP_NORESERVE` is honored, and the result is always
/// page-aligned.
unsafe fn map(len: usize, prot: libc::c_int) -> Result<*mut u8, Reply> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    // SAFETY: length is a positive multiple of the page size computed by
    // the caller; the returned pointer is checked against MAP_FAILED below.
    let p = unsafe { libc::mmap(std::ptr::null_mut(), len, prot, flags, -1, 0) };
    if p == libc::MAP_FAILED {
        Err(Reply::ResourceFail)
    } else {
        Ok(p.cast())
    }
}

pub(super) unsafe fn reserve() -> Result<*mut u8, Reply> {
    // POSIX has no reserve-without-commit primitive; the kernel does lazy
    // commit on first touch anyway, so PROT_NONE here would simply force an
    // extra mprotect later for no benefit.
    unsafe { map(vm_granularity(), libc::PROT_READ | libc::PROT_WRITE) }
}

pub(super) unsafe fn commit(page_addr: *mut u8) -> Result<(), Reply> {
    // Already readable/writable from `reserve`; nothing to do beyond
    // matching the platform-neutral calling convention.
    let _ = page_addr;
    Ok(())
}

pub(super) unsafe fn decommit(page_addr: *mut u8) -> Result<(), Reply> {
    // SAFETY: page_addr is page-aligned and lies within a live mapping, per
    // this function's contract (see platform::decommit).
    let rc = unsafe { libc::madvise(page_addr.cast(), page_size(), libc::MADV_DONTNEED) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Reply::ApiFail)
    }
}

pub(super) unsafe fn reset(page_addr: *mut u8) -> Result<(), Reply> {
    // Greedy appetite: advise-unused without relinquishing the mapping.
    unsafe { decommit(page_addr) }
}

pub(super) unsafe fn release(addr: *mut u8) -> Result<(), Reply> {
    // SAFETY: addr is exactly a value previously returned by reserve and not
    // yet released, per this function's contract.
    let rc = unsafe { libc::munmap(addr.cast(), vm_granularity()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Reply::ApiFail)
    }
}
