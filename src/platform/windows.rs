//! Windows backing for the platform shim: `VirtualAlloc`/`VirtualFree`/
//! `VirtualProtect` via `winapi`, grounded on
//! `examples/vanyastaff-nebula/.../syscalls/direct.rs`'s windows branch.
//!
//! Unlike POSIX `mmap`, Windows genuinely distinguishes reserve (address
//! space only) from commit (physical backing), which is why
//! [`reserve`]/[`commit`] aren't collapsed here the way they are on unix
//! (spec.md §4.3).

use std::sync::OnceLock;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
use winapi::um::winnt::{MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE};

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
static VM_GRANULARITY: OnceLock<usize> = OnceLock::new();

fn system_info() -> SYSTEM_INFO {
    let mut info: SYSTEM_INFO = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid, writable SYSTEM_INFO the API fills in full.
    unsafe { GetSystemInfo(&mut info) };
    info
}

pub(super) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| system_info().dwPageSize as usize)
}

pub(super) fn vm_granularity() -> usize {
    *VM_GRANULARITY.get_or_init(|| system_info().dwAllocationGranularity as usize)
}

pub(super) unsafe fn reserve() -> Result<*mut u8, crate::reply::Reply> {
    // SAFETY: MEM_RESERVE with PAGE_NOACCESS reserves address space without
    // committing physical memory; a null return is VirtualAlloc's documented
    // failure signal.
    let p = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            vm_granularity(),
            MEM_RESERVE,
            PAGE_NOACCESS,
        )
    };
    if p.is_null() {
        Err(crate::reply::Reply::ResourceFail)
    } else {
        Ok(p.cast())
    }
}

pub(super) unsafe fn commit(page_addr: *mut u8) -> Result<(), crate::reply::Reply> {
    // SAFETY: page_addr lies within a live MEM_RESERVE range, per this
    // function's contract.
    let p = unsafe {
        VirtualAlloc(page_addr.cast(), page_size(), MEM_COMMIT, PAGE_READWRITE)
    };
    if p.is_null() {
        Err(crate::reply::Reply::ResourceFail)
    } else {
        Ok(())
    }
}

pub(super) unsafe fn decommit(page_addr: *mut u8) -> Result<(), crate::reply::Reply> {
    // SAFETY: page_addr is a committed page within a live reservation.
    let ok = unsafe { VirtualFree(page_addr.cast(), page_size(), MEM_DECOMMIT) };
    if ok != 0 {
        Ok(())
    } else {
        Err(crate::reply::Reply::ApiFail)
    }
}

pub(super) unsafe fn reset(page_addr: *mut u8) -> Result<(), crate::reply::Reply> {
    // Windows has no cheap "advise unused, keep committed" primitive
    // equivalent to MADV_DONTNEED that preserves the commit accounting this
    // crate relies on, so greedy appetite decommits here too; the
    // distinction still matters on unix (see unix::reset's doc comment).
    unsafe { decommit(page_addr) }
}

pub(super) unsafe fn release(addr: *mut u8) -> Result<(), crate::reply::Reply> {
    // SAFETY: addr is exactly a value previously returned by reserve.
    let ok = unsafe { VirtualFree(addr.cast(), 0, MEM_RELEASE) };
    if ok != 0 {
        Ok(())
    } else {
        Err(crate::reply::Reply::ApiFail)
    }
}
