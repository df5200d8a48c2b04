//! Small stand-alone helpers shared by the ambient option paths:
//! debug-fill/zero-fill for the `zero-mem` and `mark-freed` config options
//! (spec.md §6).

use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

/// Overwrites `len` bytes at `ptr` with zero. Used by the `zero-mem` option.
///
/// # Safety
/// `ptr` must be valid for `len` bytes of writes.
#[inline]
pub unsafe fn secure_zero(ptr: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe {
        ptr::write_bytes(ptr, 0, len);
    }
    compiler_fence(Ordering::SeqCst);
}

/// Fills `len` bytes at `ptr` with `pattern`. Used by the `mark-freed` option.
///
/// # Safety
/// `ptr` must be valid for `len` bytes of writes.
#[inline]
pub unsafe fn fill_pattern(ptr: *mut u8, len: usize, pattern: u8) {
    if len == 0 {
        return;
    }
    unsafe {
        ptr::write_bytes(ptr, pattern, len);
    }
    compiler_fence(Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_zero_clears_bytes() {
        let mut buf = [0xAAu8; 16];
        unsafe { secure_zero(buf.as_mut_ptr(), buf.len()) };
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn fill_pattern_writes_byte() {
        let mut buf = [0u8; 16];
        unsafe { fill_pattern(buf.as_mut_ptr(), buf.len(), 0xCD) };
        assert!(buf.iter().all(|&b| b == 0xCD));
    }
}
