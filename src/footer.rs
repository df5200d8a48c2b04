//! Page footers (spec.md §3 "Page footer", §4.3 step 5, §4.4): a fixed,
//! alignment-adjusted, right-aligned structure near the tail of a writable
//! zone, tagged with a signature, letting an owner be recovered from any
//! address in that zone in O(1) by masking down to the zone's base and
//! reading a known offset.
//!
//! Grounded on `examples/original_source/src/lib/foot.c`'s
//! `ramfoot_mkspec`/`ramfoot_mkfooter`/`ramfoot_getstorage`. Two nested
//! instances of this exist in the final design: the page pool's own
//! "PAGE"-tagged footer (computed against the full hardware page size) and
//! the aligned pool's "ALIG"-tagged footer nested inside the page pool's
//! reduced writable zone (see `page_pool`/`aligned_pool`). Unlike the
//! source, the payload stored here is always just a pointer to a
//! Rust-heap-owned node rather than an embedded struct — see DESIGN.md for
//! why that's a safe simplification in Rust.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use crate::reply::{PoolResult, Reply};
use crate::signature::Signature;

/// A computed footer layout for payload type `P`, analogous to
/// `ramfoot_spec_t`.
pub struct FooterSpec<P> {
    /// Offset from the zone's base address to the footer's first byte.
    footer_offset: usize,
    /// Offset from the footer's first byte to the payload (after the
    /// signature word).
    storage_offset: usize,
    signature: Signature,
    _marker: PhantomData<P>,
}

#[repr(C)]
struct FooterLayout<P> {
    signature: u32,
    payload: P,
}

impl<P> FooterSpec<P> {
    /// Builds a spec right-aligning a `FooterLayout<P>` within `writable_zone`
    /// bytes, matching `ramfoot_alignright`: the footer's own alignment
    /// requirement is honored by rounding the right-aligned offset down to
    /// that alignment, exactly as the source does.
    pub fn new(writable_zone: usize, signature: Signature) -> PoolResult<Self> {
        let footer_size = size_of::<FooterLayout<P>>();
        let footer_align = align_of::<FooterLayout<P>>();
        if footer_size == 0 || footer_size > writable_zone {
            return Err(Reply::RangeFail);
        }
        let right_aligned = writable_zone - footer_size;
        let footer_offset = right_aligned & !(footer_align - 1);
        let storage_offset = std::mem::offset_of!(FooterLayout<P>, payload);

        Ok(Self {
            footer_offset,
            storage_offset,
            signature,
            _marker: PhantomData,
        })
    }

    /// Distance from a zone's base to the footer — the portion of the zone
    /// usable by upper layers (`spec.md` §4.3's page-pool "granularity").
    pub fn footer_offset(&self) -> usize {
        self.footer_offset
    }

    fn footer_addr(&self, zone_base: *mut u8) -> *mut u8 {
        // SAFETY (caller obligation): zone_base + footer_offset stays within
        // the allocation the caller reserved for this zone.
        unsafe { zone_base.add(self.footer_offset) }
    }

    /// Writes the footer's signature and payload. Returns a pointer to the
    /// payload's storage, matching `ramfoot_mkfooter`.
    ///
    /// # Safety
    /// `zone_base` must be writable for at least `writable_zone` bytes (the
    /// value passed to [`Self::new`]) and must not already hold a live
    /// footer this call would overwrite while in use.
    pub unsafe fn write(&self, zone_base: *mut u8, payload: P) -> NonNull<P> {
        let footer = self.footer_addr(zone_base).cast::<FooterLayout<P>>();
        // SAFETY: footer_addr lies within the writable zone by construction
        // of footer_offset in `new`, and the caller guarantees writability.
        unsafe {
            (*footer).signature = self.signature.bytes_as_u32();
            std::ptr::write(std::ptr::addr_of_mut!((*footer).payload), payload);
            NonNull::new_unchecked(std::ptr::addr_of_mut!((*footer).payload))
        }
    }

    /// Reads the footer's payload, treating the memory as untrusted input:
    /// a signature mismatch returns `NotFound`, never `Corrupt`, matching
    /// spec.md §9's footer-reading contract.
    ///
    /// # Safety
    /// `zone_base` must point at the base of a zone at least `writable_zone`
    /// bytes long that was either produced by [`Self::write`] with this same
    /// spec, or is foreign memory the caller is deliberately probing.
    pub unsafe fn read(&self, zone_base: *mut u8) -> PoolResult<NonNull<P>> {
        let footer = self.footer_addr(zone_base).cast::<FooterLayout<P>>();
        // SAFETY: caller guarantees zone_base is valid for at least
        // `writable_zone` bytes, which covers the footer by construction.
        let sig = unsafe { (*footer).signature };
        if sig != self.signature.bytes_as_u32() {
            return Err(Reply::NotFound);
        }
        // SAFETY: signature matched, so this is (with high probability) a
        // footer this spec wrote; even if it's a collision, `payload` is
        // `Copy`-free and we only ever take its address, never read through
        // it without the caller further validating (aligned/page pool do,
        // via their own back-pointer checks).
        Ok(unsafe { NonNull::new_unchecked(std::ptr::addr_of_mut!((*footer).payload)) })
    }
}

impl Signature {
    fn bytes_as_u32(self) -> u32 {
        u32::from_le_bytes(self.bytes())
    }
}
