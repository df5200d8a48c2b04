//! 4-byte page-footer tags: a cheap, probabilistic "do I own this page?"
//! check performed before trusting the rest of a footer. Grounded on
//! `examples/original_source/include/ramalloc/sig.h`'s `ramsig_signature_t`
//! union of a `u32` and a 4-byte array.

/// A 4-byte tag compared with a fast integer equality check rather than
/// `memcmp`, matching `RAMSIG_CMP`.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature(u32);

impl Signature {
    /// Builds a signature from 4 ASCII bytes, little-endian packed exactly as
    /// `RAMSIG_MKUINT32(a, b, c, d)` does.
    pub const fn new(tag: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(tag))
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl core::fmt::Debug for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let b = self.bytes();
        write!(
            f,
            "Signature({:?})",
            core::str::from_utf8(&b).unwrap_or("<non-utf8>")
        )
    }
}

/// Page-pool footers: one per hardware page, storing a back-pointer to the
/// owning region node.
pub const SIG_PAGE: Signature = Signature::new(*b"PAGE");
/// Aligned-pool footers: nested inside the page-pool's writable zone,
/// storing a pointer to the owning slot node.
pub const SIG_ALIG: Signature = Signature::new(*b"ALIG");
/// Multiplexer ownership tag, stored in the aligned pool's 2-word tag.
pub const SIG_MUXP: Signature = Signature::new(*b"MUXP");
/// Reserved for slot-pool-level tagging when a slot pool isn't backed by an
/// aligned pool's footer (kept for parity with the source's `"SLOT"` tag).
pub const SIG_SLOT: Signature = Signature::new(*b"SLOT");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        assert_eq!(SIG_PAGE.bytes(), *b"PAGE");
        assert_eq!(SIG_ALIG.bytes(), *b"ALIG");
        assert_ne!(SIG_PAGE, SIG_ALIG);
    }
}
