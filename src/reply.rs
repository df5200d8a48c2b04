//! The closed-set outcome taxonomy every pool operation returns.
//!
//! `Reply` mirrors the original library's `ram_reply_t` enum one-for-one,
//! minus `OK` (modeled by `Result::Ok`) and `INSANE` (modeled by a panic,
//! since the source itself documents it as "a branch claimed unreachable
//! was reached" — not a value any caller is meant to recover from).

use std::sync::atomic::{AtomicUsize, Ordering};

/// Everything a pool operation can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Reply {
    /// Caller passed a NULL/zero/otherwise-forbidden argument.
    #[error("disallowed argument")]
    Disallowed,
    /// Size outside the pooled range, or a numeric cast would lose information.
    #[error("out of capacity or size range")]
    RangeFail,
    /// The address is not owned by the pool that was asked about it.
    #[error("address not owned by this pool")]
    NotFound,
    /// The requested operation isn't supported in this configuration.
    #[error("unsupported operation")]
    Unsupported,
    /// A precondition on pool state was not met (used before init, or torn down).
    #[error("pool used in an inconsistent state")]
    Inconsistent,
    /// A runtime invariant was violated (free-list length, signature, list linkage).
    #[error("internal invariant violated")]
    Corrupt,
    /// The OS refused to create VM, a mutex, or a TLS key.
    #[error("OS resource allocation failed")]
    ResourceFail,
    /// An underlying C-runtime-equivalent call failed.
    #[error("runtime call failed")]
    CrtFail,
    /// An underlying OS API call failed.
    #[error("OS API call failed")]
    ApiFail,
    /// Transient condition; retry may succeed.
    #[error("try again")]
    Again,
    /// An arithmetic or stack operation underflowed.
    #[error("underflow")]
    Underflow,
    /// An arithmetic operation overflowed.
    #[error("overflow")]
    Overflow,
    /// Malformed input that isn't simply a forbidden-argument case.
    #[error("malformed input")]
    InputFail,
}

/// The result type every pool operation returns.
pub type PoolResult<T> = Result<T, Reply>;

impl Reply {
    /// True for the two replies that are expected, routine control flow
    /// (routing to a fallback allocator) rather than programmer or OS error.
    pub fn is_routine(self) -> bool {
        matches!(self, Reply::NotFound | Reply::RangeFail)
    }

    fn stats_index(self) -> usize {
        self as usize
    }
}

/// Process-wide atomic counters, one per `Reply` variant, gated behind the
/// `stats` feature so a host process can inspect how often each kind fired.
#[cfg(feature = "stats")]
#[derive(Debug, Default)]
pub struct ReplyStats {
    counts: [AtomicUsize; 13],
}

#[cfg(feature = "stats")]
impl ReplyStats {
    pub const fn new() -> Self {
        // AtomicUsize::new is const, but array-from-fn isn't in a const fn on
        // stable without a macro; spell it out. One slot per `Reply` variant
        // (Disallowed..=InputFail).
        Self {
            counts: [
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
            ],
        }
    }

    pub fn record(&self, reply: Reply) {
        self.counts[reply.stats_index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, reply: Reply) -> usize {
        self.counts[reply.stats_index()].load(Ordering::Relaxed)
    }
}

#[cfg(feature = "stats")]
pub static REPLY_STATS: ReplyStats = ReplyStats::new();

/// Records `reply` into the global counters (if `stats` is enabled) and logs
/// it at an appropriate level (if `logging` is enabled). Called at the one
/// point in each layer where an error is about to be returned to the caller,
/// mirroring the source's single "reporter callback" choke point.
#[inline]
pub fn note(reply: Reply, site: &'static str) {
    #[cfg(feature = "stats")]
    REPLY_STATS.record(reply);

    #[cfg(feature = "logging")]
    {
        if reply.is_routine() {
            tracing::trace!(reply = %reply, site, "pool operation routed to fallback");
        } else if matches!(reply, Reply::Corrupt) {
            tracing::error!(reply = %reply, site, "pool invariant violated");
        } else {
            tracing::warn!(reply = %reply, site, "pool operation failed");
        }
    }
    #[cfg(not(feature = "logging"))]
    {
        let _ = (reply, site);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routine_classification() {
        assert!(Reply::NotFound.is_routine());
        assert!(Reply::RangeFail.is_routine());
        assert!(!Reply::Corrupt.is_routine());
    }

    #[cfg(feature = "stats")]
    #[test]
    fn stats_count() {
        let stats = ReplyStats::new();
        stats.record(Reply::NotFound);
        stats.record(Reply::NotFound);
        assert_eq!(stats.count(Reply::NotFound), 2);
        assert_eq!(stats.count(Reply::Corrupt), 0);
    }
}
