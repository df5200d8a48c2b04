//! Process-wide configuration, grounded on the teacher's `OnceLock`-based
//! global-config pattern (`examples/vanyastaff-nebula/.../src/config.rs`)
//! but holding exactly the options `spec.md` §6 enumerates.

use std::sync::Arc;

use crate::reply::Reply;

/// How aggressively released pages are handed back to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Appetite {
    /// Decommit (or unmap) released pages immediately.
    #[default]
    Frugal,
    /// Keep pages committed, only advise the OS they're unused.
    Greedy,
}

/// A function invoked whenever a pool is about to return a non-routine
/// `Reply` to its caller. Replaces the source's process-wide reporter
/// function pointer (spec.md §9) with a value injected at `initialize` time
/// instead of static mutable state.
pub type ReporterFn = dyn Fn(Reply, &'static str) + Send + Sync;

/// Init-time and compile-time options, one field per row of spec.md §6's
/// configuration table.
#[derive(Clone)]
pub struct Options {
    /// Frugal vs greedy page-return policy.
    pub appetite: Appetite,
    /// If set, freed memory is overwritten with this byte before the slot
    /// returns to the free stack (debug aid).
    pub mark_freed: Option<u8>,
    /// Zero newly acquired memory before handing it to the caller.
    pub zero_mem: bool,
    /// Refuse to pool a size class that doesn't fit at least this many slots
    /// per page.
    pub min_page_density: usize,
    /// Default `k` (reclaim throttle) for lazy pools.
    pub default_reclaim_goal: usize,
    /// Sink for non-OK replies, invoked before they propagate to the caller.
    pub reporter: Option<Arc<ReporterFn>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            appetite: Appetite::Frugal,
            mark_freed: None,
            zero_mem: false,
            min_page_density: 2,
            default_reclaim_goal: 8,
            reporter: None,
        }
    }
}

impl core::fmt::Debug for Options {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Options")
            .field("appetite", &self.appetite)
            .field("mark_freed", &self.mark_freed)
            .field("zero_mem", &self.zero_mem)
            .field("min_page_density", &self.min_page_density)
            .field("default_reclaim_goal", &self.default_reclaim_goal)
            .field("reporter", &self.reporter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Options {
    pub fn report(&self, reply: Reply, site: &'static str) {
        crate::reply::note(reply, site);
        if let Some(reporter) = &self.reporter {
            reporter(reply, site);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = Options::default();
        assert_eq!(opts.appetite, Appetite::Frugal);
        assert!(!opts.zero_mem);
        assert_eq!(opts.min_page_density, 2);
    }
}
