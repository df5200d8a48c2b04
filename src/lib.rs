//! # ramkit
//!
//! A layered, pooled heap allocator for small, frequently allocated,
//! fixed-size objects. Requests outside the pooled size range are handed
//! off to a supplementary allocator.
//!
//! The layers, bottom to top:
//!
//! - [`vector_pool`] — tracks which nodes of a higher layer have free
//!   capacity.
//! - [`slot_pool`] — O(1) fixed-size allocation on top of a vector pool.
//! - [`page_pool`] — hands out OS hardware pages.
//! - [`aligned_pool`] — fixed-size slots living on a single page, with O(1)
//!   owner recovery from any interior address via a page footer.
//! - [`mux_pool`] — routes a size request to one of 128 aligned pools.
//! - [`lazy_pool`] — defers cross-thread releases onto a trash stack.
//! - [`parallel_pool`] — one lazy pool per thread.
//! - [`facade`] — the process-wide default instance.
//!
//! Most applications only need [`facade`]'s free functions (or the
//! `GlobalAllocAdapter` it exposes under the `global` feature); the other
//! modules are public for embedders who want their own pool hierarchy
//! rather than the shared default one.

pub mod aligned_pool;
pub mod config;
pub mod facade;
pub mod footer;
pub mod lazy_pool;
pub mod mux_pool;
pub mod page_pool;
pub mod parallel_pool;
pub mod platform;
pub mod reply;
pub mod signature;
pub mod slot_pool;
pub mod trash;
pub mod utils;
pub mod vector_pool;

pub use config::{Appetite, Options};
pub use reply::{PoolResult, Reply};
