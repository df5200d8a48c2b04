//! End-to-end scenarios, scaled down from the full iteration counts for
//! test-suite speed (the same scaling `page_pool`'s own unit tests already
//! apply to Scenario A).

use std::ptr::NonNull;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ramkit::aligned_pool::AlignedPool;
use ramkit::config::Appetite;
use ramkit::mux_pool::MuxPool;
use ramkit::page_pool::PagePool;
use ramkit::parallel_pool::ParallelPool;
use ramkit::reply::Reply;
use ramkit::slot_pool::{SlotBacking, SlotPool};

/// Mirrors `AlignedPool::new`'s own capacity computation (`footer_offset /
/// granularity`, not the raw writable zone) so these boundary tests probe
/// the same arithmetic the pool actually runs.
fn aligned_pool_capacity(writable_zone: usize, granularity: usize) -> usize {
    type SlotHandle = ramkit::vector_pool::NodeHandle<ramkit::slot_pool::SlotNode<NonNull<AlignedPool>>>;
    let footer: ramkit::footer::FooterSpec<SlotHandle> =
        ramkit::footer::FooterSpec::new(writable_zone, ramkit::signature::SIG_ALIG).unwrap();
    footer.footer_offset() / granularity
}

struct HeapBacking;

impl SlotBacking<()> for HeapBacking {
    fn make_node(&mut self, granularity: usize, capacity: usize) -> ramkit::reply::PoolResult<(NonNull<u8>, ())> {
        let layout = std::alloc::Layout::array::<u8>(granularity * capacity).unwrap();
        // SAFETY: layout has nonzero size for nonzero granularity/capacity.
        let p = unsafe { std::alloc::alloc(layout) };
        NonNull::new(p).map(|p| (p, ())).ok_or(Reply::ResourceFail)
    }

    unsafe fn destroy_node(&mut self, storage: NonNull<u8>, granularity: usize, capacity: usize, _extra: &mut ()) {
        let layout = std::alloc::Layout::array::<u8>(granularity * capacity).unwrap();
        unsafe { std::alloc::dealloc(storage.as_ptr(), layout) };
    }
}

/// Scenario B: randomized slot pool. Size = 8 bytes, node capacity = 10,
/// shuffled acquire/release with fill-checks, no corruption, zero leaks.
#[test]
fn scenario_b_randomized_slot_pool() {
    let mut pool = SlotPool::new(8, 10, HeapBacking).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let mut live: Vec<(NonNull<u8>, ramkit::vector_pool::NodeHandle<ramkit::slot_pool::SlotNode<()>>, u8)> = Vec::new();

    for i in 0..2_000u32 {
        let do_acquire = live.is_empty() || rng.gen_bool(0.5);
        if do_acquire {
            let (ptr, node, _) = pool.acquire().unwrap();
            let byte = (i & 0xff) as u8;
            unsafe { std::ptr::write_bytes(ptr.as_ptr(), byte, 8) };
            live.push((ptr, node, byte));
        } else {
            let idx = rng.gen_range(0..live.len());
            let (ptr, node, byte) = live.swap_remove(idx);
            unsafe {
                let slice = std::slice::from_raw_parts(ptr.as_ptr(), 8);
                assert!(slice.iter().all(|&b| b == byte));
                pool.release(ptr, node).unwrap();
            }
        }
    }
    for (ptr, node, byte) in live {
        unsafe {
            let slice = std::slice::from_raw_parts(ptr.as_ptr(), 8);
            assert!(slice.iter().all(|&b| b == byte));
            pool.release(ptr, node).unwrap();
        }
    }
    pool.check().unwrap();
}

/// Scenario C: multiplexer mixed sizes. Sizes in [4, 100], fill each,
/// interleaved releases, `query` reports the correctly rounded size.
#[test]
fn scenario_c_multiplexer_mixed_sizes() {
    let mut mux = MuxPool::new(Appetite::Frugal, 2);
    let mut rng = StdRng::seed_from_u64(1);
    let mut live = Vec::new();

    for _ in 0..5_000u32 {
        if live.is_empty() || rng.gen_bool(0.5) {
            let size = 4 + rng.gen_range(0..97);
            let ptr = mux.acquire(size).unwrap();
            unsafe { std::ptr::write_bytes(ptr.as_ptr(), (size & 0xff) as u8, size) };
            live.push((ptr, size));
        } else {
            let idx = rng.gen_range(0..live.len());
            let (ptr, size) = live.swap_remove(idx);
            let (_mux_ptr, rounded) = unsafe { MuxPool::query(ptr) }.unwrap();
            assert!(rounded >= size);
            unsafe {
                let slice = std::slice::from_raw_parts(ptr.as_ptr(), size);
                assert!(slice.iter().all(|&b| b == (size & 0xff) as u8));
            }
            mux.release(ptr).unwrap();
        }
    }
    for (ptr, _size) in live {
        mux.release(ptr).unwrap();
    }
    mux.check().unwrap();
}

/// Scenario D (scaled): several threads sharing one parallel pool, each
/// running its own acquire/release mix, each ending with a clean `check`.
#[test]
fn scenario_d_parallel_pool_multiple_threads() {
    let pool = std::sync::Arc::new(ParallelPool::new(Appetite::Frugal, 2, 16));
    let mut handles = Vec::new();
    for t in 0..4u8 {
        let pool = pool.clone();
        handles.push(std::thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(100 + t as u64);
            let mut live = Vec::new();
            for _ in 0..2_000u32 {
                if live.is_empty() || rng.gen_bool(0.5) {
                    let size = 8 + rng.gen_range(0..56);
                    let ptr = pool.acquire(size).unwrap();
                    unsafe { std::ptr::write_bytes(ptr.as_ptr(), t, size) };
                    live.push((ptr, size));
                } else {
                    let idx = rng.gen_range(0..live.len());
                    let (ptr, size) = live.swap_remove(idx);
                    unsafe {
                        let slice = std::slice::from_raw_parts(ptr.as_ptr(), size);
                        assert!(slice.iter().all(|&b| b == t));
                        ParallelPool::release(ptr).unwrap();
                    }
                }
            }
            for (ptr, _size) in live {
                unsafe { ParallelPool::release(ptr).unwrap() };
            }
            pool.check().unwrap();
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

/// Scenario E: thread A acquires, hands the pointer to thread B, B releases.
/// The release lands on A's trash, drained by A's next `reclaim`.
#[test]
fn scenario_e_cross_thread_release() {
    let pool = std::sync::Arc::new(ParallelPool::new(Appetite::Frugal, 2, 100));
    let ptr = pool.acquire(24).unwrap();
    let addr = ptr.as_ptr() as usize;

    std::thread::spawn(move || {
        let ptr = NonNull::new(addr as *mut u8).unwrap();
        unsafe { ParallelPool::release(ptr).unwrap() };
    })
    .join()
    .unwrap();

    let reclaimed = pool.reclaim(10).unwrap();
    assert_eq!(reclaimed, 1);
}

/// Scenario F: a request larger than any size class falls back to the
/// supplementary allocator; `query` on it reports `NotFound`, and
/// `discard` frees it without corrupting the pool.
#[test]
fn scenario_f_fallback_integration() {
    let huge = std::mem::size_of::<usize>() * (ramkit::mux_pool::NUM_CLASSES + 1);
    let ptr = ramkit::facade::acquire(huge).unwrap();
    unsafe {
        std::ptr::write_bytes(ptr.as_ptr(), 0x5a, huge);
        assert_eq!(ramkit::facade::query(ptr), Err(Reply::NotFound));
        ramkit::facade::discard(ptr).unwrap();
    }
    ramkit::facade::check().unwrap();
}

/// Boundary: a slot-pool node with exactly `min_page_density` slots must
/// succeed; one less must `RangeFail`. A granularity equal to the footer's
/// own offset (not the raw writable zone) gives a node capacity of exactly
/// 1, so the boundary is crossed just by varying `min_page_density` between
/// 1 and 2.
#[test]
fn boundary_min_page_density() {
    let zone = PagePool::writable_zone_hint().unwrap();
    let granularity = aligned_pool_capacity(zone, 1); // footer_offset, since dividing by 1 is a no-op
    assert_eq!(aligned_pool_capacity(zone, granularity), 1);
    assert!(AlignedPool::new(Appetite::Frugal, granularity, 1, None).is_ok());
    assert_eq!(
        AlignedPool::new(Appetite::Frugal, granularity, 2, None).map(|_| ()),
        Err(Reply::RangeFail)
    );
}

/// Boundary: a size exactly on a class boundary routes to that class, not
/// the next one up.
#[test]
fn boundary_size_class_exact_match() {
    let step = std::mem::size_of::<usize>();
    let mut mux = MuxPool::new(Appetite::Frugal, 2);
    let at_boundary = mux.acquire(step * 3).unwrap();
    let (_p, size_at) = unsafe { MuxPool::query(at_boundary) }.unwrap();
    assert_eq!(size_at, step * 3);

    let past_boundary = mux.acquire(step * 3 + 1).unwrap();
    let (_p, size_past) = unsafe { MuxPool::query(past_boundary) }.unwrap();
    assert_eq!(size_past, step * 4);

    mux.release(at_boundary).unwrap();
    mux.release(past_boundary).unwrap();
}

/// Boundary: acquiring every slot from a fresh aligned pool then releasing
/// all of them leaves the pool behaving exactly like a fresh one again.
#[test]
fn boundary_acquire_all_then_release_all() {
    let mut pool = AlignedPool::new(Appetite::Frugal, 64, 2, None).unwrap();
    let capacity = aligned_pool_capacity(PagePool::writable_zone_hint().unwrap(), 64);
    let mut ptrs = Vec::new();
    for _ in 0..capacity {
        ptrs.push(pool.acquire().unwrap());
    }
    for ptr in ptrs {
        pool.release(ptr).unwrap();
    }
    pool.check().unwrap();
    // A fresh acquire after the full round-trip must behave like the very
    // first one: it succeeds and doesn't collide with stale bookkeeping.
    let fresh = pool.acquire().unwrap();
    pool.release(fresh).unwrap();
}
