//! The slot pool (spec.md §4.2): O(1) fixed-size allocation built on a
//! [`VecPool`], with an intrusive LIFO free-stack living inside each node's
//! own slot bytes — the one piece of the original intrusive design spec.md
//! §9 explicitly keeps as-is ("the first word of an unallocated slot is the
//! next-free-index ... wrap in a tagged-union type that distinguishes
//! 'slot currently allocated' from 'slot currently in free stack' at the
//! type level"). [`FreeSlot`] is that tagged union's "currently free" half;
//! a slot that has been handed to a caller has no Rust-visible
//! representation at all (the caller owns those bytes as a `[u8]`).

use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::NonNull;

use crate::reply::{PoolResult, Reply};
use crate::vector_pool::{MakeNode, NodeHandle, VecPool};

/// The free-stack link stored in the first bytes of every unallocated slot.
/// `NIL` (`u32::MAX`) terminates the stack, matching the source's
/// "index, or NIL" free-stack head.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct FreeSlot(u32);

const NIL: u32 = u32::MAX;

impl FreeSlot {
    const fn nil() -> Self {
        Self(NIL)
    }
    fn is_nil(self) -> bool {
        self.0 == NIL
    }
}

/// Backing-storage strategy for a slot pool's nodes: where the bytes for
/// `capacity` slots of `granularity` each come from, and how they're torn
/// down. Mirrors the source's `mknode`/`rmnode`/`initslot` triple.
pub trait SlotBacking<Extra> {
    /// Allocates storage for one node's worth of slots and returns it along
    /// with the node's caller-defined extra bookkeeping.
    fn make_node(&mut self, granularity: usize, capacity: usize) -> PoolResult<(NonNull<u8>, Extra)>;

    /// Tears down storage previously returned by `make_node`.
    ///
    /// # Safety
    /// `storage` must be exactly the pointer `make_node` returned, not
    /// already destroyed.
    unsafe fn destroy_node(&mut self, storage: NonNull<u8>, granularity: usize, capacity: usize, extra: &mut Extra);

    /// Runs once per slot before its first acquire isn't distinguished from
    /// later ones at this layer (spec.md §4.2: "the caller is expected to
    /// detect 'first use' by inspecting slot state"); default is a no-op.
    fn init_slot(&mut self, _slot: &mut [u8], _extra: &Extra) {}
}

/// A slot node: an embedded vector node whose payload is this struct. Owns
/// a contiguous slot array, a free-stack head, and a live count.
pub struct SlotNode<Extra> {
    storage: NonNull<u8>,
    granularity: usize,
    capacity: u32,
    free_head: FreeSlot,
    count: u32,
    pub extra: Extra,
}

impl<Extra> SlotNode<Extra> {
    fn is_full(&self) -> bool {
        self.count == self.capacity
    }
    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn slot_ptr(&self, index: u32) -> NonNull<u8> {
        // SAFETY: index < capacity is upheld by every caller in this module.
        unsafe { NonNull::new_unchecked(self.storage.as_ptr().add(index as usize * self.granularity)) }
    }

    unsafe fn read_link(&self, index: u32) -> FreeSlot {
        unsafe { self.slot_ptr(index).cast::<FreeSlot>().read_unaligned() }
    }

    unsafe fn write_link(&self, index: u32, link: FreeSlot) {
        unsafe { self.slot_ptr(index).cast::<FreeSlot>().write_unaligned(link) };
    }
}

struct NodeFactory<'a, Extra, B> {
    backing: &'a mut B,
    granularity: usize,
    capacity: u32,
    _marker: PhantomData<Extra>,
}

impl<'a, Extra, B: SlotBacking<Extra>> MakeNode<SlotNode<Extra>> for NodeFactory<'a, Extra, B> {
    fn make_node(&mut self) -> PoolResult<SlotNode<Extra>> {
        let (storage, extra) = self.backing.make_node(self.granularity, self.capacity as usize)?;
        // Free stack is initialized in descending order so the first
        // acquire returns index 0, matching spec.md §4.2's stated
        // convention (purely cosmetic, no semantic weight).
        let node = SlotNode {
            storage,
            granularity: self.granularity,
            capacity: self.capacity,
            free_head: FreeSlot(0),
            count: 0,
            extra,
        };
        for i in 0..self.capacity {
            let link = if i + 1 == self.capacity { FreeSlot::nil() } else { FreeSlot(i + 1) };
            // SAFETY: storage holds `capacity` slots of `granularity` bytes
            // each, and granularity >= size_of::<FreeSlot>() is enforced in
            // `SlotPool::new`.
            unsafe { node.write_link(i, link) };
        }
        Ok(node)
    }
}

/// The slot pool itself.
pub struct SlotPool<Extra, B: SlotBacking<Extra>> {
    vec: VecPool<SlotNode<Extra>, NodeFactoryBox<Extra, B>>,
    granularity: usize,
    capacity: u32,
}

/// `NodeFactory` borrows `backing` for its lifetime, but `VecPool` wants an
/// owned factory it can call repeatedly across the pool's whole lifetime;
/// this box-of-backing indirection makes that ownership-safe without
/// threading a lifetime parameter through `SlotPool` itself.
struct NodeFactoryBox<Extra, B> {
    backing: B,
    granularity: usize,
    capacity: u32,
    _marker: PhantomData<Extra>,
}

impl<Extra, B: SlotBacking<Extra>> MakeNode<SlotNode<Extra>> for NodeFactoryBox<Extra, B> {
    fn make_node(&mut self) -> PoolResult<SlotNode<Extra>> {
        let mut factory = NodeFactory {
            backing: &mut self.backing,
            granularity: self.granularity,
            capacity: self.capacity,
            _marker: PhantomData,
        };
        factory.make_node()
    }
}

impl<Extra, B: SlotBacking<Extra>> SlotPool<Extra, B> {
    /// `mkpool(granularity, node_capacity, backing)`. `granularity` must be
    /// at least `size_of::<u32>()` (the free-stack link width); `node_capacity`
    /// must fit in a `u32` and be nonzero.
    pub fn new(granularity: usize, node_capacity: usize, backing: B) -> PoolResult<Self> {
        if granularity < size_of::<u32>() || node_capacity == 0 {
            return Err(Reply::Disallowed);
        }
        if node_capacity > u32::MAX as usize {
            return Err(Reply::RangeFail);
        }
        let factory = NodeFactoryBox {
            backing,
            granularity,
            capacity: node_capacity as u32,
            _marker: PhantomData,
        };
        Ok(Self {
            vec: VecPool::new(node_capacity, factory)?,
            granularity,
            capacity: node_capacity as u32,
        })
    }

    pub fn granularity(&self) -> usize {
        self.granularity
    }

    pub fn node_capacity(&self) -> u32 {
        self.capacity
    }

    pub fn backing_mut(&mut self) -> &mut B {
        &mut self.vec.factory_mut().backing
    }

    /// `acquire() -> ptr`: returns a pointer to a fresh slot, the node
    /// handle that owns it (the caller — aligned pool — needs the handle to
    /// embed in a footer), and whether that node was just minted (so a
    /// one-time per-node action, like writing a page footer, can run
    /// exactly once).
    pub fn acquire(&mut self) -> PoolResult<(NonNull<u8>, NodeHandle<SlotNode<Extra>>, bool)> {
        let (mut handle, is_new_node) = self.vec.get_node()?;
        // SAFETY: handle was just returned by this pool's own VecPool.
        let node = unsafe { handle.as_mut() };

        if node.free_head.is_nil() {
            return Err(Reply::Corrupt);
        }
        let index = node.free_head.0;
        // SAFETY: index comes from the free stack, in range by invariant.
        let next = unsafe { node.read_link(index) };
        node.free_head = next;
        node.count += 1;
        let is_full_now = node.is_full();
        let granularity = node.granularity;

        let ptr = unsafe { handle.as_ref() }.slot_ptr(index);
        // SAFETY: `handle` was produced by this pool's VecPool this call.
        unsafe { self.vec.acquire(handle, is_full_now)? };

        // `initslot` runs on every acquire, not only the slot's first use
        // (spec.md §4.2) — the backing strategy is responsible for
        // detecting "already initialized" itself if it cares.
        {
            // SAFETY: `ptr` is valid for `granularity` bytes and exclusively
            // owned until returned to the caller.
            let slot = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), granularity) };
            let node = unsafe { handle.as_ref() };
            self.vec.factory_mut().backing.init_slot(slot, &node.extra);
        }
        Ok((ptr, handle, is_new_node))
    }

    /// `release(ptr, node)`: pushes the slot back onto `node`'s free stack
    /// and, if the node is now empty, tears it down via the backing
    /// strategy.
    ///
    /// # Safety
    /// `node` must be the slot node that `ptr` was originally acquired
    /// from, still alive.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>, mut node: NodeHandle<SlotNode<Extra>>) -> PoolResult<()> {
        let node_ref = unsafe { node.as_mut() };
        let offset = ptr.as_ptr() as usize - node_ref.storage.as_ptr() as usize;
        if offset % node_ref.granularity != 0 {
            return Err(Reply::Corrupt);
        }
        let index = (offset / node_ref.granularity) as u32;
        if index >= node_ref.capacity {
            return Err(Reply::Corrupt);
        }

        let was_full = node_ref.is_full();
        // SAFETY: storage has `capacity` slots of `granularity` bytes.
        unsafe { node_ref.write_link(index, node_ref.free_head) };
        node_ref.free_head = FreeSlot(index);
        node_ref.count -= 1;
        let is_empty_now = node_ref.is_empty();

        // SAFETY: `node` was produced by this pool's VecPool.
        unsafe { self.vec.release(node, was_full, is_empty_now)? };

        if is_empty_now {
            // SAFETY: node is empty and about to be destroyed; not used again.
            let mut boxed = unsafe { self.vec.take_empty(node)? };
            let granularity = boxed.granularity;
            let capacity = boxed.capacity as usize;
            let storage = boxed.storage;
            // SAFETY: storage was produced by this same backing strategy's
            // make_node and is being destroyed exactly once.
            unsafe {
                self.vec
                    .factory_mut()
                    .backing
                    .destroy_node(storage, granularity, capacity, &mut boxed.extra)
            };
        }
        Ok(())
    }

    /// `chkpool`: every node's `count <= capacity`, full implies
    /// `count == capacity`, and the free stack has exactly `capacity - count`
    /// unique, in-range entries.
    pub fn check(&self) -> PoolResult<()> {
        self.vec.check(|node| {
            if node.count > node.capacity {
                return Err(Reply::Corrupt);
            }
            if node.is_full() != node.free_head.is_nil() {
                return Err(Reply::Corrupt);
            }
            let mut seen = vec![false; node.capacity as usize];
            let mut cursor = node.free_head;
            let mut walked = 0usize;
            while !cursor.is_nil() {
                let idx = cursor.0;
                if idx >= node.capacity || seen[idx as usize] {
                    return Err(Reply::Corrupt);
                }
                seen[idx as usize] = true;
                walked += 1;
                // SAFETY: idx is in range and slot is on the free stack (not
                // concurrently mutated; this pool is single-threaded).
                cursor = unsafe { node.read_link(idx) };
            }
            if walked != (node.capacity - node.count) as usize {
                return Err(Reply::Corrupt);
            }
            Ok(())
        })
    }
}
