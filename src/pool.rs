//! Per-type chunk-backed node pool with a lock-free free list.
//!
//! Mirrors the Treiber-stack free-list shape the teacher pack uses for its
//! `LockFreeStack` (`push`/`pop` via `compare_exchange` loops), but applied
//! to recycling fixed-size cells instead of user values. Chunks are never
//! freed or resized while the pool is alive; the pool grows by chaining a
//! new chunk onto `current_chunk` when the active one is exhausted.

use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::atomic::AtomicCell;

use crate::error::{JobQueueError, Result};

pub const MIN_CHUNK_SIZE: usize = 64;
pub const MAX_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_CHUNK_SIZE: usize = 256;
pub const DEFAULT_INITIAL_CHUNKS: usize = 1;

/// A type poolable by [`NodePool`].
///
/// Implementors lend their own intrusive "next" slot to the pool's free
/// list, so returning a cell to the pool costs no extra allocation — the
/// same memory a node occupies in the queue is reused to thread the free
/// list while the node is idle.
pub trait Poolable: Default {
    /// The slot used to chain this cell into the pool's free list. A given
    /// cell is either linked into its owner (the queue) or into the free
    /// list, never both at once, so reusing the field is sound.
    fn free_next(&self) -> &AtomicPtr<Self>;

    /// Reset any payload to the type's default "empty" state.
    fn reset(&self);

    /// Monotonically increasing recycle counter, bumped on every
    /// deallocation. Combined with hazard-pointer protection upstream,
    /// this lets callers notice a cell has been recycled since they last
    /// observed it.
    fn version(&self) -> &AtomicU64;
}

/// A free-list head paired with a tag bumped on every push and pop, so a
/// `compare_exchange` against a stale `head` fails even if the same cell
/// has since been popped and pushed back (the classic ABA scenario:
/// thread A reads `head == X`, stalls, thread B pops `X`, reallocates it
/// into the live queue, then deallocates it again so it's back on the
/// free list at the same address — A's CAS would otherwise succeed
/// against a node that's concurrently live elsewhere). Mirrors the
/// packed-pointer-plus-version technique the teacher pack uses for its
/// own ABA-protected stack, built on `AtomicCell` instead of a
/// nightly-only wide atomic so it compiles on stable.
struct TaggedPtr<T> {
    ptr: *mut T,
    tag: u64,
}

impl<T> Clone for TaggedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaggedPtr<T> {}

impl<T> PartialEq for TaggedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.tag == other.tag
    }
}

impl<T> Eq for TaggedPtr<T> {}

impl<T> TaggedPtr<T> {
    const fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            tag: 0,
        }
    }
}

#[repr(align(64))]
struct PoolChunk<T: Poolable> {
    nodes: Box<[T]>,
    allocation_index: AtomicUsize,
    next: AtomicPtr<PoolChunk<T>>,
    capacity: usize,
}

impl<T: Poolable> PoolChunk<T> {
    fn new(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity);
        nodes.resize_with(capacity, T::default);
        Self {
            nodes: nodes.into_boxed_slice(),
            allocation_index: AtomicUsize::new(0),
            next: AtomicPtr::new(std::ptr::null_mut()),
            capacity,
        }
    }
}

/// Snapshot of pool counters, useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatistics {
    pub total_chunks: usize,
    pub total_nodes: usize,
    pub allocated_nodes: usize,
    pub free_list_size: usize,
}

/// Chunk-backed allocator for fixed-size cells of type `T`.
///
/// `allocate` is wait-free when the free list or current chunk has room,
/// and lock-free (bounded retries under a losing CAS) when a new chunk
/// must be installed.
pub struct NodePool<T: Poolable> {
    chunk_size: usize,
    max_chunks: Option<usize>,
    free_list: AtomicCell<TaggedPtr<T>>,
    current_chunk: AtomicPtr<PoolChunk<T>>,
    total_chunks: AtomicUsize,
    total_nodes: AtomicUsize,
    allocated_nodes: AtomicUsize,
    free_list_size: AtomicUsize,
}

// SAFETY: all mutable access goes through atomics and CAS loops; `T` cells
// are handed out exclusively (never aliased) once popped from either the
// free list or a fresh chunk slot.
unsafe impl<T: Poolable + Send> Send for NodePool<T> {}
unsafe impl<T: Poolable + Send> Sync for NodePool<T> {}

impl<T: Poolable> NodePool<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CHUNKS, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CHUNKS, chunk_size)
    }

    pub fn with_capacity(initial_chunks: usize, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        let pool = Self {
            chunk_size,
            max_chunks: None,
            free_list: AtomicCell::new(TaggedPtr::null()),
            current_chunk: AtomicPtr::new(std::ptr::null_mut()),
            total_chunks: AtomicUsize::new(0),
            total_nodes: AtomicUsize::new(0),
            allocated_nodes: AtomicUsize::new(0),
            free_list_size: AtomicUsize::new(0),
        };
        for _ in 0..initial_chunks {
            let _ = pool.grow();
        }
        pool
    }

    /// Impose a ceiling on the number of chunks this pool may allocate.
    /// Once reached, `allocate` returns `AllocationFailed` instead of
    /// growing further.
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = Some(max_chunks);
        self
    }

    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            total_chunks: self.total_chunks.load(Ordering::Relaxed),
            total_nodes: self.total_nodes.load(Ordering::Relaxed),
            allocated_nodes: self.allocated_nodes.load(Ordering::Relaxed),
            free_list_size: self.free_list_size.load(Ordering::Relaxed),
        }
    }

    /// Allocates a cell, never returning null. Fails only if a
    /// `max_chunks` ceiling has been configured and reached.
    pub fn allocate(&self) -> Result<*mut T> {
        if let Some(ptr) = self.pop_from_free_list() {
            unsafe { (*ptr).reset() };
            self.allocated_nodes.fetch_add(1, Ordering::Relaxed);
            self.free_list_size.fetch_sub(1, Ordering::Relaxed);
            return Ok(ptr);
        }

        loop {
            let chunk = self.current_chunk.load(Ordering::Acquire);
            if chunk.is_null() {
                self.grow()?;
                continue;
            }
            let chunk_ref = unsafe { &*chunk };
            let idx = chunk_ref.allocation_index.fetch_add(1, Ordering::Relaxed);
            if idx < chunk_ref.capacity {
                self.allocated_nodes.fetch_add(1, Ordering::Relaxed);
                let ptr = chunk_ref.nodes.as_ptr().wrapping_add(idx) as *mut T;
                return Ok(ptr);
            }
            self.grow()?;
        }
    }

    /// Returns a cell to the pool. `node` must have come from this pool's
    /// `allocate`. A null pointer is ignored.
    pub fn deallocate(&self, node: *mut T) {
        if node.is_null() {
            return;
        }
        unsafe {
            (*node).reset();
            (*node).version().fetch_add(1, Ordering::AcqRel);
        }
        self.push_to_free_list(node);
        self.allocated_nodes.fetch_sub(1, Ordering::Relaxed);
        self.free_list_size.fetch_add(1, Ordering::Relaxed);
    }

    fn push_to_free_list(&self, node: *mut T) {
        loop {
            let head = self.free_list.load();
            unsafe { (*node).free_next().store(head.ptr, Ordering::Relaxed) };
            let new_head = TaggedPtr {
                ptr: node,
                tag: head.tag.wrapping_add(1),
            };
            if self.free_list.compare_exchange(head, new_head).is_ok() {
                return;
            }
        }
    }

    fn pop_from_free_list(&self) -> Option<*mut T> {
        loop {
            let head = self.free_list.load();
            if head.ptr.is_null() {
                return None;
            }
            let next = unsafe { (*head.ptr).free_next().load(Ordering::Acquire) };
            let new_head = TaggedPtr {
                ptr: next,
                tag: head.tag.wrapping_add(1),
            };
            if self.free_list.compare_exchange(head, new_head).is_ok() {
                return Some(head.ptr);
            }
        }
    }

    fn grow(&self) -> Result<()> {
        if let Some(max) = self.max_chunks {
            if self.total_chunks.load(Ordering::Relaxed) >= max {
                return Err(JobQueueError::AllocationFailed);
            }
        }
        let new_chunk = Box::into_raw(Box::new(PoolChunk::new(self.chunk_size)));
        let current = self.current_chunk.load(Ordering::Acquire);
        unsafe { (*new_chunk).next.store(current, Ordering::Relaxed) };
        match self.current_chunk.compare_exchange(
            current,
            new_chunk,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.total_chunks.fetch_add(1, Ordering::Relaxed);
                self.total_nodes.fetch_add(self.chunk_size, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                // Lost the race to install a chunk; drop our candidate and
                // let the caller retry against the winner's chunk.
                drop(unsafe { Box::from_raw(new_chunk) });
                Ok(())
            }
        }
    }
}

impl<T: Poolable> Default for NodePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> Drop for NodePool<T> {
    fn drop(&mut self) {
        let mut chunk = self.current_chunk.load(Ordering::Acquire);
        while !chunk.is_null() {
            let boxed = unsafe { Box::from_raw(chunk) };
            chunk = boxed.next.load(Ordering::Relaxed);
            drop(boxed);
        }
    }
}
