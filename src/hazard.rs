//! Custom hazard-pointer manager for safe memory reclamation.
//!
//! A thread publishes the pointer it is about to dereference into a slot
//! other threads can see (`protect`), and a retired object is only handed
//! back to its owner (`scan_and_reclaim`) once no slot anywhere still
//! holds it. This mirrors the teacher pack's `HazardPointers<T>`
//! (thread-registered hazards + a retirement list drained by partitioning
//! against the live hazard set), but tracks hazards in a lock-free
//! singly-linked list of per-thread records instead of a
//! `Mutex<Vec<(ThreadId, *mut T)>>`, so `protect` never blocks.

use std::collections::HashSet;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::error::{JobQueueError, Result};

pub const DEFAULT_MAX_THREADS: usize = 128;
pub const DEFAULT_POINTERS_PER_THREAD: usize = 4;
const RETIRED_SCAN_THRESHOLD: usize = 64;

#[repr(align(64))]
struct HazardRecord<T> {
    owner: AtomicU64,
    slots: Vec<AtomicPtr<T>>,
    next: AtomicPtr<HazardRecord<T>>,
}

const NO_OWNER: u64 = 0;

fn thread_id_as_u64(id: ThreadId) -> u64 {
    // `ThreadId` exposes no stable numeric accessor; its `Debug` form
    // encodes the platform's internal counter (`ThreadId(N)`), which is
    // unique and stable for the thread's lifetime, so we parse that.
    let text = format!("{:?}", id);
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().unwrap_or(1).max(1)
}

impl<T> HazardRecord<T> {
    fn new(pointers_per_thread: usize) -> Self {
        let mut slots = Vec::with_capacity(pointers_per_thread);
        slots.resize_with(pointers_per_thread, || AtomicPtr::new(ptr::null_mut()));
        Self {
            owner: AtomicU64::new(NO_OWNER),
            slots,
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

/// Statistics snapshot for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HazardStatistics {
    pub active_hazard_pointers: usize,
    pub retired_list_size: usize,
    pub total_reclaimed: u64,
    pub total_retired: u64,
}

/// Manages hazard-pointer records and a retirement list for values of
/// type `T` shared across threads.
pub struct HazardPointerManager<T> {
    max_threads: usize,
    pointers_per_thread: usize,
    head_record: AtomicPtr<HazardRecord<T>>,
    record_count: AtomicUsize,
    retired: Mutex<Vec<*mut T>>,
    total_retired: AtomicU64,
    total_reclaimed: AtomicU64,
}

// SAFETY: all shared state is behind atomics or a `Mutex`; raw pointers
// kept in `retired` are never dereferenced except by `scan_and_reclaim`,
// which hands them to a caller-supplied reclaim function one at a time.
unsafe impl<T> Send for HazardPointerManager<T> {}
unsafe impl<T> Sync for HazardPointerManager<T> {}

impl<T> HazardPointerManager<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_THREADS, DEFAULT_POINTERS_PER_THREAD)
    }

    pub fn with_capacity(max_threads: usize, pointers_per_thread: usize) -> Self {
        Self {
            max_threads,
            pointers_per_thread,
            head_record: AtomicPtr::new(ptr::null_mut()),
            record_count: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
            total_retired: AtomicU64::new(0),
            total_reclaimed: AtomicU64::new(0),
        }
    }

    pub fn statistics(&self) -> HazardStatistics {
        let retired_list_size = self
            .retired
            .lock()
            .expect("hazard retired list poisoned")
            .len();
        HazardStatistics {
            active_hazard_pointers: self.collect_hazards().len(),
            retired_list_size,
            total_reclaimed: self.total_reclaimed.load(Ordering::Relaxed),
            total_retired: self.total_retired.load(Ordering::Relaxed),
        }
    }

    /// Acquires (or reuses) this thread's hazard record and returns a
    /// scoped handle bound to one of its slots.
    pub fn acquire(&self) -> Result<HazardPointer<'_, T>> {
        let record = self.acquire_record()?;
        let slot_index = self.acquire_slot(record)?;
        Ok(HazardPointer {
            manager: self,
            record,
            slot_index,
        })
    }

    /// Adds `pointer` to the retirement list. Safe to call from any
    /// thread; does not by itself reclaim anything.
    pub fn retire(&self, pointer: *mut T) {
        if pointer.is_null() {
            return;
        }
        let should_scan = {
            let mut retired = self.retired.lock().expect("hazard retired list poisoned");
            retired.push(pointer);
            retired.len() >= RETIRED_SCAN_THRESHOLD
        };
        self.total_retired.fetch_add(1, Ordering::Relaxed);
        if should_scan {
            self.scan_and_reclaim(|_| {});
        }
    }

    /// Partitions the retirement list against the live hazard set and
    /// invokes `reclaim` for every pointer no thread currently protects.
    /// Passing a no-op closure simply drops the survivors' scan.
    pub fn scan_and_reclaim(&self, mut reclaim: impl FnMut(*mut T)) {
        let hazards = self.collect_hazards();
        let to_free = {
            let mut retired = self.retired.lock().expect("hazard retired list poisoned");
            let (to_free, still_hazardous): (Vec<*mut T>, Vec<*mut T>) = retired
                .drain(..)
                .partition(|p| !hazards.contains(&(*p as usize)));
            *retired = still_hazardous;
            to_free
        };
        if to_free.is_empty() {
            return;
        }
        let reclaimed = to_free.len() as u64;
        for pointer in to_free {
            reclaim(pointer);
        }
        self.total_reclaimed.fetch_add(reclaimed, Ordering::Relaxed);
        debug!(reclaimed, hazards = hazards.len(), "scan_and_reclaim");
    }

    fn collect_hazards(&self) -> HashSet<usize> {
        let mut set = Vec::new();
        let mut record = self.head_record.load(Ordering::Acquire);
        while !record.is_null() {
            let r = unsafe { &*record };
            for slot in &r.slots {
                let p = slot.load(Ordering::Acquire);
                if !p.is_null() {
                    set.push(p as usize);
                }
            }
            record = r.next.load(Ordering::Acquire);
        }
        set.into_iter().collect()
    }

    fn acquire_record(&self) -> Result<*mut HazardRecord<T>> {
        let tid = thread_id_as_u64(thread::current().id());

        let mut record = self.head_record.load(Ordering::Acquire);
        while !record.is_null() {
            let r = unsafe { &*record };
            if r.owner.load(Ordering::Acquire) == tid {
                return Ok(record);
            }
            if r.owner
                .compare_exchange(NO_OWNER, tid, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(record);
            }
            record = r.next.load(Ordering::Acquire);
        }

        if self.record_count.load(Ordering::Relaxed) >= self.max_threads {
            return Err(JobQueueError::Unknown(
                "hazard pointer capacity exhausted: max_threads reached".into(),
            ));
        }

        let new_record = Box::into_raw(Box::new(HazardRecord::new(self.pointers_per_thread)));
        unsafe { (*new_record).owner.store(tid, Ordering::Release) };
        loop {
            let head = self.head_record.load(Ordering::Acquire);
            unsafe { (*new_record).next.store(head, Ordering::Relaxed) };
            if self
                .head_record
                .compare_exchange(head, new_record, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.record_count.fetch_add(1, Ordering::Relaxed);
                return Ok(new_record);
            }
        }
    }

    fn acquire_slot(&self, record: *mut HazardRecord<T>) -> Result<usize> {
        let r = unsafe { &*record };
        for (i, slot) in r.slots.iter().enumerate() {
            if slot
                .compare_exchange(
                    ptr::null_mut(),
                    std::ptr::NonNull::<T>::dangling().as_ptr(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(i);
            }
        }
        Err(JobQueueError::Unknown(
            "hazard pointer capacity exhausted: pointers_per_thread reached".into(),
        ))
    }

    fn release_slot(&self, record: *mut HazardRecord<T>, index: usize) {
        let r = unsafe { &*record };
        r.slots[index].store(ptr::null_mut(), Ordering::Release);
    }
}

impl<T> Default for HazardPointerManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HazardPointerManager<T> {
    fn drop(&mut self) {
        // Best-effort final reclamation; nothing should still be
        // protected here since every `HazardPointer` handle is scoped to
        // a call already finished by the time the manager itself drops.
        self.scan_and_reclaim(|p| drop(unsafe { Box::from_raw(p) }));
        let remaining = self.retired.lock().expect("hazard retired list poisoned");
        if !remaining.is_empty() {
            debug!(
                remaining = remaining.len(),
                "hazard pointer manager dropped with pointers still protected"
            );
        }
        drop(remaining);

        let mut record = self.head_record.load(Ordering::Acquire);
        while !record.is_null() {
            let boxed = unsafe { Box::from_raw(record) };
            record = boxed.next.load(Ordering::Relaxed);
            drop(boxed);
        }
    }
}

/// RAII handle bound to one hazard slot. Dropping it clears the slot.
pub struct HazardPointer<'m, T> {
    manager: &'m HazardPointerManager<T>,
    record: *mut HazardRecord<T>,
    slot_index: usize,
}

impl<'m, T> HazardPointer<'m, T> {
    /// Publishes the current value of `src` into this handle's slot,
    /// re-reading until the published value is confirmed still current,
    /// guaranteeing the returned pointer cannot be reclaimed until this
    /// handle is cleared or dropped.
    pub fn protect(&self, src: &AtomicPtr<T>) -> *mut T {
        let record = unsafe { &*self.record };
        let slot = &record.slots[self.slot_index];
        loop {
            let candidate = src.load(Ordering::Acquire);
            slot.store(candidate, Ordering::Release);
            let confirm = src.load(Ordering::Acquire);
            if confirm == candidate {
                return candidate;
            }
        }
    }

    /// Clears the protection held by this handle.
    pub fn clear(&self) {
        let record = unsafe { &*self.record };
        record.slots[self.slot_index].store(ptr::null_mut(), Ordering::Release);
    }
}

impl<'m, T> Drop for HazardPointer<'m, T> {
    fn drop(&mut self) {
        self.clear();
        self.manager.release_slot(self.record, self.slot_index);
    }
}
