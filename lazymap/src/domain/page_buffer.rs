//! PageBuffer domain service - the capacity-bounded set of resident pages.
//!
//! This module contains the `PageBuffer` service which implements the
//! business rules for tracking resident pages: bounded capacity, dirty
//! tracking, oldest-first selection of eviction candidates, and the
//! hand-over of a page to a flusher.

use core::time::Duration;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::domain::{
    entities::{PageDescriptor, PageState},
    error::BufferError,
    slot_arena::{Frame, FreeSlots, SlotArena},
    value_objects::{ConfigError, PageAddress, SlotId},
};

/// Domain service for the shared cache of resident pages.
///
/// `PageBuffer` implements all residency rules:
/// - At most `capacity` descriptors exist at any time, one per slot
/// - A page can only be dirtied while it is present
/// - `oldest_present` is total and deterministic (recency token, then
///   address), and skips pages already claimed by a flusher, so a sweep
///   that claims what it is given always terminates
/// - Removing a descriptor twice is reported, never ignored
///
/// All state sits behind one coarse lock. Multi-step sequences take it once
/// through [`PageBuffer::lock`] and run every step on the returned guard;
/// the lock is not reentrant, so never call the one-shot helpers on the
/// buffer while holding a guard.
///
/// # Examples
///
/// ```
/// use lazymap::domain::{PageAddress, PageBuffer};
///
/// let buffer = PageBuffer::new(2, 4096).unwrap();
/// let mut guard = buffer.lock();
///
/// let a = guard.reserve(PageAddress::new(0x1000)).unwrap();
/// guard.complete_fill(a.address(), false).unwrap();
/// guard.mark_dirty(a.address()).unwrap();
///
/// let oldest = guard.oldest_present().unwrap();
/// assert_eq!(oldest.address(), a.address());
/// assert!(oldest.is_dirty());
/// ```
pub struct PageBuffer {
    state: Mutex<BufferState>,
    changed: Condvar,
    arena: SlotArena,
}

struct BufferState {
    capacity: usize,
    pages: HashMap<PageAddress, PageDescriptor>,
    // Present pages only, ordered by (token, address).
    order: BTreeSet<(u64, PageAddress)>,
    free: FreeSlots,
    next_token: u64,
    leaving: usize,
}

impl BufferState {
    fn issue_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn entry_mut(&mut self, address: PageAddress) -> Result<&mut PageDescriptor, BufferError> {
        self.pages.get_mut(&address).ok_or(BufferError::NotResident(address))
    }
}

impl PageBuffer {
    /// Create a buffer of `capacity` page slots of `page_size` bytes each.
    ///
    /// All frames are allocated up front.
    ///
    /// # Errors
    ///
    /// See [`SlotArena::new`].
    pub fn new(capacity: usize, page_size: usize) -> Result<Self, ConfigError> {
        let arena = SlotArena::new(capacity, page_size)?;
        Ok(Self {
            state: Mutex::new(BufferState {
                capacity,
                pages: HashMap::with_capacity(capacity),
                order: BTreeSet::new(),
                free: FreeSlots::new(capacity),
                next_token: 0,
                leaving: 0,
            }),
            changed: Condvar::new(),
            arena,
        })
    }

    /// Acquire the buffer lock for a multi-step sequence.
    pub fn lock(&self) -> BufferGuard<'_> {
        BufferGuard {
            buffer: self,
            state: self.state.lock(),
        }
    }

    /// Maximum number of resident pages.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Size of each page in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.arena.page_size()
    }

    /// The frame backing `slot`.
    pub fn frame(&self, slot: SlotId) -> Option<Arc<Frame>> {
        self.arena.frame(slot).cloned()
    }

    /// Track a present, clean page in a specific free slot.
    ///
    /// # Errors
    ///
    /// See [`BufferGuard::insert`].
    pub fn insert(&self, address: PageAddress, slot: SlotId) -> Result<PageDescriptor, BufferError> {
        self.lock().insert(address, slot)
    }

    /// Look up the descriptor of `address`.
    pub fn lookup(&self, address: PageAddress) -> Option<PageDescriptor> {
        self.lock().lookup(address)
    }

    /// Mark a present page dirty.
    ///
    /// # Errors
    ///
    /// See [`BufferGuard::mark_dirty`].
    pub fn mark_dirty(&self, address: PageAddress) -> Result<PageDescriptor, BufferError> {
        self.lock().mark_dirty(address)
    }

    /// The oldest present page, if any.
    pub fn oldest_present(&self) -> Option<PageDescriptor> {
        self.lock().oldest_present()
    }

    /// Remove a descriptor and free its slot.
    ///
    /// # Errors
    ///
    /// See [`BufferGuard::remove`].
    pub fn remove(&self, descriptor: &PageDescriptor) -> Result<(), BufferError> {
        self.lock().remove(descriptor)
    }

    /// Number of descriptors currently tracked (present, filling or leaving).
    pub fn resident_count(&self) -> usize {
        self.lock().resident_count()
    }

    /// Addresses of every tracked page, in ascending order.
    pub fn resident_addresses(&self) -> Vec<PageAddress> {
        let guard = self.lock();
        let mut addrs: Vec<_> = guard.state.pages.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }
}

/// Exclusive access to the buffer for the duration of a sequence.
///
/// Dropping the guard releases the lock.
pub struct BufferGuard<'a> {
    buffer: &'a PageBuffer,
    state: MutexGuard<'a, BufferState>,
}

impl BufferGuard<'_> {
    /// Track a present, clean page in the given slot.
    ///
    /// # Errors
    ///
    /// - [`BufferError::CapacityExceeded`] if every slot is occupied
    /// - [`BufferError::AlreadyTracked`] if the address has a descriptor
    /// - [`BufferError::SlotInUse`] if `slot` is occupied or out of range
    pub fn insert(&mut self, address: PageAddress, slot: SlotId) -> Result<PageDescriptor, BufferError> {
        self.check_admission(address)?;
        if !self.state.free.take(slot) {
            return Err(BufferError::SlotInUse(slot));
        }
        let token = self.state.issue_token();
        let desc = PageDescriptor::new(address, slot, PageState::Present, token);
        self.state.pages.insert(address, desc);
        self.state.order.insert((token, address));
        Ok(desc)
    }

    /// Reserve a free slot for `address` before reading it from the Store.
    ///
    /// The descriptor starts in [`PageState::Filling`]: it counts against
    /// capacity and blocks other faults on the same page, but is invisible
    /// to sweeps until [`complete_fill`](Self::complete_fill).
    ///
    /// # Errors
    ///
    /// - [`BufferError::CapacityExceeded`] if no slot is free
    /// - [`BufferError::AlreadyTracked`] if the address has a descriptor
    pub fn reserve(&mut self, address: PageAddress) -> Result<PageDescriptor, BufferError> {
        self.check_admission(address)?;
        let capacity = self.state.capacity;
        let slot = self
            .state
            .free
            .pop()
            .ok_or(BufferError::CapacityExceeded { capacity })?;
        let desc = PageDescriptor::new(address, slot, PageState::Filling, u64::MAX);
        self.state.pages.insert(address, desc);
        Ok(desc)
    }

    /// Mark a reserved page present once its frame holds the Store's data.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotResident`] unless the page is filling.
    pub fn complete_fill(&mut self, address: PageAddress, dirty: bool) -> Result<PageDescriptor, BufferError> {
        let token = self.state.issue_token();
        let desc = self.state.entry_mut(address)?;
        if desc.state() != PageState::Filling {
            return Err(BufferError::NotResident(address));
        }
        desc.set_state(PageState::Present);
        desc.set_token(token);
        if dirty {
            desc.mark_dirty();
        }
        let desc = *desc;
        self.state.order.insert((token, address));
        self.buffer.changed.notify_all();
        Ok(desc)
    }

    /// Drop a reservation whose fill failed and free its slot.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotResident`] unless the page is filling.
    pub fn abort_fill(&mut self, address: PageAddress) -> Result<(), BufferError> {
        match self.state.pages.get(&address) {
            Some(desc) if desc.state() == PageState::Filling => {
                let slot = desc.slot();
                self.state.pages.remove(&address);
                self.state.free.release(slot);
                self.buffer.changed.notify_all();
                Ok(())
            }
            _ => Err(BufferError::NotResident(address)),
        }
    }

    /// Look up the descriptor of `address`.
    pub fn lookup(&self, address: PageAddress) -> Option<PageDescriptor> {
        self.state.pages.get(&address).copied()
    }

    /// Mark a present page dirty. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotResident`] if the page is absent, still
    /// filling, or owned by a flusher.
    pub fn mark_dirty(&mut self, address: PageAddress) -> Result<PageDescriptor, BufferError> {
        let desc = self.state.entry_mut(address)?;
        if !desc.is_present() {
            return Err(BufferError::NotResident(address));
        }
        desc.mark_dirty();
        Ok(*desc)
    }

    /// The present page with the smallest recency token.
    ///
    /// Pages that are filling or claimed are skipped.
    pub fn oldest_present(&self) -> Option<PageDescriptor> {
        let (_, address) = self.state.order.first()?;
        self.state.pages.get(address).copied()
    }

    /// Hand a present page over to the caller for write-back and eviction.
    ///
    /// The page moves to [`PageState::Leaving`]: it stays resident and keeps
    /// its slot, but no fault, sweep or dirty marking touches it until the
    /// claim is resolved by [`remove`](Self::remove) or
    /// [`release_claim`](Self::release_claim).
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotResident`] unless the page is present.
    pub fn claim(&mut self, address: PageAddress) -> Result<PageDescriptor, BufferError> {
        let desc = self.state.entry_mut(address)?;
        if !desc.is_present() {
            return Err(BufferError::NotResident(address));
        }
        desc.set_state(PageState::Leaving);
        let desc = *desc;
        self.state.order.remove(&(desc.token(), address));
        self.state.leaving += 1;
        Ok(desc)
    }

    /// Claim the oldest present page whose token is below `before`.
    ///
    /// Passing the value of [`next_token`](Self::next_token) taken at the
    /// start of a sweep restricts the sweep to pages resident at that time.
    pub fn claim_oldest_present(&mut self, before: u64) -> Option<PageDescriptor> {
        let &(token, address) = self.state.order.first()?;
        if token >= before {
            return None;
        }
        self.claim(address).ok()
    }

    /// Return a claimed page to the present set after a failed write-back.
    ///
    /// The page gets a fresh token, becoming the newest resident page.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotResident`] unless the page is leaving.
    pub fn release_claim(&mut self, address: PageAddress) -> Result<PageDescriptor, BufferError> {
        let token = self.state.issue_token();
        let desc = self.state.entry_mut(address)?;
        if desc.state() != PageState::Leaving {
            return Err(BufferError::NotResident(address));
        }
        desc.set_state(PageState::Present);
        desc.set_token(token);
        let desc = *desc;
        self.state.order.insert((token, address));
        self.state.leaving -= 1;
        self.buffer.changed.notify_all();
        Ok(desc)
    }

    /// Clear the dirty flag after a successful write-back.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotResident`] if the page is not tracked.
    pub fn mark_clean(&mut self, address: PageAddress) -> Result<(), BufferError> {
        self.state.entry_mut(address)?.mark_clean();
        Ok(())
    }

    /// Remove `descriptor` from the buffer and free its slot.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotPresent`] if this descriptor was already
    /// removed (the address may since have been refilled under a different
    /// descriptor, which is left untouched).
    pub fn remove(&mut self, descriptor: &PageDescriptor) -> Result<(), BufferError> {
        let address = descriptor.address();
        let current = match self.state.pages.get(&address) {
            Some(d) if d.slot() == descriptor.slot() && d.token() == descriptor.token() => *d,
            _ => return Err(BufferError::NotPresent(address)),
        };
        self.state.pages.remove(&address);
        match current.state() {
            PageState::Leaving => self.state.leaving -= 1,
            _ => {
                self.state.order.remove(&(current.token(), address));
            }
        }
        self.state.free.release(current.slot());
        self.buffer.changed.notify_all();
        Ok(())
    }

    /// Number of tracked descriptors, including filling and leaving pages.
    pub fn resident_count(&self) -> usize {
        self.state.pages.len()
    }

    /// Number of present pages (candidates for eviction).
    pub fn present_count(&self) -> usize {
        self.state.order.len()
    }

    /// Number of pages claimed for write-back or eviction.
    pub fn leaving_count(&self) -> usize {
        self.state.leaving
    }

    /// Number of unoccupied slots.
    pub fn free_slots(&self) -> usize {
        self.state.free.available()
    }

    /// The token the next admitted page will receive.
    pub fn next_token(&self) -> u64 {
        self.state.next_token
    }

    /// Release the lock until another thread changes page state, or until
    /// `timeout` elapses. Returns `true` on timeout.
    pub fn wait_for_change(&mut self, timeout: Duration) -> bool {
        self.buffer.changed.wait_for(&mut self.state, timeout).timed_out()
    }

    fn check_admission(&self, address: PageAddress) -> Result<(), BufferError> {
        if self.state.pages.contains_key(&address) {
            return Err(BufferError::AlreadyTracked(address));
        }
        if self.state.pages.len() >= self.state.capacity {
            return Err(BufferError::CapacityExceeded {
                capacity: self.state.capacity,
            });
        }
        Ok(())
    }
}
