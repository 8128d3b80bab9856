//! # Reservation Table
//!
//! The authoritative set of admitted reservations. Slots are kept in
//! admission order; the Rate-Monotonic assigner relies on that order to break
//! ties between equal periods.
//!
//! The table itself is not synchronized. The manager wraps it in the single
//! table lock.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::error::{RsvError, RsvResult};
use crate::process::{Pid, Process};
use crate::reservation::Reservation;
use crate::timer::TimerId;

// =============================================================================
// SLOT
// =============================================================================

/// One admitted reservation together with the resources it holds
pub struct Slot<P> {
    reservation: Arc<Reservation>,
    /// The counted process reference held for the entry's lifetime
    process: Arc<P>,
    timer: TimerId,
    admitted: u64,
}

impl<P> fmt::Debug for Slot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("reservation", &self.reservation)
            .field("timer", &self.timer)
            .field("admitted", &self.admitted)
            .finish()
    }
}

impl<P: Process> Slot<P> {
    /// Shared reservation state
    pub fn reservation(&self) -> &Arc<Reservation> {
        &self.reservation
    }

    /// The owning process
    pub fn process(&self) -> &Arc<P> {
        &self.process
    }

    /// Period timer
    pub fn timer(&self) -> TimerId {
        self.timer
    }

    /// Admission sequence number (tie-break key)
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Split into the parts teardown consumes
    pub(crate) fn into_parts(self) -> (Arc<Reservation>, Arc<P>, TimerId) {
        (self.reservation, self.process, self.timer)
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// Admitted reservations, at most one per process
pub struct ReservationTable<P> {
    slots: Vec<Slot<P>>,
    capacity: usize,
    next_admission: u64,
}

impl<P> fmt::Debug for ReservationTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReservationTable")
            .field("len", &self.slots.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<P: Process> ReservationTable<P> {
    /// Create an empty table holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
            next_admission: 0,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// No entries?
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Population cap
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entry owned by `pid`
    pub fn find(&self, pid: Pid) -> Option<&Slot<P>> {
        self.slots.iter().find(|s| s.reservation.pid() == pid)
    }

    /// Does `pid` own an entry?
    pub fn contains(&self, pid: Pid) -> bool {
        self.find(pid).is_some()
    }

    /// Entries in admission order
    pub fn iter(&self) -> impl Iterator<Item = &Slot<P>> {
        self.slots.iter()
    }

    /// Check that `pid` may be admitted and make room for it
    ///
    /// After this returns `Ok`, [`ReservationTable::insert`] will not
    /// allocate.
    ///
    /// [`RsvError::OutOfMemory`] covers only this slot growth. The
    /// `Arc<Reservation>` built during admission and the timer queue's own
    /// bookkeeping allocate through the global allocator, which aborts on
    /// failure instead of returning an error.
    pub fn prepare_insert(&mut self, pid: Pid) -> RsvResult<()> {
        if self.contains(pid) {
            return Err(RsvError::AlreadyReserved);
        }
        if self.slots.len() >= self.capacity {
            return Err(RsvError::CapacityExceeded);
        }
        self.slots
            .try_reserve(1)
            .map_err(|_| RsvError::OutOfMemory)
    }

    /// Append an entry; call [`ReservationTable::prepare_insert`] first
    pub fn insert(&mut self, reservation: Arc<Reservation>, process: Arc<P>, timer: TimerId) {
        debug_assert!(!self.contains(reservation.pid()));
        debug_assert!(self.slots.len() < self.capacity);

        let admitted = self.next_admission;
        self.next_admission += 1;
        self.slots.push(Slot {
            reservation,
            process,
            timer,
            admitted,
        });
    }

    /// Remove the entry owned by `pid`, preserving the order of the rest
    pub fn remove(&mut self, pid: Pid) -> Option<Slot<P>> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.reservation.pid() == pid)?;
        Some(self.slots.remove(idx))
    }

    /// Remove every entry
    pub fn drain(&mut self) -> Vec<Slot<P>> {
        core::mem::take(&mut self.slots)
    }
}
