//! # Reservation Entries
//!
//! The part of a reservation shared between the table, the period timer and
//! the tasks waiting on it. Everything mutable here is atomic so the timer
//! callback can run without taking the table lock.

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use core::time::Duration;

use bitflags::bitflags;

use crate::process::{Pid, RtPriority};
use crate::timer::{Expiry, TimerCallback, TimerRestart};
use crate::wait::WaitQueue;

bitflags! {
    /// Reservation state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReservationFlags: u32 {
        /// Torn down (terminal)
        const CANCELED    = 1 << 0;
        /// Period timer armed
        const TIMER_ARMED = 1 << 1;
        /// A firing has covered more than one period
        const OVERRUN     = 1 << 2;
    }
}

/// An admitted `(C, T)` reservation
pub struct Reservation {
    pid: Pid,
    budget: Duration,
    period: Duration,
    /// Assigned RT level, 0 until the first recomputation
    priority: AtomicU32,
    period_seq: AtomicU64,
    flags: AtomicU32,
    waiters: WaitQueue,
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("pid", &self.pid)
            .field("budget", &self.budget)
            .field("period", &self.period)
            .field("priority", &self.priority())
            .field("period_seq", &self.period_seq())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Reservation {
    /// Create a new active reservation
    pub fn new(pid: Pid, budget: Duration, period: Duration) -> Self {
        Self {
            pid,
            budget,
            period,
            priority: AtomicU32::new(0),
            period_seq: AtomicU64::new(0),
            flags: AtomicU32::new(0),
            waiters: WaitQueue::new(),
        }
    }

    /// Owning process
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Budget `C`
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Period `T`
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Current RT level, if one has been assigned
    pub fn priority(&self) -> Option<RtPriority> {
        match self.priority.load(Ordering::Acquire) {
            0 => None,
            level => Some(RtPriority(level)),
        }
    }

    pub(crate) fn set_priority(&self, priority: RtPriority) {
        self.priority.store(priority.level(), Ordering::Release);
    }

    /// Period boundary sequence number
    pub fn period_seq(&self) -> u64 {
        self.period_seq.load(Ordering::Acquire)
    }

    /// State bits
    pub fn flags(&self) -> ReservationFlags {
        ReservationFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Has the reservation been torn down?
    pub fn is_canceled(&self) -> bool {
        self.flags().contains(ReservationFlags::CANCELED)
    }

    /// Tasks waiting for the next period boundary
    pub fn waiters(&self) -> &WaitQueue {
        &self.waiters
    }

    pub(crate) fn mark_timer_armed(&self) {
        self.flags
            .fetch_or(ReservationFlags::TIMER_ARMED.bits(), Ordering::AcqRel);
    }

    pub(crate) fn clear_timer_armed(&self) {
        self.flags
            .fetch_and(!ReservationFlags::TIMER_ARMED.bits(), Ordering::AcqRel);
    }

    /// Set the terminal flag; `true` only for the call that set it
    pub(crate) fn mark_canceled(&self) -> bool {
        let prev = self
            .flags
            .fetch_or(ReservationFlags::CANCELED.bits(), Ordering::AcqRel);
        prev & ReservationFlags::CANCELED.bits() == 0
    }
}

impl TimerCallback for Reservation {
    fn on_expiry(&self, expiry: &mut Expiry) -> TimerRestart {
        if self.is_canceled() {
            self.clear_timer_armed();
            return TimerRestart::NoRestart;
        }

        let elapsed = expiry.forward(self.period).max(1);
        if elapsed > 1 {
            self.flags
                .fetch_or(ReservationFlags::OVERRUN.bits(), Ordering::AcqRel);
        }
        self.period_seq.fetch_add(elapsed, Ordering::AcqRel);
        self.waiters.wake_all();

        TimerRestart::Restart
    }
}
