//! # Reservation Teardown
//!
//! Cancellation, exit cleanup and shutdown all end in the same teardown.
//! Whichever path removes the slot from the table owns it; the others find
//! nothing. That single removal is what makes the process reference drop
//! exactly once.
//!
//! Teardown order:
//!
//! 1. With the table lock held: remove the slot, restore the owner's default
//!    scheduling class (not on exit) and re-rank the survivors. A concurrent
//!    re-admission of the same pid therefore always applies its FIFO level
//!    after the restore.
//! 2. Mark the reservation canceled.
//! 3. Stop the period timer, waiting out a running callback.
//! 4. Wake every waiter; they observe `NoReservation`.
//! 5. Drop the process reference.

use crate::error::{RsvError, RsvResult};
use crate::manager::{Counters, ReservationManager};
use crate::process::{ExitObserver, Pid, Process};
use crate::table::Slot;
use crate::wait::TaskContext;

/// Why a reservation is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    /// Explicit cancellation
    Cancel,
    /// The owning process terminated
    Exit,
    /// The manager is shutting down
    Shutdown,
}

impl<P: Process> ReservationManager<P> {
    /// Cancel `pid`'s reservation (`Pid::CURRENT` = caller)
    pub fn cancel(&self, ctx: &dyn TaskContext, pid: Pid) -> RsvResult<()> {
        let pid = pid.or_caller(ctx.pid());
        let slot = self
            .unlink(pid, Teardown::Cancel)
            .ok_or(RsvError::NotFound)?;
        self.teardown(slot, Teardown::Cancel);
        Ok(())
    }

    /// Process-exit hook: drop the dead process's reservation, if any
    pub fn on_process_exit(&self, pid: Pid) {
        if let Some(slot) = self.unlink(pid, Teardown::Exit) {
            self.teardown(slot, Teardown::Exit);
        }
    }

    /// Tear down every reservation and detach from exit notifications
    pub fn shutdown(&self) {
        if let Some((lifecycle, id)) = self.subscription.lock().take() {
            lifecycle.unsubscribe_exit(id);
        }

        let slots = {
            let mut table = self.table.lock();
            let slots = table.drain();
            for slot in &slots {
                self.restore_default(slot);
            }
            slots
        };
        let count = slots.len();
        for slot in slots {
            self.teardown(slot, Teardown::Shutdown);
        }
        log::info!("rsv: shutdown, {} reservations released", count);
    }

    /// Remove `pid`'s slot, demote it and re-rank the survivors in one
    /// critical section
    fn unlink(&self, pid: Pid, reason: Teardown) -> Option<Slot<P>> {
        let mut table = self.table.lock();
        let slot = table.remove(pid)?;
        if reason != Teardown::Exit {
            self.restore_default(&slot);
        }
        self.recompute(&table);
        Some(slot)
    }

    /// Put a live owner back in the default class; the caller holds the
    /// table lock
    fn restore_default(&self, slot: &Slot<P>) {
        let process = slot.process();
        if !process.is_alive() {
            return;
        }
        if let Err(err) = self.sched.set_default(process) {
            Counters::bump(&self.counters.sched_failures, 1);
            log::warn!(
                "rsv: failed to restore pid {} to default: {}",
                process.pid(),
                err
            );
        }
    }

    fn teardown(&self, slot: Slot<P>, reason: Teardown) {
        let (rsv, process, timer) = slot.into_parts();
        let pid = rsv.pid();

        let first = rsv.mark_canceled();
        debug_assert!(first, "reservation for pid {} torn down twice", pid);

        self.timers.cancel(timer);
        rsv.clear_timer_armed();

        let woken = rsv.waiters().wake_all();

        match reason {
            Teardown::Cancel | Teardown::Shutdown => Counters::bump(&self.counters.canceled, 1),
            Teardown::Exit => Counters::bump(&self.counters.reaped, 1),
        }

        drop(process);

        log::info!(
            "rsv: released pid {} ({:?}), woke {} waiter(s), seq {}",
            pid,
            reason,
            woken,
            rsv.period_seq()
        );
    }
}

impl<P: Process> ExitObserver for ReservationManager<P> {
    fn on_process_exit(&self, pid: Pid) {
        ReservationManager::on_process_exit(self, pid);
    }
}

// =============================================================================
// TESTS
// =============================================================================
