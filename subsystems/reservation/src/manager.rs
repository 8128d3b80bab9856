//! # Reservation Manager
//!
//! The service object that owns the reservation table and implements the
//! entry points: admission ([`ReservationManager::reserve`]), waiting for the
//! next period ([`ReservationManager::wait_next_period`]), and, in
//! [`crate::reaper`], cancellation and exit cleanup.
//!
//! ## Locking
//!
//! ```text
//!   table lock  ──▶  timer queue lock      (arm during admission)
//!   table lock  ──▶  SchedClassControl     (recomputation, default restore)
//!   timer callback ──▶ wait queue lock     (never the table lock)
//! ```
//!
//! Teardown stops timers and wakes waiters with the table lock released.
//! [`SchedClassControl`] implementations must not call back into the manager.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use spin::Mutex;

use crate::config::{ConfigError, RsvConfig};
use crate::error::{RsvError, RsvResult};
use crate::priority::RmAssigner;
use crate::process::{
    ExitObserver, Pid, Process, ProcessLifecycle, ProcessRegistry, RtPriority, SchedClassControl,
    SubscriptionId,
};
use crate::reservation::{Reservation, ReservationFlags};
use crate::table::ReservationTable;
use crate::timer::TimerFacility;
use crate::wait::TaskContext;

// =============================================================================
// STATISTICS
// =============================================================================

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) admitted: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) canceled: AtomicU64,
    pub(crate) reaped: AtomicU64,
    pub(crate) sched_failures: AtomicU64,
    pub(crate) waits_completed: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Snapshot of the manager's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvStats {
    /// Successful admissions
    pub admitted: u64,
    /// Rejected admissions
    pub rejected: u64,
    /// Reservations torn down by cancellation or shutdown
    pub canceled: u64,
    /// Reservations torn down because the owner exited
    pub reaped: u64,
    /// Failed scheduling-class changes
    pub sched_failures: u64,
    /// Successful period waits
    pub waits_completed: u64,
}

/// Read-only view of one reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationInfo {
    /// Owner
    pub pid: Pid,
    /// Budget `C`
    pub budget: Duration,
    /// Period `T`
    pub period: Duration,
    /// Assigned RT level
    pub priority: Option<RtPriority>,
    /// Period boundary sequence number
    pub period_seq: u64,
    /// State bits; `OVERRUN` once a timer firing covered several periods
    pub flags: ReservationFlags,
}

impl ReservationInfo {
    fn of(rsv: &Reservation) -> Self {
        Self {
            pid: rsv.pid(),
            budget: rsv.budget(),
            period: rsv.period(),
            priority: rsv.priority(),
            period_seq: rsv.period_seq(),
            flags: rsv.flags(),
        }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Owner of the reservation table and its collaborators
pub struct ReservationManager<P: Process> {
    pub(crate) config: RsvConfig,
    pub(crate) table: Mutex<ReservationTable<P>>,
    pub(crate) assigner: RmAssigner,
    pub(crate) registry: Arc<dyn ProcessRegistry<P>>,
    pub(crate) sched: Arc<dyn SchedClassControl<P>>,
    pub(crate) timers: Arc<dyn TimerFacility>,
    pub(crate) subscription: Mutex<Option<(Arc<dyn ProcessLifecycle>, SubscriptionId)>>,
    pub(crate) counters: Counters,
}

impl<P: Process> fmt::Debug for ReservationManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReservationManager")
            .field("config", &self.config)
            .field("table", &*self.table.lock())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<P: Process> ReservationManager<P> {
    /// Build a manager with an empty table
    pub fn new(
        config: RsvConfig,
        registry: Arc<dyn ProcessRegistry<P>>,
        sched: Arc<dyn SchedClassControl<P>>,
        timers: Arc<dyn TimerFacility>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        log::info!(
            "rsv: manager up, {} slots, FIFO {}..={}",
            config.max_reservations,
            config.rt_priority_min,
            config.rt_priority_max
        );

        Ok(Self {
            config,
            table: Mutex::new(ReservationTable::new(config.max_reservations)),
            assigner: RmAssigner::from_config(&config),
            registry,
            sched,
            timers,
            subscription: Mutex::new(None),
            counters: Counters::default(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RsvConfig {
        &self.config
    }

    /// Admit a `(budget, period)` reservation for `pid` (`Pid::CURRENT` = caller)
    pub fn reserve(
        &self,
        ctx: &dyn TaskContext,
        pid: Pid,
        budget: Duration,
        period: Duration,
    ) -> RsvResult<()> {
        let pid = pid.or_caller(ctx.pid());
        let result = self.admit(pid, budget, period);

        match result {
            Ok(()) => {
                Counters::bump(&self.counters.admitted, 1);
                log::info!(
                    "rsv: admitted pid {} C={:?} T={:?}",
                    pid,
                    budget,
                    period
                );
            },
            Err(err) => {
                Counters::bump(&self.counters.rejected, 1);
                log::debug!("rsv: rejected pid {}: {}", pid, err);
            },
        }
        result
    }

    fn admit(&self, pid: Pid, budget: Duration, period: Duration) -> RsvResult<()> {
        if budget.is_zero() || period.is_zero() || budget > period {
            return Err(RsvError::InvalidArgument);
        }

        // Every early return below drops `process`, releasing the reference.
        let process = self.registry.resolve(pid).ok_or(RsvError::NoSuchProcess)?;

        let mut table = self.table.lock();
        // Exit marks the process dead before notifying; checking under the
        // table lock means either we see it dead or the exit path sees our
        // entry.
        if !process.is_alive() {
            return Err(RsvError::NoSuchProcess);
        }
        table.prepare_insert(pid)?;

        let reservation = Arc::new(Reservation::new(pid, budget, period));
        reservation.mark_timer_armed();
        let timer = self.timers.arm(period, reservation.clone());
        table.insert(reservation, process, timer);

        self.recompute(&table);
        Ok(())
    }

    /// Re-rank the whole table; the caller holds the table lock
    pub(crate) fn recompute(&self, table: &ReservationTable<P>) {
        let failures = self.assigner.apply(table, &*self.sched);
        Counters::bump(&self.counters.sched_failures, failures as u64);
    }

    /// Block until the caller's reservation crosses a period boundary
    ///
    /// Returns `Ok` once at least one boundary has passed since the call
    /// started, [`RsvError::NoReservation`] if the caller holds no
    /// reservation or it is torn down while waiting, and
    /// [`RsvError::Interrupted`] if a signal arrives first.
    pub fn wait_next_period(&self, ctx: &dyn TaskContext) -> RsvResult<()> {
        let pid = ctx.pid();
        let rsv = self
            .table
            .lock()
            .find(pid)
            .map(|slot| slot.reservation().clone())
            .ok_or(RsvError::NoReservation)?;

        let seen = rsv.period_seq();
        loop {
            let token = rsv.waiters().register(ctx.waker());

            let outcome = if rsv.is_canceled() {
                Some(Err(RsvError::NoReservation))
            } else if rsv.period_seq() != seen {
                Some(Ok(()))
            } else if ctx.signal_pending() {
                Some(Err(RsvError::Interrupted))
            } else {
                None
            };

            if let Some(result) = outcome {
                rsv.waiters().unregister(token);
                match result {
                    Ok(()) => Counters::bump(&self.counters.waits_completed, 1),
                    Err(err) => log::debug!("rsv: wait for pid {} ended: {}", pid, err),
                }
                return result;
            }

            ctx.block();
            rsv.waiters().unregister(token);
        }
    }

    /// Snapshot of `pid`'s reservation
    pub fn reservation(&self, pid: Pid) -> Option<ReservationInfo> {
        self.table
            .lock()
            .find(pid)
            .map(|slot| ReservationInfo::of(slot.reservation()))
    }

    /// Number of admitted reservations
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// No reservations admitted?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    pub fn stats(&self) -> RsvStats {
        let c = &self.counters;
        RsvStats {
            admitted: c.admitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            canceled: c.canceled.load(Ordering::Relaxed),
            reaped: c.reaped.load(Ordering::Relaxed),
            sched_failures: c.sched_failures.load(Ordering::Relaxed),
            waits_completed: c.waits_completed.load(Ordering::Relaxed),
        }
    }
}

impl<P: Process + 'static> ReservationManager<P> {
    /// Subscribe to exit notifications from `lifecycle`
    ///
    /// Replaces any previous subscription.
    pub fn attach(self: &Arc<Self>, lifecycle: Arc<dyn ProcessLifecycle>) {
        let observer: Arc<dyn ExitObserver> = self.clone();
        let id = lifecycle.subscribe_exit(Arc::downgrade(&observer));

        let previous = self.subscription.lock().replace((lifecycle, id));
        if let Some((old, old_id)) = previous {
            old.unsubscribe_exit(old_id);
        }
        log::debug!("rsv: exit notifications attached ({:?})", id);
    }
}

// =============================================================================
// TESTS
// =============================================================================
