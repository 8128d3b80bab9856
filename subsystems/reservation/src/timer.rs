//! # Period Timers
//!
//! A soft high-resolution timer queue driven by a monotonic [`Clock`].
//!
//! The kernel calls [`TimerQueue::run_expired`] from its timer interrupt (or
//! tick softirq). Callbacks run with no queue lock held and must not block.
//! A periodic callback re-arms itself by forwarding its [`Expiry`] from the
//! previously scheduled expiry, so delivery jitter never accumulates as drift.
//!
//! [`TimerFacility::cancel`] is synchronous: when it returns, the callback is
//! neither queued nor running, and it will not run again.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use spin::Mutex;

// =============================================================================
// TIME TYPES
// =============================================================================

/// Monotonic timestamp in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ktime(u64);

impl Ktime {
    /// Clock origin
    pub const ZERO: Ktime = Ktime(0);

    /// Create from nanoseconds
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get nanoseconds
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// `self + duration`, saturating at the end of time
    pub fn saturating_add(self, duration: Duration) -> Ktime {
        Ktime(self.0.saturating_add(duration_nanos(duration)))
    }

    /// Time elapsed since `earlier` (zero if `earlier` is later)
    pub fn duration_since(self, earlier: Ktime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Ktime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Monotonic clock source
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Ktime;
}

// =============================================================================
// TIMER INTERFACE
// =============================================================================

/// Timer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[cfg(test)]
impl TimerId {
    pub(crate) const fn test(id: u64) -> Self {
        Self(id)
    }
}

/// What a callback wants after it ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRestart {
    /// Stop the timer for good
    NoRestart,
    /// Re-queue at the (forwarded) expiry
    Restart,
}

/// Expiry state handed to a running callback
#[derive(Debug, Clone, Copy)]
pub struct Expiry {
    expires: Ktime,
    now: Ktime,
}

impl Expiry {
    /// Build an expiry record
    pub const fn new(expires: Ktime, now: Ktime) -> Self {
        Self { expires, now }
    }

    /// The scheduled expiry being delivered
    pub const fn expires(&self) -> Ktime {
        self.expires
    }

    /// Time at delivery
    pub const fn now(&self) -> Ktime {
        self.now
    }

    /// Advance the expiry by whole intervals until it lies in the future
    ///
    /// Returns the number of intervals skipped over (the overrun count), or
    /// zero if the expiry was already in the future.
    pub fn forward(&mut self, interval: Duration) -> u64 {
        if self.now < self.expires {
            return 0;
        }

        let interval = duration_nanos(interval).max(1);
        let delta = self.now.0 - self.expires.0;
        let overruns = delta / interval + 1;
        self.expires = Ktime(
            self.expires
                .0
                .saturating_add(overruns.saturating_mul(interval)),
        );
        overruns
    }
}

/// Callback run when a timer expires
///
/// Runs in interrupt context: must not block and must not take locks that a
/// blocking path could hold.
pub trait TimerCallback: Send + Sync {
    /// Handle one expiry; forward `expiry` before returning `Restart`
    fn on_expiry(&self, expiry: &mut Expiry) -> TimerRestart;
}

/// Timer facility consumed by the reservation core
pub trait TimerFacility: Send + Sync {
    /// Arm a timer that first fires `delay` from now
    fn arm(&self, delay: Duration, callback: Arc<dyn TimerCallback>) -> TimerId;

    /// Stop a timer, waiting for a running callback to finish
    ///
    /// Returns `false` if the timer was not armed. Must not be called from
    /// the timer's own callback.
    fn cancel(&self, id: TimerId) -> bool;
}

// =============================================================================
// TIMER QUEUE
// =============================================================================

struct QueueState {
    /// Armed timers ordered by expiry, then by id
    pending: BTreeMap<(Ktime, TimerId), Arc<dyn TimerCallback>>,
    /// Expiry of every armed timer
    deadlines: BTreeMap<TimerId, Ktime>,
    /// Callback currently executing
    running: Option<TimerId>,
    /// Set by `cancel` while `running` executes
    cancel_running: bool,
}

/// Soft timer queue over a monotonic clock
pub struct TimerQueue {
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    /// Serializes expiry processing across CPUs
    runner: Mutex<()>,
    next_id: AtomicU64,
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimerQueue")
            .field("armed", &state.deadlines.len())
            .field("running", &state.running)
            .finish()
    }
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(QueueState {
                pending: BTreeMap::new(),
                deadlines: BTreeMap::new(),
                running: None,
                cancel_running: false,
            }),
            runner: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The clock driving this queue
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Number of armed timers (a running one is not counted)
    pub fn armed(&self) -> usize {
        self.state.lock().deadlines.len()
    }

    /// Is `id` queued?
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.state.lock().deadlines.contains_key(&id)
    }

    /// Earliest queued expiry
    pub fn next_deadline(&self) -> Option<Ktime> {
        self.state
            .lock()
            .pending
            .first_key_value()
            .map(|(&(expires, _), _)| expires)
    }

    /// Run every callback whose expiry has passed
    ///
    /// Returns the number of callbacks executed. If another CPU is already
    /// processing the queue this returns `0` immediately; that CPU picks up
    /// whatever is due.
    pub fn run_expired(&self) -> usize {
        let Some(_runner) = self.runner.try_lock() else {
            return 0;
        };

        let mut fired = 0;
        loop {
            let now = self.clock.now();

            let (expires, id, callback) = {
                let mut state = self.state.lock();
                let due = state
                    .pending
                    .first_key_value()
                    .is_some_and(|(&(expires, _), _)| expires <= now);
                if !due {
                    break;
                }
                let Some(((expires, id), callback)) = state.pending.pop_first() else {
                    break;
                };
                state.deadlines.remove(&id);
                state.running = Some(id);
                state.cancel_running = false;
                (expires, id, callback)
            };

            let mut expiry = Expiry::new(expires, now);
            let mut restart = callback.on_expiry(&mut expiry);
            if restart == TimerRestart::Restart && expiry.expires <= now {
                log::warn!("timer {:?} restarted without forwarding, stopping it", id);
                restart = TimerRestart::NoRestart;
            }

            let mut state = self.state.lock();
            state.running = None;
            let canceled = core::mem::take(&mut state.cancel_running);
            if restart == TimerRestart::Restart && !canceled {
                state.pending.insert((expiry.expires, id), callback);
                state.deadlines.insert(id, expiry.expires);
            }
            fired += 1;
        }

        fired
    }
}

impl TimerFacility for TimerQueue {
    fn arm(&self, delay: Duration, callback: Arc<dyn TimerCallback>) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let expires = self.clock.now().saturating_add(delay);

        let mut state = self.state.lock();
        state.pending.insert((expires, id), callback);
        state.deadlines.insert(id, expires);
        drop(state);

        log::debug!("timer {:?} armed, first expiry at {}", id, expires);
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        if let Some(expires) = state.deadlines.remove(&id) {
            state.pending.remove(&(expires, id));
            return true;
        }
        if state.running != Some(id) {
            return false;
        }

        state.cancel_running = true;
        drop(state);

        while self.state.lock().running == Some(id) {
            core::hint::spin_loop();
        }
        true
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::vec::Vec;

    struct Periodic {
        period: Duration,
        fired: Mutex<Vec<(Ktime, u64)>>,
        limit: usize,
    }

    impl Periodic {
        fn new(period_ms: u64, limit: usize) -> Arc<Self> {
            Arc::new(Self {
                period: Duration::from_millis(period_ms),
                fired: Mutex::new(Vec::new()),
                limit,
            })
        }
    }

    impl TimerCallback for Periodic {
        fn on_expiry(&self, expiry: &mut Expiry) -> TimerRestart {
            let scheduled = expiry.expires();
            let overruns = expiry.forward(self.period);
            let mut fired = self.fired.lock();
            fired.push((scheduled, overruns));
            if fired.len() >= self.limit {
                TimerRestart::NoRestart
            } else {
                TimerRestart::Restart
            }
        }
    }

    fn ms(v: u64) -> Ktime {
        Ktime::from_nanos(v * 1_000_000)
    }

    #[test]
    fn test_forward_on_time() {
        let mut expiry = Expiry::new(ms(10), ms(10));
        assert_eq!(expiry.forward(Duration::from_millis(10)), 1);
        assert_eq!(expiry.expires(), ms(20));
    }

    #[test]
    fn test_forward_keeps_grid_under_jitter() {
        // Delivered 3 ms late: next expiry stays on the 10 ms grid
        let mut expiry = Expiry::new(ms(10), ms(13));
        assert_eq!(expiry.forward(Duration::from_millis(10)), 1);
        assert_eq!(expiry.expires(), ms(20));
    }

    #[test]
    fn test_forward_skips_missed_periods() {
        let mut expiry = Expiry::new(ms(10), ms(35));
        assert_eq!(expiry.forward(Duration::from_millis(10)), 3);
        assert_eq!(expiry.expires(), ms(40));
    }

    #[test]
    fn test_forward_future_expiry_is_noop() {
        let mut expiry = Expiry::new(ms(50), ms(35));
        assert_eq!(expiry.forward(Duration::from_millis(10)), 0);
        assert_eq!(expiry.expires(), ms(50));
    }

    #[test]
    fn test_first_expiry_after_delay() {
        let clock = ManualClock::new();
        let queue = TimerQueue::new(clock.clone());
        let cb = Periodic::new(10, usize::MAX);
        let id = queue.arm(Duration::from_millis(10), cb.clone());

        clock.advance_ms(9);
        assert_eq!(queue.run_expired(), 0);
        assert!(queue.is_armed(id));

        clock.advance_ms(1);
        assert_eq!(queue.run_expired(), 1);
        assert_eq!(cb.fired.lock().as_slice(), &[(ms(10), 1)]);
        assert_eq!(queue.next_deadline(), Some(ms(20)));
    }

    #[test]
    fn test_periodic_rearm_from_scheduled_time() {
        let clock = ManualClock::new();
        let queue = TimerQueue::new(clock.clone());
        let cb = Periodic::new(10, usize::MAX);
        queue.arm(Duration::from_millis(10), cb.clone());

        for late in [12, 21, 34] {
            clock.set_ms(late);
            queue.run_expired();
        }

        let fired = cb.fired.lock();
        let scheduled: Vec<Ktime> = fired.iter().map(|&(at, _)| at).collect();
        assert_eq!(scheduled, [ms(10), ms(20), ms(30)]);
        assert_eq!(queue.next_deadline(), Some(ms(40)));
    }

    #[test]
    fn test_no_restart_stops_timer() {
        let clock = ManualClock::new();
        let queue = TimerQueue::new(clock.clone());
        let cb = Periodic::new(5, 2);
        let id = queue.arm(Duration::from_millis(5), cb.clone());

        clock.set_ms(5);
        queue.run_expired();
        clock.set_ms(10);
        queue.run_expired();
        clock.set_ms(100);
        queue.run_expired();

        assert_eq!(cb.fired.lock().len(), 2);
        assert!(!queue.is_armed(id));
        assert_eq!(queue.armed(), 0);
    }

    #[test]
    fn test_cancel_armed_timer() {
        let clock = ManualClock::new();
        let queue = TimerQueue::new(clock.clone());
        let cb = Periodic::new(10, usize::MAX);
        let id = queue.arm(Duration::from_millis(10), cb.clone());

        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));

        clock.set_ms(50);
        assert_eq!(queue.run_expired(), 0);
        assert!(cb.fired.lock().is_empty());
    }

    #[test]
    fn test_cancel_waits_for_running_callback() {
        struct Slow {
            entered: std::sync::Barrier,
            release: std::sync::atomic::AtomicBool,
            runs: AtomicUsize,
        }

        impl TimerCallback for Slow {
            fn on_expiry(&self, expiry: &mut Expiry) -> TimerRestart {
                self.runs.fetch_add(1, Ordering::SeqCst);
                self.entered.wait();
                while !self.release.load(Ordering::SeqCst) {
                    std::hint::spin_loop();
                }
                expiry.forward(Duration::from_millis(1));
                TimerRestart::Restart
            }
        }

        let clock = ManualClock::new();
        let queue = Arc::new(TimerQueue::new(clock.clone()));
        let slow = Arc::new(Slow {
            entered: std::sync::Barrier::new(2),
            release: std::sync::atomic::AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        });
        let id = queue.arm(Duration::from_millis(1), slow.clone());
        clock.set_ms(1);

        let runner = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.run_expired())
        };
        slow.entered.wait();

        let canceller = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.cancel(id))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!canceller.is_finished());

        slow.release.store(true, Ordering::SeqCst);
        assert!(canceller.join().unwrap());
        runner.join().unwrap();

        clock.set_ms(100);
        assert_eq!(queue.run_expired(), 0);
        assert_eq!(slow.runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.armed(), 0);
    }

    #[test]
    fn test_restart_without_forward_is_stopped() {
        struct Lazy;

        impl TimerCallback for Lazy {
            fn on_expiry(&self, _expiry: &mut Expiry) -> TimerRestart {
                TimerRestart::Restart
            }
        }

        let clock = ManualClock::new();
        let queue = TimerQueue::new(clock.clone());
        queue.arm(Duration::from_millis(1), Arc::new(Lazy));
        clock.set_ms(1);

        assert_eq!(queue.run_expired(), 1);
        assert_eq!(queue.armed(), 0);
    }

    #[test]
    fn test_ktime_display() {
        assert_eq!(
            std::format!("{}", Ktime::from_nanos(1_500_000_000)),
            "1.500000000"
        );
    }
}
