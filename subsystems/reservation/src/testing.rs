//! Test doubles for the kernel collaborators
//!
//! Threads stand in for tasks: blocking parks the thread, a waker unparks it.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::task::Wake;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::task::Waker;
use std::thread::{self, Thread};

use spin::Mutex;

use crate::config::RsvConfig;
use crate::error::SchedError;
use crate::manager::ReservationManager;
use crate::process::{
    ExitObserver, Pid, Process, ProcessLifecycle, ProcessRegistry, RtPriority, SchedClassControl,
    SubscriptionId,
};
use crate::timer::{Clock, Ktime, TimerQueue};
use crate::wait::TaskContext;

// =============================================================================
// PROCESSES
// =============================================================================

#[derive(Debug)]
pub struct MockProcess {
    pid: Pid,
    alive: AtomicBool,
}

impl MockProcess {
    pub fn new(pid: Pid) -> Arc<Self> {
        Arc::new(Self {
            pid,
            alive: AtomicBool::new(true),
        })
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Process for MockProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Process table plus exit notification
#[derive(Default)]
pub struct MockKernel {
    processes: Mutex<BTreeMap<Pid, Arc<MockProcess>>>,
    observers: Mutex<Vec<(SubscriptionId, Weak<dyn ExitObserver>)>>,
    next_subscription: AtomicU64,
    resolve_dead: AtomicBool,
}

impl MockKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawn(&self, pid: Pid) -> Arc<MockProcess> {
        let process = MockProcess::new(pid);
        self.processes.lock().insert(pid, process.clone());
        process
    }

    /// Let `resolve` hand out processes already marked dead
    pub fn keep_resolving_dead(&self, on: bool) {
        self.resolve_dead.store(on, Ordering::SeqCst);
    }

    /// Terminate `pid`: mark dead, unlink, then notify outside the lock
    pub fn exit(&self, pid: Pid) {
        let Some(process) = self.processes.lock().remove(&pid) else {
            return;
        };
        process.kill();
        drop(process);

        let observers: Vec<Weak<dyn ExitObserver>> =
            self.observers.lock().iter().map(|(_, o)| o.clone()).collect();
        for observer in observers.iter().filter_map(Weak::upgrade) {
            observer.on_process_exit(pid);
        }
    }

    pub fn observers(&self) -> usize {
        self.observers.lock().len()
    }
}

impl ProcessRegistry<MockProcess> for MockKernel {
    fn resolve(&self, pid: Pid) -> Option<Arc<MockProcess>> {
        let resolve_dead = self.resolve_dead.load(Ordering::SeqCst);
        self.processes
            .lock()
            .get(&pid)
            .filter(|p| resolve_dead || p.is_alive())
            .cloned()
    }
}

impl ProcessLifecycle for MockKernel {
    fn subscribe_exit(&self, observer: Weak<dyn ExitObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    fn unsubscribe_exit(&self, id: SubscriptionId) {
        self.observers.lock().retain(|(sub, _)| *sub != id);
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedClass {
    Default,
    Fifo(u32),
}

type DefaultHook = Box<dyn Fn(Pid) + Send + Sync>;

/// Records the last class set for each pid
#[derive(Default)]
pub struct RecordingScheduler {
    classes: Mutex<BTreeMap<Pid, SchedClass>>,
    failing: Mutex<Vec<Pid>>,
    default_hook: Mutex<Option<DefaultHook>>,
}

impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn class(&self, pid: Pid) -> Option<SchedClass> {
        self.classes.lock().get(&pid).copied()
    }

    pub fn fifo_level(&self, pid: Pid) -> Option<u32> {
        match self.class(pid)? {
            SchedClass::Fifo(level) => Some(level),
            SchedClass::Default => None,
        }
    }

    /// Every class change for `pid` fails from now on
    pub fn fail_for(&self, pid: Pid) {
        self.failing.lock().push(pid);
    }

    /// Run `hook` at the start of every `set_default`, before it records
    pub fn on_set_default(&self, hook: impl Fn(Pid) + Send + Sync + 'static) {
        *self.default_hook.lock() = Some(Box::new(hook));
    }

    fn record(&self, pid: Pid, class: SchedClass) -> Result<(), SchedError> {
        if self.failing.lock().contains(&pid) {
            return Err(SchedError::PermissionDenied);
        }
        self.classes.lock().insert(pid, class);
        Ok(())
    }
}

impl SchedClassControl<MockProcess> for RecordingScheduler {
    fn set_realtime_fifo(&self, process: &MockProcess, priority: RtPriority) -> Result<(), SchedError> {
        self.record(process.pid(), SchedClass::Fifo(priority.level()))
    }

    fn set_default(&self, process: &MockProcess) -> Result<(), SchedError> {
        if let Some(hook) = self.default_hook.lock().as_ref() {
            hook(process.pid());
        }
        self.record(process.pid(), SchedClass::Default)
    }
}

// =============================================================================
// CLOCK
// =============================================================================

#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance_ms(&self, ms: u64) {
        self.nanos.fetch_add(ms * 1_000_000, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: u64) {
        self.nanos.store(ms * 1_000_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ktime {
        Ktime::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// =============================================================================
// TASKS
// =============================================================================

struct Unpark(Thread);

impl Wake for Unpark {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

/// The calling thread as a task
pub struct ThreadTask {
    pid: Pid,
    thread: Thread,
    signal: Arc<AtomicBool>,
}

impl ThreadTask {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            thread: thread::current(),
            signal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            signal: self.signal.clone(),
            thread: self.thread.clone(),
        }
    }
}

impl TaskContext for ThreadTask {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn signal_pending(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    fn waker(&self) -> Waker {
        Waker::from(Arc::new(Unpark(self.thread.clone())))
    }

    fn block(&self) {
        thread::park();
    }
}

/// Delivers a signal to a [`ThreadTask`] from another thread
pub struct Interrupter {
    signal: Arc<AtomicBool>,
    thread: Thread,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.signal.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }
}

// =============================================================================
// HARNESS
// =============================================================================

/// A manager wired to mock collaborators, attached for exit notifications
pub struct Harness {
    pub kernel: Arc<MockKernel>,
    pub sched: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
    pub timers: Arc<TimerQueue>,
    pub manager: Arc<ReservationManager<MockProcess>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RsvConfig::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(RsvConfig::default().with_max_reservations(capacity))
    }

    pub fn with_config(config: RsvConfig) -> Self {
        let kernel = MockKernel::new();
        let sched = RecordingScheduler::new();
        let clock = ManualClock::new();
        let timers = Arc::new(TimerQueue::new(clock.clone()));
        let manager = Arc::new(
            ReservationManager::<MockProcess>::new(config, kernel.clone(), sched.clone(), timers.clone())
                .expect("valid config"),
        );
        manager.attach(kernel.clone());

        Self {
            kernel,
            sched,
            clock,
            timers,
            manager,
        }
    }

    /// Move the clock to `ms` and fire whatever expired
    pub fn tick_to_ms(&self, ms: u64) -> usize {
        self.clock.set_ms(ms);
        self.timers.run_expired()
    }

    /// Spin until `pid`'s reservation has at least `n` registered waiters
    pub fn wait_for_waiters(&self, pid: Pid, n: usize) {
        let rsv = self
            .manager
            .table
            .lock()
            .find(pid)
            .map(|slot| slot.reservation().clone())
            .expect("reservation exists");
        while rsv.waiters().len() < n {
            thread::yield_now();
        }
    }
}
