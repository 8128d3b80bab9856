//! # Reservation System Calls
//!
//! The user-space boundary: copies arguments in, maps raw pids onto
//! [`Pid`], calls into the [`ReservationManager`] and folds the outcome into
//! the `0` / `-errno` return convention.
//!
//! | Number | Call                         | Arguments                 |
//! |--------|------------------------------|---------------------------|
//! | 397    | `set_rsv`                    | `pid, *C, *T`             |
//! | 398    | `cancel_rsv`                 | `pid`                     |
//! | 399    | `wait_until_next_period`     | none                      |
//!
//! A pid of `0` names the caller. Budget and period are passed by address as
//! [`Timespec`] and are copied in before anything else is checked, so a bad
//! pointer always reports `EFAULT`.

use core::mem::size_of;
use core::time::Duration;

use static_assertions::const_assert_eq;

use crate::error::{errno, RsvError, RsvResult};
use crate::manager::ReservationManager;
use crate::process::{Pid, Process};
use crate::wait::TaskContext;

// =============================================================================
// SYSCALL NUMBERS
// =============================================================================

/// `set_rsv(pid, const struct timespec *C, const struct timespec *T)`
pub const SYS_SET_RSV: usize = 397;
/// `cancel_rsv(pid)`
pub const SYS_CANCEL_RSV: usize = 398;
/// `wait_until_next_period(void)`
pub const SYS_WAIT_UNTIL_NEXT_PERIOD: usize = 399;

// =============================================================================
// USER ABI
// =============================================================================

/// `struct timespec` as laid out by user space
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timespec {
    /// Seconds
    pub tv_sec: i64,
    /// Nanoseconds, `0..1_000_000_000`
    pub tv_nsec: i64,
}

const_assert_eq!(size_of::<Timespec>(), 16);

const NSEC_PER_SEC: i64 = 1_000_000_000;

impl Timespec {
    /// Build from raw fields
    pub const fn new(tv_sec: i64, tv_nsec: i64) -> Self {
        Self { tv_sec, tv_nsec }
    }

    /// Convert to a [`Duration`]
    ///
    /// Negative fields and an out-of-range `tv_nsec` are rejected.
    pub fn to_duration(self) -> RsvResult<Duration> {
        if self.tv_sec < 0 || !(0..NSEC_PER_SEC).contains(&self.tv_nsec) {
            return Err(RsvError::InvalidArgument);
        }
        Ok(Duration::new(self.tv_sec as u64, self.tv_nsec as u32))
    }
}

impl From<Duration> for Timespec {
    fn from(d: Duration) -> Self {
        Self {
            tv_sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            tv_nsec: i64::from(d.subsec_nanos()),
        }
    }
}

/// A user-space address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserAddr(pub usize);

/// Copies arguments out of the caller's address space
pub trait UserMemory {
    /// Read a [`Timespec`] at `addr`; [`RsvError::Fault`] if it is not readable
    fn read_timespec(&self, addr: UserAddr) -> RsvResult<Timespec>;
}

/// Raw syscall arguments as passed in registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallArgs([usize; 6]);

impl SyscallArgs {
    /// Wrap register values
    pub const fn new(args: [usize; 6]) -> Self {
        Self(args)
    }

    /// Argument `n` (0-based)
    pub fn arg(&self, n: usize) -> usize {
        self.0.get(n).copied().unwrap_or(0)
    }

    /// Argument `n` reinterpreted as a C `pid_t`
    pub fn pid(&self, n: usize) -> i32 {
        self.arg(n) as i32
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn user_pid(raw: i32) -> Option<Pid> {
    u32::try_from(raw).ok().map(Pid)
}

fn to_return(result: RsvResult<()>) -> isize {
    match result {
        Ok(()) => 0,
        Err(err) => -(err.errno() as isize),
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// `set_rsv`: reserve `*budget` every `*period` for `pid`
pub fn sys_set_rsv<P: Process>(
    manager: &ReservationManager<P>,
    ctx: &dyn TaskContext,
    mem: &dyn UserMemory,
    pid: i32,
    budget: UserAddr,
    period: UserAddr,
) -> isize {
    to_return(set_rsv(manager, ctx, mem, pid, budget, period))
}

fn set_rsv<P: Process>(
    manager: &ReservationManager<P>,
    ctx: &dyn TaskContext,
    mem: &dyn UserMemory,
    pid: i32,
    budget: UserAddr,
    period: UserAddr,
) -> RsvResult<()> {
    let budget = mem.read_timespec(budget)?;
    let period = mem.read_timespec(period)?;
    let pid = user_pid(pid).ok_or(RsvError::NoSuchProcess)?;
    manager.reserve(ctx, pid, budget.to_duration()?, period.to_duration()?)
}

/// `cancel_rsv`: drop `pid`'s reservation
pub fn sys_cancel_rsv<P: Process>(
    manager: &ReservationManager<P>,
    ctx: &dyn TaskContext,
    pid: i32,
) -> isize {
    let result = user_pid(pid)
        .ok_or(RsvError::NotFound)
        .and_then(|pid| manager.cancel(ctx, pid));
    to_return(result)
}

/// `wait_until_next_period`: block until the caller's next period starts
pub fn sys_wait_until_next_period<P: Process>(
    manager: &ReservationManager<P>,
    ctx: &dyn TaskContext,
) -> isize {
    to_return(manager.wait_next_period(ctx))
}

/// Route a raw syscall to its handler
///
/// Unknown numbers return `-ENOSYS`.
pub fn dispatch<P: Process>(
    manager: &ReservationManager<P>,
    ctx: &dyn TaskContext,
    mem: &dyn UserMemory,
    number: usize,
    args: &SyscallArgs,
) -> isize {
    match number {
        SYS_SET_RSV => sys_set_rsv(
            manager,
            ctx,
            mem,
            args.pid(0),
            UserAddr(args.arg(1)),
            UserAddr(args.arg(2)),
        ),
        SYS_CANCEL_RSV => sys_cancel_rsv(manager, ctx, args.pid(0)),
        SYS_WAIT_UNTIL_NEXT_PERIOD => sys_wait_until_next_period(manager, ctx),
        _ => {
            log::debug!("rsv: unknown syscall {}", number);
            -(errno::ENOSYS as isize)
        },
    }
}

// =============================================================================
// TESTS
// =============================================================================
