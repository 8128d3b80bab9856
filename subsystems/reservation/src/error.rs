//! # Reservation Errors
//!
//! Error kinds returned synchronously by the reservation entry points, and
//! their mapping onto the errno values the syscall boundary hands back to
//! user space.

use core::fmt;

// =============================================================================
// ERRNO VALUES
// =============================================================================

/// Linux errno values used by the reservation syscalls
pub mod errno {
    /// No such process
    pub const ESRCH: i32 = 3;
    /// Interrupted system call
    pub const EINTR: i32 = 4;
    /// No such file or directory (no reservation to cancel)
    pub const ENOENT: i32 = 2;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Bad address
    pub const EFAULT: i32 = 14;
    /// Device or resource busy (already reserved)
    pub const EBUSY: i32 = 16;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// No space left (reservation table full)
    pub const ENOSPC: i32 = 28;
    /// Function not implemented (unknown syscall number)
    pub const ENOSYS: i32 = 38;
}

// =============================================================================
// RESERVATION ERROR
// =============================================================================

/// Result type for reservation operations
pub type RsvResult<T> = Result<T, RsvError>;

/// Errors returned by the reservation core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsvError {
    /// `C <= 0`, `T <= 0` or `C > T`
    InvalidArgument,
    /// Target pid does not resolve to a live process
    NoSuchProcess,
    /// Target already owns a reservation
    AlreadyReserved,
    /// Reservation table is full
    CapacityExceeded,
    /// Allocation failed while inserting
    OutOfMemory,
    /// Cancellation of a reservation that does not exist
    NotFound,
    /// Caller owns no reservation, or it was canceled while waiting
    NoReservation,
    /// Wait interrupted by a signal; the caller may retry
    Interrupted,
    /// Invalid caller-supplied memory region
    Fault,
}

impl RsvError {
    /// Errno value reported to user space (positive)
    pub const fn errno(self) -> i32 {
        match self {
            RsvError::InvalidArgument => errno::EINVAL,
            RsvError::NoSuchProcess => errno::ESRCH,
            RsvError::AlreadyReserved => errno::EBUSY,
            RsvError::CapacityExceeded => errno::ENOSPC,
            RsvError::OutOfMemory => errno::ENOMEM,
            RsvError::NotFound => errno::ENOENT,
            RsvError::NoReservation => errno::ENOENT,
            RsvError::Interrupted => errno::EINTR,
            RsvError::Fault => errno::EFAULT,
        }
    }

    /// Can the caller simply retry the same request?
    pub const fn is_retryable(self) -> bool {
        matches!(self, RsvError::Interrupted)
    }

    /// Short human-readable description
    pub const fn as_str(self) -> &'static str {
        match self {
            RsvError::InvalidArgument => "invalid budget or period",
            RsvError::NoSuchProcess => "no such process",
            RsvError::AlreadyReserved => "process already holds a reservation",
            RsvError::CapacityExceeded => "reservation table is full",
            RsvError::OutOfMemory => "out of memory",
            RsvError::NotFound => "no reservation for process",
            RsvError::NoReservation => "caller holds no active reservation",
            RsvError::Interrupted => "wait interrupted",
            RsvError::Fault => "bad user address",
        }
    }
}

impl fmt::Display for RsvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SCHEDULING-CLASS ERROR
// =============================================================================

/// Failure reported by the external scheduling-class facility
///
/// These never reach the caller of `reserve`/`cancel`; they are logged and
/// counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedError {
    /// The process vanished before the change could be applied
    NoSuchProcess,
    /// The facility refused the change
    PermissionDenied,
    /// Priority level outside the facility's range
    InvalidPriority,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::NoSuchProcess => f.write_str("process no longer exists"),
            SchedError::PermissionDenied => f.write_str("scheduling change refused"),
            SchedError::InvalidPriority => f.write_str("priority out of range"),
        }
    }
}
