//! # Process Collaborators
//!
//! Interfaces the reservation core consumes from the rest of the kernel:
//! pid resolution, scheduling-class changes and exit notification.
//!
//! Process handles are reference counted. A resolved `Arc<P>` is a counted
//! reference; the reservation table keeps exactly one clone per entry and
//! drops it when the entry is torn down.

use alloc::sync::{Arc, Weak};
use core::fmt;

use crate::error::SchedError;

// =============================================================================
// IDENTITIES
// =============================================================================

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// Sentinel meaning "the calling process"
    pub const CURRENT: Pid = Pid(0);

    /// Is this the caller sentinel?
    pub const fn is_current(self) -> bool {
        self.0 == 0
    }

    /// Replace the sentinel with the caller's pid
    pub const fn or_caller(self, caller: Pid) -> Pid {
        if self.is_current() {
            caller
        } else {
            self
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed real-time priority level (higher value wins)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtPriority(pub u32);

impl RtPriority {
    /// Raw level
    pub const fn level(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RtPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PROCESS REGISTRY
// =============================================================================

/// A process as seen by the reservation core
pub trait Process: Send + Sync {
    /// Process identifier
    fn pid(&self) -> Pid;

    /// Has the process not yet terminated?
    fn is_alive(&self) -> bool;
}

/// Resolves pids to counted process handles
pub trait ProcessRegistry<P: Process>: Send + Sync {
    /// Look up a live process, taking a counted reference to it
    fn resolve(&self, pid: Pid) -> Option<Arc<P>>;
}

/// The facility that actually moves a process between scheduling classes
pub trait SchedClassControl<P: Process>: Send + Sync {
    /// Switch to fixed-priority real-time (FIFO) scheduling at `priority`
    fn set_realtime_fifo(&self, process: &P, priority: RtPriority) -> Result<(), SchedError>;

    /// Switch back to the default time-sharing class
    fn set_default(&self, process: &P) -> Result<(), SchedError>;
}

// =============================================================================
// EXIT NOTIFICATION
// =============================================================================

/// Exit subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives process termination notifications
pub trait ExitObserver: Send + Sync {
    /// Called once for every process that terminates
    fn on_process_exit(&self, pid: Pid);
}

/// The process-lifecycle subsystem
///
/// Implementations must make [`Process::is_alive`] return `false` before
/// notifying observers of that process's exit. Admission relies on this to
/// never insert an entry the exit path has already missed.
pub trait ProcessLifecycle: Send + Sync {
    /// Register for exit notifications
    fn subscribe_exit(&self, observer: Weak<dyn ExitObserver>) -> SubscriptionId;

    /// Drop a registration
    fn unsubscribe_exit(&self, id: SubscriptionId);
}
