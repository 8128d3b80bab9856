//! # Wait Queues
//!
//! Block/wake primitive for tasks waiting on a period boundary.
//!
//! The waiting side follows the usual prepare/check/sleep pattern: register a
//! waker, re-check the condition, then [`TaskContext::block`]. A wake that
//! lands between the check and the block is not lost because `block` returns
//! immediately once the task's waker has fired.

use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::Waker;

use spin::Mutex;

use crate::process::Pid;

// =============================================================================
// TASK CONTEXT
// =============================================================================

/// The task issuing a request
pub trait TaskContext {
    /// Pid of the calling process
    fn pid(&self) -> Pid;

    /// Is a signal pending for this task?
    fn signal_pending(&self) -> bool;

    /// A waker that makes this task runnable again
    fn waker(&self) -> Waker;

    /// Suspend until woken
    ///
    /// Returns immediately if the task's waker fired since the previous
    /// `block`, and may return spuriously.
    fn block(&self);
}

// =============================================================================
// WAIT QUEUE
// =============================================================================

/// Registration token returned by [`WaitQueue::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken(u64);

/// A set of blocked tasks
pub struct WaitQueue {
    waiters: Mutex<Vec<(WaitToken, Waker)>>,
    next_token: AtomicU64,
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("waiters", &self.len())
            .finish()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Add a waiter
    pub fn register(&self, waker: Waker) -> WaitToken {
        let token = WaitToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.waiters.lock().push((token, waker));
        token
    }

    /// Remove a waiter; a no-op if it was already woken
    pub fn unregister(&self, token: WaitToken) {
        self.waiters.lock().retain(|(t, _)| *t != token);
    }

    /// Wake and remove every waiter, returning how many were woken
    ///
    /// The list is detached under the lock and the wakers are invoked after
    /// it is released.
    pub fn wake_all(&self) -> usize {
        let woken = core::mem::take(&mut *self.waiters.lock());
        let count = woken.len();
        for (_, waker) in woken {
            waker.wake();
        }
        count
    }

    /// Number of registered waiters
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// No waiters registered?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
