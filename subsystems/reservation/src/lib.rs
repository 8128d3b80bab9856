//! # Cadence CPU Reservations
//!
//! Periodic CPU-time reservations layered on a fixed-priority real-time
//! scheduler. A process asks for a budget `C` every period `T`; the
//! reservation core admits or rejects the request, ranks every admitted
//! reservation Rate-Monotonically, releases the owner once per period and
//! tears the reservation down on cancellation or process exit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        RESERVATION MANAGER                           │
//! │                                                                      │
//! │  reserve ──▶ ┌──────────────────┐ ──▶ ┌──────────────────────┐       │
//! │              │ ReservationTable │     │  RM priority assign  │──▶ SchedClassControl
//! │  cancel ───▶ │   (spin::Mutex)  │ ──▶ │  (full recompute)    │       │
//! │              └────────┬─────────┘     └──────────────────────┘       │
//! │  exit ─────▶ reaper ──┘                                              │
//! │                                                                      │
//! │  TimerQueue ──▶ Reservation::on_expiry ──▶ period_seq++ ──▶ wake_all │
//! │                                                  │                   │
//! │  wait_next_period ◀──────── WaitQueue ◀──────────┘                   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Collaborators
//!
//! The embedding kernel supplies the process registry ([`ProcessRegistry`]),
//! the scheduling-class switch ([`SchedClassControl`]), exit notifications
//! ([`ProcessLifecycle`]), a monotonic [`Clock`] and the caller's
//! [`TaskContext`]. Nothing in this crate is global: one
//! [`ReservationManager`] is built at service start and shut down explicitly.
//!
//! ## Invariants
//!
//! 1. At most `max_reservations` entries, at most one per process.
//! 2. Every membership change is followed by a full priority recomputation
//!    before the table lock is released.
//! 3. A reservation is destroyed exactly once; its process reference is
//!    released exactly once, by whichever teardown path removed it.
//! 4. Once teardown returns, the entry's period timer is stopped and no
//!    further period advance is observable.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod manager;
pub mod priority;
pub mod process;
pub mod reaper;
pub mod reservation;
pub mod syscall;
pub mod table;
pub mod timer;
pub mod wait;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, RsvConfig};
pub use error::{RsvError, RsvResult, SchedError};
pub use manager::{ReservationInfo, ReservationManager, RsvStats};
pub use priority::RmAssigner;
pub use process::{
    ExitObserver, Pid, Process, ProcessLifecycle, ProcessRegistry, RtPriority, SchedClassControl,
    SubscriptionId,
};
pub use reservation::{Reservation, ReservationFlags};
pub use table::ReservationTable;
pub use timer::{Clock, Expiry, Ktime, TimerCallback, TimerFacility, TimerId, TimerQueue, TimerRestart};
pub use wait::{TaskContext, WaitQueue};
