//! # Rate-Monotonic Priority Assignment
//!
//! Shorter period, higher priority. The whole table is re-ranked on every
//! membership change; nothing is patched incrementally, so the result depends
//! only on the current membership.
//!
//! Entries are ordered by `(period, admission sequence)`: equal periods keep
//! their admission order, earlier admission ranking higher. Levels are handed
//! out one per entry from the top of the band down, clamped at the floor.

use alloc::vec::Vec;
use core::time::Duration;

use crate::config::RsvConfig;
use crate::process::{Process, RtPriority, SchedClassControl};
use crate::table::ReservationTable;

/// Rate-Monotonic level assigner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmAssigner {
    highest: u32,
    floor: u32,
}

impl RmAssigner {
    /// Assign levels from `highest` down to `floor`
    pub const fn new(highest: u32, floor: u32) -> Self {
        Self { highest, floor }
    }

    /// Assigner for a configuration's priority band
    pub const fn from_config(config: &RsvConfig) -> Self {
        Self::new(config.rt_priority_max, config.rt_priority_min)
    }

    /// Level for the entry at position `rank` (0 = shortest period)
    pub fn level_for_rank(&self, rank: usize) -> RtPriority {
        let rank = u32::try_from(rank).unwrap_or(u32::MAX);
        RtPriority(self.highest.saturating_sub(rank).max(self.floor))
    }

    /// Rank `(period, admission sequence)` keys
    ///
    /// Returns one level per key, in input order.
    pub fn rank(&self, keys: &[(Duration, u64)]) -> Vec<RtPriority> {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|&i| keys[i]);

        let mut levels = alloc::vec![RtPriority(self.floor); keys.len()];
        for (rank, &i) in order.iter().enumerate() {
            levels[i] = self.level_for_rank(rank);
        }
        levels
    }

    /// Recompute and apply levels for every entry in `table`
    ///
    /// A failed scheduling-class change is logged and skipped: it is not
    /// retried and the table keeps the computed level. Returns the number of
    /// failed changes.
    pub fn apply<P: Process>(
        &self,
        table: &ReservationTable<P>,
        sched: &dyn SchedClassControl<P>,
    ) -> usize {
        let keys: Vec<(Duration, u64)> = table
            .iter()
            .map(|slot| (slot.reservation().period(), slot.admitted()))
            .collect();
        let levels = self.rank(&keys);

        let mut failures = 0;
        for (slot, level) in table.iter().zip(levels) {
            let rsv = slot.reservation();
            rsv.set_priority(level);

            match sched.set_realtime_fifo(slot.process(), level) {
                Ok(()) => {
                    log::debug!(
                        "rsv: pid {} period {:?} -> FIFO {}",
                        rsv.pid(),
                        rsv.period(),
                        level
                    );
                },
                Err(err) => {
                    failures += 1;
                    log::warn!(
                        "rsv: failed to set FIFO {} for pid {}: {}",
                        level,
                        rsv.pid(),
                        err
                    );
                },
            }
        }
        failures
    }
}

impl Default for RmAssigner {
    fn default() -> Self {
        Self::from_config(&RsvConfig::default())
    }
}
