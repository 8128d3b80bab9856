//! # Reservation Configuration
//!
//! Population cap and the real-time priority band handed out by the
//! Rate-Monotonic assigner.

use core::fmt;

use static_assertions::const_assert;

/// Default cap on concurrently admitted reservations
pub const DEFAULT_MAX_RESERVATIONS: usize = 50;

/// Highest fixed real-time priority level (`MAX_RT_PRIO - 1`)
pub const DEFAULT_RT_PRIORITY_MAX: u32 = 99;

/// Lowest fixed real-time priority level
pub const DEFAULT_RT_PRIORITY_MIN: u32 = 1;

// Every admitted reservation must get its own level with the defaults.
const_assert!(
    DEFAULT_RT_PRIORITY_MAX - DEFAULT_RT_PRIORITY_MIN + 1 >= DEFAULT_MAX_RESERVATIONS as u32
);

/// Invalid configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_reservations` is zero
    ZeroCapacity,
    /// Level 0 is the non-real-time class
    ZeroPriorityFloor,
    /// `rt_priority_min > rt_priority_max`
    InvertedPriorityRange,
    /// Fewer levels than `max_reservations`
    PriorityRangeTooNarrow {
        /// Levels available in the band
        levels: u32,
        /// Requested population cap
        capacity: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCapacity => f.write_str("max_reservations must be at least 1"),
            ConfigError::ZeroPriorityFloor => f.write_str("rt_priority_min must be at least 1"),
            ConfigError::InvertedPriorityRange => {
                f.write_str("rt_priority_min exceeds rt_priority_max")
            },
            ConfigError::PriorityRangeTooNarrow { levels, capacity } => write!(
                f,
                "{} priority levels cannot rank {} reservations",
                levels, capacity
            ),
        }
    }
}

/// Reservation core configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsvConfig {
    /// Maximum number of admitted reservations
    pub max_reservations: usize,
    /// Level given to the shortest period
    pub rt_priority_max: u32,
    /// Floor of the band
    pub rt_priority_min: u32,
}

impl Default for RsvConfig {
    fn default() -> Self {
        Self {
            max_reservations: DEFAULT_MAX_RESERVATIONS,
            rt_priority_max: DEFAULT_RT_PRIORITY_MAX,
            rt_priority_min: DEFAULT_RT_PRIORITY_MIN,
        }
    }
}

impl RsvConfig {
    /// Create the default configuration
    pub const fn new() -> Self {
        Self {
            max_reservations: DEFAULT_MAX_RESERVATIONS,
            rt_priority_max: DEFAULT_RT_PRIORITY_MAX,
            rt_priority_min: DEFAULT_RT_PRIORITY_MIN,
        }
    }

    /// Set the population cap
    pub const fn with_max_reservations(mut self, max: usize) -> Self {
        self.max_reservations = max;
        self
    }

    /// Set the real-time priority band
    pub const fn with_priority_range(mut self, min: u32, max: u32) -> Self {
        self.rt_priority_min = min;
        self.rt_priority_max = max;
        self
    }

    /// Number of distinct levels in the band (1 for an inverted band)
    pub const fn priority_levels(&self) -> u32 {
        self.rt_priority_max
            .saturating_sub(self.rt_priority_min)
            .saturating_add(1)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reservations == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.rt_priority_min == 0 {
            return Err(ConfigError::ZeroPriorityFloor);
        }
        if self.rt_priority_min > self.rt_priority_max {
            return Err(ConfigError::InvertedPriorityRange);
        }

        let levels = self.priority_levels();
        if (levels as usize) < self.max_reservations {
            return Err(ConfigError::PriorityRangeTooNarrow {
                levels,
                capacity: self.max_reservations,
            });
        }

        Ok(())
    }
}
