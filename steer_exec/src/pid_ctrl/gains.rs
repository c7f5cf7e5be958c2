//! # Gains and gain schedule
//!
//! The gain schedule is an ordered list of speed bands, each carrying its own set of PID gains.
//! Bands are searched in insertion order and the first band containing the speed wins, so
//! overlapping bands are resolved by the order in which they were added.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A set of PID gains.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64
}

/// A speed band over which a set of gains applies.
///
/// The band is closed at `lower_speed` and open at `upper_speed`. `lower_speed < upper_speed` is
/// expected but not enforced, an inverted band simply never matches.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainRange {
    pub lower_speed: f64,
    pub upper_speed: f64,
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64
}

/// Ordered sequence of gain ranges.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GainSchedule {
    ranges: Vec<GainRange>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Gains {
    pub const fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self { k_p, k_i, k_d }
    }
}

impl GainRange {
    pub const fn new(lower_speed: f64, upper_speed: f64, k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self { lower_speed, upper_speed, k_p, k_i, k_d }
    }

    /// The gains that apply within this range.
    pub fn gains(&self) -> Gains {
        Gains::new(self.k_p, self.k_i, self.k_d)
    }

    /// Returns true if `speed` falls within `[lower_speed, upper_speed)`.
    ///
    /// A NaN speed is never contained in any range.
    pub fn contains(&self, speed: f64) -> bool {
        speed >= self.lower_speed && speed < self.upper_speed
    }
}

impl GainSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a range to the end of the schedule. No de-duplication or overlap checks are made.
    pub fn push(&mut self, range: GainRange) {
        self.ranges.push(range);
    }

    /// Find the first range containing `speed`.
    pub fn select(&self, speed: f64) -> Option<&GainRange> {
        self.ranges.iter().find(|r| r.contains(speed))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GainRange> {
        self.ranges.iter()
    }
}

impl From<Vec<GainRange>> for GainSchedule {
    fn from(ranges: Vec<GainRange>) -> Self {
        Self { ranges }
    }
}
