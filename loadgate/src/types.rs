//! Signal types shared by the loadgate pipeline.
//!
//! This module defines the values that flow between the activity counter,
//! the visibility gate, the flash controller and the indicator. Types that
//! leave the crate serialize to snake_case JSON.

use serde::{Deserialize, Serialize};

/// A payload-free task lifecycle signal emitted by external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSignal {
    Started,
    Ended,
}

/// Edge derived from two consecutive active-count emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityEdge {
    /// The count moved from exactly 0 to exactly 1.
    Activated,
    /// The count reached 0 from a nonzero value.
    Deactivated,
}

/// Progress statistics for a single indicator display.
///
/// `total` is always `completed` plus the number of tasks still active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadStats {
    /// Tasks seen during this display, finished or not.
    pub total: usize,

    /// Tasks that finished during this display.
    pub completed: usize,
}

impl LoadStats {
    /// Returns the completed fraction in `0.0..=1.0`, or `0.0` when nothing
    /// has been seen yet.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Returns the completed share as a whole percentage (rounded down).
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.completed.min(self.total) * 100) / self.total) as u8
        }
    }
}

/// Signal delivered to whatever renders the busy indicator.
///
/// Uses serde's internally tagged representation so each event prints as a
/// single flat JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorEvent {
    /// The indicator became visible. Sent once per display cycle.
    Show(LoadStats),
    /// Progress changed while the indicator is visible.
    Progress(LoadStats),
    /// The indicator should be hidden. Sent once per display cycle.
    Hide,
}

/// Fired once for every fully matched key combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboTriggered;
