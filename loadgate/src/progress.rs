//! Per-display progress tracking.
//!
//! A [`ProgressScope`] is opened when the indicator is shown and dropped when
//! it hides. It owns its own counter subscription and a fresh
//! [`ProgressTracker`], so nothing carries over between display cycles.

use tracing::trace;

use crate::counter::{ActivityCounter, CountSubscription};
use crate::types::LoadStats;

/// Folds active-count emissions into [`LoadStats`].
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    previous: usize,
    stats: LoadStats,
}

impl ProgressTracker {
    /// Creates a tracker at `{total: 0, completed: 0}`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one count emission and returns the updated statistics.
    ///
    /// Every decrease counts as exactly one completion, regardless of size.
    pub fn observe(&mut self, count: usize) -> LoadStats {
        if count < self.previous {
            self.stats.completed += 1;
        }
        self.previous = count;
        self.stats.total = self.stats.completed + count;
        self.stats
    }

    /// Returns the current statistics.
    #[must_use]
    pub fn stats(&self) -> LoadStats {
        self.stats
    }
}

/// Progress for one show/hide cycle of the indicator.
#[derive(Debug)]
pub struct ProgressScope {
    counts: CountSubscription,
    tracker: ProgressTracker,
}

impl ProgressScope {
    /// Subscribes to `counter` and folds the replayed current count.
    #[must_use]
    pub fn open(counter: &ActivityCounter) -> Self {
        let mut scope = Self {
            counts: counter.subscribe(),
            tracker: ProgressTracker::new(),
        };
        scope.drain();
        trace!(stats = ?scope.tracker.stats(), "Progress scope opened");
        scope
    }

    /// Returns the statistics so far.
    #[must_use]
    pub fn stats(&self) -> LoadStats {
        self.tracker.stats()
    }

    /// Waits for the next count change and returns the updated statistics.
    ///
    /// # Cancel safety
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<LoadStats> {
        let count = self.counts.recv().await?;
        Some(self.tracker.observe(count))
    }

    /// Folds every count already delivered. Returns the new statistics if
    /// anything changed.
    pub fn drain(&mut self) -> Option<LoadStats> {
        let mut updated = None;
        while let Some(count) = self.counts.try_next() {
            updated = Some(self.tracker.observe(count));
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::TaskSignals;
    use std::time::Duration;

    fn stats(total: usize, completed: usize) -> LoadStats {
        LoadStats { total, completed }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn single_task_reaches_full() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(1), stats(1, 0));
        assert_eq!(tracker.observe(0), stats(1, 1));
        assert_eq!(tracker.stats().percent(), 100);
    }

    #[test]
    fn start_start_end_start() {
        let mut tracker = ProgressTracker::new();
        tracker.observe(1);
        tracker.observe(2);
        tracker.observe(1);
        assert_eq!(tracker.observe(2), stats(3, 1));
    }

    #[test]
    fn initial_observation_counts_as_total() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(4), stats(4, 0));
    }

    #[test]
    fn repeated_value_changes_nothing() {
        let mut tracker = ProgressTracker::new();
        tracker.observe(2);
        assert_eq!(tracker.observe(2), stats(2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn scope_starts_from_current_count() {
        let signals = TaskSignals::new();
        let counter = ActivityCounter::new(signals.clone());
        let _keepalive = counter.subscribe();

        signals.started();
        signals.started();
        settle().await;

        let mut scope = ProgressScope::open(&counter);
        assert_eq!(scope.stats(), stats(2, 0));

        signals.ended();
        assert_eq!(scope.next().await, Some(stats(2, 1)));
        signals.started();
        assert_eq!(scope.next().await, Some(stats(3, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn new_scope_does_not_carry_over() {
        let signals = TaskSignals::new();
        let counter = ActivityCounter::new(signals.clone());
        let _keepalive = counter.subscribe();

        signals.started();
        settle().await;
        let mut first = ProgressScope::open(&counter);
        signals.ended();
        settle().await;
        assert_eq!(first.drain(), Some(stats(1, 1)));
        drop(first);

        signals.started();
        settle().await;
        let second = ProgressScope::open(&counter);
        assert_eq!(second.stats(), stats(1, 0));
    }
}
