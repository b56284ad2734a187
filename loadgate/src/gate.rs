//! Visibility edges derived from the active count.
//!
//! Edges are a pure function of consecutive pairs of count emissions. The
//! first emission of a subscription has no predecessor and never produces an
//! edge, which keeps the replayed initial `0` from reading as a deactivation.

use std::future;

use futures::stream::{BoxStream, Stream, StreamExt};

use crate::counter::ActivityCounter;
use crate::types::VisibilityEdge;

/// Boxed edge stream as produced by [`subscribe`].
pub type EdgeStream = BoxStream<'static, VisibilityEdge>;

/// Classifies one `(previous, current)` pair of count emissions.
#[must_use]
pub fn classify(previous: usize, current: usize) -> Option<VisibilityEdge> {
    match (previous, current) {
        (0, 1) => Some(VisibilityEdge::Activated),
        (p, 0) if p > 0 => Some(VisibilityEdge::Deactivated),
        _ => None,
    }
}

/// Maps a count sequence to its edges.
pub fn edges<S>(counts: S) -> impl Stream<Item = VisibilityEdge>
where
    S: Stream<Item = usize>,
{
    counts
        .scan(None, |previous: &mut Option<usize>, current| {
            let edge = previous
                .replace(current)
                .and_then(|previous| classify(previous, current));
            future::ready(Some(edge))
        })
        .filter_map(future::ready)
}

/// Only the `Activated` edges of a count sequence.
pub fn activations<S>(counts: S) -> impl Stream<Item = ()>
where
    S: Stream<Item = usize>,
{
    edges(counts)
        .filter_map(|edge| future::ready((edge == VisibilityEdge::Activated).then_some(())))
}

/// Only the `Deactivated` edges of a count sequence.
pub fn deactivations<S>(counts: S) -> impl Stream<Item = ()>
where
    S: Stream<Item = usize>,
{
    edges(counts)
        .filter_map(|edge| future::ready((edge == VisibilityEdge::Deactivated).then_some(())))
}

/// Subscribes to `counter` and returns its edge stream.
///
/// The stream holds a counter subscription; dropping it detaches.
#[must_use]
pub fn subscribe(counter: &ActivityCounter) -> EdgeStream {
    edges(counter.subscribe()).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::TaskSignals;
    use crate::types::VisibilityEdge::{Activated, Deactivated};
    use futures::stream;

    #[test]
    fn classify_pairs() {
        assert_eq!(classify(0, 1), Some(Activated));
        assert_eq!(classify(1, 0), Some(Deactivated));
        assert_eq!(classify(5, 0), Some(Deactivated));
        assert_eq!(classify(1, 2), None);
        assert_eq!(classify(2, 1), None);
        assert_eq!(classify(0, 0), None);
        // Only an exact 0 -> 1 step activates.
        assert_eq!(classify(0, 2), None);
    }

    #[tokio::test]
    async fn initial_zero_is_not_an_edge() {
        let collected: Vec<_> = edges(stream::iter(vec![0])).collect().await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn edges_follow_the_count_history() {
        let counts = stream::iter(vec![0, 1, 2, 1, 0, 1, 0]);
        let collected: Vec<_> = edges(counts).collect().await;
        assert_eq!(
            collected,
            vec![Activated, Deactivated, Activated, Deactivated]
        );
    }

    #[tokio::test]
    async fn late_subscription_starting_nonzero() {
        let counts = stream::iter(vec![3, 2, 0, 1]);
        let collected: Vec<_> = edges(counts).collect().await;
        assert_eq!(collected, vec![Deactivated, Activated]);
    }

    #[tokio::test]
    async fn split_signals() {
        let history = vec![0, 1, 0, 1, 2, 0];
        let up: Vec<_> = activations(stream::iter(history.clone())).collect().await;
        let down: Vec<_> = deactivations(stream::iter(history)).collect().await;
        assert_eq!(up.len(), 2);
        assert_eq!(down.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn observers_see_identical_edges() {
        let signals = TaskSignals::new();
        let counter = ActivityCounter::new(signals.clone());
        let first = subscribe(&counter);
        let second = subscribe(&counter);

        signals.started();
        signals.started();
        signals.ended();
        signals.ended();

        let a: Vec<_> = first.take(2).collect().await;
        let b: Vec<_> = second.take(2).collect().await;
        assert_eq!(a, vec![Activated, Deactivated]);
        assert_eq!(a, b);
    }
}
