//! Property tests for the shared activity counter.
//!
//! These tests drive the counter with many start/end interleavings and check
//! the observable guarantees every observer relies on:
//!
//! 1. The settled count equals the clamped running sum of the signals
//! 2. No observer ever sees two consecutive equal values
//! 3. A new observer immediately receives the current value
//! 4. Every observer sees the same sequence

use std::time::Duration;

use loadgate::bus::DEFAULT_CHANNEL_CAPACITY;
use loadgate::counter::{ActivityCounter, CountSubscription};
use loadgate::signals::TaskSignals;
use loadgate::types::TaskSignal;

// =============================================================================
// Test Helpers
// =============================================================================

/// Lets spawned senders run. Time is paused, so the sleep only completes
/// once every ready task has run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn drain(sub: &mut CountSubscription) -> Vec<usize> {
    let mut values = Vec::new();
    while let Some(value) = sub.try_next() {
        values.push(value);
    }
    values
}

/// Deterministic pseudo-random signal sequences (xorshift), weighted
/// towards starts so counts climb as well as fall.
fn interleavings(cases: usize, len: usize) -> Vec<Vec<TaskSignal>> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..cases)
        .map(|_| {
            (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    if state % 5 < 3 {
                        TaskSignal::Started
                    } else {
                        TaskSignal::Ended
                    }
                })
                .collect()
        })
        .collect()
}

/// The count a correct implementation must settle on.
fn expected_count(signals: &[TaskSignal]) -> usize {
    signals.iter().fold(0usize, |count, signal| match signal {
        TaskSignal::Started => count + 1,
        TaskSignal::Ended => count.saturating_sub(1),
    })
}

fn publish(signals: &TaskSignals, sequence: &[TaskSignal]) {
    for signal in sequence {
        match signal {
            TaskSignal::Started => signals.started(),
            TaskSignal::Ended => signals.ended(),
        }
    }
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn settled_count_matches_clamped_sum() {
    for sequence in interleavings(50, 40) {
        let signals = TaskSignals::new();
        let counter = ActivityCounter::new(signals.clone());
        let mut sub = counter.subscribe();

        publish(&signals, &sequence);
        settle().await;

        let values = drain(&mut sub);
        let expected = expected_count(&sequence);
        assert_eq!(values.last().copied(), Some(expected));
        assert_eq!(counter.current(), Some(expected));
    }
}

#[tokio::test(start_paused = true)]
async fn balanced_signals_settle_at_starts_minus_ends() {
    let signals = TaskSignals::new();
    let counter = ActivityCounter::new(signals.clone());
    let _sub = counter.subscribe();

    for _ in 0..7 {
        signals.started();
    }
    for _ in 0..3 {
        signals.ended();
    }
    settle().await;

    assert_eq!(counter.current(), Some(4));
    assert_eq!(counter.underflow_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_consecutive_duplicates() {
    for sequence in interleavings(50, 60) {
        let signals = TaskSignals::new();
        let counter = ActivityCounter::new(signals.clone());
        let mut sub = counter.subscribe();

        publish(&signals, &sequence);
        settle().await;

        let values = drain(&mut sub);
        for pair in values.windows(2) {
            assert_ne!(pair[0], pair[1], "duplicate emission in {values:?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn new_observer_receives_current_value_first() {
    let signals = TaskSignals::new();
    let counter = ActivityCounter::new(signals.clone());
    let _first = counter.subscribe();

    for (step, signal) in interleavings(1, 30).remove(0).into_iter().enumerate() {
        publish(&signals, &[signal]);
        settle().await;

        let current = counter.current().expect("counter is running");
        let mut late = counter.subscribe();
        assert_eq!(late.try_next(), Some(current), "step {step}");
        assert_eq!(late.try_next(), None, "step {step}");
    }
}

#[tokio::test(start_paused = true)]
async fn observers_see_identical_sequences() {
    let signals = TaskSignals::new();
    let counter = ActivityCounter::new(signals.clone());
    let mut a = counter.subscribe();
    let mut b = counter.subscribe();
    let mut c = counter.subscribe();

    publish(&signals, &interleavings(1, 80).remove(0));
    settle().await;

    let seen = drain(&mut a);
    assert_eq!(seen, drain(&mut b));
    assert_eq!(seen, drain(&mut c));
}

#[tokio::test(start_paused = true)]
async fn resubscribe_after_teardown_starts_from_zero() {
    let signals = TaskSignals::new();
    let counter = ActivityCounter::new(signals.clone());

    let sub = counter.subscribe();
    signals.started();
    signals.started();
    settle().await;
    assert_eq!(counter.current(), Some(2));
    drop(sub);

    let mut again = counter.subscribe();
    assert_eq!(again.try_next(), Some(0));

    // Ends for tasks started before teardown are clamped, not carried.
    signals.ended();
    settle().await;
    assert_eq!(again.try_next(), None);
    assert_eq!(counter.underflow_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn guards_from_many_tasks_balance_out() {
    let signals = TaskSignals::new();
    let counter = ActivityCounter::new(signals.clone());
    let mut sub = counter.subscribe();

    let mut handles = Vec::new();
    for i in 0..20u64 {
        let signals = signals.clone();
        handles.push(tokio::spawn(async move {
            signals
                .track_future(tokio::time::sleep(Duration::from_millis(10 * (i % 4 + 1))))
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    settle().await;

    let values = drain(&mut sub);
    assert_eq!(values.first(), Some(&0));
    assert_eq!(values.last(), Some(&0));
    assert_eq!(values.iter().max(), Some(&20));
    assert_eq!(counter.underflow_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn bursts_larger_than_bus_capacity_settle_at_zero() {
    let signals = TaskSignals::new();
    let counter = ActivityCounter::new(signals.clone());
    let _sub = counter.subscribe();
    let burst = DEFAULT_CHANNEL_CAPACITY + 100;

    for _ in 0..burst {
        signals.started();
        tokio::task::yield_now().await;
    }
    for _ in 0..burst {
        signals.ended();
    }
    settle().await;

    assert_eq!(counter.current(), Some(0));
    assert_eq!(counter.underflow_count(), 0);
}
