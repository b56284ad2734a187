//! Shared live count of active tasks.
//!
//! [`ActivityCounter`] folds task signals into a running count and fans it
//! out to any number of observers. It behaves as a hot, replay-one,
//! reference-counted source:
//!
//! - The first [`ActivityCounter::subscribe`] attaches the counter to its
//!   [`TaskSignals`] as a sink. Later observers share that computation.
//! - Signals are applied on the thread that sends them, so a count change is
//!   visible to [`ActivityCounter::current`] and to new subscribers as soon as
//!   `started()` or `ended()` returns. Bursts of any size are never lost.
//! - Every new observer receives the current count immediately, then only
//!   changes.
//! - When the last [`CountSubscription`] is dropped the sink is detached and
//!   the count is reset. The next subscriber starts again from 0.
//!
//! The running sum is clamped at 0, so surplus end signals are absorbed (and
//! logged) instead of producing a negative count. Clamping happens on the
//! internal sum; de-duplication happens on the emitted sequence.
//!
//! # Example
//!
//! ```rust
//! use loadgate::counter::ActivityCounter;
//! use loadgate::signals::TaskSignals;
//!
//! # async fn example() {
//! let signals = TaskSignals::new();
//! let counter = ActivityCounter::new(signals.clone());
//!
//! let mut counts = counter.subscribe();
//! assert_eq!(counts.recv().await, Some(0));
//!
//! signals.started();
//! assert_eq!(counter.current(), Some(1));
//! assert_eq!(counts.recv().await, Some(1));
//! # }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::signals::{SignalSink, TaskSignals};
use crate::types::TaskSignal;

/// Shared, reference-counted active task count.
///
/// Cloning is cheap and clones observe the same computation.
#[derive(Debug, Clone)]
pub struct ActivityCounter {
    signals: TaskSignals,
    shared: Arc<Mutex<Shared>>,
}

/// State shared between the counter handle, its subscriptions and the
/// signal sink.
#[derive(Debug, Default)]
struct Shared {
    /// Clamped running sum. Always equal to the last emitted value.
    count: usize,
    /// Live observers keyed by subscription id.
    observers: HashMap<u64, mpsc::UnboundedSender<usize>>,
    next_id: u64,
    /// Sink registration, present while at least one observer is attached.
    sink: Option<u64>,
    /// End signals absorbed by the clamp since the counter was created.
    underflows: u64,
}

impl Shared {
    fn start(&mut self, shared: &Arc<Mutex<Shared>>, signals: &TaskSignals) {
        self.count = 0;
        let sink: Arc<dyn SignalSink> = Arc::clone(shared) as Arc<dyn SignalSink>;
        let id = signals.attach_sink(sink);
        self.sink = Some(id);
        debug!(sink = id, "Activity counter started");
    }

    fn teardown(&mut self, signals: &TaskSignals) {
        if let Some(id) = self.sink.take() {
            signals.detach_sink(id);
        }
        self.count = 0;
        debug!("Activity counter torn down");
    }

    fn apply(&mut self, signal: TaskSignal) {
        let next = match clamp_step(self.count, signal) {
            Ok(next) => next,
            Err(clamped) => {
                self.underflows += 1;
                warn!(
                    underflows = self.underflows,
                    "Task ended with no active tasks, count clamped at 0"
                );
                clamped
            }
        };
        self.emit(next);
    }

    fn emit(&mut self, next: usize) {
        if next == self.count {
            trace!(count = next, "Count unchanged, emission suppressed");
            return;
        }
        self.count = next;
        trace!(count = next, observers = self.observers.len(), "Count changed");
        for tx in self.observers.values() {
            // A closed receiver belongs to a subscription that is mid-drop.
            let _ = tx.send(next);
        }
    }
}

impl SignalSink for Mutex<Shared> {
    fn apply(&self, signal: TaskSignal) {
        let mut state = lock(self);
        // A dispatch that raced a teardown must not touch the reset count.
        if state.sink.is_some() {
            state.apply(signal);
        }
    }
}

/// Applies one signal to the running sum.
///
/// Returns `Err(0)` when an end signal would take the sum below zero.
fn clamp_step(count: usize, signal: TaskSignal) -> Result<usize, usize> {
    match signal {
        TaskSignal::Started => Ok(count.saturating_add(1)),
        TaskSignal::Ended => count.checked_sub(1).ok_or(0),
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActivityCounter {
    /// Creates a counter over the given task signals.
    ///
    /// Nothing is counted until the first observer subscribes.
    #[must_use]
    pub fn new(signals: TaskSignals) -> Self {
        Self {
            signals,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Attaches an observer.
    ///
    /// The returned subscription already holds the current count, including
    /// every signal sent before this call returned.
    #[must_use]
    pub fn subscribe(&self) -> CountSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.shared);

        if state.observers.is_empty() {
            state.start(&self.shared, &self.signals);
        }

        let _ = tx.send(state.count);

        let id = state.next_id;
        state.next_id += 1;
        state.observers.insert(id, tx);
        trace!(id, observers = state.observers.len(), "Count observer attached");

        CountSubscription {
            id,
            rx,
            counter: self.clone(),
        }
    }

    /// Returns the current count, or `None` while nobody is observing.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        let state = lock(&self.shared);
        state.sink.map(|_| state.count)
    }

    /// Returns the number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        lock(&self.shared).observers.len()
    }

    /// Returns whether the shared computation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.shared).sink.is_some()
    }

    /// Returns how many end signals were absorbed by the clamp.
    ///
    /// Survives teardown; a nonzero value means some caller ended more tasks
    /// than it started.
    #[must_use]
    pub fn underflow_count(&self) -> u64 {
        lock(&self.shared).underflows
    }

    /// Returns the task signals this counter folds.
    #[must_use]
    pub fn signals(&self) -> &TaskSignals {
        &self.signals
    }
}

/// One observer's view of the active count.
///
/// Implements [`Stream`]. Dropping it detaches the observer, and dropping the
/// last one tears the shared computation down.
#[derive(Debug)]
pub struct CountSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<usize>,
    counter: ActivityCounter,
}

impl CountSubscription {
    /// Waits for the next emitted count.
    pub async fn recv(&mut self) -> Option<usize> {
        self.rx.recv().await
    }

    /// Returns an already-emitted count without waiting.
    pub fn try_next(&mut self) -> Option<usize> {
        self.rx.try_recv().ok()
    }
}

impl Stream for CountSubscription {
    type Item = usize;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<usize>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for CountSubscription {
    fn drop(&mut self) {
        let mut state = lock(&self.counter.shared);
        state.observers.remove(&self.id);
        trace!(
            id = self.id,
            observers = state.observers.len(),
            "Count observer detached"
        );
        if state.observers.is_empty() {
            state.teardown(&self.counter.signals);
        }
    }
}
