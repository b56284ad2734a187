//! Entry points for reporting background work.
//!
//! [`TaskSignals`] is the handle external call sites hold. It is cheap to
//! clone and both [`TaskSignals::started`] and [`TaskSignals::ended`] are
//! fire-and-forget, so they can be called from any task at any rate.
//!
//! Pairing starts and ends by hand is easy to get wrong on early returns, so
//! [`TaskSignals::track`] hands out a [`TaskGuard`] that reports the end when
//! dropped.
//!
//! Every signal is delivered twice:
//!
//! - synchronously, on the calling thread, to each attached [`SignalSink`].
//!   This path is lossless and is how the activity counter keeps its sum.
//! - to the raw [`EventBus`] returned by [`TaskSignals::bus`]. Bus observers
//!   that fall more than the bus capacity behind skip signals.
//!
//! # Example
//!
//! ```rust
//! use loadgate::signals::TaskSignals;
//!
//! # async fn fetch() -> u32 { 42 }
//! # async fn example() {
//! let signals = TaskSignals::new();
//!
//! // Manual pairing
//! signals.started();
//! signals.ended();
//!
//! // Scoped pairing
//! let value = signals.track_future(fetch()).await;
//! assert_eq!(value, 42);
//! # }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::bus::EventBus;
use crate::types::TaskSignal;

/// Consumer applied to every task signal on the sending thread.
///
/// Implementations must not call back into [`TaskSignals`].
pub(crate) trait SignalSink: Send + Sync + Debug {
    fn apply(&self, signal: TaskSignal);
}

#[derive(Debug, Default)]
struct Sinks {
    next_id: u64,
    entries: HashMap<u64, Arc<dyn SignalSink>>,
}

/// Cloneable handle for emitting task start and end signals.
#[derive(Debug, Clone, Default)]
pub struct TaskSignals {
    bus: EventBus<TaskSignal>,
    sinks: Arc<Mutex<Sinks>>,
}

impl TaskSignals {
    /// Creates a handle backed by a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle backed by a bus with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bus: EventBus::with_capacity(capacity),
            sinks: Arc::default(),
        }
    }

    /// Reports that a task started.
    pub fn started(&self) {
        self.dispatch(TaskSignal::Started);
    }

    /// Reports that a task ended.
    pub fn ended(&self) {
        self.dispatch(TaskSignal::Ended);
    }

    fn dispatch(&self, signal: TaskSignal) {
        // Sinks are applied outside the registry lock: a sink may take its
        // own lock, and attach/detach run while that lock is held.
        let sinks: Vec<Arc<dyn SignalSink>> = self
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();
        for sink in sinks {
            sink.apply(signal);
        }
        self.bus.publish(signal);
    }

    /// Attaches a sink and returns its id for [`TaskSignals::detach_sink`].
    pub(crate) fn attach_sink(&self, sink: Arc<dyn SignalSink>) -> u64 {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        let id = sinks.next_id;
        sinks.next_id += 1;
        sinks.entries.insert(id, sink);
        trace!(id, sinks = sinks.entries.len(), "Signal sink attached");
        id
    }

    pub(crate) fn detach_sink(&self, id: u64) {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.entries.remove(&id);
        trace!(id, sinks = sinks.entries.len(), "Signal sink detached");
    }

    /// Returns the number of attached sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Reports a start now and returns a guard that reports the end on drop.
    #[must_use = "dropping the guard immediately ends the task"]
    pub fn track(&self) -> TaskGuard {
        self.started();
        TaskGuard {
            signals: Some(self.clone()),
        }
    }

    /// Runs `future` as a tracked task.
    ///
    /// The end signal is sent when the future completes or when the returned
    /// future is dropped before completion.
    pub async fn track_future<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        let _guard = self.track();
        future.await
    }

    /// Returns the raw signal bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus<TaskSignal> {
        &self.bus
    }
}

/// Reports a task end when dropped.
#[derive(Debug)]
pub struct TaskGuard {
    signals: Option<TaskSignals>,
}

impl TaskGuard {
    /// Ends the task now instead of at drop.
    pub fn finish(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if let Some(signals) = self.signals.take() {
            trace!("Task guard released");
            signals.ended();
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn started_and_ended_publish_signals() {
        let signals = TaskSignals::new();
        let mut rx = signals.bus().subscribe();

        signals.started();
        signals.ended();

        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Started);
        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Ended);
    }

    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<TaskSignal>>);

    impl SignalSink for Recorder {
        fn apply(&self, signal: TaskSignal) {
            self.0.lock().unwrap().push(signal);
        }
    }

    #[test]
    fn sinks_see_every_signal_beyond_bus_capacity() {
        let signals = TaskSignals::with_capacity(4);
        let recorder = Arc::new(Recorder::default());
        let id = signals.attach_sink(recorder.clone());
        assert_eq!(signals.sink_count(), 1);

        for _ in 0..100 {
            signals.started();
        }
        signals.ended();
        assert_eq!(recorder.0.lock().unwrap().len(), 101);

        signals.detach_sink(id);
        signals.started();
        assert_eq!(recorder.0.lock().unwrap().len(), 101);
        assert_eq!(signals.sink_count(), 0);
    }

    #[test]
    fn signals_without_observers_are_harmless() {
        let signals = TaskSignals::new();
        signals.started();
        signals.ended();
        signals.ended();
    }

    #[test]
    fn guard_ends_on_drop() {
        let signals = TaskSignals::new();
        let mut rx = signals.bus().subscribe();

        {
            let _guard = signals.track();
            assert_eq!(rx.try_recv().unwrap(), TaskSignal::Started);
            assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        }

        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Ended);
    }

    #[test]
    fn guard_finish_ends_exactly_once() {
        let signals = TaskSignals::new();
        let mut rx = signals.bus().subscribe();

        let guard = signals.track();
        guard.finish();

        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Started);
        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Ended);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn track_future_brackets_the_future() {
        let signals = TaskSignals::new();
        let mut rx = signals.bus().subscribe();

        let value = signals.track_future(async { 5 }).await;

        assert_eq!(value, 5);
        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Started);
        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Ended);
    }

    #[tokio::test]
    async fn dropped_tracked_future_still_ends() {
        let signals = TaskSignals::new();
        let mut rx = signals.bus().subscribe();

        let pending = signals.track_future(std::future::pending::<()>());
        let result = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;

        assert!(result.is_err());
        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Started);
        assert_eq!(rx.try_recv().unwrap(), TaskSignal::Ended);
    }
}
