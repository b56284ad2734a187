//! Busy indicator coordination.
//!
//! [`Indicator`] wires the pipeline together in a background task:
//!
//! ```text
//! task signals ─▶ ActivityCounter ─▶ gate edges ─▶ FlashController ─▶ Show / Hide
//!                       │                                  │
//!                       └──────────▶ ProgressScope ◀───────┘ (opened on Show, dropped on Hide)
//!                                         │
//!                                         └─▶ Progress
//! ```
//!
//! Output is delivered as [`IndicatorEvent`]s on an mpsc channel supplied by
//! the caller. Each display cycle is exactly one `Show`, zero or more
//! `Progress`, then one `Hide`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use loadgate::counter::ActivityCounter;
//! use loadgate::indicator::Indicator;
//! use loadgate::signals::TaskSignals;
//! use loadgate::types::IndicatorEvent;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let signals = TaskSignals::new();
//!     let counter = ActivityCounter::new(signals.clone());
//!     let (tx, mut rx) = mpsc::channel(64);
//!     let _indicator = Indicator::new(&counter, Duration::from_millis(2000), tx);
//!
//!     let _guard = signals.track();
//!     if let Some(IndicatorEvent::Show(stats)) = rx.recv().await {
//!         println!("busy: {}/{}", stats.completed, stats.total);
//!     }
//! }
//! ```

use std::future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::counter::ActivityCounter;
use crate::flash::{FlashController, FlashSignal};
use crate::gate::{self, EdgeStream};
use crate::progress::ProgressScope;
use crate::types::{IndicatorEvent, LoadStats};

/// Handle to a running indicator pipeline.
///
/// The pipeline stops when the handle is dropped or when the output
/// receiver is closed.
#[derive(Debug)]
pub struct Indicator {
    task_handle: JoinHandle<()>,
}

impl Indicator {
    /// Starts the pipeline.
    ///
    /// The counter is subscribed before this returns, so no task signal
    /// published afterwards can be missed.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        counter: &ActivityCounter,
        flash_threshold: Duration,
        output_tx: mpsc::Sender<IndicatorEvent>,
    ) -> Self {
        let flash = FlashController::new(gate::subscribe(counter), flash_threshold);
        let counter = counter.clone();

        let task_handle = tokio::spawn(async move {
            run_indicator_loop(flash, counter, output_tx).await;
        });

        Self { task_handle }
    }

    /// Returns whether the pipeline task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

impl Drop for Indicator {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

/// Runs the indicator until the edge stream ends or the output is closed.
async fn run_indicator_loop(
    mut flash: FlashController<EdgeStream>,
    counter: ActivityCounter,
    output_tx: mpsc::Sender<IndicatorEvent>,
) {
    let mut scope: Option<ProgressScope> = None;

    debug!(
        threshold_ms = flash.threshold().as_millis(),
        "Starting indicator loop"
    );

    loop {
        let event = tokio::select! {
            biased;

            Some(stats) = next_progress(&mut scope) => IndicatorEvent::Progress(stats),

            signal = flash.next_signal() => match signal {
                Some(FlashSignal::Show) => {
                    let opened = ProgressScope::open(&counter);
                    let stats = opened.stats();
                    scope = Some(opened);
                    IndicatorEvent::Show(stats)
                }
                Some(FlashSignal::Hide) => {
                    if let Some(stats) = scope.take().and_then(|mut closing| closing.drain()) {
                        if !emit(&output_tx, IndicatorEvent::Progress(stats)).await {
                            break;
                        }
                    }
                    IndicatorEvent::Hide
                }
                None => break,
            },
        };

        if !emit(&output_tx, event).await {
            break;
        }
    }

    debug!("Indicator loop terminated");
}

/// Waits on the open progress scope, or forever if there is none.
async fn next_progress(scope: &mut Option<ProgressScope>) -> Option<LoadStats> {
    match scope {
        Some(scope) => scope.next().await,
        None => future::pending().await,
    }
}

/// Sends one event. Returns `false` once the receiver is gone.
async fn emit(output_tx: &mpsc::Sender<IndicatorEvent>, event: IndicatorEvent) -> bool {
    trace!(?event, "Emitting indicator event");
    if output_tx.send(event).await.is_err() {
        debug!("Indicator receiver dropped, stopping");
        return false;
    }
    true
}
