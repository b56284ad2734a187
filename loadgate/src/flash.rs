//! Flicker suppression for the busy indicator.
//!
//! [`FlashController`] turns visibility edges into show and hide decisions
//! with two guarantees:
//!
//! 1. Work that finishes within the flash threshold never shows anything.
//! 2. Once shown, the indicator stays up for at least the flash threshold,
//!    and never hides while work is still active.
//!
//! # States
//!
//! ```text
//!            Activated                 threshold elapsed
//!   Idle ───────────────▶ PendingShow ───────────────────▶ Showing ── emits Show
//!    ▲                        │                               │
//!    │      Deactivated       │                               │ min-visible elapsed
//!    ├────────────────────────┘                               │ and Deactivated seen
//!    └────────────────────────────────────────────────────────┘ emits Hide
//! ```
//!
//! Each timer is created by the transition that needs it and stored in the
//! state it governs, so leaving a state drops its timer with it. There is no
//! long-lived timer shared across activations.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, trace};

use crate::types::VisibilityEdge;

/// Default flash threshold in milliseconds.
pub const DEFAULT_FLASH_THRESHOLD_MS: u64 = 2000;

/// Decision emitted by the flash controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashSignal {
    Show,
    Hide,
}

/// Controller state. Timers live inside the variant they belong to.
#[derive(Debug)]
enum Phase {
    Idle,
    PendingShow {
        show_at: Pin<Box<Sleep>>,
    },
    Showing {
        /// Minimum-visible countdown, `None` once it has elapsed.
        min_visible: Option<Pin<Box<Sleep>>>,
        /// Whether the count is currently at 0.
        work_done: bool,
    },
}

/// What woke the controller.
enum Wake {
    Edge(Option<VisibilityEdge>),
    Timer,
}

/// Debounces visibility edges into [`FlashSignal`]s.
///
/// Driven by awaiting [`FlashController::next_signal`] in a loop.
#[derive(Debug)]
pub struct FlashController<S> {
    edges: S,
    threshold: Duration,
    phase: Phase,
    edges_done: bool,
}

impl<S> FlashController<S>
where
    S: Stream<Item = VisibilityEdge> + Unpin,
{
    /// Creates a controller over `edges` using `threshold` both as the
    /// minimum active time before showing and the minimum visible time.
    #[must_use]
    pub fn new(edges: S, threshold: Duration) -> Self {
        Self {
            edges,
            threshold,
            phase: Phase::Idle,
            edges_done: false,
        }
    }

    /// Creates a controller with [`DEFAULT_FLASH_THRESHOLD_MS`].
    #[must_use]
    pub fn with_default_threshold(edges: S) -> Self {
        Self::new(edges, Duration::from_millis(DEFAULT_FLASH_THRESHOLD_MS))
    }

    /// Returns the configured threshold.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Returns whether the indicator is currently shown.
    #[must_use]
    pub fn is_showing(&self) -> bool {
        matches!(self.phase, Phase::Showing { .. })
    }

    /// Returns whether a show is pending on the threshold timer.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::PendingShow { .. })
    }

    /// Waits for the next show or hide decision.
    ///
    /// Returns `None` once the edge stream has ended and nothing is shown.
    /// If the edge stream ends while the indicator is shown, a final
    /// [`FlashSignal::Hide`] is returned first.
    ///
    /// # Cancel safety
    ///
    /// Cancel safe. State only changes after an edge or timer has been
    /// observed, and timers persist across calls.
    pub async fn next_signal(&mut self) -> Option<FlashSignal> {
        loop {
            if self.edges_done {
                return self.finish();
            }

            let wake = {
                let Self { edges, phase, .. } = self;
                tokio::select! {
                    edge = edges.next() => Wake::Edge(edge),
                    () = phase_timer(phase) => Wake::Timer,
                }
            };

            let signal = match wake {
                Wake::Edge(Some(edge)) => self.on_edge(edge),
                Wake::Edge(None) => {
                    debug!("Edge stream ended");
                    self.edges_done = true;
                    None
                }
                Wake::Timer => self.on_timer(),
            };

            if signal.is_some() {
                return signal;
            }
        }
    }

    fn on_edge(&mut self, edge: VisibilityEdge) -> Option<FlashSignal> {
        trace!(?edge, "Flash controller received edge");
        match (&mut self.phase, edge) {
            (Phase::Idle, VisibilityEdge::Activated) => {
                self.phase = Phase::PendingShow {
                    show_at: Box::pin(sleep(self.threshold)),
                };
                debug!(threshold_ms = self.threshold.as_millis(), "Show pending");
                None
            }
            (Phase::PendingShow { .. }, VisibilityEdge::Deactivated) => {
                self.phase = Phase::Idle;
                debug!("Work finished before threshold, show cancelled");
                None
            }
            (Phase::Showing { min_visible, .. }, VisibilityEdge::Deactivated)
                if min_visible.is_none() =>
            {
                self.phase = Phase::Idle;
                info!("Hiding indicator");
                Some(FlashSignal::Hide)
            }
            (Phase::Showing { work_done, .. }, edge) => {
                *work_done = edge == VisibilityEdge::Deactivated;
                None
            }
            (phase, edge) => {
                trace!(?phase, ?edge, "Edge ignored");
                None
            }
        }
    }

    fn on_timer(&mut self) -> Option<FlashSignal> {
        match &mut self.phase {
            Phase::PendingShow { .. } => {
                self.phase = Phase::Showing {
                    min_visible: Some(Box::pin(sleep(self.threshold))),
                    work_done: false,
                };
                info!("Showing indicator");
                Some(FlashSignal::Show)
            }
            Phase::Showing {
                work_done: true, ..
            } => {
                self.phase = Phase::Idle;
                info!("Hiding indicator");
                Some(FlashSignal::Hide)
            }
            Phase::Showing { min_visible, .. } => {
                *min_visible = None;
                trace!("Minimum visible time elapsed, waiting for work to finish");
                None
            }
            Phase::Idle => None,
        }
    }

    fn finish(&mut self) -> Option<FlashSignal> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Showing { .. } => {
                info!("Hiding indicator, edge stream closed");
                Some(FlashSignal::Hide)
            }
            _ => None,
        }
    }
}

/// Resolves when the current phase's timer fires; never resolves when the
/// phase has no timer.
async fn phase_timer(phase: &mut Phase) {
    match phase {
        Phase::PendingShow { show_at } => show_at.as_mut().await,
        Phase::Showing {
            min_visible: Some(timer),
            ..
        } => timer.as_mut().await,
        _ => future::pending().await,
    }
}
