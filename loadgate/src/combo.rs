//! Timed key-sequence detection.
//!
//! [`ComboMatcher`] is a two-state machine over raw key symbols:
//!
//! - **Idle**: only the first symbol of the sequence does anything. It moves
//!   the matcher to `Matching` and sets a deadline `timeout` from now.
//! - **Matching**: each key must equal the next expected symbol. A wrong key
//!   or a key at or past the deadline aborts back to `Idle`. The last
//!   correct symbol fires [`ComboTriggered`] and returns to `Idle`.
//!
//! An aborting key is then looked at again as an Idle key, so pressing the
//! first symbol mid-match restarts the sequence with a fresh deadline.
//!
//! [`ComboDetector`] drives a matcher from an [`EventBus`] in a background
//! task and also expires a pending match when its deadline passes with no
//! further keys. [`DebugMode`] is the usual consumer: each trigger flips it.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::types::ComboTriggered;

/// Default combo timeout in milliseconds, measured from the first key.
pub const DEFAULT_COMBO_TIMEOUT_MS: u64 = 3000;

/// Default combo sequence.
pub const DEFAULT_COMBO_KEYS: [&str; 4] = ["a", "s", "d", "f"];

/// Errors building a combo matcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComboError {
    /// The target sequence has no symbols.
    #[error("combo sequence must contain at least one key")]
    EmptySequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComboState {
    Idle,
    Matching {
        /// Index of the next expected symbol.
        next: usize,
        deadline: Instant,
    },
}

/// Recognises one ordered key sequence within a timeout.
#[derive(Debug, Clone)]
pub struct ComboMatcher<K> {
    sequence: Vec<K>,
    timeout: Duration,
    state: ComboState,
}

impl<K> ComboMatcher<K>
where
    K: PartialEq + Debug,
{
    /// Creates a matcher for `sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`ComboError::EmptySequence`] if `sequence` is empty.
    pub fn new(sequence: Vec<K>, timeout: Duration) -> Result<Self, ComboError> {
        if sequence.is_empty() {
            return Err(ComboError::EmptySequence);
        }
        Ok(Self {
            sequence,
            timeout,
            state: ComboState::Idle,
        })
    }

    /// Returns the target sequence.
    #[must_use]
    pub fn sequence(&self) -> &[K] {
        &self.sequence
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns whether a match is in progress.
    #[must_use]
    pub fn is_matching(&self) -> bool {
        matches!(self.state, ComboState::Matching { .. })
    }

    /// Returns the deadline of the match in progress.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ComboState::Matching { deadline, .. } => Some(deadline),
            ComboState::Idle => None,
        }
    }

    /// Feeds one key observed at `now`.
    ///
    /// Returns `Some(ComboTriggered)` when this key completes the sequence.
    pub fn feed(&mut self, key: &K, now: Instant) -> Option<ComboTriggered> {
        self.expire(now);

        if let ComboState::Matching { next, deadline } = self.state {
            if self.sequence[next] == *key {
                if next + 1 == self.sequence.len() {
                    self.state = ComboState::Idle;
                    info!("Key combo matched");
                    return Some(ComboTriggered);
                }
                trace!(?key, matched = next + 1, "Combo key matched");
                self.state = ComboState::Matching {
                    next: next + 1,
                    deadline,
                };
                return None;
            }
            trace!(?key, expected = ?self.sequence[next], "Combo mismatch, aborting");
            self.state = ComboState::Idle;
        }

        if self.sequence[0] == *key {
            if self.sequence.len() == 1 {
                info!("Key combo matched");
                return Some(ComboTriggered);
            }
            trace!(?key, "Combo initiated");
            self.state = ComboState::Matching {
                next: 1,
                deadline: now + self.timeout,
            };
        }
        None
    }

    /// Aborts the match in progress if its deadline is at or before `now`.
    ///
    /// Returns whether a match was aborted.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.state {
            ComboState::Matching { deadline, .. } if now >= deadline => {
                debug!("Combo timed out");
                self.state = ComboState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drops any match in progress.
    pub fn reset(&mut self) {
        self.state = ComboState::Idle;
    }
}

/// Handle to a background combo detection task.
///
/// Stops when dropped, when the key bus closes or when the output receiver
/// is closed.
#[derive(Debug)]
pub struct ComboDetector {
    task_handle: JoinHandle<()>,
}

impl ComboDetector {
    /// Starts detecting `matcher`'s sequence on `keys`.
    ///
    /// The key bus is subscribed before this returns.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new<K>(
        matcher: ComboMatcher<K>,
        keys: &EventBus<K>,
        output_tx: mpsc::Sender<ComboTriggered>,
    ) -> Self
    where
        K: Clone + PartialEq + Debug + Send + 'static,
    {
        let keys_rx = keys.subscribe();
        let task_handle = tokio::spawn(async move {
            run_combo_loop(matcher, keys_rx, output_tx).await;
        });
        Self { task_handle }
    }

    /// Returns whether the detection task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

impl Drop for ComboDetector {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

async fn run_combo_loop<K>(
    mut matcher: ComboMatcher<K>,
    mut keys: broadcast::Receiver<K>,
    output_tx: mpsc::Sender<ComboTriggered>,
) where
    K: Clone + PartialEq + Debug,
{
    debug!(
        sequence = ?matcher.sequence(),
        timeout_ms = matcher.timeout().as_millis(),
        "Starting combo loop"
    );

    loop {
        // The timer is rebuilt from the state's deadline on every pass, so
        // it cannot outlive the match it belongs to.
        let deadline = matcher.deadline();

        tokio::select! {
            key = keys.recv() => match key {
                Ok(key) => {
                    if let Some(triggered) = matcher.feed(&key, Instant::now()) {
                        if output_tx.send(triggered).await.is_err() {
                            debug!("Combo receiver dropped, stopping");
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Combo detector lagged, resetting match");
                    matcher.reset();
                }
                Err(RecvError::Closed) => {
                    debug!("Key bus closed");
                    break;
                }
            },
            () = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                matcher.expire(Instant::now());
            }
        }
    }

    debug!("Combo loop terminated");
}

/// Shared debug-mode flag flipped by combo triggers.
#[derive(Debug, Clone)]
pub struct DebugMode {
    tx: Arc<watch::Sender<bool>>,
}

impl DebugMode {
    /// Creates the flag, initially off.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&self) -> bool {
        self.tx.send_modify(|enabled| *enabled = !*enabled);
        let enabled = *self.tx.borrow();
        info!(enabled, "Debug mode toggled");
        enabled
    }

    /// Returns the current value.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Toggles the flag on every trigger received until `triggers` closes.
    pub async fn follow(self, mut triggers: mpsc::Receiver<ComboTriggered>) {
        while triggers.recv().await.is_some() {
            self.toggle();
        }
    }
}

impl Default for DebugMode {
    fn default() -> Self {
        Self::new()
    }
}
