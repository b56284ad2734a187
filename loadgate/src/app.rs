//! Composition root.
//!
//! [`Loadgate`] builds the whole system from a [`Config`]: the task-signal
//! handle, the shared activity counter, the indicator pipeline, the key bus,
//! the combo detector and the debug-mode flag it toggles.
//!
//! # Example
//!
//! ```no_run
//! use loadgate::app::Loadgate;
//! use loadgate::config::Config;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> loadgate::Result<()> {
//!     let (app, mut events) = Loadgate::start(&Config::default())?;
//!
//!     let signals = app.signals().clone();
//!     tokio::spawn(async move {
//!         signals
//!             .track_future(tokio::time::sleep(std::time::Duration::from_secs(3)))
//!             .await;
//!     });
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::EventBus;
use crate::combo::{ComboDetector, ComboMatcher, DebugMode};
use crate::config::Config;
use crate::counter::ActivityCounter;
use crate::error::Result;
use crate::indicator::Indicator;
use crate::signals::TaskSignals;
use crate::types::IndicatorEvent;

/// Capacity of the indicator and combo output channels.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// A running loadgate instance.
///
/// Dropping it stops every background task it started.
#[derive(Debug)]
pub struct Loadgate {
    signals: TaskSignals,
    counter: ActivityCounter,
    keys: EventBus<String>,
    debug_mode: DebugMode,
    _indicator: Indicator,
    _combo: ComboDetector,
    debug_task: JoinHandle<()>,
}

impl Loadgate {
    /// Starts every component and returns the instance with its indicator
    /// event receiver.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured combo sequence is empty.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &Config) -> Result<(Self, mpsc::Receiver<IndicatorEvent>)> {
        let matcher = ComboMatcher::new(config.combo_keys.clone(), config.combo_timeout)?;

        let signals = TaskSignals::with_capacity(config.bus_capacity);
        let counter = ActivityCounter::new(signals.clone());
        let keys = EventBus::with_capacity(config.bus_capacity);

        let (indicator_tx, indicator_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let indicator = Indicator::new(&counter, config.flash_threshold, indicator_tx);

        let (combo_tx, combo_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let combo = ComboDetector::new(matcher, &keys, combo_tx);

        let debug_mode = DebugMode::new();
        let debug_task = tokio::spawn(debug_mode.clone().follow(combo_rx));

        info!(
            flash_threshold_ms = config.flash_threshold.as_millis(),
            combo_timeout_ms = config.combo_timeout.as_millis(),
            combo_keys = ?config.combo_keys,
            "loadgate started"
        );

        Ok((
            Self {
                signals,
                counter,
                keys,
                debug_mode,
                _indicator: indicator,
                _combo: combo,
                debug_task,
            },
            indicator_rx,
        ))
    }

    /// Returns the handle for reporting task starts and ends.
    #[must_use]
    pub fn signals(&self) -> &TaskSignals {
        &self.signals
    }

    /// Returns the shared activity counter.
    #[must_use]
    pub fn counter(&self) -> &ActivityCounter {
        &self.counter
    }

    /// Returns the raw key bus the combo detector listens on.
    #[must_use]
    pub fn keys(&self) -> &EventBus<String> {
        &self.keys
    }

    /// Publishes one key press.
    pub fn press(&self, key: impl Into<String>) {
        self.keys.publish(key.into());
    }

    /// Returns the debug-mode flag.
    #[must_use]
    pub fn debug_mode(&self) -> &DebugMode {
        &self.debug_mode
    }
}

impl Drop for Loadgate {
    fn drop(&mut self) {
        self.debug_task.abort();
    }
}
