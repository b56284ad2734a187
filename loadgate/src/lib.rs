//! loadgate - flicker-free busy indicator coordination.
//!
//! This crate turns raw "task started" / "task ended" signals from any number
//! of concurrent call sites into show, progress and hide decisions for a busy
//! indicator, and separately recognises a timed key combo that toggles a
//! debug mode. Rendering the indicator is left to the caller.
//!
//! # Pipeline
//!
//! ```text
//! TaskSignals ─▶ ActivityCounter ─▶ gate ─▶ FlashController ─▶ Show / Hide
//!                      └──────────▶ ProgressScope ─────────────▶ Progress
//!
//! key bus ─▶ ComboDetector ─▶ ComboTriggered ─▶ DebugMode
//! ```
//!
//! # Modules
//!
//! - [`bus`]: Multicast event bus without replay
//! - [`signals`]: Task start/end handle and RAII task guard
//! - [`counter`]: Shared, replay-one, reference-counted active task count
//! - [`gate`]: Activated/deactivated edges from consecutive counts
//! - [`flash`]: Minimum-active and minimum-visible timing
//! - [`progress`]: Per-display `(total, completed)` tracking
//! - [`indicator`]: Background task combining the above
//! - [`combo`]: Timed key-sequence matcher, detector and debug-mode flag
//! - [`keys`]: Terminal keyboard feed
//! - [`app`]: Composition root
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types
//! - [`types`]: Shared signal types

pub mod app;
pub mod bus;
pub mod combo;
pub mod config;
pub mod counter;
pub mod error;
pub mod flash;
pub mod gate;
pub mod indicator;
pub mod keys;
pub mod progress;
pub mod signals;
pub mod types;

pub use app::Loadgate;
pub use bus::{EventBus, DEFAULT_CHANNEL_CAPACITY};
pub use combo::{ComboDetector, ComboError, ComboMatcher, DebugMode};
pub use config::{Config, ConfigError};
pub use counter::{ActivityCounter, CountSubscription};
pub use error::{LoadgateError, Result};
pub use flash::{FlashController, FlashSignal, DEFAULT_FLASH_THRESHOLD_MS};
pub use indicator::Indicator;
pub use keys::KeyFeed;
pub use progress::{ProgressScope, ProgressTracker};
pub use signals::{TaskGuard, TaskSignals};
pub use types::{ComboTriggered, IndicatorEvent, LoadStats, TaskSignal, VisibilityEdge};
