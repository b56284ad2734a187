//! Terminal keyboard feed.
//!
//! [`KeyFeed`] polls crossterm for key presses and publishes each one as a
//! key symbol on an [`EventBus<String>`], which is what the combo detector
//! consumes. Terminal polling is blocking, so it runs on the blocking pool
//! via `spawn_blocking`.
//!
//! Symbols are the key's own text for printable keys (`"a"`, `"+"`), the
//! crossterm key name for the rest (`"Enter"`, `"Esc"`, `"Up"`), and a `C-`
//! prefix when Control is held (`"C-c"`).

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace};

use crate::bus::EventBus;
use crate::error::{LoadgateError, Result};

/// Default terminal poll timeout in milliseconds.
const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;

/// Publishes terminal key presses onto a key bus.
#[derive(Debug)]
pub struct KeyFeed {
    keys: EventBus<String>,
    shutdown_rx: oneshot::Receiver<()>,
    poll_timeout: Duration,
    poll: fn(Duration) -> io::Result<Option<String>>,
}

impl KeyFeed {
    /// Creates a feed publishing onto `keys` until `shutdown_rx` fires.
    pub fn new(keys: EventBus<String>, shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self {
            keys,
            shutdown_rx,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            poll: poll_key,
        }
    }

    /// Runs until shutdown is signalled or the shutdown sender is dropped.
    ///
    /// A poll already running on the blocking pool when shutdown arrives is
    /// awaited, and any key it read is still published.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgateError::Io`] if reading the terminal fails or the
    /// polling task panics.
    pub async fn run(mut self) -> Result<()> {
        let mut in_flight: Option<JoinHandle<io::Result<Option<String>>>> = None;

        loop {
            let (poll_fn, poll_timeout) = (self.poll, self.poll_timeout);
            let poll = in_flight
                .get_or_insert_with(|| tokio::task::spawn_blocking(move || poll_fn(poll_timeout)));

            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    debug!("Key feed received shutdown signal");
                    if let Some(poll) = in_flight.take() {
                        if let Err(e) = self.publish_polled(poll.await) {
                            debug!(error = %e, "Final terminal poll failed");
                        }
                    }
                    break;
                }

                result = poll => {
                    in_flight = None;
                    self.publish_polled(result)?;
                }
            }
        }

        Ok(())
    }

    fn publish_polled(
        &self,
        result: std::result::Result<io::Result<Option<String>>, JoinError>,
    ) -> Result<()> {
        let polled = result.map_err(|join_error| {
            LoadgateError::Io(io::Error::other(format!(
                "terminal polling task failed: {join_error}"
            )))
        })?;
        if let Some(symbol) = polled? {
            trace!(%symbol, "Key pressed");
            self.keys.publish(symbol);
        }
        Ok(())
    }
}

/// Waits up to `timeout` for a key press.
fn poll_key(timeout: Duration) -> io::Result<Option<String>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }
    match event::read()? {
        CrosstermEvent::Key(key) => Ok(key_symbol(&key)),
        _ => Ok(None),
    }
}

/// Converts a key event to its symbol. Releases and repeats yield `None`.
#[must_use]
pub fn key_symbol(key: &KeyEvent) -> Option<String> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    let base = match key.code {
        KeyCode::Char(c) => c.to_string(),
        KeyCode::F(n) => format!("F{n}"),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        _ => return None,
    };

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        Some(format!("C-{base}"))
    } else {
        Some(base)
    }
}
