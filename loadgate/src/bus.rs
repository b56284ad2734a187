//! Multicast event bus.
//!
//! [`EventBus`] is the shared primitive every loadgate source is built on:
//! task signals and raw key presses are both published through one. It wraps
//! a tokio broadcast channel, so each observer gets its own independent
//! receiver and nothing published before an observer subscribed is replayed
//! to it. Anything that needs replay (the activity counter) buffers it
//! explicitly on top of the bus.
//!
//! # Example
//!
//! ```rust
//! use loadgate::bus::EventBus;
//!
//! let bus: EventBus<&'static str> = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! assert_eq!(bus.publish("a"), 1);
//! assert_eq!(rx.try_recv().unwrap(), "a");
//! ```

use std::fmt::Debug;

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

/// Default channel capacity.
///
/// Observers that fall more than this many events behind receive
/// `RecvError::Lagged` on their next receive.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Multi-producer, multi-observer signal source without history.
///
/// `EventBus` is `Clone`; clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus<T> {
    sender: Sender<T>,
}

impl<T> EventBus<T>
where
    T: Clone + Debug,
{
    /// Creates a bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created event bus");
        Self { sender }
    }

    /// Subscribes a new observer.
    ///
    /// The receiver only sees events published after this call returns.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<T> {
        let rx = self.sender.subscribe();
        trace!(
            subscriber_count = self.subscriber_count(),
            "New bus subscriber"
        );
        rx
    }

    /// Publishes an event to every current observer.
    ///
    /// Returns how many observers received it. Publishing with nobody
    /// listening is not an error; the event is simply dropped.
    pub fn publish(&self, event: T) -> usize {
        trace!(event = ?event, "Publishing event");

        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No active subscribers, event dropped");
                0
            }
        }
    }

    /// Returns the number of live observers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T> Default for EventBus<T>
where
    T: Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
