//! Progress events for posting operations
//!
//! An in-process broadcast bus. Emitting never blocks: with no subscribers
//! events are dropped, and lagging subscribers lose the oldest events.
//!
//! ```no_run
//! use libcrosspost::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PostingStarted {
//!     user_id: 7,
//!     platforms: vec!["telegram".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventBus {
    /// Bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Dispatch is about to begin, in the listed platform order
    PostingStarted { user_id: i64, platforms: Vec<String> },

    ProviderSucceeded {
        user_id: i64,
        platform: String,
        channel_id: String,
        remote_id: String,
    },

    ProviderFailed {
        user_id: i64,
        platform: String,
        error: String,
    },

    /// Every provider succeeded and the post was recorded
    PostingCompleted { user_id: i64, post_id: i64 },

    /// Posting stopped before completion
    PostingFailed { user_id: i64, error: String },
}
