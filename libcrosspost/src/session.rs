//! Login session sharing
//!
//! Session-based providers (Telegram) must not log in twice in parallel for
//! the same account. The registry hands out one async-locked slot per
//! `(user, platform, identity)`; whoever holds the lock establishes the
//! session, later callers reuse it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::types::SocialPlatform;

/// Shared slot holding an established session, if any
pub type SessionSlot<S> = Arc<tokio::sync::Mutex<Option<S>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: i64,
    pub platform: SocialPlatform,
    /// Credential identity within the platform (e.g. phone number)
    pub identity: String,
}

impl SessionKey {
    pub fn new(user_id: i64, platform: SocialPlatform, identity: impl Into<String>) -> Self {
        Self {
            user_id,
            platform,
            identity: identity.into(),
        }
    }
}

pub struct SessionRegistry<S> {
    slots: Mutex<HashMap<SessionKey, SessionSlot<S>>>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `key`, created empty on first use
    pub fn slot(&self, key: &SessionKey) -> SessionSlot<S> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Forget the slot for `key`; the next caller starts from scratch
    pub fn forget(&self, key: &SessionKey) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
