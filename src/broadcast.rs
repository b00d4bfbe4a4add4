//! In-process publish/subscribe.
//!
//! Listeners are plain callbacks invoked on the publisher's thread, in subscription
//! order. A listener may subscribe or unsubscribe from within its callback; changes take
//! effect on the next publish.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Handle returned by [Broadcast::subscribe], used to unsubscribe.
pub type SubscriptionId = u64;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Broadcast<T> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
}

/// The page context's message channel. Carries arbitrary JSON, not only this crate's messages.
pub type PageChannel = Broadcast<Value>;

impl<T> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Delivers a value to every listener. Returns the number of listeners notified.
    pub fn publish(&self, value: &T) -> usize {
        let listeners: Vec<Listener<T>> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
        };

        for listener in &listeners {
            listener(value);
        }

        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<T> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcast").field("listeners", &self.listener_count()).finish()
    }
}
