//! Process-wide forced-logout broadcast.
//!
//! When the session guard decides a session is unrecoverable it publishes
//! a [`LogoutEvent`] here. Delivery happens on two paths carrying the same
//! payload:
//!
//! - registered handlers, invoked synchronously in subscription order -
//!   for code holding a broadcaster handle (the session facade, a global
//!   navigation listener);
//! - a `tokio::sync::broadcast` channel - for detached tasks with no
//!   call-stack relationship to the guard.
//!
//! Events are not replayed: a subscriber registered after a publication
//! never sees it. Handlers must be idempotent, since several concurrent
//! calls can each reach a terminal failure from the same expired
//! credential and publish independently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the channel-based delivery path. Forced logouts are rare;
/// a lagged receiver only misses duplicate notifications.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LogoutEvent {
    /// Human-readable reason, suitable for a single explanatory message.
    pub reason: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub at: DateTime<Utc>,
}

impl LogoutEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            at: Utc::now(),
        }
    }
}

type Handler = Arc<dyn Fn(&LogoutEvent) + Send + Sync>;

/// Created once at startup, torn down never. Injected into the components
/// that need it rather than living in a global.
pub struct LogoutBroadcaster {
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
    channel: broadcast::Sender<LogoutEvent>,
}

impl Default for LogoutBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl LogoutBroadcaster {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            channel,
        }
    }

    /// Register a handler. The returned [`Subscription`] deregisters it
    /// when dropped, so tie it to the subscriber's lifetime (typically a
    /// component mount).
    pub fn subscribe(
        self: &Arc<Self>,
        handler: impl Fn(&LogoutEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().unwrap().push((id, Arc::new(handler)));
        Subscription {
            id,
            broadcaster: Arc::clone(self),
        }
    }

    /// Receiver for the channel-based delivery path. Only events published
    /// after this call are delivered.
    pub fn listen(&self) -> broadcast::Receiver<LogoutEvent> {
        self.channel.subscribe()
    }

    /// Notify all current subscribers: handlers first, in subscription
    /// order, then the channel path.
    pub fn publish(&self, event: LogoutEvent) {
        debug!(reason = %event.reason, "Publishing forced logout");

        // Snapshot outside the lock so a handler may subscribe or
        // unsubscribe during delivery without deadlocking.
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap();
            handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(&event);
        }

        // Channel path: no receivers is fine.
        let _ = self.channel.send(event);
    }

    fn unsubscribe(&self, id: u64) {
        self.handlers.lock().unwrap().retain(|(hid, _)| *hid != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

/// Deregistration guard returned by [`LogoutBroadcaster::subscribe`].
pub struct Subscription {
    id: u64,
    broadcaster: Arc<LogoutBroadcaster>,
}

impl Subscription {
    /// Explicitly deregister now instead of at drop.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
