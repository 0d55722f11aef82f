//! Topic-keyed synchronous publish/subscribe registry.
//!
//! # Invariants
//! - `publish` never fails; handler errors and panics are logged and do not
//!   stop delivery to the remaining handlers of the same topic.
//! - A `SubscriptionHandle` removes exactly its own handler, at most once.
//! - The registry lock is never held while a handler runs, so handlers may
//!   subscribe, unsubscribe or publish re-entrantly.

use crate::logging::describe_panic;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Outcome reported by a subscriber for one delivery.
pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

type Handler<P> = Arc<dyn Fn(&P) -> HandlerResult + Send + Sync>;

struct Registry<K, P> {
    topics: Mutex<HashMap<K, Vec<(u64, Handler<P>)>>>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash, P> Registry<K, P> {
    fn remove(&self, topic: &K, id: u64) {
        let mut topics = self.topics.lock();
        if let Some(handlers) = topics.get_mut(topic) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
            if handlers.is_empty() {
                topics.remove(topic);
            }
        }
    }
}

/// In-process notification channel.
///
/// Cloning yields another reference to the same registry.
pub struct NotificationChannel<K, P> {
    registry: Arc<Registry<K, P>>,
}

impl<K, P> Clone for NotificationChannel<K, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K, P> Default for NotificationChannel<K, P>
where
    K: Eq + Hash + Copy + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> NotificationChannel<K, P>
where
    K: Eq + Hash + Copy + Debug,
{
    /// Creates an empty channel. Clones share the same subscriptions.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                topics: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers `handler` for `topic`.
    ///
    /// The returned handle is the only way to remove this handler.
    #[must_use = "dropping the handle leaves the handler subscribed with no way to remove it"]
    pub fn subscribe<F>(&self, topic: K, handler: F) -> SubscriptionHandle<K, P>
    where
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .topics
            .lock()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!("event=bus_subscribe module=bus status=ok topic={topic:?} subscription_id={id}");

        SubscriptionHandle {
            topic,
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Delivers `payload` to every handler currently registered for `topic`.
    ///
    /// Returns the number of handlers that completed without error.
    pub fn publish(&self, topic: K, payload: &P) -> usize {
        let handlers: Vec<Handler<P>> = match self.registry.topics.lock().get(&topic) {
            Some(entries) => entries.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => warn!(
                    "event=bus_deliver module=bus status=error topic={topic:?} error={err}"
                ),
                Err(panic_payload) => error!(
                    "event=bus_deliver module=bus status=panic topic={:?} payload={}",
                    topic,
                    describe_panic(panic_payload.as_ref())
                ),
            }
        }

        debug!("event=bus_publish module=bus status=ok topic={topic:?} delivered={delivered}");
        delivered
    }

    /// Number of handlers currently registered for `topic`.
    pub fn subscriber_count(&self, topic: K) -> usize {
        self.registry
            .topics
            .lock()
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Drops every subscription on every topic.
    pub fn clear(&self) {
        self.registry.topics.lock().clear();
        debug!("event=bus_clear module=bus status=ok");
    }
}

/// Capability to remove one handler from its channel.
pub struct SubscriptionHandle<K, P> {
    topic: K,
    id: u64,
    registry: Weak<Registry<K, P>>,
    active: AtomicBool,
}

impl<K, P> SubscriptionHandle<K, P>
where
    K: Eq + Hash + Copy + Debug,
{
    /// Removes the handler. Later calls are no-ops, as is calling this after
    /// the channel was cleared or dropped.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.topic, self.id);
            debug!(
                "event=bus_unsubscribe module=bus status=ok topic={:?} subscription_id={}",
                self.topic, self.id
            );
        }
    }

    pub fn topic(&self) -> K {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
