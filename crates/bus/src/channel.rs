//! In-process publish/subscribe channel.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::HandlerPanic;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Entry<T> {
    id: u64,
    filter: Option<Filter<T>>,
    callback: Callback<T>,
}

struct Subscribers<T> {
    next_id: AtomicU64,
    entries: RwLock<Vec<Arc<Entry<T>>>>,
}

/// Something a [`Subscription`] can be released from.
trait Release: Send + Sync {
    fn release(&self, id: u64) -> bool;

    fn contains(&self, id: u64) -> bool;
}

impl<T: 'static> Release for Subscribers<T> {
    fn release(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.read().iter().any(|entry| entry.id == id)
    }
}

/// A broadcast list of `(filter, callback)` subscriptions.
///
/// `publish` invokes every matching callback synchronously, in subscription
/// order. The subscriber list is snapshotted first, so callbacks may
/// subscribe or unsubscribe without deadlocking. A panicking callback is
/// contained and logged; later callbacks still run.
pub struct Channel<T> {
    subscribers: Arc<Subscribers<T>>,
}

impl<T: 'static> Channel<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Subscribers {
                next_id: AtomicU64::new(1),
                entries: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Subscribes `callback` to every published item.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(callback))
    }

    /// Subscribes `callback` to the items accepted by `filter`.
    pub fn subscribe_filtered<P, F>(&self, filter: P, callback: F) -> Subscription
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(Some(Arc::new(filter)), Arc::new(callback))
    }

    fn add(&self, filter: Option<Filter<T>>, callback: Callback<T>) -> Subscription {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.entries.write().push(Arc::new(Entry {
            id,
            filter,
            callback,
        }));
        let owner: Weak<dyn Release> = Arc::downgrade(&self.subscribers) as Weak<dyn Release>;
        Subscription { id, owner }
    }

    /// Delivers `item` to every matching subscriber. Returns how many
    /// callbacks were invoked.
    pub fn publish(&self, item: &T) -> usize {
        let snapshot: Vec<Arc<Entry<T>>> = self.subscribers.entries.read().clone();
        let mut delivered = 0;
        for entry in snapshot {
            if let Some(filter) = &entry.filter
                && !filter(item)
            {
                continue;
            }
            delivered += 1;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (entry.callback)(item))) {
                let panic = HandlerPanic::new(format!("subscription #{}", entry.id), payload);
                tracing::error!(subscription = entry.id, error = %panic, "subscriber panicked");
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.entries.read().len()
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.subscribers.entries.read().len())
            .finish()
    }
}

/// One active binding between a channel and a callback.
///
/// Releasing consumes the handle, so a subscription can be released at most
/// once. Dropping the handle without releasing leaves the callback attached.
#[must_use = "a subscription stays attached until `unsubscribe` is called"]
pub struct Subscription {
    id: u64,
    owner: Weak<dyn Release>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true while the callback is still attached.
    pub fn is_active(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|owner| owner.contains(self.id))
    }

    /// Detaches the callback. Returns false if the channel is already gone.
    pub fn unsubscribe(self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|owner| owner.release(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
