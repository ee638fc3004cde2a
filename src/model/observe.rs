//! Change notification: observer lists and subscription guards
//!
//! Each model and aggregator owns one [`Observers`] list. Listeners are
//! invoked synchronously, after the owner has released its own locks, so a
//! listener may freely read back from the component that notified it.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::entity::EntityId;

/// One batch of changes: entities updated (or created) and ids removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<T> {
    pub updated: HashMap<EntityId, T>,
    pub removed: Vec<EntityId>,
}

impl<T> ChangeSet<T> {
    pub fn new(updated: HashMap<EntityId, T>, removed: Vec<EntityId>) -> Self {
        Self { updated, removed }
    }

    pub fn empty() -> Self {
        Self {
            updated: HashMap::new(),
            removed: Vec::new(),
        }
    }

    /// True if nothing was updated or removed
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Callback receiving change batches
pub type Listener<T> = Arc<dyn Fn(&ChangeSet<T>) + Send + Sync>;

/// Keeps a listener registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Explicitly unsubscribe.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct ObserverList<T> {
    next_id: AtomicU64,
    listeners: DashMap<u64, Listener<T>>,
}

/// The set of listeners registered with one component.
pub struct Observers<T> {
    inner: Arc<ObserverList<T>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserverList {
                next_id: AtomicU64::new(0),
                listeners: DashMap::new(),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.insert(id, listener);
        let list: Weak<ObserverList<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.listeners.remove(&id);
            }
        })
    }

    /// Deliver `changes` to every listener. Empty batches are not delivered.
    pub fn notify(&self, changes: &ChangeSet<T>) {
        if changes.is_empty() {
            return;
        }
        // Snapshot first: a listener may subscribe or unsubscribe re-entrantly.
        let mut listeners: Vec<(u64, Listener<T>)> = self
            .inner
            .listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);
        for (_, listener) in listeners {
            listener(changes);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.listeners.is_empty()
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Listener<u32>, Arc<Mutex<Vec<usize>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Listener<u32> = Arc::new(move |changes: &ChangeSet<u32>| {
            sink.lock().unwrap().push(changes.updated.len());
        });
        (listener, seen)
    }

    #[test]
    fn listeners_receive_non_empty_batches() {
        let observers = Observers::new();
        let (listener, seen) = recording();
        let _sub = observers.subscribe(listener);

        observers.notify(&ChangeSet::new(HashMap::from([("a".to_string(), 1)]), vec![]));
        observers.notify(&ChangeSet::empty());

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let observers = Observers::new();
        let (listener, seen) = recording();
        let sub = observers.subscribe(listener);
        assert_eq!(observers.len(), 1);

        drop(sub);
        assert!(observers.is_empty());

        observers.notify(&ChangeSet::new(HashMap::from([("a".to_string(), 1)]), vec![]));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn subscription_outliving_observers_is_harmless() {
        let observers: Observers<u32> = Observers::new();
        let (listener, _) = recording();
        let sub = observers.subscribe(listener);
        drop(observers);
        sub.unsubscribe();
    }
}
