//! Observer registry with explicit subscription handles

use crate::core::sync::recover_mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by [`ObserverRegistry::subscribe`]; pass it back to
/// [`ObserverRegistry::unsubscribe`] to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Synchronous fan-out to a list of observers.
///
/// Notification happens on the caller's task; observers are expected to be
/// cheap (latch a signal, bump a counter) and must not block. The observer
/// list is snapshotted before invocation so an observer may unsubscribe
/// itself or others without deadlocking.
pub struct ObserverRegistry<T> {
    observers: Mutex<Vec<(SubscriptionId, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        recover_mutex(self.observers.lock()).push((id, Arc::new(observer)));
        id
    }

    /// Remove a subscription. Unknown ids are ignored so release actions
    /// stay idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        recover_mutex(self.observers.lock()).retain(|(other, _)| *other != id);
    }

    pub fn observer_count(&self) -> usize {
        recover_mutex(self.observers.lock()).len()
    }

    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Observer<T>> = recover_mutex(self.observers.lock())
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer(value);
        }
    }
}

impl<T> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
