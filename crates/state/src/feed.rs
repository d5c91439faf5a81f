use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

struct Inner<T> {
    next_id: u64,
    snapshot: Arc<Vec<T>>,
    subscribers: BTreeMap<u64, Callback<T>>,
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    // A panicking callback never runs under the lock, so the data is still consistent.
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live collection that pushes each new snapshot to its subscribers.
///
/// Callbacks run outside the lock, in subscription order. A new subscriber is
/// called once with the current snapshot before `subscribe` returns.
pub struct Feed<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Feed {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Feed<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Send + Sync + 'static> Feed<T> {
    pub fn new(initial: Vec<T>) -> Self {
        Feed {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                snapshot: Arc::new(initial),
                subscribers: BTreeMap::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<T>
    where
        F: Fn(&[T]) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let (id, snapshot) = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(id, Arc::clone(&callback));
            (id, Arc::clone(&inner.snapshot))
        };
        callback(&snapshot);
        Subscription {
            id,
            feed: Arc::downgrade(&self.inner),
        }
    }

    /// Replaces the snapshot and notifies every subscriber.
    pub fn publish(&self, items: Vec<T>) {
        let snapshot = Arc::new(items);
        let callbacks: Vec<Callback<T>> = {
            let mut inner = lock(&self.inner);
            inner.snapshot = Arc::clone(&snapshot);
            inner.subscribers.values().cloned().collect()
        };
        tracing::trace!(items = snapshot.len(), subscribers = callbacks.len(), "feed publish");
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&lock(&self.inner).snapshot)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Handle returned by [`Feed::subscribe`]. Dropping it detaches the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription<T> {
    id: u64,
    feed: Weak<Mutex<Inner<T>>>,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.feed.upgrade() {
            lock(&inner).subscribers.remove(&self.id);
        }
    }
}
