//! Flush subscribers.
//!
//! A subscriber is told every time an observer finishes a successful flush,
//! so a render layer can push the new value wherever it is displayed. The
//! runtime does not know or care where that is.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::runtime::Runtime;
use crate::graph::CellKey;

/// Unique identifier for a flush subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type NotifyFn<V> = Box<dyn FnMut(CellKey, &V) + Send>;

/// A flush subscriber.
struct Subscriber<V> {
    id: SubscriberId,
    notify: NotifyFn<V>,
}

/// Subscribers in subscription order.
pub(crate) struct Subscribers<V> {
    entries: Vec<Subscriber<V>>,
}

impl<V> Default for Subscribers<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> Subscribers<V> {
    fn add(&mut self, notify: NotifyFn<V>) -> SubscriberId {
        let id = SubscriberId::next();
        self.entries.push(Subscriber { id, notify });
        id
    }

    fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        self.entries.len() != before
    }

    /// Tell every subscriber that `key` flushed with `value`.
    pub(crate) fn notify(&mut self, key: CellKey, value: &V) {
        for subscriber in &mut self.entries {
            (subscriber.notify)(key, value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V> fmt::Debug for Subscribers<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|s| s.id))
            .finish()
    }
}

impl<V> Runtime<V>
where
    V: Clone + 'static,
{
    /// Register a callback for successful observer flushes.
    ///
    /// ```rust
    /// use std::sync::{Arc, Mutex};
    /// use reflow_core::Runtime;
    ///
    /// let mut rt = Runtime::new();
    /// let rows = rt.create_source(3_usize);
    /// let table = rt.create_observer(move |cx| Ok(cx.read(rows)? * 2));
    ///
    /// let rendered = Arc::new(Mutex::new(Vec::new()));
    /// let sink = rendered.clone();
    /// rt.subscribe(move |key, value| sink.lock().unwrap().push((key, *value)));
    ///
    /// rt.flush();
    /// rt.write(rows, 5).unwrap();
    /// assert_eq!(*rendered.lock().unwrap(), vec![(table, 6), (table, 10)]);
    /// ```
    pub fn subscribe<F>(&mut self, notify: F) -> SubscriberId
    where
        F: FnMut(CellKey, &V) + Send + 'static,
    {
        self.subscribers.add(Box::new(notify))
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
