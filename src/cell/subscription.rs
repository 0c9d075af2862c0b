//! Listener registries and the RAII [`Subscription`] guard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Anything a [`Subscription`] can detach itself from.
pub(crate) trait ListenerSet: Send + Sync {
    fn remove_listener(&self, id: u64);
}

pub(crate) type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Ordered list of callbacks receiving `&A`.
///
/// Callbacks are invoked in registration order on a snapshot of the list, so
/// a callback may subscribe or unsubscribe without deadlocking.
pub(crate) struct Listeners<A> {
    inner: Arc<ListenersInner<A>>,
}

struct ListenersInner<A> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<A>)>>,
}

impl<A: 'static> Listeners<A> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ListenersInner {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn add(&self, callback: Callback<A>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.lock().push((id, callback));
        let set: Arc<dyn ListenerSet> = self.inner.clone();
        Subscription {
            owner: Some(Arc::downgrade(&set)),
            id,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Callback<A>> {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    pub(crate) fn emit(&self, value: &A) {
        for callback in self.snapshot() {
            callback(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.inner.entries.lock().clear();
    }
}

impl<A: 'static> ListenerSet for ListenersInner<A> {
    fn remove_listener(&self, id: u64) {
        self.entries.lock().retain(|(entry, _)| *entry != id);
    }
}

/// RAII guard for a registered listener.
///
/// Dropping the guard removes the listener before the next notification
/// cycle. A subscription outliving its source is inert.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    owner: Option<Weak<dyn ListenerSet>>,
    id: u64,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    /// Whether the source still exists and the listener is still attached.
    pub fn is_active(&self) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|owner| owner.strong_count() > 0)
    }

    pub(crate) fn detach(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.remove_listener(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
