use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{Callback, Domain, Listeners, ReadCell, StateCell, Subscription};
use crate::error::DisposeError;
use crate::lifecycle::{Disposable, LifecycleScope};

/// Key to ordered error messages. An empty list is never stored.
///
/// # Notifications
///
/// - Per key: every `set_errors` call notifies listeners of
///   [`subscribe_errors_changed`](Self::subscribe_errors_changed) with the key.
/// - Aggregate: the [`has_errors`](Self::has_errors) cell emits only when it
///   flips.
///
/// Both are delivered in the notify phase of the enclosing causal update, so
/// a property that commits a value and its errors together is observed once.
#[derive(Clone)]
pub struct ErrorsContainer {
    inner: Arc<ErrorsInner>,
}

struct ErrorsInner {
    domain: Domain,
    errors: Mutex<BTreeMap<String, Vec<String>>>,
    has_errors: StateCell<bool>,
    changed: Listeners<String>,
}

impl ErrorsContainer {
    pub fn new(scope: &LifecycleScope) -> Self {
        let container = Self {
            inner: Arc::new(ErrorsInner {
                domain: scope.domain().clone(),
                errors: Mutex::new(BTreeMap::new()),
                has_errors: StateCell::new(scope.domain(), false),
                changed: Listeners::new(),
            }),
        };
        scope.own(container.clone());
        container
    }

    /// Replace the errors of `key`. An empty list removes the entry.
    pub fn set_errors<I, S>(&self, key: impl Into<String>, errors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let errors: Vec<String> = errors.into_iter().map(Into::into).collect();
        self.inner.domain.batch(|| {
            let has_errors = {
                let mut map = self.inner.errors.lock();
                if errors.is_empty() {
                    map.remove(&key);
                } else {
                    map.insert(key.clone(), errors);
                }
                !map.is_empty()
            };
            self.inner.has_errors.set(has_errors);
            self.emit_changed(vec![key]);
        });
    }

    /// Clear one key, or every key as a single update when `key` is `None`.
    pub fn clear_errors(&self, key: Option<&str>) {
        if let Some(key) = key {
            self.set_errors(key, Vec::<String>::new());
            return;
        }
        self.inner.domain.batch(|| {
            let cleared: Vec<String> = {
                let mut map = self.inner.errors.lock();
                std::mem::take(&mut *map).into_keys().collect()
            };
            self.inner.has_errors.set(false);
            self.emit_changed(cleared);
        });
    }

    fn emit_changed(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.domain.defer(move || {
            for key in &keys {
                inner.changed.emit(key);
            }
        });
    }

    /// Errors recorded for `key`, in insertion order.
    pub fn errors(&self, key: &str) -> Vec<String> {
        self.inner
            .errors
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys with at least one error, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.errors.lock().keys().cloned().collect()
    }

    pub fn has_errors_for(&self, key: &str) -> bool {
        self.inner.errors.lock().contains_key(key)
    }

    pub fn has_errors(&self) -> ReadCell<bool> {
        self.inner.has_errors.read_only()
    }

    /// Listen for per-key changes. The listener receives the key.
    pub fn subscribe_errors_changed(
        &self,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Callback<String> = Arc::new(move |key: &String| listener(key));
        self.inner.changed.add(callback)
    }
}

impl Disposable for ErrorsContainer {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.changed.clear();
        self.inner.has_errors.clear_listeners();
        Ok(())
    }

    fn name(&self) -> String {
        "errors container".to_string()
    }
}

impl std::fmt::Debug for ErrorsContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorsContainer")
            .field("errors", &*self.inner.errors.lock())
            .finish()
    }
}
