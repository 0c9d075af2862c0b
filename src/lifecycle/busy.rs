use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{ReadCell, StateCell};
use crate::error::DisposeError;
use crate::lifecycle::{Disposable, LifecycleScope};

/// Stack-based busy accounting.
///
/// Each [`BusyScope::begin`] pushes a reason; the returned guard pops it on
/// [`BusyGuard::end`] or drop. `is_busy` is `true` while any reason remains.
/// The same reason may be active several times at once.
#[derive(Clone)]
pub struct BusyScope {
    inner: Arc<BusyInner>,
}

struct BusyInner {
    next_id: AtomicU64,
    reasons: Mutex<Vec<(u64, String)>>,
    is_busy: StateCell<bool>,
}

impl BusyInner {
    fn end(&self, id: u64) {
        let _writer = self.is_busy.domain().write_lock();
        let busy = {
            let mut reasons = self.reasons.lock();
            reasons.retain(|(entry, _)| *entry != id);
            !reasons.is_empty()
        };
        self.is_busy.set(busy);
    }
}

impl BusyScope {
    pub fn new(scope: &LifecycleScope) -> Self {
        let busy = Self {
            inner: Arc::new(BusyInner {
                next_id: AtomicU64::new(1),
                reasons: Mutex::new(Vec::new()),
                is_busy: StateCell::new(scope.domain(), false),
            }),
        };
        scope.own(busy.clone());
        busy
    }

    /// Mark the owner busy for `reason` until the guard ends.
    pub fn begin(&self, reason: impl Into<String>) -> BusyGuard {
        let reason = reason.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let _writer = self.inner.is_busy.domain().write_lock();
        self.inner.reasons.lock().push((id, reason.clone()));
        self.inner.is_busy.set(true);
        tracing::trace!(reason = %reason, "Busy");
        BusyGuard {
            inner: Arc::clone(&self.inner),
            id: Some(id),
        }
    }

    /// Await `future` while busy with `reason`.
    pub async fn execute_scoped<F: Future>(&self, future: F, reason: impl Into<String>) -> F::Output {
        let _guard = self.begin(reason);
        future.await
    }

    /// Run `f` while busy with `reason`.
    pub fn run_scoped<R>(&self, f: impl FnOnce() -> R, reason: impl Into<String>) -> R {
        let _guard = self.begin(reason);
        f()
    }

    pub fn is_busy(&self) -> ReadCell<bool> {
        self.inner.is_busy.read_only()
    }

    /// Active reasons, oldest first.
    pub fn reasons(&self) -> Vec<String> {
        self.inner
            .reasons
            .lock()
            .iter()
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

impl Disposable for BusyScope {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.is_busy.clear_listeners();
        Ok(())
    }

    fn name(&self) -> String {
        "busy scope".to_string()
    }
}

/// Ends one busy reason when dropped.
#[must_use = "dropping a BusyGuard ends the busy reason immediately"]
pub struct BusyGuard {
    inner: Arc<BusyInner>,
    id: Option<u64>,
}

impl BusyGuard {
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(id) = self.id.take() {
            self.inner.end(id);
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Observable;

    #[test]
    fn nested_reasons_keep_busy_until_last_ends() {
        let scope = LifecycleScope::new("vm");
        let busy = BusyScope::new(&scope);
        let flips = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let flips = flips.clone();
            busy.is_busy().subscribe(move |v: &bool| flips.lock().push(*v))
        };

        let load = busy.begin("load");
        let save = busy.begin("save");
        let load_again = busy.begin("load");
        assert_eq!(busy.reasons(), vec!["load", "save", "load"]);

        load.end();
        drop(save);
        assert!(busy.is_busy().get());
        assert_eq!(busy.reasons(), vec!["load"]);

        load_again.end();
        assert!(!busy.is_busy().get());
        assert_eq!(*flips.lock(), vec![true, false]);
    }

    #[test]
    fn run_scoped_is_busy_inside() {
        let scope = LifecycleScope::new("vm");
        let busy = BusyScope::new(&scope);
        let inside = busy.run_scoped(|| busy.is_busy().get(), "compute");
        assert!(inside);
        assert!(!busy.is_busy().get());
    }

    #[tokio::test]
    async fn execute_scoped_ends_after_future() {
        let scope = LifecycleScope::new("vm");
        let busy = BusyScope::new(&scope);
        let observer = busy.clone();
        let value = busy
            .execute_scoped(async move { (observer.reasons(), 7) }, "fetch")
            .await;
        assert_eq!(value, (vec!["fetch".to_string()], 7));
        assert!(busy.reasons().is_empty());
    }
}
