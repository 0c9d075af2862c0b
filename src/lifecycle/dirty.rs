use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{CellValue, Observable, ReadCell, StateCell, Subscription};
use crate::error::DisposeError;
use crate::lifecycle::{Disposable, LifecycleScope};

/// Records whether tracked state changed since the last [`mark_clean`].
///
/// The flag is set by any emission of a tracked source and cleared only by
/// [`mark_clean`].
///
/// [`mark_clean`]: DirtyTracker::mark_clean
#[derive(Clone)]
pub struct DirtyTracker {
    inner: Arc<DirtyInner>,
}

struct DirtyInner {
    is_dirty: StateCell<bool>,
    tracked: Mutex<Vec<Subscription>>,
}

impl DirtyTracker {
    pub fn new(scope: &LifecycleScope) -> Self {
        let tracker = Self {
            inner: Arc::new(DirtyInner {
                is_dirty: StateCell::new(scope.domain(), false),
                tracked: Mutex::new(Vec::new()),
            }),
        };
        scope.own(tracker.clone());
        tracker
    }

    /// Mark dirty whenever `source` emits.
    pub fn track_property<T, O>(&self, source: &O) -> &Self
    where
        T: CellValue,
        O: Observable<T>,
    {
        let flag = self.inner.is_dirty.clone();
        let subscription = source.subscribe(move |_| {
            flag.set(true);
        });
        self.inner.tracked.lock().push(subscription);
        self
    }

    pub fn mark_dirty(&self) {
        self.inner.is_dirty.set(true);
    }

    pub fn mark_clean(&self) {
        self.inner.is_dirty.set(false);
    }

    pub fn is_dirty(&self) -> ReadCell<bool> {
        self.inner.is_dirty.read_only()
    }

    /// Number of tracked sources.
    pub fn tracked_count(&self) -> usize {
        self.inner.tracked.lock().len()
    }
}

impl Disposable for DirtyTracker {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.tracked.lock().clear();
        self.inner.is_dirty.clear_listeners();
        Ok(())
    }

    fn name(&self) -> String {
        "dirty tracker".to_string()
    }
}
