use std::sync::Arc;

use crate::cell::{Observable, ReadCell, StateCell, Subscription};
use crate::error::DisposeError;
use crate::lifecycle::{Disposable, LifecycleScope};

/// Advisory "is this instance currently relevant" flag.
///
/// Flipping the flag notifies listeners and runs the optional hook; it never
/// executes anything. Composites read it when deciding eligibility.
#[derive(Clone)]
pub struct ActiveAwareness {
    inner: Arc<ActiveInner>,
}

struct ActiveInner {
    is_active: StateCell<bool>,
    _hook: Option<Subscription>,
}

impl ActiveAwareness {
    pub fn new(scope: &LifecycleScope, initial: bool) -> Self {
        Self::build(scope, initial, None)
    }

    /// Run `hook` with the new state on every transition.
    pub fn with_hook(
        scope: &LifecycleScope,
        initial: bool,
        hook: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        Self::build(scope, initial, Some(Box::new(hook)))
    }

    fn build(
        scope: &LifecycleScope,
        initial: bool,
        hook: Option<Box<dyn Fn(bool) + Send + Sync>>,
    ) -> Self {
        let is_active = StateCell::new(scope.domain(), initial);
        let hook = hook.map(|hook| is_active.subscribe(move |active: &bool| hook(*active)));
        let awareness = Self {
            inner: Arc::new(ActiveInner {
                is_active,
                _hook: hook,
            }),
        };
        scope.own(awareness.clone());
        awareness
    }

    /// Returns `true` when the state changed.
    pub fn set_active(&self, active: bool) -> bool {
        let changed = self.inner.is_active.set(active);
        if changed {
            tracing::trace!(active, "Active state changed");
        }
        changed
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active.get()
    }

    pub fn active(&self) -> ReadCell<bool> {
        self.inner.is_active.read_only()
    }
}

impl Disposable for ActiveAwareness {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.is_active.clear_listeners();
        Ok(())
    }

    fn name(&self) -> String {
        "active awareness".to_string()
    }
}

impl std::fmt::Debug for ActiveAwareness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActiveAwareness")
            .field(&self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn hook_runs_on_transitions_only() {
        let scope = LifecycleScope::new("tab");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let awareness = {
            let seen = seen.clone();
            ActiveAwareness::with_hook(&scope, false, move |active| seen.lock().push(active))
        };

        assert!(!awareness.set_active(false));
        assert!(awareness.set_active(true));
        assert!(awareness.set_active(false));
        assert_eq!(*seen.lock(), vec![true, false]);
        assert!(!awareness.active().get());
    }
}
