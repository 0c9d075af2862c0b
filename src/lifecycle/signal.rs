use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// One-shot flag with async wake-up, shared by teardown and cancellation.
#[derive(Clone, Default)]
pub(crate) struct Flag {
    raised: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Flag {
    /// Raise the flag. Returns `true` only for the first call.
    pub(crate) fn raise(&self) -> bool {
        if self.raised.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait(&self) {
        // Register with Notify BEFORE checking the flag: otherwise raise()
        // could land between the check and the await and the wake-up would
        // be lost.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_raised() {
            return;
        }
        notified.await;
    }
}

/// Lightweight handle observing a scope's teardown.
///
/// Fires at most once, when the owning scope starts disposing.
#[derive(Clone, Default)]
pub struct TeardownSignal {
    flag: Flag,
}

impl TeardownSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fire(&self) -> bool {
        self.flag.raise()
    }

    pub fn is_fired(&self) -> bool {
        self.flag.is_raised()
    }

    /// Resolve once teardown has started (immediately if it already has).
    pub async fn fired(&self) {
        self.flag.wait().await
    }
}

impl std::fmt::Debug for TeardownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownSignal")
            .field("fired", &self.is_fired())
            .finish()
    }
}
