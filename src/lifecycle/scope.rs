//! Ownership and teardown of everything a view-model creates.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{Domain, Subscription};
use crate::config::Config;
use crate::diagnostics::{ConfigurationWarning, Diagnostics, InstanceToken, WarningKind};
use crate::error::DisposeError;
use crate::lifecycle::signal::TeardownSignal;

/// A resource released when its owning [`LifecycleScope`] disposes.
pub trait Disposable: Send + Sync {
    /// Release the resource. Called at most once by a scope.
    fn dispose(&self) -> Result<(), DisposeError>;

    /// Name used in logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

enum Owned {
    Resource(Box<dyn Disposable>),
    Subscription(Subscription),
    Callback(Box<dyn FnOnce() + Send>),
}

impl Owned {
    fn name(&self) -> String {
        match self {
            Owned::Resource(resource) => resource.name(),
            Owned::Subscription(_) => "subscription".to_string(),
            Owned::Callback(_) => "dispose callback".to_string(),
        }
    }

    fn release(self) -> Result<(), DisposeError> {
        match self {
            Owned::Resource(resource) => resource.dispose(),
            Owned::Subscription(subscription) => {
                subscription.unsubscribe();
                Ok(())
            }
            Owned::Callback(callback) => {
                callback();
                Ok(())
            }
        }
    }
}

/// Owns the subscriptions, commands and containers of one logical owner.
///
/// # Invariants
///
/// 1. The teardown signal fires at most once.
/// 2. `dispose()` is idempotent.
/// 3. Owned resources are released in reverse registration order; a failing
///    release is logged and skipped.
/// 4. Anything registered after disposal is released immediately.
///
/// Dropping the scope disposes it.
pub struct LifecycleScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    domain: Domain,
    config: Arc<Config>,
    diagnostics: Diagnostics,
    signal: TeardownSignal,
    owned: Mutex<Vec<Owned>>,
    instance: InstanceToken,
}

impl ScopeInner {
    fn register(&self, owned: Owned) {
        let rejected = {
            let mut list = self.owned.lock();
            if self.signal.is_fired() {
                Some(owned)
            } else {
                list.push(owned);
                None
            }
        };

        if let Some(owned) = rejected {
            let resource = owned.name();
            self.diagnostics.warn(ConfigurationWarning {
                kind: WarningKind::RegisteredAfterDispose,
                subject: resource.clone(),
                message: format!(
                    "registered into disposed scope '{}'; released immediately",
                    self.name
                ),
            });
            release_logged(&self.name, owned);
        }
    }

    fn dispose(&self) {
        if !self.signal.fire() {
            return;
        }

        let owned = std::mem::take(&mut *self.owned.lock());
        let total = owned.len();
        let mut failed = 0usize;
        for item in owned.into_iter().rev() {
            if !release_logged(&self.name, item) {
                failed += 1;
            }
        }
        self.instance.release();

        tracing::debug!(
            scope = %self.name,
            released = total,
            failed,
            "Lifecycle scope disposed"
        );
    }
}

/// Release one item, logging failures and panics. Returns `true` on success.
fn release_logged(scope: &str, item: Owned) -> bool {
    let resource = item.name();
    match catch_unwind(AssertUnwindSafe(|| item.release())) {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            tracing::warn!(
                scope = %scope,
                resource = %resource,
                error = %error,
                "Disposal failed; continuing teardown"
            );
            false
        }
        Err(_) => {
            tracing::warn!(
                scope = %scope,
                resource = %resource,
                "Disposal panicked; continuing teardown"
            );
            false
        }
    }
}

impl LifecycleScope {
    /// Create a scope with default config and a fresh domain.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> ScopeBuilder {
        ScopeBuilder {
            name: name.into(),
            domain: None,
            config: None,
            diagnostics: None,
        }
    }

    /// Create a nested scope sharing this scope's domain, config and
    /// diagnostics. The child is disposed when the parent disposes, or
    /// earlier if disposed directly.
    pub fn child(&self, name: impl Into<String>) -> LifecycleScope {
        let name = format!("{}/{}", self.inner.name, name.into());
        let child = LifecycleScope {
            inner: Arc::new(ScopeInner {
                instance: self.inner.diagnostics.track("scope"),
                name,
                domain: self.inner.domain.clone(),
                config: Arc::clone(&self.inner.config),
                diagnostics: self.inner.diagnostics.clone(),
                signal: TeardownSignal::new(),
                owned: Mutex::new(Vec::new()),
            }),
        };
        self.own(ChildScope {
            inner: Arc::clone(&child.inner),
        });
        child
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn domain(&self) -> &Domain {
        &self.inner.domain
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Handle observing this scope's teardown.
    pub fn signal(&self) -> TeardownSignal {
        self.inner.signal.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.signal.is_fired()
    }

    /// Number of resources currently owned.
    pub fn owned_count(&self) -> usize {
        self.inner.owned.lock().len()
    }

    /// Take ownership of a disposable resource.
    pub fn own(&self, resource: impl Disposable + 'static) {
        self.inner.register(Owned::Resource(Box::new(resource)));
    }

    /// Keep a subscription alive until the scope disposes.
    pub fn own_subscription(&self, subscription: Subscription) {
        self.inner.register(Owned::Subscription(subscription));
    }

    /// Run `callback` during teardown, in reverse registration order.
    pub fn on_dispose(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.register(Owned::Callback(Box::new(callback)));
    }

    /// Drive `future` until it completes or the scope starts tearing down.
    ///
    /// Returns `None` when teardown won the race.
    pub async fn run_until_disposed<F: Future>(&self, future: F) -> Option<F::Output> {
        let signal = self.signal();
        tokio::select! {
            biased;
            _ = signal.fired() => None,
            output = future => Some(output),
        }
    }

    /// Fire the teardown signal, then release owned resources in reverse
    /// registration order. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for LifecycleScope {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for LifecycleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleScope")
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .field("owned", &self.owned_count())
            .finish()
    }
}

/// Builder for [`LifecycleScope`].
pub struct ScopeBuilder {
    name: String,
    domain: Option<Domain>,
    config: Option<Config>,
    diagnostics: Option<Diagnostics>,
}

impl ScopeBuilder {
    /// Join an existing single-writer domain instead of creating one.
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a shared collector. Without one, the scope builds its own from
    /// the config's `[diagnostics]` section.
    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn build(self) -> LifecycleScope {
        let domain = self.domain.unwrap_or_else(|| Domain::new(self.name.clone()));
        let config = self.config.unwrap_or_default();
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Diagnostics::from_config(&config.diagnostics));
        LifecycleScope {
            inner: Arc::new(ScopeInner {
                instance: diagnostics.track("scope"),
                name: self.name,
                domain,
                config: Arc::new(config),
                diagnostics,
                signal: TeardownSignal::new(),
                owned: Mutex::new(Vec::new()),
            }),
        }
    }
}

struct ChildScope {
    inner: Arc<ScopeInner>,
}

impl Disposable for ChildScope {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.dispose();
        Ok(())
    }

    fn name(&self) -> String {
        format!("scope '{}'", self.inner.name)
    }
}
