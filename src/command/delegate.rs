use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::active::ActiveAwareness;
use crate::cell::{
    CellValue, Dependency, Derived, Domain, Listeners, Observable, ReadCell, StateCell, Subscription,
};
use crate::command::{CancelToken, CommandId, Truthy};
use crate::config::ExecutionPolicy;
use crate::diagnostics::InstanceToken;
use crate::error::{CommandError, DisposeError};
use crate::lifecycle::{Disposable, LifecycleScope, TeardownSignal};

type Body<P, R> = Arc<dyn Fn(P, CancelToken) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;
type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// One observed enablement source.
struct Source {
    dependency: Box<dyn Dependency + Send + Sync>,
    truthy: Predicate,
    /// Keeps a mirror of a foreign-domain source in sync.
    _link: Option<Subscription>,
}

impl Source {
    fn new<T, O>(domain: &Domain, source: &O, truthy: fn(&T) -> bool) -> Self
    where
        T: CellValue,
        O: Observable<T>,
    {
        if source.node_ref().domain.same_as(domain) {
            let reader = source.clone();
            return Source {
                dependency: Box::new(source.clone()),
                truthy: Arc::new(move || reader.with(truthy)),
                _link: None,
            };
        }
        let (mirror, link) = StateCell::mirror(domain, source);
        let reader = mirror.clone();
        Source {
            dependency: Box::new(mirror),
            truthy: Arc::new(move || reader.with(truthy)),
            _link: Some(link),
        }
    }
}

/// Immutable enablement definition. Every `observes_*` call derives a new
/// one from the previous and swaps it in.
struct Definition {
    base: Predicate,
    sources: Vec<Arc<Source>>,
}

impl Definition {
    fn evaluate(&self) -> bool {
        (self.base)() && self.sources.iter().all(|source| (source.truthy)())
    }

    fn with_source(&self, source: Source) -> Definition {
        let mut sources = self.sources.clone();
        sources.push(Arc::new(source));
        Definition {
            base: Arc::clone(&self.base),
            sources,
        }
    }
}

/// The installed definition and the derived cell computing it.
struct Gate {
    definition: Arc<Definition>,
    derived: Derived<bool>,
    _forward: Subscription,
}

/// An executable unit with derived enablement and activity.
///
/// `can_execute` is the base predicate AND every observed source.
/// `is_executing` is `true` while at least one invocation is in flight.
///
/// # Invariants
///
/// 1. The in-flight count never goes negative; it is released on success,
///    failure and when the `execute` future is dropped.
/// 2. `can_execute` is recomputed once per causal update, with settled
///    inputs.
/// 3. `execute` does not consult `can_execute`; use
///    [`try_execute`](Self::try_execute) for a gated call.
pub struct Command<P, R> {
    inner: Arc<CommandInner<P, R>>,
}

struct CommandInner<P, R> {
    id: CommandId,
    name: String,
    domain: Domain,
    policy: ExecutionPolicy,
    body: Body<P, R>,
    gate: Mutex<Option<Gate>>,
    can_execute: StateCell<bool>,
    is_executing: StateCell<bool>,
    in_flight: AtomicUsize,
    queue: tokio::sync::Mutex<()>,
    active: Option<ActiveAwareness>,
    teardown: TeardownSignal,
    disposed: AtomicBool,
    retired: Listeners<CommandId>,
    instance: InstanceToken,
}

impl<P, R> Clone for Command<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R> Command<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// A command with default options whose body ignores cancellation.
    pub fn new<F, Fut>(scope: &LifecycleScope, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self::builder(name).build(scope, body)
    }

    /// A command with default options whose body receives the token.
    pub fn with_cancellation<F, Fut>(scope: &LifecycleScope, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(P, CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self::builder(name).build_with_cancellation(scope, body)
    }

    pub fn builder(name: impl Into<String>) -> CommandBuilder<P, R> {
        CommandBuilder {
            name: name.into(),
            policy: None,
            base: None,
            active: None,
            _marker: PhantomData,
        }
    }

    fn from_parts(
        scope: &LifecycleScope,
        options: CommandBuilder<P, R>,
        body: Body<P, R>,
    ) -> Self {
        let domain = scope.domain().clone();
        let policy = options
            .policy
            .unwrap_or(scope.config().commands.default_policy);
        let base = options.base.unwrap_or_else(|| Arc::new(|| true));
        let definition = Definition {
            base,
            sources: Vec::new(),
        };

        let command = Self {
            inner: Arc::new(CommandInner {
                id: CommandId::new(),
                can_execute: StateCell::new(&domain, definition.evaluate()),
                is_executing: StateCell::new(&domain, false),
                name: options.name,
                domain,
                policy,
                body,
                gate: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                queue: tokio::sync::Mutex::new(()),
                active: options.active,
                teardown: scope.signal(),
                disposed: AtomicBool::new(false),
                retired: Listeners::new(),
                instance: scope.diagnostics().track("command"),
            }),
        };
        command.install(Arc::new(definition));
        scope.own(command.clone());

        tracing::debug!(
            command = %command.inner.name,
            id = %command.inner.id,
            policy = ?policy,
            "Command created"
        );
        command
    }

    /// Build the derived cell for `definition` and forward it to the public
    /// `can_execute` cell.
    fn install(&self, definition: Arc<Definition>) {
        let inner = &self.inner;
        let dependencies: Vec<&dyn Dependency> = definition
            .sources
            .iter()
            .map(|source| source.dependency.as_ref() as &dyn Dependency)
            .collect();
        let compute = Arc::clone(&definition);
        let derived = Derived::combine(&inner.domain, &dependencies, move || compute.evaluate());

        inner.domain.batch(|| {
            let output = inner.can_execute.clone();
            output.set(derived.get());
            let forward = derived.subscribe(move |value: &bool| {
                output.set(*value);
            });
            *inner.gate.lock() = Some(Gate {
                definition,
                derived,
                _forward: forward,
            });
        });
    }

    fn extend(self, source: Source) -> Self {
        {
            let _writer = self.inner.domain.write_lock();
            let current = self
                .inner
                .gate
                .lock()
                .as_ref()
                .map(|gate| Arc::clone(&gate.definition));
            // No gate once disposed.
            if let Some(current) = current {
                self.install(Arc::new(current.with_source(source)));
            }
        }
        self
    }

    /// AND the truthiness of `source` into `can_execute`.
    ///
    /// `source` may belong to another view-model's domain; it is then
    /// mirrored into this command's domain.
    pub fn observes_property<T, O>(self, source: &O) -> Self
    where
        T: CellValue + Truthy,
        O: Observable<T>,
    {
        let source = Source::new::<T, O>(&self.inner.domain, source, |value: &T| value.is_truthy());
        self.extend(source)
    }

    /// AND a boolean source into `can_execute`.
    pub fn observes_can_execute<O>(self, source: &O) -> Self
    where
        O: Observable<bool>,
    {
        let source = Source::new::<bool, O>(&self.inner.domain, source, |value: &bool| *value);
        self.extend(source)
    }

    /// Re-evaluate the base predicate and re-deliver `can_execute`, for state
    /// the command does not observe.
    pub fn raise_can_execute_changed(&self) {
        let inner = &self.inner;
        let _writer = inner.domain.write_lock();
        let before = inner.can_execute.version();
        let derived = inner.gate.lock().as_ref().map(|gate| gate.derived.clone());
        if let Some(derived) = derived {
            derived.invalidate();
        }
        let output = inner.can_execute.clone();
        inner.domain.defer(move || {
            if output.version() == before {
                output.notify_current();
            }
        });
    }

    pub async fn execute(&self, param: P) -> Result<R, CommandError> {
        self.execute_with(param, &CancelToken::new()).await
    }

    /// Execute unless `token` is already cancelled.
    ///
    /// Under `SequentialQueue` the token is checked again once the call
    /// reaches the head of the queue.
    pub async fn execute_with(&self, param: P, token: &CancelToken) -> Result<R, CommandError> {
        let inner = &self.inner;
        self.check_dispatch(token)?;

        let _queued = match inner.policy {
            ExecutionPolicy::SequentialQueue => {
                let slot = inner.queue.lock().await;
                self.check_dispatch(token)?;
                Some(slot)
            }
            _ => None,
        };

        self.enter()?;
        let _release = scopeguard::guard((), |_| self.leave());

        tracing::debug!(command = %inner.name, "Command started");
        match (inner.body)(param, token.clone()).await {
            Ok(value) => {
                tracing::debug!(command = %inner.name, "Command finished");
                Ok(value)
            }
            Err(source) => {
                tracing::warn!(command = %inner.name, error = %source, "Command failed");
                Err(CommandError::Execution {
                    command: inner.name.clone(),
                    source,
                })
            }
        }
    }

    /// Execute only if `can_execute` is currently true.
    pub async fn try_execute(&self, param: P) -> Result<R, CommandError> {
        if !self.inner.can_execute.get() {
            return Err(CommandError::Disabled {
                command: self.inner.name.clone(),
            });
        }
        self.execute(param).await
    }

    fn check_dispatch(&self, token: &CancelToken) -> Result<(), CommandError> {
        if self.is_disposed() {
            return Err(CommandError::Disposed {
                command: self.inner.name.clone(),
            });
        }
        if token.is_cancelled() {
            tracing::debug!(command = %self.inner.name, "Command cancelled before dispatch");
            return Err(CommandError::Cancelled {
                command: self.inner.name.clone(),
            });
        }
        Ok(())
    }

    fn enter(&self) -> Result<(), CommandError> {
        let inner = &self.inner;
        let _writer = inner.domain.write_lock();
        if inner.policy == ExecutionPolicy::SequentialReject
            && inner.in_flight.load(Ordering::SeqCst) > 0
        {
            tracing::debug!(command = %inner.name, "Command rejected while busy");
            return Err(CommandError::Busy {
                command: inner.name.clone(),
            });
        }
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.is_executing.set(true);
        Ok(())
    }

    fn leave(&self) {
        let inner = &self.inner;
        let _writer = inner.domain.write_lock();
        let remaining = inner
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .map(|previous| previous.saturating_sub(1))
            .unwrap_or(0);
        inner.is_executing.set(remaining > 0);
    }
}

impl<P, R> Command<P, R> {
    pub fn id(&self) -> CommandId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.inner.policy
    }

    pub fn can_execute(&self) -> ReadCell<bool> {
        self.inner.can_execute.read_only()
    }

    pub fn is_executing(&self) -> ReadCell<bool> {
        self.inner.is_executing.read_only()
    }

    /// Invocations currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn active_awareness(&self) -> Option<&ActiveAwareness> {
        self.inner.active.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst) || self.inner.teardown.is_fired()
    }

    /// Whether both handles refer to the same command.
    pub fn same_as(&self, other: &Command<P, R>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` once this command is disposed.
    pub(crate) fn on_disposed(&self, f: impl Fn(&CommandId) + Send + Sync + 'static) -> Subscription {
        self.inner.retired.add(Arc::new(f))
    }
}

impl<P, R> Disposable for Command<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn dispose(&self) -> Result<(), DisposeError> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.gate.lock().take();
        self.inner.retired.emit(&self.inner.id);
        self.inner.retired.clear();
        self.inner.can_execute.clear_listeners();
        self.inner.is_executing.clear_listeners();
        self.inner.instance.release();
        tracing::debug!(command = %self.inner.name, "Command disposed");
        Ok(())
    }

    fn name(&self) -> String {
        format!("command '{}'", self.inner.name)
    }
}

impl<P, R> std::fmt::Debug for Command<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("policy", &self.inner.policy)
            .field("can_execute", &self.inner.can_execute.get())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Options for a [`Command`]; finished with a body.
pub struct CommandBuilder<P, R> {
    name: String,
    policy: Option<ExecutionPolicy>,
    base: Option<Predicate>,
    active: Option<ActiveAwareness>,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R> CommandBuilder<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Override the scope's default policy.
    pub fn policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Base enablement predicate (default: always true).
    ///
    /// Reads inside the predicate are not tracked; call
    /// [`Command::raise_can_execute_changed`] when its inputs change.
    pub fn can_execute(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.base = Some(Arc::new(predicate));
        self
    }

    pub fn active_awareness(mut self, active: ActiveAwareness) -> Self {
        self.active = Some(active);
        self
    }

    pub fn build<F, Fut>(self, scope: &LifecycleScope, body: F) -> Command<P, R>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body: Body<P, R> = Arc::new(move |param, _token| body(param).boxed());
        Command::from_parts(scope, self, body)
    }

    pub fn build_with_cancellation<F, Fut>(self, scope: &LifecycleScope, body: F) -> Command<P, R>
    where
        F: Fn(P, CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body: Body<P, R> = Arc::new(move |param, token| body(param, token).boxed());
        Command::from_parts(scope, self, body)
    }
}
