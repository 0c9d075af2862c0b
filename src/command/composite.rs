use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::cell::{Dependency, Derived, Domain, Observable, ReadCell, StateCell, Subscription};
use crate::command::{CancelToken, Command, CommandId};
use crate::diagnostics::{ConfigurationWarning, Diagnostics, WarningKind};
use crate::error::{CommandError, DisposeError};
use crate::lifecycle::{Disposable, LifecycleScope};

/// Result of one child in a composite execution.
#[derive(Debug)]
pub enum ChildOutcome<R> {
    Succeeded(R),
    Failed(CommandError),
    /// Not dispatched because the token was cancelled first.
    Skipped,
}

impl<R> ChildOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, ChildOutcome::Succeeded(_))
    }
}

/// Per-child entry of a composite execution, in registration order.
#[derive(Debug)]
pub struct ChildReport<R> {
    pub command: String,
    pub id: CommandId,
    pub outcome: ChildOutcome<R>,
}

/// At least one child of a composite did not succeed.
///
/// Carries every child's outcome, including the successes.
#[derive(Debug)]
pub struct CompositeAggregateError<R> {
    pub composite: String,
    pub outcomes: Vec<ChildReport<R>>,
}

impl<R> CompositeAggregateError<R> {
    pub fn failures(&self) -> impl Iterator<Item = &ChildReport<R>> {
        self.outcomes
            .iter()
            .filter(|report| matches!(report.outcome, ChildOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ChildReport<R>> {
        self.outcomes
            .iter()
            .filter(|report| matches!(report.outcome, ChildOutcome::Skipped))
    }
}

impl<R> std::fmt::Display for CompositeAggregateError<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unsuccessful = self
            .outcomes
            .iter()
            .filter(|report| !report.outcome.is_success())
            .count();
        write!(
            f,
            "Composite '{}': {} of {} children did not succeed",
            self.composite,
            unsuccessful,
            self.outcomes.len()
        )
    }
}

impl<R: std::fmt::Debug> std::error::Error for CompositeAggregateError<R> {}

/// Construction options for [`CompositeCommand`]. Unset fields come from the
/// scope's configuration.
#[derive(Debug, Clone, Default)]
pub struct CompositeOptions {
    pub name: Option<String>,
    pub monitor_activity: Option<bool>,
}

#[derive(Clone)]
struct ChildCells {
    can_execute: ReadCell<bool>,
    is_executing: ReadCell<bool>,
    /// Present only when monitoring and the child is active-aware.
    active: Option<ReadCell<bool>>,
}

impl ChildCells {
    fn eligible(&self) -> bool {
        self.active.as_ref().map_or(true, |active| active.get())
    }
}

/// `cell` as a dependency of `domain`, mirrored when it lives elsewhere.
fn local_to(domain: &Domain, cell: ReadCell<bool>, links: &mut Vec<Subscription>) -> ReadCell<bool> {
    if cell.domain().same_as(domain) {
        return cell;
    }
    let (mirror, link) = StateCell::mirror(domain, &cell);
    links.push(link);
    mirror.read_only()
}

struct Child<P, R> {
    command: Command<P, R>,
    _retired: Subscription,
}

struct Aggregate {
    _derived: Derived<(bool, bool)>,
    _forward: Subscription,
    _links: Vec<Subscription>,
}

/// Aggregates commands: `can_execute` is the AND and `is_executing` the OR
/// over eligible children.
///
/// A child is eligible when activity is not monitored, or when it is active
/// (children without active-awareness always count as active). An empty
/// eligible set gives `can_execute = true` and `is_executing = false`.
///
/// Children may belong to other view-models' domains. A child leaves the
/// composite when it is disposed.
pub struct CompositeCommand<P, R> {
    inner: Arc<CompositeInner<P, R>>,
}

struct CompositeInner<P, R> {
    name: String,
    domain: Domain,
    monitor_activity: bool,
    diagnostics: Diagnostics,
    children: Mutex<Vec<Child<P, R>>>,
    aggregate: Mutex<Option<Aggregate>>,
    can_execute: StateCell<bool>,
    is_executing: StateCell<bool>,
    disposed: AtomicBool,
}

impl<P, R> Clone for CompositeCommand<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R> CompositeCommand<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new(scope: &LifecycleScope) -> Self {
        Self::with_options(scope, CompositeOptions::default())
    }

    pub fn with_options(scope: &LifecycleScope, options: CompositeOptions) -> Self {
        let defaults = &scope.config().commands;
        let name = options.name.unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{}-{}", defaults.composite_name, &suffix[..8])
        });
        let composite = Self {
            inner: Arc::new(CompositeInner {
                name,
                domain: scope.domain().clone(),
                monitor_activity: options.monitor_activity.unwrap_or(defaults.monitor_activity),
                diagnostics: scope.diagnostics().clone(),
                children: Mutex::new(Vec::new()),
                aggregate: Mutex::new(None),
                can_execute: StateCell::new(scope.domain(), true),
                is_executing: StateCell::new(scope.domain(), false),
                disposed: AtomicBool::new(false),
            }),
        };
        composite.rebuild();
        scope.own(composite.clone());
        composite
    }

    /// Add `command`. Returns `false` if it was already registered or is
    /// disposed.
    pub fn register(&self, command: &Command<P, R>) -> bool {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) || command.is_disposed() {
            return false;
        }
        let _writer = inner.domain.write_lock();
        {
            let mut children = inner.children.lock();
            if children.iter().any(|child| child.command.id() == command.id()) {
                return false;
            }
            let composite = Arc::downgrade(&self.inner);
            let retired = command.on_disposed(move |id| {
                if let Some(inner) = composite.upgrade() {
                    CompositeCommand { inner }.remove(*id);
                }
            });
            children.push(Child {
                command: command.clone(),
                _retired: retired,
            });
        }
        // Disposed while being added.
        if command.is_disposed() {
            self.remove(command.id());
            return false;
        }

        if inner.monitor_activity && command.active_awareness().is_none() {
            inner.diagnostics.warn(ConfigurationWarning {
                kind: WarningKind::NotActiveAware,
                subject: command.name().to_string(),
                message: format!(
                    "registered into activity-monitoring composite '{}' without active-awareness; always treated as active",
                    inner.name
                ),
            });
        }

        self.rebuild();
        tracing::debug!(composite = %inner.name, command = %command.name(), "Command registered");
        true
    }

    /// Remove `command`. Returns `false` if it was not registered.
    pub fn unregister(&self, command: &Command<P, R>) -> bool {
        self.remove(command.id())
    }

    fn remove(&self, id: CommandId) -> bool {
        let inner = &self.inner;
        let _writer = inner.domain.write_lock();
        let removed = {
            let mut children = inner.children.lock();
            let position = children.iter().position(|child| child.command.id() == id);
            position.map(|index| children.remove(index))
        };
        match removed {
            Some(child) => {
                self.rebuild();
                tracing::debug!(composite = %inner.name, command = %child.command.name(), "Command unregistered");
                true
            }
            None => false,
        }
    }

    /// Rebuild the aggregate over the current children.
    fn rebuild(&self) {
        let inner = &self.inner;
        let _writer = inner.domain.write_lock();
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let mut links = Vec::new();
        let cells: Arc<Vec<ChildCells>> = Arc::new(
            inner
                .children
                .lock()
                .iter()
                .map(|child| &child.command)
                .map(|child| ChildCells {
                    can_execute: local_to(&inner.domain, child.can_execute(), &mut links),
                    is_executing: local_to(&inner.domain, child.is_executing(), &mut links),
                    active: inner
                        .monitor_activity
                        .then(|| child.active_awareness().map(|active| active.active()))
                        .flatten()
                        .map(|active| local_to(&inner.domain, active, &mut links)),
                })
                .collect(),
        );

        let mut dependencies: Vec<&dyn Dependency> = Vec::new();
        for child in cells.iter() {
            dependencies.push(&child.can_execute);
            dependencies.push(&child.is_executing);
            if let Some(active) = &child.active {
                dependencies.push(active);
            }
        }

        let snapshot = Arc::clone(&cells);
        let derived = Derived::combine(&inner.domain, &dependencies, move || {
            snapshot
                .iter()
                .filter(|child| child.eligible())
                .fold((true, false), |(all, any), child| {
                    (
                        all && child.can_execute.get(),
                        any || child.is_executing.get(),
                    )
                })
        });

        inner.domain.batch(|| {
            let (can_execute, is_executing) = (inner.can_execute.clone(), inner.is_executing.clone());
            let (all, any) = derived.get();
            can_execute.set(all);
            is_executing.set(any);
            let forward = derived.subscribe(move |(all, any): &(bool, bool)| {
                can_execute.set(*all);
                is_executing.set(*any);
            });
            *inner.aggregate.lock() = Some(Aggregate {
                _derived: derived,
                _forward: forward,
                _links: links,
            });
        });
    }

    fn eligible(&self) -> Vec<Command<P, R>> {
        let monitor = self.inner.monitor_activity;
        self.inner
            .children
            .lock()
            .iter()
            .map(|child| &child.command)
            .filter(|child| !child.is_disposed())
            .filter(|child| {
                !monitor
                    || child
                        .active_awareness()
                        .map_or(true, |active| active.is_active())
            })
            .cloned()
            .collect()
    }

    pub async fn execute(&self, param: P) -> Result<Vec<R>, CompositeAggregateError<R>> {
        self.execute_with(param, &CancelToken::new()).await
    }

    /// Run every eligible child on its own task and wait for all of them.
    ///
    /// Must be called within a tokio runtime. A failing child does not
    /// cancel its siblings. Children not yet dispatched when `token` fires
    /// are reported as skipped. Outcomes keep registration order.
    pub async fn execute_with(
        &self,
        param: P,
        token: &CancelToken,
    ) -> Result<Vec<R>, CompositeAggregateError<R>> {
        let name = &self.inner.name;
        let eligible = self.eligible();
        tracing::debug!(composite = %name, children = eligible.len(), "Composite dispatch");

        let mut tasks = JoinSet::new();
        for (index, child) in eligible.iter().enumerate() {
            let (child, param, token) = (child.clone(), param.clone(), token.clone());
            tasks.spawn(async move {
                let outcome = if token.is_cancelled() {
                    ChildOutcome::Skipped
                } else {
                    match child.execute_with(param, &token).await {
                        Ok(value) => ChildOutcome::Succeeded(value),
                        Err(error) => ChildOutcome::Failed(error),
                    }
                };
                (index, outcome)
            });
        }

        let mut settled: Vec<Option<ChildOutcome<R>>> = eligible.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => settled[index] = Some(outcome),
                Err(error) => {
                    tracing::warn!(composite = %name, error = %error, "Composite child task failed");
                }
            }
        }

        let outcomes: Vec<ChildReport<R>> = eligible
            .iter()
            .zip(settled)
            .map(|(child, outcome)| ChildReport {
                command: child.name().to_string(),
                id: child.id(),
                outcome: outcome.unwrap_or_else(|| {
                    ChildOutcome::Failed(CommandError::Execution {
                        command: child.name().to_string(),
                        source: anyhow::anyhow!("child task panicked"),
                    })
                }),
            })
            .collect();

        if outcomes.iter().all(|report| report.outcome.is_success()) {
            tracing::debug!(composite = %name, "Composite finished");
            return Ok(outcomes
                .into_iter()
                .filter_map(|report| match report.outcome {
                    ChildOutcome::Succeeded(value) => Some(value),
                    _ => None,
                })
                .collect());
        }

        let error = CompositeAggregateError {
            composite: name.clone(),
            outcomes,
        };
        tracing::warn!(
            composite = %name,
            failed = error.failures().count(),
            skipped = error.skipped().count(),
            "Composite finished with failures"
        );
        Err(error)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn monitors_activity(&self) -> bool {
        self.inner.monitor_activity
    }

    pub fn can_execute(&self) -> ReadCell<bool> {
        self.inner.can_execute.read_only()
    }

    pub fn is_executing(&self) -> ReadCell<bool> {
        self.inner.is_executing.read_only()
    }

    pub fn contains(&self, command: &Command<P, R>) -> bool {
        self.inner
            .children
            .lock()
            .iter()
            .any(|child| child.command.same_as(command))
    }

    /// Registered children, in registration order.
    pub fn children(&self) -> Vec<CommandId> {
        self.inner
            .children
            .lock()
            .iter()
            .map(|child| child.command.id())
            .collect()
    }
}

impl<P, R> Disposable for CompositeCommand<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    fn dispose(&self) -> Result<(), DisposeError> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.aggregate.lock().take();
        self.inner.children.lock().clear();
        self.inner.can_execute.clear_listeners();
        self.inner.is_executing.clear_listeners();
        Ok(())
    }

    fn name(&self) -> String {
        format!("composite '{}'", self.inner.name)
    }
}

impl<P, R> std::fmt::Debug for CompositeCommand<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeCommand")
            .field("name", &self.inner.name)
            .field("monitor_activity", &self.inner.monitor_activity)
            .field("children", &self.inner.children.lock().len())
            .finish()
    }
}
