//! Source cells and derived cells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::domain::{Domain, Node, NodeId};
use super::subscription::{Listeners, Subscription};
use super::{CellValue, Dependency, NodeRef, Observable};

type Compute<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Shared storage for source and derived cells.
pub(crate) struct CellCore<T> {
    id: NodeId,
    rank: u32,
    domain: Domain,
    value: RwLock<T>,
    version: AtomicU64,
    listeners: Listeners<T>,
    dependents: Mutex<Vec<Weak<dyn Node>>>,
    /// `None` for source cells.
    compute: Option<Compute<T>>,
}

impl<T: CellValue> CellCore<T> {
    fn new(domain: &Domain, rank: u32, value: T, compute: Option<Compute<T>>) -> Arc<Self> {
        Arc::new(Self {
            id: domain.next_id(),
            rank,
            domain: domain.clone(),
            value: RwLock::new(value),
            version: AtomicU64::new(0),
            listeners: Listeners::new(),
            dependents: Mutex::new(Vec::new()),
            compute,
        })
    }

    fn node(self: &Arc<Self>) -> Arc<dyn Node> {
        self.clone()
    }
}

impl<T: CellValue> Node for CellCore<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn rank(&self) -> u32 {
        self.rank
    }

    fn recompute(&self) -> bool {
        let Some(compute) = &self.compute else {
            return false;
        };
        let next = compute();
        let mut current = self.value.write();
        if *current == next {
            return false;
        }
        *current = next;
        self.version.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn dependents(&self) -> Vec<Arc<dyn Node>> {
        let mut dependents = self.dependents.lock();
        dependents.retain(|weak| weak.strong_count() > 0);
        dependents.iter().filter_map(Weak::upgrade).collect()
    }

    fn add_dependent(&self, dependent: Weak<dyn Node>) {
        self.dependents.lock().push(dependent);
    }

    fn notify(&self) {
        let value = self.value.read().clone();
        self.listeners.emit(&value);
    }
}

/// A mutable source of state.
///
/// Cloning a `StateCell` creates another handle to the same value.
///
/// # Invariants
///
/// 1. Setting a value equal to the current one is a no-op: no version bump,
///    no notification.
/// 2. Outside a batch, listeners have been called when `set` returns.
/// 3. Listeners are called in registration order.
pub struct StateCell<T> {
    core: Arc<CellCore<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: CellValue> StateCell<T> {
    pub fn new(domain: &Domain, initial: T) -> Self {
        Self {
            core: CellCore::new(domain, 0, initial, None),
        }
    }

    /// Commit `value` if it differs from the current value.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, value: T) -> bool {
        let _writer = self.core.domain.write_lock();
        {
            let mut current = self.core.value.write();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.core.version.fetch_add(1, Ordering::SeqCst);
        self.core.domain.commit(self.core.node());
        true
    }

    /// Mutate in place and commit if the result differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let _writer = self.core.domain.write_lock();
        let mut next = self.core.value.read().clone();
        f(&mut next);
        self.set(next)
    }

    /// Deliver the current value to listeners without changing it.
    pub fn notify_current(&self) {
        self.core.domain.renotify(self.core.node());
    }

    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> NodeId {
        self.core.id
    }

    pub fn domain(&self) -> &Domain {
        &self.core.domain
    }

    pub fn listener_count(&self) -> usize {
        self.core.listeners.len()
    }

    /// Drop every listener. Used on disposal.
    pub(crate) fn clear_listeners(&self) {
        self.core.listeners.clear();
    }

    /// A handle that can observe but not mutate this cell.
    pub fn read_only(&self) -> ReadCell<T> {
        ReadCell { cell: self.clone() }
    }

    /// A cell of `domain` that follows `source`, which may belong to another
    /// domain. The copy follows while the returned subscription lives.
    ///
    /// Each source notification commits to the copy as a causal update of
    /// `domain`. Mirrors must not form a cycle across domains.
    pub fn mirror<O: Observable<T>>(domain: &Domain, source: &O) -> (Self, Subscription) {
        let cell = Self::new(domain, source.get());
        let link = {
            let target = cell.clone();
            source.subscribe(move |value: &T| {
                target.set(value.clone());
            })
        };
        // Catch a commit that landed between the first read and subscribing.
        cell.set(source.get());
        (cell, link)
    }
}

impl<T: CellValue> Dependency for StateCell<T> {
    fn node_ref(&self) -> NodeRef {
        NodeRef {
            node: self.core.node(),
            domain: self.core.domain.clone(),
        }
    }
}

impl<T: CellValue> Observable<T> for StateCell<T> {
    fn get(&self) -> T {
        self.core.value.read().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.core.value.read())
    }

    fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.core.listeners.add(Arc::new(listener))
    }
}

impl<T: CellValue + std::fmt::Debug> std::fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("value", &*self.core.value.read())
            .field("version", &self.version())
            .finish()
    }
}

/// Read-only view of a [`StateCell`].
///
/// Handed out by components that own their state and mutate it only
/// through their own API.
pub struct ReadCell<T> {
    cell: StateCell<T>,
}

impl<T> Clone for ReadCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: CellValue> ReadCell<T> {
    pub fn version(&self) -> u64 {
        self.cell.version()
    }

    pub fn id(&self) -> NodeId {
        self.cell.id()
    }

    pub fn domain(&self) -> &Domain {
        self.cell.domain()
    }
}

impl<T: CellValue> Dependency for ReadCell<T> {
    fn node_ref(&self) -> NodeRef {
        self.cell.node_ref()
    }
}

impl<T: CellValue> Observable<T> for ReadCell<T> {
    fn get(&self) -> T {
        self.cell.get()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.cell.subscribe(listener)
    }
}

impl<T: CellValue + std::fmt::Debug> std::fmt::Debug for ReadCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadCell").field(&self.get()).finish()
    }
}

/// A value computed from other cells of the same domain.
///
/// Cells of another domain enter through [`StateCell::mirror`].
///
/// Derived cells are eager: they recompute during propagation, in rank
/// order, at most once per round. Listeners fire only when the recomputed
/// value differs from the cached one.
pub struct Derived<T> {
    core: Arc<CellCore<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: CellValue> Derived<T> {
    /// Build a derived cell over `dependencies`.
    ///
    /// `compute` must only read the listed dependencies; reads of other
    /// cells are not tracked.
    ///
    /// # Panics
    ///
    /// Panics if a dependency belongs to a different domain.
    pub fn combine(
        domain: &Domain,
        dependencies: &[&dyn Dependency],
        compute: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let refs: Vec<NodeRef> = dependencies.iter().map(|d| d.node_ref()).collect();
        for dependency in &refs {
            assert!(
                dependency.domain.same_as(domain),
                "derived cell in domain '{}' cannot depend on a cell of domain '{}'",
                domain.name(),
                dependency.domain.name(),
            );
        }
        let rank = refs.iter().map(|r| r.node.rank()).max().unwrap_or(0) + 1;

        let _writer = domain.write_lock();
        let initial = compute();
        let core = CellCore::new(domain, rank, initial, Some(Box::new(compute)));
        let node = core.node();
        for dependency in refs {
            dependency.node.add_dependent(Arc::downgrade(&node));
        }
        Self { core }
    }

    /// Derive from a single observable.
    pub fn map<S, O>(source: &O, map: impl Fn(&S) -> T + Send + Sync + 'static) -> Self
    where
        S: CellValue,
        O: Observable<S>,
    {
        let domain = source.node_ref().domain;
        let src = source.clone();
        let dependencies: [&dyn Dependency; 1] = [source];
        Self::combine(&domain, &dependencies, move || src.with(|v| map(v)))
    }

    /// Derive from two observables.
    pub fn map2<S1, S2, O1, O2>(
        s1: &O1,
        s2: &O2,
        map: impl Fn(&S1, &S2) -> T + Send + Sync + 'static,
    ) -> Self
    where
        S1: CellValue,
        S2: CellValue,
        O1: Observable<S1>,
        O2: Observable<S2>,
    {
        let domain = s1.node_ref().domain;
        let (a, b) = (s1.clone(), s2.clone());
        let dependencies: [&dyn Dependency; 2] = [s1, s2];
        Self::combine(&domain, &dependencies, move || {
            a.with(|v1| b.with(|v2| map(v1, v2)))
        })
    }

    /// Schedule a recomputation, e.g. after an untracked input changed.
    pub fn invalidate(&self) {
        self.core.domain.invalidate(&self.core.node());
    }

    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> NodeId {
        self.core.id
    }

    pub fn rank(&self) -> u32 {
        self.core.rank
    }

    pub fn domain(&self) -> &Domain {
        &self.core.domain
    }
}

impl<T: CellValue> Dependency for Derived<T> {
    fn node_ref(&self) -> NodeRef {
        NodeRef {
            node: self.core.node(),
            domain: self.core.domain.clone(),
        }
    }
}

impl<T: CellValue> Observable<T> for Derived<T> {
    fn get(&self) -> T {
        self.core.value.read().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.core.value.read())
    }

    fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.core.listeners.add(Arc::new(listener))
    }
}

impl<T: CellValue + std::fmt::Debug> std::fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("value", &*self.core.value.read())
            .field("rank", &self.core.rank)
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let hits = Arc::new(AtomicUsize::new(0));
        let read = {
            let hits = hits.clone();
            move || hits.load(Ordering::SeqCst)
        };
        (hits, read)
    }

    #[test]
    fn set_equal_value_is_noop() {
        let domain = Domain::new("test");
        let cell = StateCell::new(&domain, 3);
        let (hits, read) = counter();
        let _sub = cell.subscribe(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!cell.set(3));
        assert_eq!(cell.version(), 0);
        assert_eq!(read(), 0);

        assert!(cell.set(4));
        assert_eq!(cell.version(), 1);
        assert_eq!(read(), 1);
    }

    #[test]
    fn listener_sees_value_before_set_returns() {
        let domain = Domain::new("test");
        let cell = StateCell::new(&domain, String::from("a"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            cell.subscribe(move |v: &String| seen.lock().push(v.clone()))
        };

        cell.set("b".to_string());
        assert_eq!(*seen.lock(), vec!["b".to_string()]);
    }

    #[test]
    fn diamond_recomputes_once_with_settled_inputs() {
        let domain = Domain::new("test");
        let source = StateCell::new(&domain, 1);
        let doubled = Derived::map(&source, |v: &i32| v * 2);
        let negated = Derived::map(&source, |v: &i32| -v);

        let compute_count = Arc::new(AtomicUsize::new(0));
        let sum = {
            let compute_count = compute_count.clone();
            let (d, n) = (doubled.clone(), negated.clone());
            Derived::combine(&domain, &[&doubled, &negated], move || {
                compute_count.fetch_add(1, Ordering::SeqCst);
                d.get() + n.get()
            })
        };
        assert_eq!(sum.get(), 1);
        assert_eq!(sum.rank(), 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            sum.subscribe(move |v: &i32| seen.lock().push(*v))
        };

        compute_count.store(0, Ordering::SeqCst);
        source.set(5);

        assert_eq!(compute_count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![5]);
    }

    #[test]
    fn batch_coalesces_to_final_value() {
        let domain = Domain::new("test");
        let a = StateCell::new(&domain, 0);
        let b = StateCell::new(&domain, 0);
        let total = Derived::map2(&a, &b, |x: &i32, y: &i32| x + y);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            total.subscribe(move |v: &i32| seen.lock().push(*v))
        };

        domain.batch(|| {
            a.set(1);
            b.set(2);
            a.set(10);
        });

        assert_eq!(*seen.lock(), vec![12]);
        assert_eq!(total.version(), 1);
    }

    #[test]
    fn derived_silent_when_result_unchanged() {
        let domain = Domain::new("test");
        let source = StateCell::new(&domain, 2);
        let even = Derived::map(&source, |v: &i32| v % 2 == 0);
        let (hits, read) = counter();
        let _sub = even.subscribe(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        source.set(4);
        assert_eq!(read(), 0);
        source.set(5);
        assert_eq!(read(), 1);
        assert!(!even.get());
    }

    #[test]
    fn listener_mutation_joins_running_flush() {
        let domain = Domain::new("test");
        let input = StateCell::new(&domain, 0);
        let mirror = StateCell::new(&domain, 0);
        let _forward = {
            let mirror = mirror.clone();
            input.subscribe(move |v: &i32| {
                mirror.set(*v * 10);
            })
        };

        input.set(4);
        assert_eq!(mirror.get(), 40);
    }

    #[test]
    fn invalidate_picks_up_untracked_input() {
        let domain = Domain::new("test");
        let source = StateCell::new(&domain, 1);
        let external = Arc::new(AtomicUsize::new(0));
        let derived = {
            let external = external.clone();
            let src = source.clone();
            Derived::combine(&domain, &[&source], move || {
                src.get() + external.load(Ordering::SeqCst) as i32
            })
        };

        external.store(5, Ordering::SeqCst);
        assert_eq!(derived.get(), 1);
        derived.invalidate();
        assert_eq!(derived.get(), 6);
    }

    #[test]
    fn notify_current_redelivers() {
        let domain = Domain::new("test");
        let cell = StateCell::new(&domain, true);
        let (hits, read) = counter();
        let _sub = cell.subscribe(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        cell.notify_current();
        assert_eq!(read(), 1);
        assert_eq!(cell.version(), 0);
    }

    #[test]
    #[should_panic(expected = "cannot depend on a cell of domain")]
    fn cross_domain_dependency_panics() {
        let a = Domain::new("a");
        let b = Domain::new("b");
        let cell = StateCell::new(&a, 1);
        let _ = Derived::combine(&b, &[&cell], || 0);
    }

    #[test]
    fn mirror_follows_foreign_source() {
        let a = Domain::new("a");
        let b = Domain::new("b");
        let source = StateCell::new(&a, 1);
        let (copy, link) = StateCell::mirror(&b, &source);
        let doubled = Derived::map(&copy, |v: &i32| v * 2);
        assert_eq!(doubled.get(), 2);
        assert!(copy.domain().same_as(&b));

        source.set(5);
        assert_eq!(doubled.get(), 10);

        drop(link);
        source.set(7);
        assert_eq!(copy.get(), 5);
    }
}
