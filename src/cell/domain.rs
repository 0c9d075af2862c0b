//! Single-writer propagation domain.
//!
//! Every cell belongs to exactly one [`Domain`]. The domain serializes
//! mutations behind a re-entrant writer lock and propagates changes in two
//! phases per round:
//!
//! 1. **Recompute**: dirty derived nodes are popped in `(rank, id)` order and
//!    recomputed once each. A node whose value changed marks its own
//!    dependents dirty; those always have a higher rank, so they are visited
//!    later in the same pass and see settled inputs.
//! 2. **Notify**: listeners of every node that changed are called with the
//!    final value, followed by deferred callbacks, in commit order.
//!
//! Mutations made by listeners during phase 2 start another round of the
//! same flush. A mutation outside any batch flushes before returning.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// Identity of a node inside a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// A vertex of the propagation graph.
pub(crate) trait Node: Send + Sync {
    fn id(&self) -> NodeId;
    fn rank(&self) -> u32;
    /// Recompute from dependencies; `true` when the stored value changed.
    fn recompute(&self) -> bool;
    fn dependents(&self) -> Vec<Arc<dyn Node>>;
    fn add_dependent(&self, dependent: Weak<dyn Node>);
    fn notify(&self);
}

enum Effect {
    Notify(Arc<dyn Node>),
    Call(Box<dyn FnOnce() + Send>),
}

#[derive(Default)]
struct Propagation {
    depth: usize,
    flushing: bool,
    dirty: BTreeMap<(u32, NodeId), Weak<dyn Node>>,
    effects: Vec<Effect>,
    queued: HashSet<NodeId>,
}

impl Propagation {
    fn mark_changed(&mut self, node: &Arc<dyn Node>) {
        if self.queued.insert(node.id()) {
            self.effects.push(Effect::Notify(Arc::clone(node)));
        }
        for dependent in node.dependents() {
            self.dirty.insert(
                (dependent.rank(), dependent.id()),
                Arc::downgrade(&dependent),
            );
        }
    }

    fn idle(&self) -> bool {
        self.depth == 0 && !self.flushing
    }
}

/// Shared handle to a single-writer domain.
///
/// Clones refer to the same domain. Child scopes of one view-model share it.
#[derive(Clone)]
pub struct Domain {
    inner: Arc<DomainInner>,
}

struct DomainInner {
    name: String,
    writer: ReentrantMutex<()>,
    state: Mutex<Propagation>,
    next_id: AtomicU64,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DomainInner {
                name: name.into(),
                writer: ReentrantMutex::new(()),
                state: Mutex::new(Propagation::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether both handles refer to the same domain.
    pub fn same_as(&self, other: &Domain) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` as one causal update.
    ///
    /// Values written inside `f` are visible immediately; derived nodes and
    /// listeners observe them once, when the outermost batch closes.
    /// Notifications coalesce per cell to the final value.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _writer = self.write_lock();
        self.inner.state.lock().depth += 1;
        let closing = scopeguard::guard((), |_| {
            let idle = {
                let mut state = self.inner.state.lock();
                state.depth -= 1;
                state.idle()
            };
            if idle {
                self.flush();
            }
        });
        let out = f();
        drop(closing);
        out
    }

    /// Whether a batch or flush is currently open on this domain.
    pub fn is_propagating(&self) -> bool {
        !self.inner.state.lock().idle()
    }

    pub(crate) fn next_id(&self) -> NodeId {
        NodeId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn write_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.writer.lock()
    }

    /// Record that a source node committed a new value.
    pub(crate) fn commit(&self, node: Arc<dyn Node>) {
        let _writer = self.write_lock();
        let idle = {
            let mut state = self.inner.state.lock();
            state.mark_changed(&node);
            state.idle()
        };
        if idle {
            self.flush();
        }
    }

    /// Re-deliver the node's current value without a value change.
    pub(crate) fn renotify(&self, node: Arc<dyn Node>) {
        let _writer = self.write_lock();
        let idle = {
            let mut state = self.inner.state.lock();
            if state.queued.insert(node.id()) {
                state.effects.push(Effect::Notify(node));
            }
            state.idle()
        };
        if idle {
            self.flush();
        }
    }

    /// Schedule a recomputation of a derived node.
    pub(crate) fn invalidate(&self, node: &Arc<dyn Node>) {
        let _writer = self.write_lock();
        let idle = {
            let mut state = self.inner.state.lock();
            state
                .dirty
                .insert((node.rank(), node.id()), Arc::downgrade(node));
            state.idle()
        };
        if idle {
            self.flush();
        }
    }

    /// Run `f` in the notify phase of the current causal update.
    pub(crate) fn defer(&self, f: impl FnOnce() + Send + 'static) {
        let _writer = self.write_lock();
        let idle = {
            let mut state = self.inner.state.lock();
            state.effects.push(Effect::Call(Box::new(f)));
            state.idle()
        };
        if idle {
            self.flush();
        }
    }

    fn flush(&self) {
        self.inner.state.lock().flushing = true;
        let _reset = scopeguard::guard((), |_| {
            self.inner.state.lock().flushing = false;
        });

        loop {
            loop {
                let next = self.inner.state.lock().dirty.pop_first();
                let Some((_, weak)) = next else { break };
                let Some(node) = weak.upgrade() else { continue };
                if node.recompute() {
                    self.inner.state.lock().mark_changed(&node);
                }
            }

            let effects = {
                let mut state = self.inner.state.lock();
                state.queued.clear();
                std::mem::take(&mut state.effects)
            };
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                match effect {
                    Effect::Notify(node) => node.notify(),
                    Effect::Call(f) => f(),
                }
            }
        }
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.inner.name)
            .field("propagating", &self.is_propagating())
            .finish()
    }
}
