//! Observable state cells.
//!
//! The building block under every public stream in this crate:
//!
//! - [`StateCell`]: a mutable source value with change notification.
//! - [`ReadCell`]: a read-only view handed out by owning components.
//! - [`Derived`]: a value computed from other cells, recomputed eagerly and
//!   glitch-free during propagation.
//! - [`Domain`]: the single-writer domain that serializes mutations and
//!   batches propagation (see [`Domain::batch`]).
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per committed change.
//! 2. Listeners of one cell are notified in registration order and in
//!    commit order.
//! 3. A single causal update recomputes each derived cell at most once, after
//!    all of its inputs have settled.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.

mod domain;
mod state;
mod subscription;

pub use domain::{Domain, NodeId};
pub use state::{Derived, ReadCell, StateCell};
pub use subscription::Subscription;

pub(crate) use domain::Node;
pub(crate) use subscription::{Callback, Listeners};

use std::sync::Arc;

/// Values that can live in a cell.
pub trait CellValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> CellValue for T {}

/// Opaque link to a graph node, used to wire derived cells.
pub struct NodeRef {
    pub(crate) node: Arc<dyn Node>,
    pub(crate) domain: Domain,
}

/// Something a [`Derived`] cell can depend on.
pub trait Dependency {
    fn node_ref(&self) -> NodeRef;
}

/// Read and subscribe access shared by [`StateCell`] and [`Derived`].
pub trait Observable<T: CellValue>: Dependency + Clone + Send + Sync + 'static {
    /// Snapshot of the current value.
    fn get(&self) -> T;

    /// Borrow the current value without cloning.
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Register a change listener.
    fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription;
}
