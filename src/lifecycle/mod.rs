//! Ownership, teardown and the busy/dirty bookkeeping of a view-model.

mod busy;
mod dirty;
mod scope;
mod signal;

pub use busy::{BusyGuard, BusyScope};
pub use dirty::DirtyTracker;
pub use scope::{Disposable, LifecycleScope, ScopeBuilder};
pub use signal::TeardownSignal;

pub(crate) use signal::Flag;
