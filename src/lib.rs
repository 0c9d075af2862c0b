//! Reactive commands, properties and lifecycle scopes for MVVM view-models.
//!
//! A view-model owns a [`LifecycleScope`]. Everything it builds inside that
//! scope (properties, commands, error containers, interaction requests)
//! shares the scope's single-writer [`Domain`] and is torn down with it.
//!
//! State is exposed as observable cells ([`cell`]); derived state such as
//! `can_execute` is recomputed glitch-free, once per causal update.

pub mod active;
pub mod cell;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod interaction;
pub mod lifecycle;
pub mod logging;
pub mod property;
pub mod validation;
pub mod view_model;

pub use active::ActiveAwareness;
pub use cell::{Derived, Domain, Observable, ReadCell, StateCell, Subscription};
pub use command::{CancelToken, Command, CompositeAggregateError, CompositeCommand};
pub use config::{Config, ExecutionPolicy, UnattendedPolicy};
pub use diagnostics::{ConfigurationWarning, Diagnostics, WarningKind};
pub use error::{CommandError, DisposeError, InteractionError, LifecycleError};
pub use interaction::{Confirmation, InteractionRequest, Notification, Responder};
pub use lifecycle::{BusyScope, DirtyTracker, Disposable, LifecycleScope};
pub use property::{ReactiveProperty, SetOutcome};
pub use validation::{ErrorsContainer, ValidationOutcome};
pub use view_model::{Capabilities, ViewModel, ViewModelHost};
