//! Validated, change-notifying value slots.

use std::sync::Arc;

use crate::cell::{CellValue, Dependency, NodeRef, Observable, ReadCell, StateCell, Subscription};
use crate::error::DisposeError;
use crate::lifecycle::{Disposable, LifecycleScope};
use crate::validation::{ErrorsContainer, ValidationOutcome};

type Validator<T> = Box<dyn Fn(&T) -> ValidationOutcome + Send + Sync>;
type ChangeHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// What [`ReactiveProperty::set_value`] did with the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Committed,
    /// Valid but equal to the current value.
    Unchanged,
    /// Failed validation; the current value is kept.
    Rejected(String),
}

/// A validated value slot owned by a view-model.
///
/// # Invariants
///
/// 1. A value failing validation is never committed and never notified.
/// 2. A value equal to the current one is never notified.
/// 3. The committed value, [`is_valid`](Self::is_valid) and the recorded
///    errors change in one causal update.
pub struct ReactiveProperty<T> {
    inner: Arc<PropertyInner<T>>,
}

struct PropertyInner<T> {
    name: String,
    value: StateCell<T>,
    is_valid: StateCell<bool>,
    validate: Option<Validator<T>>,
    errors: Option<ErrorsContainer>,
    on_change: Option<ChangeHook<T>>,
}

impl<T> Clone for ReactiveProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CellValue> ReactiveProperty<T> {
    /// An unvalidated property.
    pub fn new(scope: &LifecycleScope, name: impl Into<String>, initial: T) -> Self {
        Self::builder(name, initial).build(scope)
    }

    pub fn builder(name: impl Into<String>, initial: T) -> PropertyBuilder<T> {
        PropertyBuilder {
            name: name.into(),
            initial,
            validate: None,
            errors: None,
            on_change: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn get_value(&self) -> T {
        self.inner.value.get()
    }

    /// Validate and commit `value`.
    ///
    /// Listeners have run when this returns, unless a batch is open on the
    /// domain.
    pub fn set_value(&self, value: T) -> SetOutcome {
        let inner = &self.inner;
        let outcome = inner
            .validate
            .as_ref()
            .map(|validate| validate(&value))
            .unwrap_or(ValidationOutcome::Valid);

        inner.value.domain().batch(|| match outcome {
            ValidationOutcome::Invalid(message) => {
                inner.is_valid.set(false);
                if let Some(errors) = &inner.errors {
                    errors.set_errors(inner.name.as_str(), [message.as_str()]);
                }
                tracing::debug!(property = %inner.name, reason = %message, "Value rejected");
                SetOutcome::Rejected(message)
            }
            ValidationOutcome::Valid => {
                inner.is_valid.set(true);
                if let Some(errors) = &inner.errors {
                    if errors.has_errors_for(&inner.name) {
                        errors.clear_errors(Some(&inner.name));
                    }
                }
                if !inner.value.set(value) {
                    return SetOutcome::Unchanged;
                }
                if let Some(hook) = &inner.on_change {
                    let hook = Arc::clone(hook);
                    let committed = inner.value.get();
                    inner.value.domain().defer(move || hook(&committed));
                }
                SetOutcome::Committed
            }
        })
    }

    /// Validity of the last attempted value, starting with the initial one.
    pub fn is_valid(&self) -> ReadCell<bool> {
        self.inner.is_valid.read_only()
    }

    pub fn version(&self) -> u64 {
        self.inner.value.version()
    }
}

impl<T: CellValue> Dependency for ReactiveProperty<T> {
    fn node_ref(&self) -> NodeRef {
        self.inner.value.node_ref()
    }
}

impl<T: CellValue> Observable<T> for ReactiveProperty<T> {
    fn get(&self) -> T {
        self.inner.value.get()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.value.with(f)
    }

    fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.value.subscribe(listener)
    }
}

impl<T: CellValue> Disposable for ReactiveProperty<T> {
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.value.clear_listeners();
        self.inner.is_valid.clear_listeners();
        Ok(())
    }

    fn name(&self) -> String {
        format!("property '{}'", self.inner.name)
    }
}

impl<T: CellValue + std::fmt::Debug> std::fmt::Debug for ReactiveProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveProperty")
            .field("name", &self.inner.name)
            .field("value", &self.inner.value.get())
            .field("valid", &self.inner.is_valid.get())
            .finish()
    }
}

/// Builder for [`ReactiveProperty`].
pub struct PropertyBuilder<T> {
    name: String,
    initial: T,
    validate: Option<Validator<T>>,
    errors: Option<ErrorsContainer>,
    on_change: Option<ChangeHook<T>>,
}

impl<T: CellValue> PropertyBuilder<T> {
    pub fn validate<V>(mut self, validate: impl Fn(&T) -> V + Send + Sync + 'static) -> Self
    where
        V: Into<ValidationOutcome>,
    {
        self.validate = Some(Box::new(move |value| validate(value).into()));
        self
    }

    /// Record validation messages under the property name.
    pub fn errors(mut self, errors: &ErrorsContainer) -> Self {
        self.errors = Some(errors.clone());
        self
    }

    /// Called after every commit, in the notify phase.
    pub fn on_change(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(hook));
        self
    }

    /// Validate the initial value, create the cells and hand the property to
    /// `scope`.
    pub fn build(self, scope: &LifecycleScope) -> ReactiveProperty<T> {
        let initial_outcome = self
            .validate
            .as_ref()
            .map(|validate| validate(&self.initial))
            .unwrap_or(ValidationOutcome::Valid);

        if let (ValidationOutcome::Invalid(message), Some(errors)) = (&initial_outcome, &self.errors)
        {
            errors.set_errors(self.name.as_str(), [message.as_str()]);
        }

        let property = ReactiveProperty {
            inner: Arc::new(PropertyInner {
                value: StateCell::new(scope.domain(), self.initial),
                is_valid: StateCell::new(scope.domain(), initial_outcome.is_valid()),
                name: self.name,
                validate: self.validate,
                errors: self.errors,
                on_change: self.on_change,
            }),
        };
        scope.own(property.clone());
        property
    }
}
