//! Request/response channel from view-model logic to the presentation layer.
//!
//! The view-model raises an [`InteractionRequest`] with a context; attached
//! consumers (the view) receive an [`Interaction`] and answer through its
//! shared [`Responder`]. Neither side references the other.

mod responder;

pub use responder::Responder;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{Callback, Listeners, Subscription};
use crate::config::UnattendedPolicy;
use crate::error::{DisposeError, InteractionError};
use crate::lifecycle::{Disposable, LifecycleScope};

/// One raised request as seen by a consumer.
pub struct Interaction<C, R> {
    pub context: C,
    pub responder: Responder<R>,
}

/// What [`InteractionRequest::raise`] did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaiseOutcome {
    /// Delivered to this many consumers.
    Delivered(usize),
    /// No consumer; kept for the next one (`ReplayLast`).
    Buffered,
    /// No consumer; dropped (`DropAndWarn`).
    Dropped,
}

/// Context for a yes/no question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub title: String,
    pub content: String,
}

impl Confirmation {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Context for an acknowledgement-only message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub content: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

pub type ConfirmationRequest = InteractionRequest<Confirmation, bool>;
pub type NotificationRequest = InteractionRequest<Notification, ()>;

/// Single-shot, typed request channel.
///
/// `raise` is synchronous: attached consumers have been called when it
/// returns. A request raised with no consumer attached follows the
/// [`UnattendedPolicy`] of the owning scope's configuration.
pub struct InteractionRequest<C, R> {
    inner: Arc<RequestInner<C, R>>,
}

struct RequestInner<C, R> {
    name: String,
    policy: UnattendedPolicy,
    consumers: Listeners<Interaction<C, R>>,
    pending: Mutex<Option<Interaction<C, R>>>,
}

impl<C, R> Clone for InteractionRequest<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, R> InteractionRequest<C, R>
where
    C: Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new(scope: &LifecycleScope, name: impl Into<String>) -> Self {
        Self::with_policy(scope, name, scope.config().interaction.unattended)
    }

    pub fn with_policy(scope: &LifecycleScope, name: impl Into<String>, policy: UnattendedPolicy) -> Self {
        let request = Self {
            inner: Arc::new(RequestInner {
                name: name.into(),
                policy,
                consumers: Listeners::new(),
                pending: Mutex::new(None),
            }),
        };
        scope.own(request.clone());
        request
    }

    /// Attach a consumer. Under `ReplayLast` a buffered request is delivered
    /// to it before this returns.
    pub fn subscribe(
        &self,
        consumer: impl Fn(&Interaction<C, R>) + Send + Sync + 'static,
    ) -> Subscription {
        let consumer: Callback<Interaction<C, R>> = Arc::new(consumer);
        let subscription = self.inner.consumers.add(Arc::clone(&consumer));
        let replay = self.inner.pending.lock().take();
        if let Some(interaction) = replay {
            tracing::debug!(request = %self.inner.name, "Replaying buffered interaction");
            consumer(&interaction);
        }
        subscription
    }

    /// Deliver `context` to every attached consumer. `callback` runs at most
    /// once, with the first response.
    pub fn raise(&self, context: C, callback: impl FnOnce(R) + Send + 'static) -> RaiseOutcome {
        let interaction = Interaction {
            context,
            responder: Responder::new(self.inner.name.clone(), callback),
        };

        let consumers = self.inner.consumers.len();
        if consumers > 0 {
            self.inner.consumers.emit(&interaction);
            return RaiseOutcome::Delivered(consumers);
        }

        match self.inner.policy {
            UnattendedPolicy::ReplayLast => {
                tracing::debug!(request = %self.inner.name, "No consumer attached; buffering");
                // A previously buffered request is replaced and abandoned.
                *self.inner.pending.lock() = Some(interaction);
                RaiseOutcome::Buffered
            }
            UnattendedPolicy::DropAndWarn => {
                tracing::warn!(request = %self.inner.name, "Interaction raised with no consumer attached; dropped");
                // Disarm the abandonment warning; the drop was already reported.
                interaction.responder.disarm();
                RaiseOutcome::Dropped
            }
        }
    }

    /// Raise and wait for the response.
    pub async fn raise_async(&self, context: C) -> Result<R, InteractionError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let outcome = self.raise(context, move |value| {
            let _ = tx.send(value);
        });
        if outcome == RaiseOutcome::Dropped {
            return Err(InteractionError::NoConsumer {
                request: self.inner.name.clone(),
            });
        }
        rx.await.map_err(|_| InteractionError::Abandoned {
            request: self.inner.name.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> UnattendedPolicy {
        self.inner.policy
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.len()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.pending.lock().is_some()
    }
}

impl<C, R> Disposable for InteractionRequest<C, R>
where
    C: Send + Sync + 'static,
    R: Send + 'static,
{
    fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.consumers.clear();
        self.inner.pending.lock().take();
        Ok(())
    }

    fn name(&self) -> String {
        format!("interaction '{}'", self.inner.name)
    }
}

impl<C: 'static, R: 'static> std::fmt::Debug for InteractionRequest<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionRequest")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.policy)
            .field("consumers", &self.inner.consumers.len())
            .finish()
    }
}
