use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

type Reply<R> = Box<dyn FnOnce(R) + Send>;

/// Shared answer slot of one interaction.
///
/// Every consumer that received the interaction holds a clone. The first
/// [`respond`](Self::respond) wins; later calls are ignored and return
/// `false`. If every clone is dropped unanswered the interaction is
/// abandoned: a warning is logged and the producer's callback never runs.
pub struct Responder<R> {
    inner: Arc<ResponderInner<R>>,
}

struct ResponderInner<R> {
    request: String,
    reply: Mutex<Option<Reply<R>>>,
}

impl<R> Clone for Responder<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + 'static> Responder<R> {
    /// A responder that hands the answer to `callback`.
    pub fn new(request: impl Into<String>, callback: impl FnOnce(R) + Send + 'static) -> Self {
        Self {
            inner: Arc::new(ResponderInner {
                request: request.into(),
                reply: Mutex::new(Some(Box::new(callback))),
            }),
        }
    }

    /// A responder whose answer arrives on the returned receiver. The
    /// receiver errors if the responder is abandoned.
    pub fn channel(request: impl Into<String>) -> (Self, oneshot::Receiver<R>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self::new(request, move |value| {
            // The producer may have stopped waiting.
            let _ = tx.send(value);
        });
        (responder, rx)
    }

    /// Deliver the answer. Returns `false` if one was already delivered.
    pub fn respond(&self, value: R) -> bool {
        let reply = self.inner.reply.lock().take();
        match reply {
            Some(reply) => {
                reply(value);
                true
            }
            None => {
                tracing::debug!(request = %self.inner.request, "Duplicate response ignored");
                false
            }
        }
    }
}

impl<R> Responder<R> {
    pub fn is_answered(&self) -> bool {
        self.inner.reply.lock().is_none()
    }

    pub fn request(&self) -> &str {
        &self.inner.request
    }

    /// Drop the callback without answering or warning.
    pub(crate) fn disarm(&self) {
        self.inner.reply.lock().take();
    }
}

impl<R> Drop for ResponderInner<R> {
    fn drop(&mut self) {
        if self.reply.get_mut().is_some() {
            tracing::warn!(request = %self.request, "Interaction abandoned without a response");
        }
    }
}

impl<R> std::fmt::Debug for Responder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("request", &self.inner.request)
            .field("answered", &self.is_answered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn first_response_wins() {
        let hits = Arc::new(AtomicUsize::new(0));
        let responder = {
            let hits = hits.clone();
            Responder::new("confirm", move |value: usize| {
                hits.fetch_add(value, Ordering::SeqCst);
            })
        };
        let other = responder.clone();

        assert!(responder.respond(1));
        assert!(!other.respond(10));
        assert!(other.is_answered());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_responder_closes_channel() {
        let (responder, rx) = Responder::<bool>::channel("confirm");
        drop(responder);
        assert!(rx.await.is_err());
    }
}
