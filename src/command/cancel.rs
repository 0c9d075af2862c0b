use crate::lifecycle::Flag;

/// Cooperative cancellation token.
///
/// Cancelling never aborts running work. Commands check the token before
/// dispatching a body; bodies built with
/// [`Command::with_cancellation`](crate::command::Command::with_cancellation)
/// receive a clone and may poll it.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Flag,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        let first = self.flag.raise();
        if first {
            tracing::debug!("Cancellation requested");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.is_raised()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        self.flag.wait().await
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
