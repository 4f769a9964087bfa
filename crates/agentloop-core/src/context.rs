use crate::error::{AgentError, AgentResult};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation scope for one run.
///
/// A cheap-to-clone handle that combines an explicit cancellation token with an
/// optional deadline. Every suspension point in the core (provider calls,
/// backoff waits, stream reads) races its work against [`Context::done`].
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    /// Wraps an existing token, e.g. one owned by a parent task.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets the deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// A child scope: cancelled whenever `self` is, cancellable on its own
    /// without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this scope and all its children.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Context cancelled");
        }
        self.token.cancel();
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason this context is finished, or `None` if it is still live.
    pub fn err(&self) -> Option<AgentError> {
        if self.token.is_cancelled() {
            return Some(AgentError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(AgentError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns `Err` if the context is already finished.
    pub fn check(&self) -> AgentResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> AgentError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => AgentError::Cancelled,
                () = tokio::time::sleep_until(deadline) => AgentError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                AgentError::Cancelled
            }
        }
    }

    /// Sleeps for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> AgentResult<()> {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
