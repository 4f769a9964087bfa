use crate::backends::LlmBackend;
use crate::backoff::Backoff;
use crate::classify::{classify, ErrorClass};
use crate::config::{CallConfig, ReasoningMarkers, RetryPolicy};
use crate::stream::{ChunkStream, StreamChunk};
use agentloop_core::{AgentError, AgentResult, AssistantMessage, Context, Message};
use agentloop_skills::CapabilityDescriptor;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wraps a provider backend with the retry loop.
///
/// Holds no mutable state, so one dispatcher can serve concurrent callers;
/// per-call tunables travel in the immutable [`CallConfig`] each call gets.
pub struct CallDispatcher {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
    backoff: Backoff,
}

impl CallDispatcher {
    /// Dispatcher over `backend`, with backoff derived from `policy`.
    pub fn new(backend: Arc<dyn LlmBackend>, policy: RetryPolicy) -> Self {
        let backoff = Backoff::from_policy(&policy);
        Self {
            backend,
            policy,
            backoff,
        }
    }

    /// Replace the backoff schedule derived from the policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    fn max_retries(&self, config: &CallConfig) -> u32 {
        config.max_retries().unwrap_or(self.policy.max_retries)
    }

    /// One model call with retries.
    ///
    /// Makes up to `max_retries + 1` attempts. Fatal errors come back wrapped
    /// in [`AgentError::NonRetryable`] after a single attempt; cancellation
    /// comes back as the context's own error; exhausted retries come back as
    /// [`AgentError::Temporary`].
    pub async fn invoke(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
    ) -> AgentResult<AssistantMessage> {
        let max_retries = self.max_retries(config);
        let mut attempt = 0;

        loop {
            let result = tokio::select! {
                biased;
                err = ctx.done() => Err(err),
                res = self.backend.chat(ctx, messages, tools, config) => res,
            };

            match result {
                Ok(message) => {
                    debug!(attempt, "Model call succeeded");
                    return Ok(message);
                }
                Err(e) => self.before_retry(ctx, e, attempt, max_retries).await?,
            }
            attempt += 1;
        }
    }

    /// One streaming model call with retries.
    ///
    /// Chunks go to `on_chunk` as they are produced. Failures before the first
    /// chunk is delivered are retried like [`CallDispatcher::invoke`]; after
    /// that, any failure (including one returned by `on_chunk`) ends the call,
    /// since a retry would hand the caller the same text twice.
    pub async fn invoke_stream<F>(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
        markers: &ReasoningMarkers,
        mut on_chunk: F,
    ) -> AgentResult<AssistantMessage>
    where
        F: FnMut(&StreamChunk) -> AgentResult<()> + Send,
    {
        let max_retries = self.max_retries(config);
        let mut attempt = 0;

        loop {
            let mut delivered = false;
            let result = self
                .stream_once(ctx, messages, tools, config, markers, &mut on_chunk, &mut delivered)
                .await;

            match result {
                Ok(message) => return Ok(message),
                Err(e) if delivered => {
                    warn!(
                        attempt,
                        error = %e,
                        "Stream failed after delivering output, not retrying"
                    );
                    return Err(e);
                }
                Err(e) => self.before_retry(ctx, e, attempt, max_retries).await?,
            }
            attempt += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_once<F>(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
        markers: &ReasoningMarkers,
        on_chunk: &mut F,
        delivered: &mut bool,
    ) -> AgentResult<AssistantMessage>
    where
        F: FnMut(&StreamChunk) -> AgentResult<()> + Send,
    {
        let opened = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            res = self.backend.chat_stream(ctx, messages, tools, config) => res,
        };
        let deltas = opened?;

        let mut stream = ChunkStream::new(ctx.clone(), deltas, markers.clone());
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            *delivered = true;
            on_chunk(&chunk)?;
        }
        stream.finish()
    }

    /// Decides what follows a failed attempt. `Ok(())` means the backoff
    /// wait is over and the caller should try again.
    async fn before_retry(
        &self,
        ctx: &Context,
        err: AgentError,
        attempt: u32,
        max_retries: u32,
    ) -> AgentResult<()> {
        if err.is_cancellation() {
            info!(attempt, error = %err, "Model call cancelled");
            return Err(err);
        }

        if classify(&err) == ErrorClass::Fatal {
            warn!(attempt, error = %err, "Non-retryable model error");
            return Err(AgentError::NonRetryable(Box::new(err)));
        }

        if attempt >= max_retries {
            warn!(
                attempts = attempt + 1,
                error = %err,
                "Retries exhausted for model call"
            );
            return Err(err.into_temporary());
        }

        let delay = self.backoff.delay(attempt);
        info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retryable model error, backing off"
        );
        self.backoff.wait(ctx, delay).await
    }
}
