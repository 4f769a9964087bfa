use crate::backends::LlmBackend;
use crate::config::CallConfig;
use crate::stream::DeltaStream;
use agentloop_core::{AgentError, AgentResult, AssistantMessage, Context, Message};
use agentloop_skills::CapabilityDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// An `LlmBackend` that tries an ordered list of backends, once each.
///
/// A failure moves on to the next backend; when every backend has failed the
/// last error is returned. Cancellation stops the walk immediately. This type
/// does not retry or sleep: wrap it in a
/// [`CallDispatcher`](crate::CallDispatcher) to retry the whole chain.
pub struct FailoverBackend {
    backends: Vec<Arc<dyn LlmBackend>>,
}

impl FailoverBackend {
    /// Create a failover chain. At least one backend is required.
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>) -> AgentResult<Self> {
        if backends.is_empty() {
            return Err(AgentError::Config(
                "FailoverBackend requires at least one backend".into(),
            ));
        }
        Ok(Self { backends })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[async_trait]
impl LlmBackend for FailoverBackend {
    async fn chat(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
    ) -> AgentResult<AssistantMessage> {
        let mut last_err: Option<AgentError> = None;

        for (backend_idx, backend) in self.backends.iter().enumerate() {
            match backend.chat(ctx, messages, tools, config).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(
                        backend = backend_idx,
                        error = %e,
                        "Backend failed, moving to next backend"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| AgentError::Config("All failover backends exhausted".into())))
    }

    async fn chat_stream(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
    ) -> AgentResult<DeltaStream> {
        let mut last_err: Option<AgentError> = None;

        for (backend_idx, backend) in self.backends.iter().enumerate() {
            match backend.chat_stream(ctx, messages, tools, config).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(
                        backend = backend_idx,
                        error = %e,
                        "Backend failed to open stream, moving to next backend"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            AgentError::Config("All failover backends exhausted (stream)".into())
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
