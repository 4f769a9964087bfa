pub mod scripted;

use crate::config::CallConfig;
use crate::stream::{replay, DeltaStream};
use agentloop_core::{AgentResult, AssistantMessage, Context, Message};
use agentloop_skills::CapabilityDescriptor;
use async_trait::async_trait;

/// Trait for LLM provider backends.
///
/// Each provider adapter (OpenAI-compatible, Gemini, MCP-backed, etc.)
/// implements this trait to handle wire-format translation. Implementations
/// make exactly one request per call and never retry on their own; retries
/// belong to [`CallDispatcher`](crate::CallDispatcher).
///
/// Errors should be mapped onto `AgentError::Provider` (with the HTTP status
/// when there is one) or `AgentError::Transport`, so the retry classifier can
/// tell transient failures from fatal ones.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Non-streaming chat completion.
    async fn chat(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
    ) -> AgentResult<AssistantMessage>;

    /// Streaming chat completion.
    ///
    /// The default implementation calls [`LlmBackend::chat`] and replays the
    /// complete answer as a single round of deltas.
    async fn chat_stream(
        &self,
        ctx: &Context,
        messages: &[Message],
        tools: &[CapabilityDescriptor],
        config: &CallConfig,
    ) -> AgentResult<DeltaStream> {
        let message = self.chat(ctx, messages, tools, config).await?;
        Ok(replay(message))
    }
}
