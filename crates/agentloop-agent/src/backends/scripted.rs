use super::LlmBackend;
use crate::config::CallConfig;
use crate::stream::{replay, DeltaStream, StreamDelta};
use agentloop_core::{AgentError, AgentResult, AssistantMessage, Context, Message};
use agentloop_skills::CapabilityDescriptor;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// One scripted provider turn.
#[derive(Debug)]
pub enum ScriptStep {
    /// Answer with this message.
    Reply(AssistantMessage),
    /// Fail with this error.
    Fail(AgentError),
    /// Stream these deltas (the non-streaming path assembles them).
    Stream(Vec<AgentResult<StreamDelta>>),
    /// Never answer; only cancellation ends the call.
    Hang,
}

type Fallback = Box<dyn Fn() -> AgentResult<AssistantMessage> + Send + Sync>;

/// A deterministic backend that replays a queue of scripted turns.
///
/// Used by tests and demos. Each call consumes the next step; once the queue
/// is empty the optional fallback answers, otherwise the call fails. Every
/// request's messages are recorded for later inspection.
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<Fallback>,
    requests: Mutex<Vec<Vec<Message>>>,
    call_count: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// A backend that answers every call with `reply`.
    pub fn always(reply: AssistantMessage) -> Self {
        Self::new([]).otherwise(move || Ok(reply.clone()))
    }

    /// Sets the answer used once the scripted steps run out.
    pub fn otherwise<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> AgentResult<AssistantMessage> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Appends a step to the end of the script.
    pub fn push(&self, step: ScriptStep) {
        self.steps.lock().push_back(step);
    }

    /// Number of `chat`/`chat_stream` calls made so far.
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Messages passed to each call, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }

    fn next_step(&self, messages: &[Message]) -> Option<ScriptStep> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(messages.to_vec());
        self.steps.lock().pop_front()
    }

    fn fallback_reply(&self) -> AgentResult<AssistantMessage> {
        match &self.fallback {
            Some(f) => f(),
            None => Err(AgentError::Config("scripted backend: no more steps".into())),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn chat(
        &self,
        ctx: &Context,
        messages: &[Message],
        _tools: &[CapabilityDescriptor],
        _config: &CallConfig,
    ) -> AgentResult<AssistantMessage> {
        match self.next_step(messages) {
            Some(ScriptStep::Reply(reply)) => Ok(reply),
            Some(ScriptStep::Fail(err)) => Err(err),
            Some(ScriptStep::Stream(deltas)) => {
                let stream = futures_util::stream::iter(deltas).boxed();
                crate::stream::accumulate(ctx, stream, &Default::default(), |_| Ok(())).await
            }
            Some(ScriptStep::Hang) => Err(ctx.done().await),
            None => self.fallback_reply(),
        }
    }

    async fn chat_stream(
        &self,
        ctx: &Context,
        messages: &[Message],
        _tools: &[CapabilityDescriptor],
        _config: &CallConfig,
    ) -> AgentResult<DeltaStream> {
        match self.next_step(messages) {
            Some(ScriptStep::Reply(reply)) => Ok(replay(reply)),
            Some(ScriptStep::Fail(err)) => Err(err),
            Some(ScriptStep::Stream(deltas)) => Ok(futures_util::stream::iter(deltas).boxed()),
            Some(ScriptStep::Hang) => Err(ctx.done().await),
            None => self.fallback_reply().map(replay),
        }
    }
}
