use crate::backends::LlmBackend;
use crate::config::{AgentConfig, CallConfig, ReasoningMarkers, UnknownToolPolicy};
use crate::dispatcher::CallDispatcher;
use crate::stream::StreamChunk;
use agentloop_core::{
    AgentError, AgentResult, AssistantMessage, Context, Message, ToolMessage, Transcript,
};
use agentloop_skills::ToolTable;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a completed agentic loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// The final assistant message (the one with no tool calls).
    pub message: AssistantMessage,
    /// Model calls made, counting each successful dispatcher call once.
    pub model_calls: u32,
    /// Tool calls handled, including ones answered with an error message.
    pub tool_calls: u32,
}

/// The Agent Runner: orchestrates the agentic loop.
/// Prompt → LLM → ToolCall → Execute Capability → Backfill → Repeat.
///
/// A runner is immutable once built and may drive any number of concurrent
/// runs, each over its own transcript.
pub struct AgentRunner {
    dispatcher: CallDispatcher,
    tools: Arc<ToolTable>,
    call_config: CallConfig,
    markers: ReasoningMarkers,
    unknown_tool: UnknownToolPolicy,
    max_iterations: u32,
}

impl AgentRunner {
    pub fn new(backend: Arc<dyn LlmBackend>, tools: Arc<ToolTable>, config: AgentConfig) -> Self {
        Self {
            dispatcher: CallDispatcher::new(backend, config.retry),
            tools,
            call_config: config.call,
            markers: config.reasoning,
            unknown_tool: config.unknown_tool,
            max_iterations: config.max_iterations,
        }
    }

    /// Build a runner around an already configured dispatcher.
    pub fn from_dispatcher(
        dispatcher: CallDispatcher,
        tools: Arc<ToolTable>,
        config: AgentConfig,
    ) -> Self {
        Self {
            dispatcher,
            tools,
            call_config: config.call,
            markers: config.reasoning,
            unknown_tool: config.unknown_tool,
            max_iterations: config.max_iterations,
        }
    }

    pub fn tools(&self) -> &Arc<ToolTable> {
        &self.tools
    }

    pub fn dispatcher(&self) -> &CallDispatcher {
        &self.dispatcher
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the agentic loop over `transcript` until the model stops asking
    /// for tools. Messages are only ever appended to `transcript`, including
    /// when the run fails.
    pub async fn run(&self, ctx: &Context, transcript: &mut Transcript) -> AgentResult<RunOutcome> {
        self.run_with(ctx, transcript, |_| Ok(())).await
    }

    /// Like [`AgentRunner::run`], handing streamed output to `on_chunk` when
    /// the call config enables streaming.
    pub async fn run_with<F>(
        &self,
        ctx: &Context,
        transcript: &mut Transcript,
        mut on_chunk: F,
    ) -> AgentResult<RunOutcome>
    where
        F: FnMut(&StreamChunk) -> AgentResult<()> + Send,
    {
        let tools = self.tools.descriptors();
        let mut model_calls = 0;
        let mut tool_calls = 0;

        info!(
            messages = transcript.len(),
            tools = tools.len(),
            streaming = self.call_config.is_streaming(),
            "Starting agentic loop"
        );

        for iteration in 0..self.max_iterations {
            info!(iteration, "Agentic loop turn");

            let call = if self.call_config.is_streaming() {
                self.dispatcher
                    .invoke_stream(
                        ctx,
                        transcript.messages(),
                        &tools,
                        &self.call_config,
                        &self.markers,
                        &mut on_chunk,
                    )
                    .await
            } else {
                self.dispatcher
                    .invoke(ctx, transcript.messages(), &tools, &self.call_config)
                    .await
            };

            let response = match call {
                Ok(response) => response,
                Err(e) => {
                    error!(iteration, error = %e, "Model call failed, ending run");
                    return Err(e);
                }
            };
            model_calls += 1;
            transcript.push(Message::Assistant(response.clone()));

            if !response.has_tool_calls() {
                info!(turns = iteration + 1, "Agentic loop completed");
                return Ok(RunOutcome {
                    message: response,
                    model_calls,
                    tool_calls,
                });
            }

            for call in &response.tool_calls {
                info!(tool = %call.name, call_id = %call.id, "Executing tool call");
                tool_calls += 1;

                match self.tools.execute(call).await {
                    Some(tool_msg) => transcript.push(tool_msg),
                    None => match self.unknown_tool {
                        UnknownToolPolicy::Report => {
                            warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
                            transcript.push(ToolMessage::error(
                                call,
                                format!("unknown tool: {}", call.name),
                            ));
                        }
                        UnknownToolPolicy::Skip => {
                            warn!(
                                tool = %call.name,
                                call_id = %call.id,
                                "Unknown tool requested, skipping"
                            );
                        }
                    },
                }
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Agentic loop reached max iterations"
        );

        Err(AgentError::ToolLoopExceeded {
            max_iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::scripted::{ScriptStep, ScriptedBackend};
    use crate::config::RetryPolicy;
    use agentloop_core::ToolCall;

    fn config(max_iterations: u32) -> AgentConfig {
        AgentConfig {
            max_iterations,
            retry: RetryPolicy::immediate(0),
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn no_tool_calls_finishes_in_one_turn() {
        let reply = AssistantMessage::text("done");
        let backend = Arc::new(ScriptedBackend::new([ScriptStep::Reply(reply.clone())]));
        let runner = AgentRunner::new(backend.clone(), Arc::new(ToolTable::new()), config(4));

        let mut transcript = Transcript::from(vec![Message::user("hi")]);
        let outcome = runner.run(&Context::new(), &mut transcript).await.unwrap();

        assert_eq!(outcome.message, reply);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(transcript.len(), 2);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_skip_policy_appends_nothing() {
        let backend = Arc::new(ScriptedBackend::new([
            ScriptStep::Reply(AssistantMessage::with_tool_calls(
                "",
                vec![ToolCall::new("call_1", "missing", "{}")],
            )),
            ScriptStep::Reply(AssistantMessage::text("fine")),
        ]));
        let mut cfg = config(4);
        cfg.unknown_tool = UnknownToolPolicy::Skip;
        let runner = AgentRunner::new(backend, Arc::new(ToolTable::new()), cfg);

        let mut transcript = Transcript::from(vec![Message::user("go")]);
        let outcome = runner.run(&Context::new(), &mut transcript).await.unwrap();

        assert_eq!(outcome.message.content, "fine");
        assert_eq!(outcome.tool_calls, 1);
        // user, assistant(tool call), assistant(final)
        assert_eq!(transcript.len(), 3);
        assert!(transcript.messages().iter().all(|m| m.as_tool().is_none()));
    }
}
