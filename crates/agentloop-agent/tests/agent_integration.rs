//! End-to-end tests for agentloop-agent: dispatcher retries, backoff,
//! streaming accumulation and the agentic loop.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use agentloop_agent::{
    accumulate, AgentConfig, AgentRunner, Backoff, CallConfig, CallDispatcher, ReasoningMarkers,
    RetryPolicy, ScriptStep, ScriptedBackend, StreamChunk, StreamDelta, UnknownToolPolicy,
};
use agentloop_core::{
    AgentError, AssistantMessage, Context, Message, ToolCall, ToolResult, Transcript,
};
use agentloop_skills::ToolTable;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn dispatcher(backend: &Arc<ScriptedBackend>, max_retries: u32) -> CallDispatcher {
    CallDispatcher::new(backend.clone(), RetryPolicy::immediate(max_retries))
}

fn echo_table() -> Arc<ToolTable> {
    let tools = ToolTable::new();
    tools.register_fn(
        "echo",
        "Echo the given text",
        json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        |args| async move {
            match args.get("text").and_then(serde_json::Value::as_str) {
                Some(text) => Ok(ToolResult::success(text)),
                None => Err(AgentError::Tool("missing 'text'".into())),
            }
        },
    );
    Arc::new(tools)
}

fn agent_config(max_iterations: u32) -> AgentConfig {
    AgentConfig {
        max_iterations,
        retry: RetryPolicy::immediate(0),
        ..AgentConfig::default()
    }
}

fn echo_call(id: &str, arguments: &str) -> AssistantMessage {
    AssistantMessage::with_tool_calls("", vec![ToolCall::new(id, "echo", arguments)])
}

// ── Dispatcher: retries ─────────────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_then_success_uses_n_attempts() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Fail(AgentError::provider(503, "Service Unavailable")),
        ScriptStep::Fail(AgentError::Transport("connection reset by peer".into())),
        ScriptStep::Fail(AgentError::provider(429, "Too Many Requests")),
        ScriptStep::Reply(AssistantMessage::text("finally")),
    ]));

    let msg = dispatcher(&backend, 3)
        .invoke(&Context::new(), &[Message::user("hi")], &[], &CallConfig::default())
        .await
        .unwrap();

    assert_eq!(msg.content, "finally");
    assert_eq!(backend.calls(), 4);
}

#[tokio::test]
async fn fatal_error_is_not_retried() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Fail(AgentError::provider(401, "invalid api key")),
        ScriptStep::Reply(AssistantMessage::text("unreached")),
    ]));

    let err = dispatcher(&backend, 5)
        .invoke(&Context::new(), &[], &[], &CallConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::NonRetryable(_)), "got: {err}");
    assert!(!err.is_temporary());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_temporary_error() {
    let backend = Arc::new(
        ScriptedBackend::new([]).otherwise(|| Err(AgentError::provider(500, "boom"))),
    );

    let err = dispatcher(&backend, 2)
        .invoke(&Context::new(), &[], &[], &CallConfig::default())
        .await
        .unwrap_err();

    assert!(err.is_temporary(), "got: {err}");
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn zero_retries_means_single_attempt() {
    let backend = Arc::new(
        ScriptedBackend::new([]).otherwise(|| Err(AgentError::provider(503, "busy"))),
    );

    let err = dispatcher(&backend, 0)
        .invoke(&Context::new(), &[], &[], &CallConfig::default())
        .await
        .unwrap_err();

    assert!(err.is_temporary());
    assert_eq!(backend.calls(), 1);
}

// ── Dispatcher: cancellation ────────────────────────────────────────────────

#[tokio::test]
async fn cancel_during_backoff_returns_promptly() {
    let backend = Arc::new(
        ScriptedBackend::new([]).otherwise(|| Err(AgentError::provider(503, "busy"))),
    );
    let policy = RetryPolicy {
        max_retries: 5,
        backoff_base_ms: 60_000,
        backoff_max_ms: 60_000,
        jitter: 0.0,
    };
    let dispatcher = CallDispatcher::new(backend.clone(), policy);

    let ctx = Context::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = dispatcher
        .invoke(&ctx, &[], &[], &CallConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled), "got: {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn cancel_during_hanging_call() {
    let backend = Arc::new(ScriptedBackend::new([ScriptStep::Hang]));
    let ctx = Context::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = dispatcher(&backend, 3)
        .invoke(&ctx, &[], &[], &CallConfig::default())
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn deadline_ends_hanging_call() {
    let backend = Arc::new(ScriptedBackend::new([ScriptStep::Hang]));
    let ctx = Context::with_timeout(Duration::from_millis(30));

    let err = dispatcher(&backend, 3)
        .invoke(&ctx, &[], &[], &CallConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::DeadlineExceeded), "got: {err}");
}

// ── Backoff ─────────────────────────────────────────────────────────────────

#[test]
fn backoff_stays_within_jitter_bounds() {
    let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2), 0.2);

    for attempt in 0..8 {
        let nominal = backoff.base_delay(attempt).as_secs_f64();
        assert!(nominal <= 2.0 + f64::EPSILON);
        for _ in 0..50 {
            let d = backoff.delay(attempt).as_secs_f64();
            assert!(d >= nominal * 0.8 - 1e-9, "attempt {attempt}: {d} < {nominal}*0.8");
            assert!(d <= nominal * 1.2 + 1e-9, "attempt {attempt}: {d} > {nominal}*1.2");
        }
    }
}

// ── Streaming ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn streamed_chunks_concatenate_to_aggregate() {
    let parts = ["Sure. <th", "ink>let me ", "check</thi", "nk> The answer", " is 4."];
    let deltas = futures_util::stream::iter(
        parts
            .iter()
            .map(|p| Ok::<_, AgentError>(StreamDelta::text(*p)))
            .collect::<Vec<_>>(),
    )
    .boxed();

    let mut chunks: Vec<StreamChunk> = Vec::new();
    let msg = accumulate(&Context::new(), deltas, &ReasoningMarkers::default(), |c| {
        chunks.push(c.clone());
        Ok(())
    })
    .await
    .unwrap();

    let content: String = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Content(t) => Some(t.as_str()),
            StreamChunk::Reasoning(_) => None,
        })
        .collect();
    let reasoning: String = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Reasoning(t) => Some(t.as_str()),
            StreamChunk::Content(_) => None,
        })
        .collect();

    assert_eq!(content, msg.content);
    assert_eq!(msg.content, "Sure.  The answer is 4.");
    assert_eq!(reasoning, "let me check");
    assert_eq!(msg.reasoning.as_deref(), Some("let me check"));
}

#[tokio::test]
async fn stream_error_after_first_chunk_is_not_retried() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Stream(vec![
            Ok(StreamDelta::text("partial")),
            Err(AgentError::Transport("connection reset".into())),
        ]),
        ScriptStep::Reply(AssistantMessage::text("unreached")),
    ]));

    let mut seen = String::new();
    let err = dispatcher(&backend, 3)
        .invoke_stream(
            &Context::new(),
            &[],
            &[],
            &CallConfig::default(),
            &ReasoningMarkers::default(),
            |chunk| {
                seen.push_str(chunk.text());
                Ok(())
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Transport(_)), "got: {err}");
    assert_eq!(seen, "partial");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn stream_assembles_fragmented_tool_call() {
    let backend = Arc::new(ScriptedBackend::new([ScriptStep::Stream(vec![
        Ok(StreamDelta::ToolCall {
            index: 0,
            id: Some("call_a".into()),
            name: Some("echo".into()),
            arguments: "{\"te".into(),
        }),
        Ok(StreamDelta::ToolCall {
            index: 0,
            id: None,
            name: None,
            arguments: "xt\":\"hi\"}".into(),
        }),
    ])]));

    let msg = dispatcher(&backend, 0)
        .invoke_stream(
            &Context::new(),
            &[],
            &[],
            &CallConfig::default(),
            &ReasoningMarkers::default(),
            |_| Ok(()),
        )
        .await
        .unwrap();

    assert_eq!(msg.tool_calls.len(), 1);
    assert_eq!(msg.tool_calls[0].id, "call_a");
    assert_eq!(msg.tool_calls[0].name, "echo");
    assert_eq!(msg.tool_calls[0].arguments, "{\"text\":\"hi\"}");
}

// ── Agentic loop ────────────────────────────────────────────────────────────

#[tokio::test]
async fn echo_tool_round_trip() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(echo_call("call_1", r#"{"text":"hello"}"#)),
        ScriptStep::Reply(AssistantMessage::text("hello")),
    ]));
    let runner = AgentRunner::new(backend.clone(), echo_table(), agent_config(8));

    let mut transcript = Transcript::from(vec![Message::user("say hello")]);
    let outcome = runner.run(&Context::new(), &mut transcript).await.unwrap();

    assert_eq!(outcome.message.content, "hello");
    assert_eq!(outcome.model_calls, 2);
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(backend.calls(), 2);

    let tool_msg = transcript.messages()[2].as_tool().unwrap();
    assert_eq!(tool_msg.tool_call_id, "call_1");
    assert_eq!(tool_msg.content, "hello");
    assert!(!tool_msg.is_error);

    // The second request saw the tool result.
    let second = &backend.requests()[1];
    assert_eq!(second.len(), 3);
    assert!(second[2].as_tool().is_some());
}

#[tokio::test]
async fn invalid_arguments_are_reported_to_the_model() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(echo_call("call_1", "{not json")),
        ScriptStep::Reply(AssistantMessage::text("sorry")),
    ]));
    let runner = AgentRunner::new(backend.clone(), echo_table(), agent_config(8));

    let mut transcript = Transcript::from(vec![Message::user("go")]);
    let outcome = runner.run(&Context::new(), &mut transcript).await.unwrap();

    assert_eq!(outcome.message.content, "sorry");
    assert_eq!(backend.calls(), 2);
    let tool_msg = transcript.messages()[2].as_tool().unwrap();
    assert!(tool_msg.is_error);
    assert!(tool_msg.content.starts_with("invalid arguments for tool 'echo'"));
}

#[tokio::test]
async fn tool_loop_is_bounded() {
    let backend = Arc::new(ScriptedBackend::always(echo_call("call_x", r#"{"text":"again"}"#)));
    let runner = AgentRunner::new(backend.clone(), echo_table(), agent_config(3));

    let mut transcript = Transcript::from(vec![Message::user("loop forever")]);
    let err = runner.run(&Context::new(), &mut transcript).await.unwrap_err();

    assert!(matches!(err, AgentError::ToolLoopExceeded { max_iterations: 3 }));
    assert!(err.is_loop_exceeded());
    assert_eq!(backend.calls(), 3);
    // user + 3 × (assistant, tool)
    assert_eq!(transcript.len(), 7);
}

#[tokio::test]
async fn unknown_tool_is_reported_by_default() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![ToolCall::new("call_9", "teleport", "{}")],
        )),
        ScriptStep::Reply(AssistantMessage::text("ok")),
    ]));
    let runner = AgentRunner::new(backend, echo_table(), agent_config(4));

    let mut transcript = Transcript::from(vec![Message::user("go")]);
    runner.run(&Context::new(), &mut transcript).await.unwrap();

    let tool_msg = transcript.messages()[2].as_tool().unwrap();
    assert!(tool_msg.is_error);
    assert_eq!(tool_msg.tool_call_id, "call_9");
    assert_eq!(tool_msg.content, "unknown tool: teleport");
}

#[tokio::test]
async fn unknown_tool_skip_policy_from_config() {
    let mut config = AgentConfig::from_toml_str("unknown_tool = \"skip\"").unwrap();
    config.retry = RetryPolicy::immediate(0);
    assert_eq!(config.unknown_tool, UnknownToolPolicy::Skip);

    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![ToolCall::new("call_9", "teleport", "{}")],
        )),
        ScriptStep::Reply(AssistantMessage::text("ok")),
    ]));
    let runner = AgentRunner::new(backend, echo_table(), config);

    let mut transcript = Transcript::from(vec![Message::user("go")]);
    runner.run(&Context::new(), &mut transcript).await.unwrap();
    assert_eq!(transcript.len(), 3);
}

#[tokio::test]
async fn model_failure_ends_run_and_keeps_transcript() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(echo_call("call_1", r#"{"text":"a"}"#)),
        ScriptStep::Fail(AgentError::provider(400, "bad request")),
    ]));
    let runner = AgentRunner::new(backend, echo_table(), agent_config(8));

    let mut transcript = Transcript::from(vec![Message::user("go")]);
    let err = runner.run(&Context::new(), &mut transcript).await.unwrap_err();

    assert!(matches!(err, AgentError::NonRetryable(_)));
    // user, assistant(tool call), tool result
    assert_eq!(transcript.len(), 3);
}

#[tokio::test]
async fn cancelled_run_stops_loop() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(echo_call("call_1", r#"{"text":"a"}"#)),
        ScriptStep::Hang,
    ]));
    let runner = AgentRunner::new(backend.clone(), echo_table(), agent_config(8));

    let ctx = Context::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let mut transcript = Transcript::from(vec![Message::user("go")]);
    let err = runner.run(&ctx, &mut transcript).await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn streaming_run_delivers_chunks() {
    let backend = Arc::new(ScriptedBackend::new([
        ScriptStep::Reply(echo_call("call_1", r#"{"text":"hello"}"#)),
        ScriptStep::Stream(vec![
            Ok(StreamDelta::text("<think>done</think>")),
            Ok(StreamDelta::text("hel")),
            Ok(StreamDelta::text("lo")),
        ]),
    ]));
    let mut config = agent_config(8);
    config.call = CallConfig::builder().streaming(true).build();
    let runner = AgentRunner::new(backend, echo_table(), config);

    let mut chunks = Vec::new();
    let mut transcript = Transcript::from(vec![Message::user("say hello")]);
    let outcome = runner
        .run_with(&Context::new(), &mut transcript, |chunk| {
            chunks.push(chunk.clone());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(outcome.message.content, "hello");
    assert_eq!(outcome.message.reasoning.as_deref(), Some("done"));
    assert!(chunks.contains(&StreamChunk::Reasoning("done".into())));
    let content: String = chunks
        .iter()
        .filter(|c| matches!(c, StreamChunk::Content(_)))
        .map(StreamChunk::text)
        .collect();
    assert_eq!(content, "hello");
}

#[tokio::test]
async fn callback_error_aborts_streaming_run() {
    let backend = Arc::new(ScriptedBackend::new([ScriptStep::Reply(
        AssistantMessage::text("some text"),
    )]));
    let mut config = agent_config(4);
    config.call = CallConfig::builder().streaming(true).build();
    config.retry = RetryPolicy::immediate(3);
    let runner = AgentRunner::new(backend.clone(), echo_table(), config);

    let mut transcript = Transcript::from(vec![Message::user("go")]);
    let err = runner
        .run_with(&Context::new(), &mut transcript, |_| {
            Err(AgentError::Stream("consumer gone".into()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Stream(_)));
    assert_eq!(backend.calls(), 1);
    assert_eq!(transcript.len(), 1);
}

// ── Configuration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn agent_config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.toml");
    tokio::fs::write(
        &path,
        r#"
max_iterations = 5
unknown_tool = "report"

[reasoning]
start = "<reasoning>"
end = "</reasoning>"

[retry]
max_retries = 2
backoff_base_ms = 100
backoff_max_ms = 1000
jitter = 0.0

[call]
temperature = 0.3
streaming = true
"#,
    )
    .await
    .unwrap();

    let config = AgentConfig::load(&path).await.unwrap();
    assert_eq!(config.max_iterations, 5);
    assert_eq!(config.reasoning.start, "<reasoning>");
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.call.temperature(), Some(0.3));
    assert!(config.call.is_streaming());
}

#[tokio::test]
async fn invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.toml");
    tokio::fs::write(&path, "max_iterations = 0\n").await.unwrap();

    let err = AgentConfig::load(&path).await.unwrap_err();
    assert!(matches!(err, AgentError::Config(_)));

    let missing = AgentConfig::load(dir.path().join("nope.toml")).await.unwrap_err();
    assert!(matches!(missing, AgentError::Io(_)));
}
