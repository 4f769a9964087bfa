//! Core types and error definitions for the agentloop execution core.
//!
//! This crate provides the foundational types shared by the skills and agent
//! crates: the error taxonomy, the cancellation context, the message sum type,
//! and tool call abstractions.
//!
//! # Main types
//!
//! - [`AgentError`] — Unified error enum, including the temporary and
//!   loop-exceeded sentinels.
//! - [`AgentResult`] — Convenience alias for `Result<T, AgentError>`.
//! - [`StatusCode`] — Narrow access to an error's HTTP-like status.
//! - [`Context`] — Cancellation token plus optional deadline.
//! - [`Message`] — Closed sum over user, system, assistant, tool and resource messages.
//! - [`Transcript`] — Append-only conversation.
//! - [`ToolCall`] — A model-initiated tool invocation request.
//! - [`ToolResult`] — Typed output segments returned by a tool.

/// Cancellation scope.
pub mod context;
/// Error taxonomy.
pub mod error;
/// Conversation messages and transcript.
pub mod message;
/// Tracing subscriber bootstrap.
pub mod telemetry;
/// Tool call and tool result types.
pub mod tool;

pub use context::Context;
pub use error::{AgentError, AgentResult, StatusCode};
pub use message::{
    AssistantMessage, Message, ResponseMetadata, Role, TokenUsage, ToolMessage, Transcript,
};
pub use tool::{ContentPart, ToolCall, ToolResult};
