//! Call-execution core: retrying model calls, stream accumulation, and the
//! bounded tool-calling loop.
//!
//! # Main types
//!
//! - [`AgentRunner`] — the agentic loop over a [`Transcript`](agentloop_core::Transcript).
//! - [`CallDispatcher`] — one model call with classified retries and backoff.
//! - [`LlmBackend`] — the contract provider adapters implement.
//! - [`StreamAccumulator`] / [`ChunkStream`] — delta folding with reasoning-marker splitting.
//! - [`AgentConfig`] / [`CallConfig`] / [`RetryPolicy`] — configuration.

pub mod backends;
pub mod backoff;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod failover;
pub mod runner;
pub mod stream;

pub use backends::scripted::{ScriptStep, ScriptedBackend};
pub use backends::LlmBackend;
pub use backoff::Backoff;
pub use classify::{classify, ErrorClass};
pub use config::{
    AgentConfig, CallConfig, CallConfigBuilder, ReasoningMarkers, RetryPolicy, UnknownToolPolicy,
};
pub use dispatcher::CallDispatcher;
pub use failover::FailoverBackend;
pub use runner::{AgentRunner, RunOutcome};
pub use stream::{
    accumulate, replay, ChunkStream, DeltaStream, ReasoningSplitter, StreamAccumulator,
    StreamChunk, StreamDelta,
};
