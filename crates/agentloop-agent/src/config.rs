use agentloop_core::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configures the retry loop around a single model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` still makes one attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
    /// Multiplicative jitter; `0.1` spreads each delay over ±10%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy with no delay between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            jitter: 0.0,
        }
    }

    fn validate(&self) -> AgentResult<()> {
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(AgentError::Config(format!(
                "retry.jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(AgentError::Config(format!(
                "retry.backoff_base_ms ({}) exceeds retry.backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }
}

/// Per-invocation model tunables.
///
/// Every field is optional so that "unset" stays distinguishable from zero;
/// backends only forward what is present. Built through
/// [`CallConfig::builder`] and immutable afterwards, so one snapshot can be
/// shared by concurrent calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    streaming: Option<bool>,
}

impl CallConfig {
    /// Starts a builder with every tunable unset.
    pub fn builder() -> CallConfigBuilder {
        CallConfigBuilder::default()
    }

    /// A builder seeded with this snapshot's values.
    pub fn to_builder(&self) -> CallConfigBuilder {
        CallConfigBuilder {
            inner: self.clone(),
        }
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }

    pub fn frequency_penalty(&self) -> Option<f32> {
        self.frequency_penalty
    }

    pub fn presence_penalty(&self) -> Option<f32> {
        self.presence_penalty
    }

    pub fn stop(&self) -> Option<&[String]> {
        self.stop.as_deref()
    }

    /// Overrides [`RetryPolicy::max_retries`] when set.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn streaming(&self) -> Option<bool> {
        self.streaming
    }

    /// Whether the agent loop should use the streaming path.
    pub fn is_streaming(&self) -> bool {
        self.streaming.unwrap_or(false)
    }
}

/// Builder for [`CallConfig`].
#[derive(Debug, Clone, Default)]
pub struct CallConfigBuilder {
    inner: CallConfig,
}

impl CallConfigBuilder {
    pub fn temperature(mut self, value: f32) -> Self {
        self.inner.temperature = Some(value);
        self
    }

    pub fn max_tokens(mut self, value: u32) -> Self {
        self.inner.max_tokens = Some(value);
        self
    }

    pub fn top_p(mut self, value: f32) -> Self {
        self.inner.top_p = Some(value);
        self
    }

    pub fn frequency_penalty(mut self, value: f32) -> Self {
        self.inner.frequency_penalty = Some(value);
        self
    }

    pub fn presence_penalty(mut self, value: f32) -> Self {
        self.inner.presence_penalty = Some(value);
        self
    }

    pub fn stop<I, S>(mut self, sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.stop = Some(sequences.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_retries(mut self, value: u32) -> Self {
        self.inner.max_retries = Some(value);
        self
    }

    pub fn streaming(mut self, enabled: bool) -> Self {
        self.inner.streaming = Some(enabled);
        self
    }

    pub fn build(self) -> CallConfig {
        self.inner
    }
}

/// What the agent loop does with a tool call naming no registered capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownToolPolicy {
    /// Append an error tool message so the model can correct itself.
    #[default]
    Report,
    /// Ignore the call; no tool message is appended.
    Skip,
}

/// Delimiters of inline reasoning text in streamed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningMarkers {
    pub start: String,
    pub end: String,
}

impl Default for ReasoningMarkers {
    fn default() -> Self {
        Self {
            start: "<think>".to_string(),
            end: "</think>".to_string(),
        }
    }
}

/// Top-level agent configuration, usually loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub unknown_tool: UnknownToolPolicy,
    #[serde(default)]
    pub reasoning: ReasoningMarkers,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub call: CallConfig,
}

fn default_max_iterations() -> u32 {
    32
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            unknown_tool: UnknownToolPolicy::default(),
            reasoning: ReasoningMarkers::default(),
            retry: RetryPolicy::default(),
            call: CallConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> AgentResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| AgentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> AgentResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.reasoning.start.is_empty() || self.reasoning.end.is_empty() {
            return Err(AgentError::Config(
                "reasoning markers must not be empty".to_string(),
            ));
        }
        self.retry.validate()
    }

    /// Retries allowed per model call, honouring the call-level override.
    pub fn effective_max_retries(&self) -> u32 {
        self.call.max_retries().unwrap_or(self.retry.max_retries)
    }
}
