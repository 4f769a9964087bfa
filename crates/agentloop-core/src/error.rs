use thiserror::Error;

/// A convenience `Result` alias using [`AgentError`].
pub type AgentResult<T> = Result<T, AgentError>;

/// Top-level error type for the execution core.
///
/// The variants line up with the failure categories a run can hit: provider
/// failures (transient or fatal), cancellation, tool problems, and loop
/// exhaustion. Provider adapters should map their own errors onto
/// [`AgentError::Provider`] or [`AgentError::Transport`] so the retry
/// classifier can inspect them without knowing provider-specific types.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A provider answered with a non-success HTTP-like status.
    #[error("Provider error ({}): {message}", status_label(.status))]
    Provider {
        /// Status code reported by the provider, if any.
        status: Option<u16>,
        /// Provider-supplied error text.
        message: String,
    },

    /// A network-level failure (connection refused, DNS, reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Marker for failures that are expected to succeed on a later attempt.
    ///
    /// Surfaced to callers once retries are exhausted.
    #[error("temporary failure: {0}")]
    Temporary(Box<AgentError>),

    /// Marker applied by the call dispatcher to errors it refused to retry.
    #[error("non-retryable: {0}")]
    NonRetryable(Box<AgentError>),

    /// The run was cancelled through its [`Context`](crate::Context).
    #[error("context cancelled")]
    Cancelled,

    /// The run's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The agentic loop hit its iteration cap without a final answer.
    #[error("tool loop exceeded maximum of {max_iterations} iterations")]
    ToolLoopExceeded {
        /// The configured cap that was reached.
        max_iterations: u32,
    },

    /// A capability with this name is already registered.
    #[error("capability already registered: {0}")]
    AlreadyExists(String),

    /// An error raised by a tool during invocation.
    #[error("Tool error: {0}")]
    Tool(String),

    /// A malformed or aborted stream.
    #[error("Stream error: {0}")]
    Stream(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "no status".to_string(), |s| s.to_string())
}

/// Narrow capability for errors that carry an HTTP-like status code.
pub trait StatusCode {
    /// The numeric status code, if this error has one.
    fn status_code(&self) -> Option<u16>;
}

impl StatusCode for AgentError {
    fn status_code(&self) -> Option<u16> {
        match self.root() {
            AgentError::Provider { status, .. } => *status,
            _ => None,
        }
    }
}

impl AgentError {
    /// Shorthand for a provider error with a status code.
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Wraps `self` in the temporary marker unless it already carries one.
    pub fn into_temporary(self) -> Self {
        if self.is_temporary() {
            self
        } else {
            Self::Temporary(Box::new(self))
        }
    }

    /// True if this error, or any error it wraps, is the temporary marker.
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::Temporary(_) => true,
            Self::NonRetryable(inner) => inner.is_temporary(),
            _ => false,
        }
    }

    /// True for [`AgentError::Cancelled`] and [`AgentError::DeadlineExceeded`],
    /// looking through wrappers.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.root(), Self::Cancelled | Self::DeadlineExceeded)
    }

    /// True for [`AgentError::ToolLoopExceeded`].
    pub fn is_loop_exceeded(&self) -> bool {
        matches!(self.root(), Self::ToolLoopExceeded { .. })
    }

    /// Peels off `Temporary` and `NonRetryable` wrappers.
    pub fn root(&self) -> &AgentError {
        match self {
            Self::Temporary(inner) | Self::NonRetryable(inner) => inner.root(),
            other => other,
        }
    }
}
