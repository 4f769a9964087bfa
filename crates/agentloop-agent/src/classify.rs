use agentloop_core::{AgentError, StatusCode};
use std::io::ErrorKind;

/// Retry verdict for a failed call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely to succeed on a later attempt.
    Retryable,
    /// Will fail the same way again; stop now.
    Fatal,
}

// Lowercase fragments of network-level failure messages.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "timed out",
    "timeout",
    "dns",
    "name resolution",
    "failed to lookup address",
    "no such host",
    "network is unreachable",
    "temporarily unavailable",
];

/// Decides whether a failed attempt is worth retrying.
///
/// Cancellation and deadline errors are always fatal. Otherwise a status code
/// decides (429 and 5xx retry, everything else does not); without one, the
/// temporary marker or a network-looking message makes the error retryable.
pub fn classify(err: &AgentError) -> ErrorClass {
    if err.is_cancellation() {
        return ErrorClass::Fatal;
    }

    if let Some(status) = err.status_code() {
        return if status == 429 || (500..600).contains(&status) {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        };
    }

    if err.is_temporary() {
        return ErrorClass::Retryable;
    }

    let transient = match err.root() {
        AgentError::Transport(msg)
        | AgentError::Stream(msg)
        | AgentError::Provider { message: msg, .. } => looks_transient(msg),
        AgentError::Io(io) => {
            matches!(
                io.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::UnexpectedEof
            ) || looks_transient(&io.to_string())
        }
        _ => false,
    };

    if transient {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

fn looks_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(classify(&AgentError::provider(429, "rate limited")), ErrorClass::Retryable);
        assert_eq!(classify(&AgentError::provider(500, "boom")), ErrorClass::Retryable);
        assert_eq!(classify(&AgentError::provider(503, "unavailable")), ErrorClass::Retryable);
        assert_eq!(classify(&AgentError::provider(599, "edge")), ErrorClass::Retryable);

        assert_eq!(classify(&AgentError::provider(400, "bad request")), ErrorClass::Fatal);
        assert_eq!(classify(&AgentError::provider(401, "unauthorized")), ErrorClass::Fatal);
        assert_eq!(classify(&AgentError::provider(404, "no model")), ErrorClass::Fatal);
    }

    #[test]
    fn status_code_wins_over_message() {
        let err = AgentError::provider(400, "upstream timeout while validating");
        assert_eq!(classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn network_messages() {
        for msg in [
            "tcp connect error: Connection refused (os error 111)",
            "operation timed out",
            "dns error: failed to lookup address information",
            "connection reset by peer",
        ] {
            assert_eq!(
                classify(&AgentError::Transport(msg.into())),
                ErrorClass::Retryable,
                "{msg}"
            );
        }
        assert_eq!(
            classify(&AgentError::Transport("invalid certificate".into())),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn io_kinds() {
        let err = AgentError::Io(std::io::Error::new(ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(classify(&err), ErrorClass::Retryable);

        let err = AgentError::Io(std::io::Error::new(ErrorKind::PermissionDenied, "denied"));
        assert_eq!(classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn temporary_marker_is_retryable() {
        let err = AgentError::Tool("backend busy".into()).into_temporary();
        assert_eq!(classify(&err), ErrorClass::Retryable);
    }

    #[test]
    fn cancellation_is_never_retried() {
        assert_eq!(classify(&AgentError::Cancelled), ErrorClass::Fatal);
        assert_eq!(classify(&AgentError::DeadlineExceeded), ErrorClass::Fatal);
        assert_eq!(
            classify(&AgentError::Cancelled.into_temporary()),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn everything_else_is_fatal() {
        assert_eq!(classify(&AgentError::Config("bad".into())), ErrorClass::Fatal);
        assert_eq!(
            classify(&AgentError::ToolLoopExceeded { max_iterations: 3 }),
            ErrorClass::Fatal
        );
    }
}
