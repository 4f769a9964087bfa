use crate::error::{AgentError, AgentResult};
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. With `json` set, events
/// are emitted as one JSON object per line.
pub fn init_tracing(default_filter: &str, json: bool) -> AgentResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| AgentError::Config(format!("tracing subscriber: {e}")))?;
    tracing::debug!(filter = default_filter, json, "Tracing initialised");
    Ok(())
}
