use crate::skill::{Arguments, Capability, CapabilityDescriptor, FnCapability};
use agentloop_core::{AgentError, AgentResult, ToolCall, ToolMessage, ToolResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`ToolTable::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No capability with this name existed.
    Added,
    /// An existing capability with the same name was replaced.
    Replaced,
}

/// Lookup table from tool name to capability.
///
/// Owned by the caller and usually shared behind an `Arc`. Registration takes
/// a write lock, so adding tools while a run is dispatching is safe; a run
/// sees whichever capability is registered at the moment it looks the name up.
#[derive(Default)]
pub struct ToolTable {
    tools: RwLock<HashMap<String, Arc<dyn Capability>>>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `capability`, replacing any existing one with the same name.
    pub fn register(&self, capability: Arc<dyn Capability>) -> Registration {
        let name = capability.descriptor().name.clone();
        let previous = self.tools.write().insert(name.clone(), capability);
        match previous {
            Some(_) => {
                warn!(tool = %name, "Replaced existing capability");
                Registration::Replaced
            }
            None => {
                info!(tool = %name, "Registered capability");
                Registration::Added
            }
        }
    }

    /// Registers `capability` only if its name is free.
    pub fn try_register(&self, capability: Arc<dyn Capability>) -> AgentResult<()> {
        let name = capability.descriptor().name.clone();
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(AgentError::AlreadyExists(name));
        }
        info!(tool = %name, "Registered capability");
        tools.insert(name, capability);
        Ok(())
    }

    /// Registers an async closure as a capability.
    pub fn register_fn<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        execute: F,
    ) -> Registration
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<ToolResult>> + Send + 'static,
    {
        self.register(Arc::new(FnCapability::new(
            name,
            description,
            parameters_schema,
            execute,
        )))
    }

    /// Removes a capability. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Descriptors of every registered capability, sorted by name.
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        let mut descriptors: Vec<_> = self
            .tools
            .read()
            .values()
            .map(|c| c.descriptor().clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Executes one tool call and renders the outcome as a tool message.
    ///
    /// Returns `None` when no capability has the requested name. Malformed
    /// arguments and tool failures come back as error tool messages rather
    /// than as `Err`, so one bad call never aborts a run.
    pub async fn execute(&self, call: &ToolCall) -> Option<ToolMessage> {
        let capability = self.get(&call.name)?;

        let args = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(reason) => {
                warn!(tool = %call.name, call_id = %call.id, %reason, "Malformed tool arguments");
                return Some(ToolMessage::error(
                    call,
                    format!("invalid arguments for tool '{}': {reason}", call.name),
                ));
            }
        };

        let message = match capability.execute(args).await {
            Ok(result) => {
                let content = result.render();
                if result.is_error {
                    ToolMessage::error(call, content)
                } else {
                    ToolMessage::success(call, content)
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                ToolMessage::error(call, format!("tool '{}' failed: {e}", call.name))
            }
        };
        Some(message)
    }
}

/// Parses raw tool arguments into a JSON object.
///
/// Blank input is treated as an empty object, since several providers send
/// `""` for tools that take no parameters.
pub fn parse_arguments(raw: &str) -> Result<Arguments, String> {
    if raw.trim().is_empty() {
        return Ok(Arguments::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl std::fmt::Debug for ToolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ToolTable").field("tools", &names).finish()
    }
}
