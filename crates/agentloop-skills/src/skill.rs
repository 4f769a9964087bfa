use agentloop_core::{AgentResult, ToolResult};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Parsed tool arguments: the JSON object the model supplied.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Metadata describing a capability's interface, as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-schema-shaped description of the expected arguments object.
    pub parameters_schema: serde_json::Value,
}

impl CapabilityDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
        }
    }
}

/// Trait that every tool the model can call must implement.
#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    async fn execute(&self, args: Arguments) -> AgentResult<ToolResult>;
}

type ExecuteFn =
    Box<dyn Fn(Arguments) -> BoxFuture<'static, AgentResult<ToolResult>> + Send + Sync>;

/// A capability backed by an async closure.
pub struct FnCapability {
    descriptor: CapabilityDescriptor,
    execute: ExecuteFn,
}

impl FnCapability {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        execute: F,
    ) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<ToolResult>> + Send + 'static,
    {
        Self {
            descriptor: CapabilityDescriptor::new(name, description, parameters_schema),
            execute: Box::new(move |args| Box::pin(execute(args))),
        }
    }
}

impl fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCapability")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: Arguments) -> AgentResult<ToolResult> {
        (self.execute)(args).await
    }
}
