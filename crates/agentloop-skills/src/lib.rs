//! Capabilities (tools) and the dispatch table that executes model tool calls.

/// Tool dispatch table.
pub mod registry;
/// Capability trait and descriptors.
pub mod skill;

pub use registry::{Registration, ToolTable};
pub use skill::{Arguments, Capability, CapabilityDescriptor, FnCapability};
