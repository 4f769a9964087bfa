use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// A system-level instruction or prompt.
    System,
    /// The model.
    Assistant,
    /// Output produced by a tool invocation.
    Tool,
    /// An attached document or other resource.
    Resource,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Resource => "resource",
        };
        f.write_str(s)
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated in the response.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Sum of input and output tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Response metadata attached to an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Provider-side response identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

/// A message produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Visible text. Empty, never absent.
    #[serde(default)]
    pub content: String,
    /// Tool invocations requested by the model, in request order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Intermediate reasoning text kept apart from `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Usage and response id.
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

impl AssistantMessage {
    /// A plain text answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// An answer that requests the given tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            ..Self::default()
        }
    }

    /// Whether the model asked for any tool invocations.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The result of one tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// The [`ToolCall::id`] this message answers.
    pub tool_call_id: String,
    /// Name of the tool that was called.
    pub name: String,
    /// Rendered output or error description.
    pub content: String,
    /// Whether the call failed (bad arguments, tool error, unknown tool).
    #[serde(default)]
    pub is_error: bool,
}

impl ToolMessage {
    /// A successful tool output.
    pub fn success(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed tool output.
    pub fn error(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// A single entry in a conversation.
///
/// The role is fixed by the variant, so it cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// Input from the end-user.
    User {
        /// Message text.
        content: String,
    },
    /// A system-level instruction.
    System {
        /// Instruction text.
        content: String,
    },
    /// A model response.
    Assistant(AssistantMessage),
    /// A tool output correlated to an earlier tool call.
    Tool(ToolMessage),
    /// An attached resource such as a retrieved document.
    Resource {
        /// Where the resource came from.
        uri: String,
        /// Resource text.
        content: String,
    },
}

impl Message {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a resource message.
    pub fn resource(uri: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Resource {
            uri: uri.into(),
            content: content.into(),
        }
    }

    /// The role implied by the variant.
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::System { .. } => Role::System,
            Self::Assistant(_) => Role::Assistant,
            Self::Tool(_) => Role::Tool,
            Self::Resource { .. } => Role::Resource,
        }
    }

    /// Textual content of any variant.
    pub fn content(&self) -> &str {
        match self {
            Self::User { content } | Self::System { content } | Self::Resource { content, .. } => {
                content
            }
            Self::Assistant(msg) => &msg.content,
            Self::Tool(msg) => &msg.content,
        }
    }

    /// The assistant payload, if this is an assistant message.
    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(msg) => Some(msg),
            _ => None,
        }
    }

    /// The tool payload, if this is a tool message.
    pub fn as_tool(&self) -> Option<&ToolMessage> {
        match self {
            Self::Tool(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<AssistantMessage> for Message {
    fn from(msg: AssistantMessage) -> Self {
        Self::Assistant(msg)
    }
}

impl From<ToolMessage> for Message {
    fn from(msg: ToolMessage) -> Self {
        Self::Tool(msg)
    }
}

/// Append-only ordered sequence of messages forming one conversation.
///
/// Entries can be added but never removed or edited, so the full exchange can
/// always be reconstructed from the final transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one message.
    pub fn push(&mut self, message: impl Into<Message>) {
        self.messages.push(message.into());
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Hands the messages back to the caller.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl Extend<Message> for Transcript {
    fn extend<T: IntoIterator<Item = Message>>(&mut self, iter: T) {
        self.messages.extend(iter);
    }
}
