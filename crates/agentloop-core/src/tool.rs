use serde::{Deserialize, Serialize};

/// A request from the model to invoke a specific tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier unique within one assistant message; echoed back by the
    /// matching tool message.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Serialized JSON arguments, exactly as the provider produced them.
    ///
    /// Kept as text so that malformed arguments survive until dispatch.
    pub arguments: String,
    /// Rendered output, for callers that record results inline. The agent
    /// loop reports results as separate tool messages and leaves this empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    /// Creates a tool call request with no result yet.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            result: None,
        }
    }
}

/// One typed segment of a tool's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// Binary image data, base64 encoded.
    Image {
        /// MIME type such as `image/png`.
        mime_type: String,
        /// Base64 payload. Never copied into the transcript.
        data: String,
    },
    /// Anything else (embedded resources, audio, provider extensions).
    Other {
        /// Free-form kind label.
        kind: String,
        /// Raw payload.
        data: serde_json::Value,
    },
}

impl ContentPart {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text used when this segment is folded into a tool message.
    ///
    /// Images collapse to a placeholder label so raw bytes never reach the model.
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Image { mime_type, .. } => format!("[image: {mime_type}]"),
            Self::Other { kind, .. } => format!("[{kind}]"),
        }
    }
}

/// The output of a capability invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Ordered output segments.
    pub content: Vec<ContentPart>,
    /// Whether the tool reports its own execution as failed.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful single-text result.
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(content)],
            is_error: false,
        }
    }

    /// Creates an error single-text result.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(content)],
            is_error: true,
        }
    }

    /// Concatenates all segments in order.
    pub fn render(&self) -> String {
        self.content.iter().map(ContentPart::render).collect()
    }
}
