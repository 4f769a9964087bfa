use crate::config::ReasoningMarkers;
use agentloop_core::{
    AgentError, AgentResult, AssistantMessage, Context, ResponseMetadata, TokenUsage, ToolCall,
};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Raw deltas delivered by a provider stream, in network order.
pub type DeltaStream = BoxStream<'static, AgentResult<StreamDelta>>;

/// One raw event from a provider stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    /// A slice of generated text. May contain inline reasoning markers,
    /// possibly cut in half at the delta boundary.
    Text { text: String },

    /// Visible content that is already separated from reasoning, such as a
    /// complete non-streamed answer. Bypasses the marker splitter.
    Content { text: String },

    /// Reasoning text delivered out of band by providers with a native field.
    Reasoning { text: String },

    /// A fragment of a tool call. Fragments sharing an `index` belong to the
    /// same call; their `arguments` are concatenated in arrival order.
    ToolCall {
        index: usize,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },

    /// Token accounting, usually sent once near the end.
    Usage { usage: TokenUsage },

    /// Provider-side response identifier.
    ResponseId { id: String },
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A piece of output handed to the caller while a stream is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Visible content.
    Content(String),
    /// Reasoning text.
    Reasoning(String),
}

impl StreamChunk {
    pub fn text(&self) -> &str {
        match self {
            Self::Content(text) | Self::Reasoning(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    Scanning,
    InReasoning,
}

/// Splits raw text into content and reasoning at the configured markers.
///
/// Text that could be the beginning of the marker being looked for is held
/// back until the next delta disambiguates it, so a marker cut across two
/// deltas is still recognised and never leaks into the output.
#[derive(Debug, Clone)]
pub struct ReasoningSplitter {
    markers: ReasoningMarkers,
    state: SplitState,
    buffer: String,
}

impl ReasoningSplitter {
    pub fn new(markers: ReasoningMarkers) -> Self {
        Self {
            markers,
            state: SplitState::Scanning,
            buffer: String::new(),
        }
    }

    /// Whether the splitter is between a start and an end marker.
    pub fn in_reasoning(&self) -> bool {
        self.state == SplitState::InReasoning
    }

    /// Feeds one delta, appending any chunks it completes to `out`.
    pub fn push(&mut self, text: &str, out: &mut Vec<StreamChunk>) {
        self.buffer.push_str(text);
        loop {
            let marker = match self.state {
                SplitState::Scanning => self.markers.start.as_str(),
                SplitState::InReasoning => self.markers.end.as_str(),
            };
            if marker.is_empty() {
                let ready = std::mem::take(&mut self.buffer);
                emit(self.state, ready, out);
                return;
            }

            if let Some(pos) = self.buffer.find(marker) {
                let before = self.buffer[..pos].to_string();
                let consumed = pos + marker.len();
                self.buffer.drain(..consumed);
                emit(self.state, before, out);
                self.state = match self.state {
                    SplitState::Scanning => SplitState::InReasoning,
                    SplitState::InReasoning => SplitState::Scanning,
                };
            } else {
                let keep_from = partial_marker_start(&self.buffer, marker);
                let ready: String = self.buffer.drain(..keep_from).collect();
                emit(self.state, ready, out);
                return;
            }
        }
    }

    /// Flushes held-back text to whichever side is active. An unterminated
    /// reasoning section is not an error.
    pub fn finish(&mut self, out: &mut Vec<StreamChunk>) {
        let rest = std::mem::take(&mut self.buffer);
        emit(self.state, rest, out);
    }
}

fn emit(state: SplitState, text: String, out: &mut Vec<StreamChunk>) {
    if text.is_empty() {
        return;
    }
    out.push(match state {
        SplitState::Scanning => StreamChunk::Content(text),
        SplitState::InReasoning => StreamChunk::Reasoning(text),
    });
}

/// Byte offset of the longest suffix of `buffer` that is a proper prefix of
/// `marker`, or `buffer.len()` if there is none.
fn partial_marker_start(buffer: &str, marker: &str) -> usize {
    let min_start = buffer.len().saturating_sub(marker.len().saturating_sub(1));
    buffer
        .char_indices()
        .map(|(i, _)| i)
        .filter(|&i| i >= min_start)
        .find(|&i| marker.starts_with(&buffer[i..]))
        .unwrap_or(buffer.len())
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds provider deltas into chunks and a final [`AssistantMessage`].
///
/// The aggregate is built only from the chunks this accumulator hands out, so
/// the final `content` and `reasoning` are exactly the in-order concatenation
/// of the delivered chunks.
#[derive(Debug)]
pub struct StreamAccumulator {
    splitter: ReasoningSplitter,
    content: String,
    reasoning: String,
    saw_reasoning: bool,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    metadata: ResponseMetadata,
}

impl StreamAccumulator {
    pub fn new(markers: ReasoningMarkers) -> Self {
        Self {
            splitter: ReasoningSplitter::new(markers),
            content: String::new(),
            reasoning: String::new(),
            saw_reasoning: false,
            tool_calls: BTreeMap::new(),
            metadata: ResponseMetadata::default(),
        }
    }

    /// Applies one delta and returns the chunks it produced.
    pub fn push(&mut self, delta: StreamDelta) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        match delta {
            StreamDelta::Text { text } => self.splitter.push(&text, &mut chunks),
            StreamDelta::Content { text } => {
                // Held-back text came first.
                self.splitter.finish(&mut chunks);
                if !text.is_empty() {
                    chunks.push(StreamChunk::Content(text));
                }
            }
            StreamDelta::Reasoning { text } => {
                self.saw_reasoning = true;
                if !text.is_empty() {
                    chunks.push(StreamChunk::Reasoning(text));
                }
            }
            StreamDelta::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = id.filter(|s| !s.is_empty()) {
                    if entry.id.is_empty() {
                        entry.id = id;
                    }
                }
                if let Some(name) = name.filter(|s| !s.is_empty()) {
                    if entry.name.is_empty() {
                        entry.name = name;
                    }
                }
                entry.arguments.push_str(&arguments);
            }
            StreamDelta::Usage { usage } => self.metadata.usage = Some(usage),
            StreamDelta::ResponseId { id } => self.metadata.response_id = Some(id),
        }
        self.record(&chunks);
        chunks
    }

    /// End of stream: releases any held-back text.
    pub fn flush(&mut self) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        self.splitter.finish(&mut chunks);
        self.record(&chunks);
        chunks
    }

    /// The aggregate message. Tool calls without a provider id get a local one.
    pub fn into_message(self) -> AssistantMessage {
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(|partial| {
                let id = if partial.id.is_empty() {
                    format!("call_{}", Uuid::new_v4().simple())
                } else {
                    partial.id
                };
                ToolCall::new(id, partial.name, partial.arguments)
            })
            .collect();

        AssistantMessage {
            content: self.content,
            tool_calls,
            reasoning: self.saw_reasoning.then_some(self.reasoning),
            metadata: self.metadata,
        }
    }

    fn record(&mut self, chunks: &[StreamChunk]) {
        for chunk in chunks {
            match chunk {
                StreamChunk::Content(text) => self.content.push_str(text),
                StreamChunk::Reasoning(text) => {
                    self.saw_reasoning = true;
                    self.reasoning.push_str(text);
                }
            }
        }
    }
}

/// Consumer-driven view over a provider stream.
///
/// Each call to [`ChunkStream::next`] reads network events only until at
/// least one chunk is ready. Dropping the stream early simply stops reading.
pub struct ChunkStream {
    ctx: Context,
    deltas: DeltaStream,
    accumulator: StreamAccumulator,
    pending: VecDeque<StreamChunk>,
    exhausted: bool,
    failed: bool,
}

impl ChunkStream {
    pub fn new(ctx: Context, deltas: DeltaStream, markers: ReasoningMarkers) -> Self {
        Self {
            ctx,
            deltas,
            accumulator: StreamAccumulator::new(markers),
            pending: VecDeque::new(),
            exhausted: false,
            failed: false,
        }
    }

    /// The next chunk, an error that ends the stream, or `None` at the end.
    pub async fn next(&mut self) -> Option<AgentResult<StreamChunk>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            if self.exhausted || self.failed {
                return None;
            }

            let item = tokio::select! {
                biased;
                err = self.ctx.done() => Some(Err(err)),
                item = self.deltas.next() => item,
            };

            match item {
                Some(Ok(delta)) => {
                    let chunks = self.accumulator.push(delta);
                    self.pending.extend(chunks);
                }
                Some(Err(err)) => {
                    self.failed = true;
                    return Some(Err(err));
                }
                None => {
                    self.exhausted = true;
                    let chunks = self.accumulator.flush();
                    self.pending.extend(chunks);
                }
            }
        }
    }

    /// The aggregate message. Only valid once [`ChunkStream::next`] has
    /// returned `None`.
    pub fn finish(self) -> AgentResult<AssistantMessage> {
        if self.failed {
            return Err(AgentError::Stream("stream ended with an error".to_string()));
        }
        if !self.exhausted || !self.pending.is_empty() {
            return Err(AgentError::Stream(
                "stream finished before all chunks were consumed".to_string(),
            ));
        }
        Ok(self.accumulator.into_message())
    }
}

/// Drives `deltas` to completion, handing every chunk to `on_chunk` in order.
///
/// An error from `on_chunk` stops reading immediately and becomes the result.
pub async fn accumulate<F>(
    ctx: &Context,
    deltas: DeltaStream,
    markers: &ReasoningMarkers,
    mut on_chunk: F,
) -> AgentResult<AssistantMessage>
where
    F: FnMut(&StreamChunk) -> AgentResult<()>,
{
    let mut stream = ChunkStream::new(ctx.clone(), deltas, markers.clone());
    while let Some(chunk) = stream.next().await {
        on_chunk(&chunk?)?;
    }
    stream.finish()
}

/// Replays a complete message as a delta stream, for backends without native
/// streaming. Content is passed through verbatim, markers included.
pub fn replay(message: AssistantMessage) -> DeltaStream {
    let mut deltas = Vec::new();
    if let Some(reasoning) = message.reasoning {
        deltas.push(StreamDelta::Reasoning { text: reasoning });
    }
    deltas.push(StreamDelta::Content {
        text: message.content,
    });
    for (index, call) in message.tool_calls.into_iter().enumerate() {
        deltas.push(StreamDelta::ToolCall {
            index,
            id: Some(call.id),
            name: Some(call.name),
            arguments: call.arguments,
        });
    }
    if let Some(usage) = message.metadata.usage {
        deltas.push(StreamDelta::Usage { usage });
    }
    if let Some(id) = message.metadata.response_id {
        deltas.push(StreamDelta::ResponseId { id });
    }
    futures_util::stream::iter(deltas.into_iter().map(Ok)).boxed()
}
