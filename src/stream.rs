//! Reconstruction of tool calls from a streamed chat completion.
//!
//! A [`StreamState`] is a plain value: [`StreamState::fold`] takes it by value together with
//! one decoded chunk and returns the next state. [`StreamAggregator`] wraps one state per
//! request and accepts raw SSE lines or event payloads.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{NormalizedResponse, ResponseChoice, ToolCall, Usage};
use crate::sse::DONE_SENTINEL;

// ============================================================================
// Stream chunk wire types
// ============================================================================

/// One `data:` payload of a streamed chat completion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl StreamChunk {
    /// Decode one event payload.
    pub fn parse(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|err| Error::protocol(format!("Malformed stream chunk: {err}")))
    }
}

// ============================================================================
// Stream State
// ============================================================================

/// Partially accumulated tool call for one stream-local index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallFragment {
    fn apply(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        let Some(function) = delta.function else {
            return;
        };
        if let Some(name) = function.name.filter(|name| !name.is_empty()) {
            self.name = name;
        }
        if let Some(arguments) = function.arguments {
            self.arguments.push_str(&arguments);
        }
    }
}

impl From<ToolCallFragment> for ToolCall {
    fn from(fragment: ToolCallFragment) -> Self {
        Self {
            id: fragment.id,
            name: fragment.name,
            arguments: fragment.arguments,
        }
    }
}

/// Accumulated state of one streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub fragments: BTreeMap<u32, ToolCallFragment>,
    pub content: Vec<String>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl StreamState {
    /// Fold one chunk into the state.
    ///
    /// Ids and names are last-write-wins per index; argument text is appended in arrival order.
    #[must_use]
    pub fn fold(mut self, chunk: StreamChunk) -> Self {
        if let Some(usage) = chunk.usage {
            self.usage = usage;
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return self;
        };
        if let Some(reason) = choice.finish_reason.filter(|reason| !reason.is_empty()) {
            self.finish_reason = Some(reason);
        }
        let Some(delta) = choice.delta else {
            return self;
        };

        for call in delta.tool_calls.unwrap_or_default() {
            self.fragments.entry(call.index).or_default().apply(call);
        }
        if let Some(content) = delta.content.filter(|content| !content.is_empty()) {
            self.content.push(content);
        }
        self
    }

    /// Concatenated content so far.
    pub fn text(&self) -> String {
        self.content.concat()
    }

    /// Convert into a normalized response; tool calls come out in ascending index order.
    pub fn finish(self, elapsed: Duration) -> NormalizedResponse {
        let content = self.content.concat();
        let tool_calls: Vec<ToolCall> = self.fragments.into_values().map(ToolCall::from).collect();
        NormalizedResponse {
            elapsed,
            choice: Some(ResponseChoice {
                content: Some(content),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                finish_reason: self.finish_reason,
            }),
            usage: self.usage,
        }
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Whether the stream should keep being consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Per-request stream reducer.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    state: StreamState,
    chunks: usize,
    done: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one raw SSE line.
    ///
    /// Blank lines and lines without a `data:` field are ignored. `data: [DONE]` ends
    /// consumption without being decoded.
    pub fn push_line(&mut self, line: &str) -> Result<Flow> {
        let line = line.trim();
        match line.strip_prefix("data:") {
            Some(payload) => self.push_data(payload.trim_start()),
            None => Ok(self.flow()),
        }
    }

    /// Consume the payload of one SSE event.
    pub fn push_data(&mut self, data: &str) -> Result<Flow> {
        if self.done {
            return Ok(Flow::Done);
        }
        let data = data.trim();
        if data.is_empty() {
            return Ok(Flow::Continue);
        }
        if data == DONE_SENTINEL {
            self.done = true;
            return Ok(Flow::Done);
        }
        let chunk = StreamChunk::parse(data)?;
        self.chunks += 1;
        self.state = std::mem::take(&mut self.state).fold(chunk);
        Ok(Flow::Continue)
    }

    const fn flow(&self) -> Flow {
        if self.done { Flow::Done } else { Flow::Continue }
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Number of decoded chunks.
    pub const fn chunks(&self) -> usize {
        self.chunks
    }

    pub const fn state(&self) -> &StreamState {
        &self.state
    }

    /// Finalize, whether or not the sentinel was seen.
    pub fn finish(self, elapsed: Duration) -> NormalizedResponse {
        self.state.finish(elapsed)
    }
}

/// Reduce a sequence of raw SSE lines, stopping at the terminal sentinel.
pub fn reduce_lines<'a, I>(lines: I) -> Result<StreamState>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut aggregator = StreamAggregator::new();
    for line in lines {
        if aggregator.push_line(line)? == Flow::Done {
            break;
        }
    }
    Ok(aggregator.state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_foreign_lines_are_ignored() {
        let state = reduce_lines([
            "",
            ": keep-alive",
            "event: chunk",
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            "   ",
        ])
        .unwrap();
        assert_eq!(state.text(), "hi");
    }

    #[test]
    fn done_sentinel_stops_consumption() {
        let mut aggregator = StreamAggregator::new();
        assert_eq!(
            aggregator
                .push_line(r#"data: {"choices":[{"delta":{"content":"a"}}]}"#)
                .unwrap(),
            Flow::Continue
        );
        assert_eq!(aggregator.push_line("data: [DONE]").unwrap(), Flow::Done);
        assert_eq!(
            aggregator
                .push_line(r#"data: {"choices":[{"delta":{"content":"b"}}]}"#)
                .unwrap(),
            Flow::Done
        );
        assert!(aggregator.is_done());
        assert_eq!(aggregator.chunks(), 1);
        assert_eq!(aggregator.state().text(), "a");
    }

    #[test]
    fn malformed_chunk_is_protocol_error() {
        let err = reduce_lines(["data: {not json"]).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn finish_reason_keeps_last_non_empty() {
        let state = reduce_lines([
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":""}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":null}]}"#,
        ])
        .unwrap();
        assert_eq!(state.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn usage_only_chunk_is_accepted() {
        let state = reduce_lines([
            r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
        ])
        .unwrap();
        assert_eq!(state.usage.total_tokens, Some(7));
    }

    #[test]
    fn fragments_finalize_in_index_order() {
        let state = reduce_lines([
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"calculate","arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"get_weather","arguments":"{}"}}]}}]}"#,
        ])
        .unwrap();
        let response = state.finish(Duration::ZERO);
        let names: Vec<_> = response
            .choice
            .as_ref()
            .unwrap()
            .tool_calls()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["get_weather", "calculate"]);
    }

    #[test]
    fn empty_id_does_not_erase_earlier_id() {
        let state = reduce_lines([
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"calculate"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"","function":{"arguments":"{}"}}]}}]}"#,
        ])
        .unwrap();
        assert_eq!(state.fragments[&0].id, "call_1");
    }

    #[test]
    fn no_fragments_means_absent_tool_calls() {
        let response = StreamState::default().finish(Duration::ZERO);
        let choice = response.choice.unwrap();
        assert!(choice.tool_calls.is_none());
        assert!(choice.tool_calls().is_empty());
        assert_eq!(choice.content.as_deref(), Some(""));
    }
}
