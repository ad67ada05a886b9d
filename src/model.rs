//! Response types shared by the request client, the stream aggregator and the evaluator.
//!
//! Both transports (one JSON body, or a reduced SSE stream) produce the same
//! [`NormalizedResponse`], so evaluation never needs to know how a response arrived.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Tool Calls
// ============================================================================

/// A finalized tool call.
///
/// `arguments` is kept as the raw text the server produced; whether it is a valid JSON
/// object is exactly what the evaluator checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// OpenAI wire shape of a tool call (`{id, type, function: {name, arguments}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "function_type", rename = "type")]
    kind: String,
    #[serde(default)]
    function: WireFunction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "arguments_as_text")]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

/// Some servers send `arguments` as an object instead of a JSON-encoded string.
fn arguments_as_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

impl From<WireToolCall> for ToolCall {
    fn from(wire: WireToolCall) -> Self {
        Self {
            id: wire.id.unwrap_or_default(),
            name: wire.function.name.unwrap_or_default(),
            arguments: wire.function.arguments,
        }
    }
}

impl From<ToolCall> for WireToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: Some(call.id),
            kind: function_type(),
            function: WireFunction {
                name: Some(call.name),
                arguments: call.arguments,
            },
        }
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Token usage counters as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

// ============================================================================
// Normalized Response
// ============================================================================

/// First choice of a chat completion, after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseChoice {
    pub content: Option<String>,
    /// `None` when the server sent no tool calls at all; `Some(vec![])` only when it sent an
    /// explicit empty list. Consumers treat both as "no tool calls".
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<String>,
}

impl ResponseChoice {
    /// Tool calls, empty when absent.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Text content, empty when absent.
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Finish reason, empty when absent.
    pub fn finish_reason(&self) -> &str {
        self.finish_reason.as_deref().unwrap_or_default()
    }
}

/// Transport-independent view of one chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResponse {
    /// Wall time from sending the request to the end of the body or stream.
    pub elapsed: Duration,
    /// `None` when the response carried no choices.
    pub choice: Option<ResponseChoice>,
    pub usage: Usage,
}

impl NormalizedResponse {
    /// Elapsed seconds rounded to two decimals, as reported in result details.
    pub fn elapsed_secs_rounded(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).round() / 100.0
    }
}

// ============================================================================
// Non-streaming wire types
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionBody {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionChoice {
    #[serde(default)]
    pub message: Option<ChatCompletionMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatCompletionBody {
    pub(crate) fn into_normalized(self, elapsed: Duration) -> NormalizedResponse {
        let choice = self.choices.into_iter().next().map(|choice| {
            let message = choice.message.unwrap_or_default();
            ResponseChoice {
                content: message.content,
                tool_calls: message.tool_calls,
                finish_reason: choice.finish_reason,
            }
        });
        NormalizedResponse {
            elapsed,
            choice,
            usage: self.usage.unwrap_or_default(),
        }
    }
}
