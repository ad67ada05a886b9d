//! Response evaluation.
//!
//! [`classify`] turns a [`NormalizedResponse`] and an [`Expectation`] into a verdict. It is a
//! pure function: the same inputs always give the same `(passed, detail)` pair.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::{ToolDefinition, find_tool};
use crate::error::Error;
use crate::model::{NormalizedResponse, ToolCall};

/// Maximum characters of response text kept in a detail record.
pub const CONTENT_SNIPPET_CHARS: usize = 200;
/// Maximum characters of raw argument text kept when arguments fail to parse.
pub const ARGUMENTS_RAW_CHARS: usize = 500;

/// What a test case requires of the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The first tool call must name this tool and carry its required arguments.
    Tool(String),
    /// The response must not contain any tool call.
    NoTool,
}

impl Expectation {
    pub fn tool(name: impl Into<String>) -> Self {
        Self::Tool(name.into())
    }

    pub fn expected_tool(&self) -> Option<&str> {
        match self {
            Self::Tool(name) => Some(name),
            Self::NoTool => None,
        }
    }
}

/// Discriminated detail of one evaluated case.
///
/// Serialized with a `verdict` tag so report consumers can branch without parsing the
/// human-facing `error` text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The expected tool was called with usable arguments.
    ToolCalled {
        tool_name: String,
        arguments: Map<String, Value>,
        finish_reason: Option<String>,
        num_tool_calls: usize,
    },
    /// No tool call was expected and none was made.
    TextOnly {
        content_snippet: String,
        finish_reason: Option<String>,
    },
    NoChoices,
    MissingToolCalls {
        finish_reason: Option<String>,
        content_snippet: String,
    },
    WrongTool {
        expected: String,
        tool_calls: Vec<ToolCall>,
    },
    ArgumentsNotObject {
        found: &'static str,
        arguments_raw: String,
    },
    InvalidArguments {
        parse_error: String,
        arguments_raw: String,
    },
    MissingArgument {
        key: String,
        arguments: Map<String, Value>,
    },
    UnexpectedToolCalls { tool_calls: Vec<ToolCall> },
    /// The request itself failed; no response was evaluated.
    Transport { kind: &'static str, message: String },
}

impl Verdict {
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::ToolCalled { .. } | Self::TextOnly { .. })
    }

    /// Human-facing failure text, `None` for passing verdicts.
    pub fn error_message(&self) -> Option<String> {
        let message = match self {
            Self::ToolCalled { .. } | Self::TextOnly { .. } => return None,
            Self::NoChoices => "No choices in response".to_string(),
            Self::MissingToolCalls { .. } => "Expected tool_calls but got none".to_string(),
            Self::WrongTool {
                expected,
                tool_calls,
            } => {
                let got = tool_calls.first().map_or("", |call| call.name.as_str());
                format!("Expected tool '{expected}' but got '{got}'")
            }
            Self::ArgumentsNotObject { found, .. } => format!("Arguments not an object: {found}"),
            Self::InvalidArguments { parse_error, .. } => {
                format!("Invalid JSON arguments: {parse_error}")
            }
            Self::MissingArgument { key, .. } => format!("Missing '{key}' key in arguments"),
            Self::UnexpectedToolCalls { .. } => "Got unexpected tool_calls".to_string(),
            Self::Transport { message, .. } => message.clone(),
        };
        Some(message)
    }
}

/// Detail record attached to a case result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDetail {
    /// Request wall time in seconds, two decimals.
    pub elapsed_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl CaseDetail {
    pub fn new(elapsed_s: f64, verdict: Verdict) -> Self {
        Self {
            elapsed_s,
            error: verdict.error_message(),
            verdict,
        }
    }

    pub const fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::ToolCalled { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }

    pub fn content_snippet(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::TextOnly {
                content_snippet, ..
            }
            | Verdict::MissingToolCalls {
                content_snippet, ..
            } => Some(content_snippet),
            _ => None,
        }
    }
}

/// Detail for a request that never produced a response.
pub fn transport_failure(elapsed_s: f64, error: &Error) -> CaseDetail {
    CaseDetail::new(
        round_secs(elapsed_s),
        Verdict::Transport {
            kind: error.kind(),
            message: error.to_string(),
        },
    )
}

/// Classify a response against an expectation.
///
/// Only the first tool call is checked against the expected tool.
pub fn classify(
    response: &NormalizedResponse,
    expectation: &Expectation,
    tools: &[ToolDefinition],
) -> (bool, CaseDetail) {
    let verdict = verdict_for(response, expectation, tools);
    let detail = CaseDetail::new(response.elapsed_secs_rounded(), verdict);
    (detail.passed(), detail)
}

fn verdict_for(
    response: &NormalizedResponse,
    expectation: &Expectation,
    tools: &[ToolDefinition],
) -> Verdict {
    let Some(choice) = &response.choice else {
        return Verdict::NoChoices;
    };
    let calls = choice.tool_calls();

    let expected = match expectation {
        Expectation::NoTool if calls.is_empty() => {
            return Verdict::TextOnly {
                content_snippet: truncate_chars(choice.content(), CONTENT_SNIPPET_CHARS),
                finish_reason: choice.finish_reason.clone(),
            };
        }
        Expectation::NoTool => {
            return Verdict::UnexpectedToolCalls {
                tool_calls: calls.to_vec(),
            };
        }
        Expectation::Tool(name) => name,
    };

    let Some(first) = calls.first() else {
        return Verdict::MissingToolCalls {
            finish_reason: choice.finish_reason.clone(),
            content_snippet: truncate_chars(choice.content(), CONTENT_SNIPPET_CHARS),
        };
    };

    if first.name != *expected {
        return Verdict::WrongTool {
            expected: expected.clone(),
            tool_calls: calls.to_vec(),
        };
    }

    let arguments = match serde_json::from_str::<Value>(&first.arguments) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Verdict::ArgumentsNotObject {
                found: json_type_name(&other),
                arguments_raw: truncate_chars(&first.arguments, ARGUMENTS_RAW_CHARS),
            };
        }
        Err(err) => {
            return Verdict::InvalidArguments {
                parse_error: err.to_string(),
                arguments_raw: truncate_chars(&first.arguments, ARGUMENTS_RAW_CHARS),
            };
        }
    };

    if let Some(tool) = find_tool(tools, expected) {
        if let Some(key) = tool
            .required_keys()
            .into_iter()
            .find(|key| !arguments.contains_key(*key))
        {
            return Verdict::MissingArgument {
                key: key.to_string(),
                arguments,
            };
        }
    }

    Verdict::ToolCalled {
        tool_name: first.name.clone(),
        arguments,
        finish_reason: choice.finish_reason.clone(),
        num_tool_calls: calls.len(),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
