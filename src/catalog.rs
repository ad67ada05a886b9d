//! Built-in test catalog: tool schemas, parser/model pairings, regression models and cases.
//!
//! Every entry here can be replaced from settings (see [`crate::config`]); these are the
//! defaults the harness ships with.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::evaluate::Expectation;

/// System instruction sent with every chat completion.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. When the user asks about weather or calculations, ALWAYS use the provided tools. Do not answer directly.";

/// Label prefix used for regression (auto-detect) configurations.
pub const AUTO_LABEL_PREFIX: &str = "auto:";

/// Substrings that mark a model as too large to run without opting in.
pub const DEFAULT_LARGE_MODEL_TAGS: &[&str] = &["Coder-Next", "70B", "397B", "Kimi-K2"];

/// A function tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    /// OpenAI `tools[]` entry for this definition.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Keys listed under the schema's `required` array, in schema order.
    pub fn required_keys(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Tools offered in every request.
pub fn default_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_weather".to_string(),
            description: "Get the current weather for a given city".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "City name, e.g. 'San Francisco'"},
                },
                "required": ["city"],
            }),
        },
        ToolDefinition {
            name: "calculate".to_string(),
            description: "Evaluate a mathematical expression and return the result".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Math expression to evaluate, e.g. '2 + 3 * 4'",
                    },
                },
                "required": ["expression"],
            }),
        },
    ]
}

/// Find a tool by name.
pub fn find_tool<'a>(tools: &'a [ToolDefinition], name: &str) -> Option<&'a ToolDefinition> {
    tools.iter().find(|tool| tool.name == name)
}

/// A parser under test and the one model it is exercised with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserModel {
    pub parser: String,
    pub model: String,
    #[serde(default)]
    pub reason: String,
}

/// Default parser table, in run order.
pub fn default_parser_models() -> Vec<ParserModel> {
    [
        ("hermes", "mlx-community/Qwen3-30B-A3B-4bit", "ChatML tokens available"),
        ("llama3_json", "mlx-community/Llama-3.3-70B-Instruct-4bit-DWQ", "Llama 3.3 70B"),
        ("gemma", "mlx-community/functiongemma-270m-it-bf16", "FunctionGemma 270M"),
        (
            "mistral",
            "mlx-community/mistralai_Devstral-Small-2-24B-Instruct-2512-MLX-8Bit",
            "Devstral Small 2 24B 8-bit",
        ),
        ("qwen3_xml", "mlx-community/Qwen3-Coder-Next-4bit", "Native Qwen3 XML"),
    ]
    .into_iter()
    .map(|(parser, model, reason)| ParserModel {
        parser: parser.to_string(),
        model: model.to_string(),
        reason: reason.to_string(),
    })
    .collect()
}

/// A model exercised without any parser override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionModel {
    pub model: String,
    /// Which auto-detected format the server is expected to pick.
    #[serde(default)]
    pub description: String,
    /// Explicitly flagged as large, independent of the tag heuristic.
    #[serde(default)]
    pub large: bool,
}

/// Default regression models, in run order.
pub fn default_regression_models() -> Vec<RegressionModel> {
    [
        ("mlx-community/GLM-4.7-Flash-4bit", "auto-detect .glm4", true),
        ("mlx-community/Qwen3-30B-A3B-4bit", "auto-detect qwen3_moe", false),
        ("mlx-community/Qwen3-Coder-Next-4bit", "auto-detect .xmlFunction", true),
    ]
    .into_iter()
    .map(|(model, description, large)| RegressionModel {
        model: model.to_string(),
        description: description.to_string(),
        large,
    })
    .collect()
}

/// One prompt sent to a running server, and what the response must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub prompt: String,
    pub expectation: Expectation,
    pub stream: bool,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        prompt: impl Into<String>,
        expectation: Expectation,
        stream: bool,
    ) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            expectation,
            stream,
        }
    }
}

/// Cases run against every parser-mode configuration, in order.
pub fn parser_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "weather_nonstream",
            "What is the weather in Tokyo?",
            Expectation::tool("get_weather"),
            false,
        ),
        TestCase::new(
            "weather_stream",
            "What is the weather in London right now?",
            Expectation::tool("get_weather"),
            true,
        ),
        TestCase::new(
            "calc_nonstream",
            "Use the calculator to compute 17 * 23 + 5",
            Expectation::tool("calculate"),
            false,
        ),
        TestCase::new(
            "calc_stream",
            "Please calculate 99 * 101 using the tool",
            Expectation::tool("calculate"),
            true,
        ),
    ]
}

/// Reduced case set for regression configurations: one sync, one streamed.
pub fn regression_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "weather_nonstream",
            "What is the weather in Tokyo?",
            Expectation::tool("get_weather"),
            false,
        ),
        TestCase::new(
            "calc_stream",
            "Please calculate 99 * 101 using the tool",
            Expectation::tool("calculate"),
            true,
        ),
    ]
}

/// Last path segment of a model id (`org/name` -> `name`).
pub fn model_short_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}
