//! Run planning: which configurations run, in which order, and which are skipped.
//!
//! Parser-mode configurations come first (in selection order), then regression
//! configurations (in table order). Planning never spawns anything; it only inspects the
//! model cache directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::catalog::{AUTO_LABEL_PREFIX, ParserModel, RegressionModel, model_short_name};

/// Parser passed to the server, or none so the server auto-detects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserSelection {
    Named(String),
    AutoDetect,
}

impl ParserSelection {
    pub fn as_override(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::AutoDetect => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    /// `reason` says why this model was paired with the parser.
    Parser { reason: String },
    Regression { description: String },
}

impl RunMode {
    pub const fn is_regression(&self) -> bool {
        matches!(self, Self::Regression { .. })
    }

    /// Free-text note shown next to the configuration in logs.
    pub fn note(&self) -> &str {
        match self {
            Self::Parser { reason } => reason,
            Self::Regression { description } => description,
        }
    }
}

/// One server configuration to exercise. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfiguration {
    /// Parser name, or `auto:<model short name>` for regression runs.
    pub label: String,
    pub parser: ParserSelection,
    pub model: String,
    pub mode: RunMode,
}

impl TestConfiguration {
    pub fn parser_mode(parser: &str, model: &str) -> Self {
        Self {
            label: parser.to_string(),
            parser: ParserSelection::Named(parser.to_string()),
            model: model.to_string(),
            mode: RunMode::Parser {
                reason: String::new(),
            },
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: &str) -> Self {
        if let RunMode::Parser { reason: slot } = &mut self.mode {
            *slot = reason.to_string();
        }
        self
    }

    pub fn regression(model: &str, description: &str) -> Self {
        Self {
            label: regression_label(model),
            parser: ParserSelection::AutoDetect,
            model: model.to_string(),
            mode: RunMode::Regression {
                description: description.to_string(),
            },
        }
    }
}

/// Why a configuration never started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnknownParser,
    LargeModel,
    ModelNotCached { path: PathBuf },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownParser => f.write_str("Unknown parser"),
            Self::LargeModel => f.write_str("Large model, skipped without --include-large"),
            Self::ModelNotCached { path } => {
                write!(f, "Model directory not found: {}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedRun {
    Eligible(TestConfiguration),
    Skipped {
        label: String,
        model: Option<String>,
        reason: SkipReason,
    },
}

impl PlannedRun {
    pub fn label(&self) -> &str {
        match self {
            Self::Eligible(config) => &config.label,
            Self::Skipped { label, .. } => label,
        }
    }

    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }
}

/// Inputs that shape a plan.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Explicit parser selection; `None` selects the whole table in order.
    pub parsers: Option<Vec<String>>,
    pub include_large: bool,
    pub run_parsers: bool,
    pub run_regression: bool,
    pub model_cache: PathBuf,
    pub large_tags: Vec<String>,
}

pub fn regression_label(model: &str) -> String {
    format!("{AUTO_LABEL_PREFIX}{}", model_short_name(model))
}

/// Size heuristic: any tag appearing in the model id marks it large.
pub fn is_large_model(model: &str, large_tags: &[String]) -> bool {
    large_tags.iter().any(|tag| !tag.is_empty() && model.contains(tag.as_str()))
}

/// Where a model is expected in the local cache.
pub fn model_dir(model_cache: &Path, model: &str) -> PathBuf {
    model_cache.join(model)
}

/// Enumerate every configuration with its eligibility.
pub fn plan_runs(
    parser_table: &[ParserModel],
    regression_models: &[RegressionModel],
    options: &PlanOptions,
) -> Vec<PlannedRun> {
    let mut runs = Vec::new();

    if options.run_parsers {
        let selected: Vec<&str> = match &options.parsers {
            Some(names) => names.iter().map(String::as_str).collect(),
            None => parser_table.iter().map(|entry| entry.parser.as_str()).collect(),
        };
        for name in selected {
            let Some(entry) = parser_table.iter().find(|entry| entry.parser == name) else {
                runs.push(PlannedRun::Skipped {
                    label: name.to_string(),
                    model: None,
                    reason: SkipReason::UnknownParser,
                });
                continue;
            };
            let config =
                TestConfiguration::parser_mode(&entry.parser, &entry.model).with_reason(&entry.reason);
            runs.push(check_eligibility(config, false, options));
        }
    }

    if options.run_regression {
        for entry in regression_models {
            let config = TestConfiguration::regression(&entry.model, &entry.description);
            runs.push(check_eligibility(config, entry.large, options));
        }
    }

    runs
}

fn check_eligibility(
    config: TestConfiguration,
    flagged_large: bool,
    options: &PlanOptions,
) -> PlannedRun {
    let large = flagged_large || is_large_model(&config.model, &options.large_tags);
    if large && !options.include_large {
        return PlannedRun::Skipped {
            label: config.label,
            model: Some(config.model),
            reason: SkipReason::LargeModel,
        };
    }
    let dir = model_dir(&options.model_cache, &config.model);
    if !dir.is_dir() {
        return PlannedRun::Skipped {
            label: config.label,
            model: Some(config.model),
            reason: SkipReason::ModelNotCached { path: dir },
        };
    }
    PlannedRun::Eligible(config)
}
