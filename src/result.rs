//! Result records.
//!
//! Every configuration yields either one `skipped` record, or one `server_start` record
//! followed (only when the server started) by one record per test case.

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::evaluate::CaseDetail;
use crate::plan::{RunMode, SkipReason, TestConfiguration};

pub const SERVER_START_TEST: &str = "server_start";
pub const SKIPPED_TEST: &str = "skipped";

/// Detail of the synthetic server-start record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Expected auto-detected format, for regression runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seconds from spawn until ready (or until giving up).
    pub startup_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skipped { reason: String },
    ServerStart { started: bool, detail: StartDetail },
    Case { stream: bool, detail: CaseDetail },
}

/// One append-only result row.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Configuration label: the parser name or `auto:<model>`.
    pub label: String,
    pub model: Option<String>,
    pub test: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Local>,
}

impl TestResult {
    pub fn skipped(label: &str, model: Option<&str>, reason: &SkipReason) -> Self {
        Self {
            label: label.to_string(),
            model: model.map(str::to_string),
            test: SKIPPED_TEST.to_string(),
            outcome: Outcome::Skipped {
                reason: reason.to_string(),
            },
            timestamp: Local::now(),
        }
    }

    pub fn server_started(config: &TestConfiguration, startup_s: f64, log: Option<String>) -> Self {
        Self::server_start(
            config,
            true,
            StartDetail {
                message: Some("Server started successfully".to_string()),
                error: None,
                description: description(&config.mode),
                startup_s,
                log,
            },
        )
    }

    pub fn server_failed(
        config: &TestConfiguration,
        error: String,
        startup_s: f64,
        log: Option<String>,
    ) -> Self {
        Self::server_start(
            config,
            false,
            StartDetail {
                message: None,
                error: Some(error),
                description: description(&config.mode),
                startup_s,
                log,
            },
        )
    }

    fn server_start(config: &TestConfiguration, started: bool, detail: StartDetail) -> Self {
        Self {
            label: config.label.clone(),
            model: Some(config.model.clone()),
            test: SERVER_START_TEST.to_string(),
            outcome: Outcome::ServerStart { started, detail },
            timestamp: Local::now(),
        }
    }

    pub fn case(config: &TestConfiguration, test: &str, stream: bool, detail: CaseDetail) -> Self {
        Self {
            label: config.label.clone(),
            model: Some(config.model.clone()),
            test: test.to_string(),
            outcome: Outcome::Case { stream, detail },
            timestamp: Local::now(),
        }
    }

    pub const fn passed(&self) -> bool {
        match &self.outcome {
            Outcome::Skipped { .. } => false,
            Outcome::ServerStart { started, .. } => *started,
            Outcome::Case { detail, .. } => detail.passed(),
        }
    }

    pub const fn stream(&self) -> Option<bool> {
        match &self.outcome {
            Outcome::Case { stream, .. } => Some(*stream),
            _ => None,
        }
    }

    /// Whether this row counts towards the pass/fail totals.
    pub const fn is_counted(&self) -> bool {
        matches!(self.outcome, Outcome::Case { .. })
    }

    pub const fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Skipped { .. } => None,
            Outcome::ServerStart { detail, .. } => detail.error.as_deref(),
            Outcome::Case { detail, .. } => detail.error.as_deref(),
        }
    }
}

fn description(mode: &RunMode) -> Option<String> {
    match mode {
        RunMode::Parser { .. } => None,
        RunMode::Regression { description } => Some(description.clone()),
    }
}

#[derive(Serialize)]
struct SkipDetail<'a> {
    reason: &'a str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum DetailRef<'a> {
    Skip(SkipDetail<'a>),
    Start(&'a StartDetail),
    Case(&'a CaseDetail),
}

/// JSONL record shape.
#[derive(Serialize)]
struct Record<'a> {
    parser: &'a str,
    model: Option<&'a str>,
    test: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    passed: bool,
    details: DetailRef<'a>,
    timestamp: &'a DateTime<Local>,
}

impl Serialize for TestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let details = match &self.outcome {
            Outcome::Skipped { reason } => DetailRef::Skip(SkipDetail { reason }),
            Outcome::ServerStart { detail, .. } => DetailRef::Start(detail),
            Outcome::Case { detail, .. } => DetailRef::Case(detail),
        };
        Record {
            parser: &self.label,
            model: self.model.as_deref(),
            test: &self.test,
            stream: self.stream(),
            passed: self.passed(),
            details,
            timestamp: &self.timestamp,
        }
        .serialize(serializer)
    }
}
