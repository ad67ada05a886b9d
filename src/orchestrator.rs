//! Sequential run driver.
//!
//! Configurations run strictly one after another in plan order: start the server, wait for
//! readiness, run each test case in declared order, then stop the server and cool down.
//! Failures are recorded against the configuration or case that produced them and the run
//! moves on.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::catalog::{TestCase, ToolDefinition};
use crate::client::{RequestClient, RequestOptions};
use crate::error::Result;
use crate::evaluate::{classify, transport_failure};
use crate::health::{HealthProbe, ProbeOutcome, ProbeSettings};
use crate::plan::{PlannedRun, RunMode, TestConfiguration};
use crate::result::TestResult;
use crate::server::{ServerCommand, ServerHandle, StopTimeouts, cool_down};

/// Everything the driver needs besides the plan.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub command: ServerCommand,
    pub port: u16,
    pub probe: ProbeSettings,
    pub health_timeout: Duration,
    pub request: RequestOptions,
    pub parser_request_timeout: Duration,
    pub regression_request_timeout: Duration,
    pub stop: StopTimeouts,
    pub cool_down: Duration,
    pub tools: Vec<ToolDefinition>,
    pub parser_cases: Vec<TestCase>,
    pub regression_cases: Vec<TestCase>,
}

impl RunSettings {
    fn cases_for(&self, mode: &RunMode) -> &[TestCase] {
        match mode {
            RunMode::Parser { .. } => &self.parser_cases,
            RunMode::Regression { .. } => &self.regression_cases,
        }
    }

    const fn request_timeout(&self, mode: &RunMode) -> Duration {
        match mode {
            RunMode::Parser { .. } => self.parser_request_timeout,
            RunMode::Regression { .. } => self.regression_request_timeout,
        }
    }
}

pub struct Orchestrator {
    settings: RunSettings,
    probe: HealthProbe,
    client: RequestClient,
}

impl Orchestrator {
    pub fn new(settings: RunSettings) -> Result<Self> {
        let probe = HealthProbe::new(settings.probe)?;
        let client = RequestClient::for_port(settings.port, settings.request.clone())?;
        Ok(Self {
            settings,
            probe,
            client,
        })
    }

    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Drive the whole plan and collect every result.
    pub fn run(&self, plan: &[PlannedRun]) -> Vec<TestResult> {
        let mut results = Vec::new();
        self.run_each(plan, |result| results.push(result));
        results
    }

    /// Drive the whole plan, handing each result to `sink` as soon as it exists.
    pub fn run_each<F>(&self, plan: &[PlannedRun], mut sink: F)
    where
        F: FnMut(TestResult),
    {
        for (position, run) in plan.iter().enumerate() {
            match run {
                PlannedRun::Skipped {
                    label,
                    model,
                    reason,
                } => {
                    info!(label = %label, reason = %reason, "Skipping configuration");
                    sink(TestResult::skipped(label, model.as_deref(), reason));
                }
                PlannedRun::Eligible(config) => {
                    info!(
                        label = %config.label,
                        model = %config.model,
                        regression = config.mode.is_regression(),
                        note = config.mode.note(),
                        position = position + 1,
                        of = plan.len(),
                        "Running configuration"
                    );
                    self.run_configuration(config, &mut sink);
                }
            }
        }
    }

    fn run_configuration<F>(&self, config: &TestConfiguration, sink: &mut F)
    where
        F: FnMut(TestResult),
    {
        let settings = &self.settings;
        let started_at = Instant::now();
        let handle = settings.command.start(
            &config.label,
            &config.model,
            config.parser.as_override(),
            settings.port,
        );
        let mut handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                warn!(label = %config.label, error = %err, "Server failed to spawn");
                sink(TestResult::server_failed(
                    config,
                    err.to_string(),
                    round_secs(started_at.elapsed()),
                    None,
                ));
                return;
            }
        };

        self.exercise(config, &mut handle, started_at, sink);

        handle.stop(settings.stop);
        cool_down(settings.cool_down);
    }

    fn exercise<F>(
        &self,
        config: &TestConfiguration,
        handle: &mut ServerHandle,
        started_at: Instant,
        sink: &mut F,
    ) where
        F: FnMut(TestResult),
    {
        let settings = &self.settings;
        let log = Some(handle.log_path().display().to_string());
        let outcome = self.probe.wait_outcome(handle, settings.health_timeout);
        let startup_s = round_secs(started_at.elapsed());

        let error = match outcome {
            ProbeOutcome::Ready => None,
            ProbeOutcome::ProcessExited => Some("Server exited before becoming ready".to_string()),
            ProbeOutcome::DeadlineElapsed => Some(format!(
                "Server failed to start within {}s",
                settings.health_timeout.as_secs()
            )),
        };
        if let Some(error) = error {
            sink(TestResult::server_failed(config, error, startup_s, log));
            return;
        }
        sink(TestResult::server_started(config, startup_s, log));

        let timeout = settings.request_timeout(&config.mode);
        for case in settings.cases_for(&config.mode) {
            sink(self.run_case(config, case, timeout));
        }
    }

    fn run_case(&self, config: &TestConfiguration, case: &TestCase, timeout: Duration) -> TestResult {
        let tools = &self.settings.tools;
        let started_at = Instant::now();
        let detail = match self.client.send(&case.prompt, tools, case.stream, timeout) {
            Ok(response) => classify(&response, &case.expectation, tools).1,
            Err(err) => {
                warn!(label = %config.label, test = %case.name, error = %err, "Request failed");
                transport_failure(started_at.elapsed().as_secs_f64(), &err)
            }
        };
        info!(
            label = %config.label,
            test = %case.name,
            stream = case.stream,
            passed = detail.passed(),
            elapsed_s = detail.elapsed_s,
            error = detail.error.as_deref().unwrap_or(""),
            "{}",
            if detail.passed() { "PASS" } else { "FAIL" }
        );
        TestResult::case(config, &case.name, case.stream, detail)
    }
}

fn round_secs(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100.0).round() / 100.0
}
