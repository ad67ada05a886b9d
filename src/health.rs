//! Readiness polling for a freshly started server.

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::client::describe;
use crate::error::Result;
use crate::server::ServerHandle;

/// Bytes of server log surfaced when the process died during startup.
pub const EXITED_LOG_TAIL: usize = 500;
/// Bytes of server log surfaced when the deadline elapsed.
pub const TIMEOUT_LOG_TAIL: usize = 1000;

/// Polling cadence for [`HealthProbe::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub attempt_timeout: Duration,
    pub interval: Duration,
    /// Log a progress line every this many attempts; 0 disables it.
    pub progress_every: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(3),
            interval: Duration::from_secs(2),
            progress_every: 10,
        }
    }
}

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    ProcessExited,
    DeadlineElapsed,
}

/// Polls `GET /v1/models` until the server answers.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: Client,
    settings: ProbeSettings,
}

impl HealthProbe {
    pub fn new(settings: ProbeSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.attempt_timeout).build()?;
        Ok(Self { client, settings })
    }

    /// Block until the server is ready, has exited, or `timeout` elapses.
    ///
    /// On failure the tail of the server log is logged; nothing is returned for it.
    pub fn wait(&self, handle: &mut ServerHandle, timeout: Duration) -> bool {
        self.wait_outcome(handle, timeout) == ProbeOutcome::Ready
    }

    pub fn wait_outcome(&self, handle: &mut ServerHandle, timeout: Duration) -> ProbeOutcome {
        let url = format!("http://127.0.0.1:{}/v1/models", handle.port());
        let start = Instant::now();
        let deadline = start + timeout;
        let mut attempts: u32 = 0;

        loop {
            if handle.has_exited() {
                return Self::exited(handle);
            }

            attempts += 1;
            match self.client.get(&url).send() {
                // Another listener may hold the port; only a live process counts.
                Ok(response) if response.status().is_success() => {
                    if handle.has_exited() {
                        return Self::exited(handle);
                    }
                    info!(
                        label = handle.label(),
                        attempts,
                        secs = start.elapsed().as_secs_f64(),
                        "Server ready"
                    );
                    return ProbeOutcome::Ready;
                }
                Ok(response) => debug!(status = %response.status(), "Readiness probe not ready"),
                Err(err) => debug!(error = %describe(&err), "Readiness probe failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    label = handle.label(),
                    timeout_secs = timeout.as_secs_f64(),
                    log_tail = %handle.log_tail(TIMEOUT_LOG_TAIL),
                    "Server not ready before deadline"
                );
                return ProbeOutcome::DeadlineElapsed;
            }

            if self.settings.progress_every > 0 && attempts % self.settings.progress_every == 0 {
                info!(
                    label = handle.label(),
                    attempts,
                    secs = start.elapsed().as_secs(),
                    "Still waiting for server"
                );
            }
            thread::sleep(self.settings.interval.min(deadline - now));
        }
    }

    fn exited(handle: &ServerHandle) -> ProbeOutcome {
        warn!(
            label = handle.label(),
            pid = handle.pid(),
            log_tail = %handle.log_tail(EXITED_LOG_TAIL),
            "Server exited before becoming ready"
        );
        ProbeOutcome::ProcessExited
    }
}
