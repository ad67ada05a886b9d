//! Configuration loading and resolution.
//!
//! Settings files hold optional overrides; [`Config::resolve`] layers them under the CLI and
//! environment and fills every remaining gap with the built-in defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::{
    DEFAULT_LARGE_MODEL_TAGS, ParserModel, RegressionModel, default_parser_models,
    default_regression_models, default_tools, parser_cases, regression_cases,
};
use crate::cli::Cli;
use crate::client::RequestOptions;
use crate::error::{Error, Result};
use crate::health::ProbeSettings;
use crate::orchestrator::RunSettings;
use crate::plan::PlanOptions;
use crate::server::{MIN_COOL_DOWN, ServerCommand, StopTimeouts};

pub const DEFAULT_SERVER_BINARY: &str = ".build/release/afm";
pub const DEFAULT_MODEL_CACHE: &str = "./models";
pub const DEFAULT_REPORT_DIR: &str = "./test-reports";
pub const DEFAULT_PORT: u16 = 9998;
/// Environment variable the server reads its model cache location from.
pub const SERVER_MODEL_CACHE_ENV: &str = "MACAFM_MLX_MODEL_CACHE";

/// Settings file contents. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server under test
    #[serde(alias = "serverBinary")]
    pub server_binary: Option<PathBuf>,
    /// Arguments placed before `-m <model>` (the backend subcommand).
    #[serde(alias = "serverArgs")]
    pub server_args: Option<Vec<String>>,
    #[serde(alias = "serverEnv")]
    pub server_env: Option<BTreeMap<String, String>>,
    #[serde(alias = "serverMaxTokens")]
    pub server_max_tokens: Option<u32>,
    pub port: Option<u16>,

    // Paths
    #[serde(alias = "modelCache")]
    pub model_cache: Option<PathBuf>,
    #[serde(alias = "reportDir")]
    pub report_dir: Option<PathBuf>,

    // Timing
    pub request: Option<RequestSettings>,
    pub health: Option<HealthSettings>,
    pub shutdown: Option<ShutdownSettings>,

    // Plans
    #[serde(alias = "largeModelTags")]
    pub large_model_tags: Option<Vec<String>>,
    pub parsers: Option<Vec<ParserModel>>,
    #[serde(alias = "regressionModels")]
    pub regression_models: Option<Vec<RegressionModel>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    #[serde(alias = "maxTokens")]
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    #[serde(alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(alias = "parserTimeoutSecs")]
    pub parser_timeout_secs: Option<f64>,
    #[serde(alias = "regressionTimeoutSecs")]
    pub regression_timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    #[serde(alias = "timeoutSecs")]
    pub timeout_secs: Option<f64>,
    #[serde(alias = "attemptTimeoutSecs")]
    pub attempt_timeout_secs: Option<f64>,
    #[serde(alias = "intervalSecs")]
    pub interval_secs: Option<f64>,
    #[serde(alias = "progressEvery")]
    pub progress_every: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    #[serde(alias = "graceSecs")]
    pub grace_secs: Option<f64>,
    #[serde(alias = "killSecs")]
    pub kill_secs: Option<f64>,
    #[serde(alias = "coolDownSecs")]
    pub cool_down_secs: Option<f64>,
}

/// Fully resolved settings for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    pub binary: PathBuf,
    pub model_cache: PathBuf,
    pub report_dir: PathBuf,
    pub write_html: bool,
    pub plan: PlanOptions,
    pub parser_table: Vec<ParserModel>,
    pub regression_models: Vec<RegressionModel>,
    pub run: RunSettings,
}

impl Config {
    /// Load configuration from the `--config` file, or global merged with project settings.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_with_roots(config_path, &Self::global_dir(), &cwd)
    }

    /// Get the global configuration directory.
    pub fn global_dir() -> PathBuf {
        global_dir_from_env(env_lookup)
    }

    /// Get the project configuration directory.
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".toolcall-harness")
    }

    /// Load settings from a specific path.
    fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse settings file {}: {e}",
                path.display()
            ))
        })?;
        Ok(config)
    }

    pub fn load_with_roots(
        config_path: Option<&Path>,
        global_dir: &Path,
        cwd: &Path,
    ) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_path(path);
        }

        let global = Self::load_from_path(&global_dir.join("settings.json"))?;
        let project = Self::load_from_path(&cwd.join(Self::project_dir()).join("settings.json"))?;
        Ok(Self::merge(global, project))
    }

    /// Merge two configurations, with `other` taking precedence.
    pub fn merge(base: Self, other: Self) -> Self {
        Self {
            server_binary: other.server_binary.or(base.server_binary),
            server_args: other.server_args.or(base.server_args),
            server_env: merge_env(base.server_env, other.server_env),
            server_max_tokens: other.server_max_tokens.or(base.server_max_tokens),
            port: other.port.or(base.port),

            model_cache: other.model_cache.or(base.model_cache),
            report_dir: other.report_dir.or(base.report_dir),

            request: merge_request(base.request, other.request),
            health: merge_health(base.health, other.health),
            shutdown: merge_shutdown(base.shutdown, other.shutdown),

            large_model_tags: other.large_model_tags.or(base.large_model_tags),
            parsers: other.parsers.or(base.parsers),
            regression_models: other.regression_models.or(base.regression_models),
        }
    }

    /// Resolve CLI > environment > settings > defaults.
    pub fn resolve(&self, cli: &Cli) -> Result<HarnessSettings> {
        self.resolve_with_env(cli, env_lookup)
    }

    fn resolve_with_env<F>(&self, cli: &Cli, get_env: F) -> Result<HarnessSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        if cli.regression_only && cli.no_regression {
            return Err(Error::config(
                "--regression-only and --no-regression cannot be combined",
            ));
        }

        let binary = cli
            .binary
            .clone()
            .or_else(|| get_env("TOOLCALL_HARNESS_SERVER_BIN").map(PathBuf::from))
            .or_else(|| self.server_binary.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVER_BINARY));
        let model_cache = cli
            .model_cache
            .clone()
            .or_else(|| get_env("TOOLCALL_HARNESS_MODEL_CACHE").map(PathBuf::from))
            .or_else(|| get_env(SERVER_MODEL_CACHE_ENV).map(PathBuf::from))
            .or_else(|| self.model_cache.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_CACHE));
        let report_dir = cli
            .report_dir
            .clone()
            .or_else(|| self.report_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR));
        let port = cli.port.or(self.port).unwrap_or(DEFAULT_PORT);

        let mut env = BTreeMap::from([("AFM_DEBUG".to_string(), "1".to_string())]);
        env.extend(self.server_env.clone().unwrap_or_default());
        env.insert(
            SERVER_MODEL_CACHE_ENV.to_string(),
            model_cache.display().to_string(),
        );

        let request = self.request.clone().unwrap_or_default();
        let health = self.health.clone().unwrap_or_default();
        let shutdown = self.shutdown.clone().unwrap_or_default();
        let request_defaults = RequestOptions::default();
        let probe_defaults = ProbeSettings::default();

        let run = RunSettings {
            command: ServerCommand {
                binary: binary.clone(),
                prefix_args: self
                    .server_args
                    .clone()
                    .unwrap_or_else(|| vec!["mlx".to_string()]),
                max_tokens: self.server_max_tokens.unwrap_or(1024),
                env,
                log_dir: report_dir.clone(),
            },
            port,
            probe: ProbeSettings {
                attempt_timeout: secs(health.attempt_timeout_secs, probe_defaults.attempt_timeout),
                interval: secs(health.interval_secs, probe_defaults.interval),
                progress_every: health.progress_every.unwrap_or(probe_defaults.progress_every),
            },
            health_timeout: secs(health.timeout_secs, Duration::from_secs(240)),
            request: RequestOptions {
                system_prompt: request
                    .system_prompt
                    .unwrap_or(request_defaults.system_prompt),
                max_tokens: request.max_tokens.unwrap_or(request_defaults.max_tokens),
                temperature: request.temperature.unwrap_or(request_defaults.temperature),
            },
            parser_request_timeout: secs(request.parser_timeout_secs, Duration::from_secs(120)),
            regression_request_timeout: secs(
                request.regression_timeout_secs,
                Duration::from_secs(180),
            ),
            stop: StopTimeouts {
                graceful: secs(shutdown.grace_secs, StopTimeouts::default().graceful),
                kill: secs(shutdown.kill_secs, StopTimeouts::default().kill),
            },
            cool_down: cool_down_floor(secs(shutdown.cool_down_secs, Duration::from_secs(5))),
            tools: default_tools(),
            parser_cases: parser_cases(),
            regression_cases: regression_cases(),
        };

        let plan = PlanOptions {
            parsers: cli.selected_parsers().filter(|names| !names.is_empty()),
            include_large: cli.include_large,
            run_parsers: !cli.regression_only,
            run_regression: !cli.no_regression,
            model_cache: model_cache.clone(),
            large_tags: self.large_model_tags.clone().unwrap_or_else(|| {
                DEFAULT_LARGE_MODEL_TAGS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
        };

        Ok(HarnessSettings {
            binary,
            model_cache,
            report_dir,
            write_html: !cli.no_html,
            plan,
            parser_table: self.parsers.clone().unwrap_or_else(default_parser_models),
            regression_models: self
                .regression_models
                .clone()
                .unwrap_or_else(default_regression_models),
            run,
        })
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn global_dir_from_env<F>(get_env: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    get_env("TOOLCALL_HARNESS_DIR").map_or_else(
        || {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".toolcall-harness")
        },
        PathBuf::from,
    )
}

/// Seconds from settings, ignoring negative or non-finite values.
fn secs(value: Option<f64>, default: Duration) -> Duration {
    value
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(default)
}

fn cool_down_floor(configured: Duration) -> Duration {
    if configured < MIN_COOL_DOWN {
        warn!(
            configured_secs = configured.as_secs_f64(),
            min_secs = MIN_COOL_DOWN.as_secs_f64(),
            "coolDownSecs below minimum, clamped"
        );
        return MIN_COOL_DOWN;
    }
    configured
}

fn merge_env(
    base: Option<BTreeMap<String, String>>,
    other: Option<BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (base, other) {
        (Some(mut base), Some(other)) => {
            base.extend(other);
            Some(base)
        }
        (base, other) => other.or(base),
    }
}

fn merge_request(
    base: Option<RequestSettings>,
    other: Option<RequestSettings>,
) -> Option<RequestSettings> {
    match (base, other) {
        (Some(base), Some(other)) => Some(RequestSettings {
            max_tokens: other.max_tokens.or(base.max_tokens),
            temperature: other.temperature.or(base.temperature),
            system_prompt: other.system_prompt.or(base.system_prompt),
            parser_timeout_secs: other.parser_timeout_secs.or(base.parser_timeout_secs),
            regression_timeout_secs: other
                .regression_timeout_secs
                .or(base.regression_timeout_secs),
        }),
        (base, other) => other.or(base),
    }
}

fn merge_health(
    base: Option<HealthSettings>,
    other: Option<HealthSettings>,
) -> Option<HealthSettings> {
    match (base, other) {
        (Some(base), Some(other)) => Some(HealthSettings {
            timeout_secs: other.timeout_secs.or(base.timeout_secs),
            attempt_timeout_secs: other.attempt_timeout_secs.or(base.attempt_timeout_secs),
            interval_secs: other.interval_secs.or(base.interval_secs),
            progress_every: other.progress_every.or(base.progress_every),
        }),
        (base, other) => other.or(base),
    }
}

fn merge_shutdown(
    base: Option<ShutdownSettings>,
    other: Option<ShutdownSettings>,
) -> Option<ShutdownSettings> {
    match (base, other) {
        (Some(base), Some(other)) => Some(ShutdownSettings {
            grace_secs: other.grace_secs.or(base.grace_secs),
            kill_secs: other.kill_secs.or(base.kill_secs),
            cool_down_secs: other.cool_down_secs.or(base.cool_down_secs),
        }),
        (base, other) => other.or(base),
    }
}
