//! toolcall-harness - tool-call parser regression runs against a local inference server

#![forbid(unsafe_code)]

use std::io;

use anyhow::{Context as _, Result};
use clap::Parser;
use toolcall_harness::cli::Cli;
use toolcall_harness::config::Config;
use toolcall_harness::orchestrator::Orchestrator;
use toolcall_harness::plan::plan_runs;
use toolcall_harness::report::{JsonlWriter, ReportPaths, Summary, write_html};
use toolcall_harness::server::ensure_binary;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    match main_impl() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            print_error_with_hints(&err);
            std::process::exit(1);
        }
    }
}

/// Returns whether every counted test passed.
fn main_impl() -> Result<bool> {
    let cli = Cli::parse();

    if cli.version {
        print_version();
        return Ok(true);
    }

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let settings = config.resolve(&cli)?;
    ensure_binary(&settings.binary)?;

    std::fs::create_dir_all(&settings.report_dir).with_context(|| {
        format!(
            "Failed to create report directory {}",
            settings.report_dir.display()
        )
    })?;
    let now = chrono::Local::now();
    let paths = ReportPaths::new(&settings.report_dir, &now.format("%Y%m%d_%H%M%S").to_string());

    let plan = plan_runs(&settings.parser_table, &settings.regression_models, &settings.plan);
    info!(
        binary = %settings.binary.display(),
        cache = %settings.model_cache.display(),
        port = settings.run.port,
        configurations = plan.len(),
        eligible = plan.iter().filter(|run| run.is_eligible()).count(),
        "Tool call parser test suite"
    );

    let orchestrator = Orchestrator::new(settings.run.clone())?;
    let mut jsonl = JsonlWriter::create(&paths.jsonl)?;
    let mut results = Vec::new();
    orchestrator.run_each(&plan, |result| {
        if let Err(err) = jsonl.append(&result) {
            warn!(error = %err, path = %paths.jsonl.display(), "Failed to append result");
        }
        results.push(result);
    });
    let jsonl_path = jsonl.finish()?;
    info!(path = %jsonl_path.display(), records = results.len(), "JSONL written");

    if settings.write_html {
        let generated = now.format("%Y-%m-%d %H:%M:%S").to_string();
        write_html(&paths.html, &results, &generated, &jsonl_path)?;
        info!(path = %paths.html.display(), "HTML report written");
    }

    let summary = Summary::from_results(&results);
    println!(
        "Results: {} passed, {} failed, {} skipped, {} total",
        summary.passed, summary.failed, summary.skipped, summary.total
    );
    for result in results.iter().filter(|r| !r.passed() && !r.is_skipped()) {
        println!(
            "  FAIL {} / {}: {}",
            result.label,
            result.test,
            result.error().unwrap_or("-")
        );
    }

    Ok(summary.all_passed())
}

fn print_error_with_hints(err: &anyhow::Error) {
    for cause in err.chain() {
        if let Some(harness_error) = cause.downcast_ref::<toolcall_harness::Error>() {
            eprint!(
                "{}",
                toolcall_harness::error_hints::format_error_with_hints(harness_error)
            );
            return;
        }
    }

    eprintln!("{err}");
}

fn print_version() {
    println!(
        "toolcall-harness {} ({} {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or(""),
    );
}
