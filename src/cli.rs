//! CLI argument parsing using Clap.

use std::path::PathBuf;

use clap::Parser;

/// End-to-end tool-call parser regression harness
#[derive(Parser, Debug, Default)]
#[allow(clippy::struct_excessive_bools)] // CLI flags are naturally boolean
#[command(name = "toolcall-harness")]
#[command(version, about, long_about = None, disable_version_flag = true)]
#[command(after_help = "Examples:
  toolcall-harness                              Run every parser and regression configuration
  toolcall-harness --parsers hermes,gemma       Only these parsers (plus regression runs)
  toolcall-harness --regression-only            Only auto-detect runs
  toolcall-harness --include-large --port 9000  Include large models on another port
")]
pub struct Cli {
    /// Print version information
    #[arg(short = 'V', long)]
    pub version: bool,

    // === Selection ===
    /// Comma-separated parser names to test (default: every parser in the table)
    #[arg(long, value_delimiter = ',')]
    pub parsers: Option<Vec<String>>,

    /// Include large models (70B-class and similar)
    #[arg(long)]
    pub include_large: bool,

    /// Skip regression runs (auto-detect without a parser override)
    #[arg(long)]
    pub no_regression: bool,

    /// Only run regression runs
    #[arg(long)]
    pub regression_only: bool,

    // === Server ===
    /// Port the server under test binds to
    #[arg(long)]
    pub port: Option<u16>,

    /// Server binary under test
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Local model cache directory
    #[arg(long)]
    pub model_cache: Option<PathBuf>,

    // === Output ===
    /// Directory for JSONL/HTML reports and server logs
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Do not write the HTML report
    #[arg(long)]
    pub no_html: bool,

    /// Settings file (replaces global and project settings)
    #[arg(long, env = "TOOLCALL_HARNESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parser names with surrounding whitespace and empty entries removed.
    pub fn selected_parsers(&self) -> Option<Vec<String>> {
        self.parsers.as_ref().map(|names| {
            names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn parse_selection_and_paths() {
        let cli = Cli::parse_from([
            "toolcall-harness",
            "--parsers",
            "hermes, gemma,,mistral",
            "--port",
            "9000",
            "--include-large",
            "--no-regression",
            "--binary",
            "/opt/afm",
            "--report-dir",
            "out",
            "--no-html",
            "-v",
        ]);

        assert_eq!(
            cli.selected_parsers(),
            Some(vec![
                "hermes".to_string(),
                "gemma".to_string(),
                "mistral".to_string()
            ])
        );
        assert_eq!(cli.port, Some(9000));
        assert!(cli.include_large);
        assert!(cli.no_regression);
        assert!(!cli.regression_only);
        assert_eq!(cli.binary, Some(PathBuf::from("/opt/afm")));
        assert_eq!(cli.report_dir, Some(PathBuf::from("out")));
        assert!(cli.no_html);
        assert!(cli.verbose);
    }

    #[test]
    fn defaults_leave_everything_unset() {
        let cli = Cli::parse_from(["toolcall-harness"]);
        assert!(cli.selected_parsers().is_none());
        assert!(cli.port.is_none());
        assert!(!cli.regression_only);
    }
}
