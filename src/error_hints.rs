//! Error hints: mapping from error variants to user-facing remediation suggestions.
//!
//! Each error variant maps to:
//! - A 1-line summary (human readable)
//! - 0-2 actionable hints (commands, env vars, paths)
//!
//! Hints are stable strings so they can be asserted on in tests.

use crate::error::Error;
use std::fmt::Write as _;

/// A remediation hint for an error.
#[derive(Debug, Clone)]
pub struct ErrorHint {
    /// Brief 1-line summary of the error category.
    pub summary: &'static str,
    /// Actionable hints for the user (0-2 items).
    pub hints: &'static [&'static str],
}

/// Get remediation hints for an error variant.
pub fn hints_for_error(error: &Error) -> ErrorHint {
    match error {
        Error::Config(msg) => config_hints(msg),
        Error::BinaryNotFound { .. } => ErrorHint {
            summary: "Server binary under test is missing",
            hints: &[
                "Build the server first (e.g. `swift build -c release`)",
                "Or point --binary / TOOLCALL_HARNESS_SERVER_BIN at an existing executable",
            ],
        },
        Error::Spawn(_) => ErrorHint {
            summary: "Server process could not be started",
            hints: &["Check that the binary is executable and its arguments are valid"],
        },
        Error::Transport { message, .. } => transport_hints(message),
        Error::Protocol(_) => ErrorHint {
            summary: "Server returned a malformed response",
            hints: &["Inspect the per-configuration server log in the report directory"],
        },
        Error::Io(err) => io_hints(err),
        Error::Json(err) => json_hints(err),
        Error::Http(_) => ErrorHint {
            summary: "HTTP request failed",
            hints: &["Check that nothing else is bound to the harness port"],
        },
    }
}

fn config_hints(msg: &str) -> ErrorHint {
    if msg.contains("settings.json") || msg.contains("settings file") {
        return ErrorHint {
            summary: "Invalid or missing configuration file",
            hints: &[
                "Check that ~/.toolcall-harness/settings.json is valid JSON",
                "Or set TOOLCALL_HARNESS_CONFIG to an explicit settings file",
            ],
        };
    }
    if msg.contains("--regression-only") || msg.contains("--no-regression") {
        return ErrorHint {
            summary: "Conflicting run-mode flags",
            hints: &["Pass at most one of --regression-only and --no-regression"],
        };
    }
    ErrorHint {
        summary: "Configuration error",
        hints: &["Run with --verbose to see the resolved settings"],
    }
}

fn transport_hints(message: &str) -> ErrorHint {
    let lower = message.to_ascii_lowercase();
    if lower.contains("refused") {
        return ErrorHint {
            summary: "Connection refused",
            hints: &["The server may have crashed; check its log file"],
        };
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return ErrorHint {
            summary: "Request timed out",
            hints: &["Large models may need a longer request timeout"],
        };
    }
    ErrorHint {
        summary: "Transport error",
        hints: &[],
    }
}

fn io_hints(err: &std::io::Error) -> ErrorHint {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorHint {
            summary: "File or directory not found",
            hints: &["Verify the path exists"],
        },
        std::io::ErrorKind::PermissionDenied => ErrorHint {
            summary: "Permission denied",
            hints: &["Check file/directory permissions of the report directory"],
        },
        _ => ErrorHint {
            summary: "I/O error",
            hints: &["Check file system and permissions"],
        },
    }
}

fn json_hints(err: &serde_json::Error) -> ErrorHint {
    if err.is_syntax() {
        return ErrorHint {
            summary: "Invalid JSON syntax",
            hints: &["Check for missing commas, brackets, or quotes"],
        };
    }
    ErrorHint {
        summary: "JSON data does not match expected structure",
        hints: &["Check that JSON fields match expected schema"],
    }
}

/// Format an error with its hints for terminal output.
pub fn format_error_with_hints(error: &Error) -> String {
    let hint = hints_for_error(error);
    let mut output = String::new();

    let _ = writeln!(&mut output, "Error: {error}");

    if !error.to_string().contains(hint.summary) {
        output.push('\n');
        output.push_str(hint.summary);
        output.push('\n');
    }

    if !hint.hints.is_empty() {
        output.push_str("\nSuggestions:\n");
        for &h in hint.hints {
            let _ = writeln!(&mut output, "  - {h}");
        }
    }

    output
}
