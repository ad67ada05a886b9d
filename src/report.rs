//! Result persistence: JSONL records, an HTML report and the pass/fail summary.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::catalog::AUTO_LABEL_PREFIX;
use crate::error::Result;
use crate::result::{SERVER_START_TEST, TestResult};

const ARGS_EXCERPT: usize = 80;
const ERROR_EXCERPT: usize = 120;
const SNIPPET_EXCERPT: usize = 100;

/// Totals over counted rows (test cases only; server-start and skipped rows are excluded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    /// Configurations that never ran.
    pub skipped: usize,
}

impl Summary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            if result.is_skipped() {
                summary.skipped += 1;
            } else if result.is_counted() {
                summary.total += 1;
                if result.passed() {
                    summary.passed += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Exit status criterion: every counted test passed.
    pub const fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Output files of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub jsonl: PathBuf,
    pub html: PathBuf,
}

impl ReportPaths {
    pub fn new(report_dir: &Path, stamp: &str) -> Self {
        Self {
            jsonl: report_dir.join(format!("tool-call-parsers-{stamp}.jsonl")),
            html: report_dir.join(format!("tool-call-parsers-{stamp}.html")),
        }
    }
}

/// Appends one JSON object per line, flushing after each record so partial runs survive.
pub struct JsonlWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, result: &TestResult) -> Result<()> {
        serde_json::to_writer(&mut self.writer, result)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

pub fn write_html(path: &Path, results: &[TestResult], generated: &str, jsonl: &Path) -> Result<()> {
    let jsonl_name = jsonl
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    std::fs::write(path, render_html(results, generated, &jsonl_name))?;
    Ok(())
}

/// Results grouped by configuration label, in first-seen order.
fn group_by_label(results: &[TestResult]) -> Vec<(&str, Vec<&TestResult>)> {
    let mut groups: Vec<(&str, Vec<&TestResult>)> = Vec::new();
    for result in results {
        match groups.iter().position(|(label, _)| *label == result.label) {
            Some(index) => groups[index].1.push(result),
            None => groups.push((result.label.as_str(), vec![result])),
        }
    }
    groups
}

pub fn render_html(results: &[TestResult], generated: &str, jsonl_name: &str) -> String {
    let summary = Summary::from_results(results);
    let (badge_color, badge_text) = if summary.total == 0 {
        ("#ef4444", "no tests".to_string())
    } else if summary.failed == 0 {
        ("#22c55e", format!("{}/{} passed", summary.passed, summary.total))
    } else {
        ("#ef4444", format!("{}/{} passed", summary.passed, summary.total))
    };

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Tool Call Parser Test Report - {generated}</title>
<style>
  :root {{ --bg: #0f172a; --card: #1e293b; --border: #334155; --text: #e2e8f0;
           --pass: #22c55e; --fail: #ef4444; --skip: #f59e0b; --accent: #38bdf8; }}
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
          background: var(--bg); color: var(--text); padding: 2rem; line-height: 1.6; }}
  .container {{ max-width: 960px; margin: 0 auto; }}
  h1 {{ font-size: 1.75rem; margin-bottom: 0.25rem; }}
  .subtitle {{ color: #94a3b8; font-size: 0.9rem; margin-bottom: 1.5rem; }}
  .summary {{ display: flex; gap: 1rem; margin-bottom: 2rem; flex-wrap: wrap; }}
  .stat {{ background: var(--card); border: 1px solid var(--border); border-radius: 12px;
           padding: 1rem 1.5rem; flex: 1; min-width: 140px; }}
  .stat .label {{ font-size: 0.75rem; text-transform: uppercase; color: #94a3b8; }}
  .stat .value {{ font-size: 1.75rem; font-weight: 700; }}
  .pass {{ color: var(--pass); }} .fail {{ color: var(--fail); }} .skip {{ color: var(--skip); }}
  .badge {{ display: inline-block; background: {badge_color}; color: #fff; font-size: 0.8rem;
            padding: 0.25rem 0.75rem; border-radius: 99px; margin-left: 0.5rem; }}
  .section {{ background: var(--card); border: 1px solid var(--border); border-radius: 12px;
              margin-bottom: 1.5rem; overflow: hidden; }}
  .section-header {{ padding: 1rem 1.5rem; border-bottom: 1px solid var(--border);
                     display: flex; align-items: center; justify-content: space-between; }}
  .section-header .model {{ color: #94a3b8; font-size: 0.85rem; font-family: monospace; }}
  .note {{ padding: 1rem 1.5rem; color: #94a3b8; }}
  table {{ width: 100%; border-collapse: collapse; }}
  th {{ text-align: left; font-size: 0.75rem; text-transform: uppercase; color: #64748b; padding: 0.6rem 1rem; }}
  td {{ padding: 0.6rem 1rem; border-top: 1px solid var(--border); font-size: 0.9rem; }}
  td.test-name {{ font-family: monospace; }}
  .details {{ font-size: 0.8rem; color: #94a3b8; max-width: 400px; word-break: break-word; }}
  .details code {{ color: var(--accent); }}
  .sse {{ font-size: 0.7rem; padding: 0.1rem 0.4rem; border-radius: 4px; color: var(--accent); }}
</style>
</head>
<body>
<div class="container">
  <h1>Tool Call Parser Test Report <span class="badge">{badge_text}</span></h1>
  <div class="subtitle">Generated {generated} - JSONL: <code>{jsonl}</code></div>
  <div class="summary">
    <div class="stat"><div class="label">Passed</div><div class="value pass">{passed}</div></div>
    <div class="stat"><div class="label">Failed</div><div class="value fail">{failed}</div></div>
    <div class="stat"><div class="label">Skipped</div><div class="value skip">{skipped}</div></div>
    <div class="stat"><div class="label">Total Tests</div><div class="value">{total}</div></div>
  </div>
"#,
        generated = escape(generated),
        jsonl = escape(jsonl_name),
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        total = summary.total,
    );

    for (label, rows) in group_by_label(results) {
        render_section(&mut html, label, &rows);
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn render_section(html: &mut String, label: &str, rows: &[&TestResult]) {
    let skip = rows.iter().find(|row| row.is_skipped());
    let model = rows.iter().find_map(|row| row.model.as_deref()).unwrap_or("-");
    let cases: Vec<_> = rows.iter().filter(|row| row.is_counted()).collect();
    let passed = cases.iter().filter(|row| row.passed()).count();
    let start_failed = rows
        .iter()
        .any(|row| row.test == SERVER_START_TEST && !row.passed());

    let (badge_class, badge_label) = if skip.is_some() {
        ("skip", "SKIPPED".to_string())
    } else if passed == cases.len() && !cases.is_empty() && !start_failed {
        ("pass", format!("{passed}/{} PASS", cases.len()))
    } else {
        ("fail", format!("{passed}/{} PASS", cases.len()))
    };

    let heading = match label.strip_prefix(AUTO_LABEL_PREFIX) {
        Some(short) => format!("Regression: {short}"),
        None => format!("--tool-call-parser {label}"),
    };

    let _ = write!(
        html,
        r#"  <div class="section">
    <div class="section-header">
      <div><h2>{heading}</h2><div class="model">{model}</div></div>
      <span class="{badge_class}">{badge_label}</span>
    </div>
"#,
        heading = escape(&heading),
        model = escape(model),
    );

    if let Some(skip) = skip {
        let reason = record_details(skip)
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        let _ = writeln!(html, r#"    <div class="note">Not run. {}</div>"#, escape(&reason));
        html.push_str("  </div>\n");
        return;
    }

    html.push_str(
        "    <table>\n      <thead><tr><th>Test</th><th>Mode</th><th>Result</th><th>Time</th><th>Details</th></tr></thead>\n      <tbody>\n",
    );
    for row in rows {
        render_row(html, row);
    }
    html.push_str("      </tbody>\n    </table>\n  </div>\n");
}

fn render_row(html: &mut String, row: &TestResult) {
    let details = record_details(row);
    let mode = match row.stream() {
        None => "-",
        Some(true) => r#"<span class="sse">SSE</span>"#,
        Some(false) => "sync",
    };
    let elapsed = details
        .get("elapsed_s")
        .or_else(|| details.get("startup_s"))
        .and_then(Value::as_f64)
        .map_or_else(|| "-".to_string(), |secs| format!("{secs:.2}"));
    let (result_class, result_text) = if row.passed() {
        ("pass", "PASS")
    } else {
        ("fail", "FAIL")
    };

    let _ = writeln!(
        html,
        r#"        <tr><td class="test-name">{test}</td><td>{mode}</td><td class="{result_class}">{result_text}</td><td>{elapsed}</td><td class="details">{detail}</td></tr>"#,
        test = escape(&row.test),
        detail = detail_html(&details),
    );
}

fn detail_html(details: &Value) -> String {
    let text = |key: &str| details.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    let mut parts = Vec::new();

    if let Some(tool) = text("tool_name") {
        parts.push(format!("tool: <code>{}</code>", escape(tool)));
    }
    if let Some(arguments) = details.get("arguments").filter(|args| !args.is_null()) {
        parts.push(format!(
            "args: <code>{}</code>",
            escape(&excerpt(&arguments.to_string(), ARGS_EXCERPT))
        ));
    }
    if let Some(error) = text("error") {
        parts.push(format!(
            r#"<span class="fail">{}</span>"#,
            escape(&excerpt(error, ERROR_EXCERPT))
        ));
    }
    if let Some(snippet) = text("content_snippet") {
        let snippet: String = snippet.chars().take(SNIPPET_EXCERPT).collect();
        parts.push(format!("content: \"{}\"", escape(&snippet)));
    }
    if let Some(message) = text("message") {
        parts.push(escape(message));
    }
    if let Some(finish) = text("finish_reason") {
        parts.push(format!("finish: <code>{}</code>", escape(finish)));
    }

    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join("<br>")
    }
}

fn record_details(row: &TestResult) -> Value {
    serde_json::to_value(row)
        .ok()
        .and_then(|mut value| value.get_mut("details").map(Value::take))
        .unwrap_or(Value::Null)
}

fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
