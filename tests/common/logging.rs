//! Buffered per-test notes, printed only when the test fails.

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Note {
    at: Duration,
    category: String,
    message: String,
    fields: Vec<(String, String)>,
}

pub struct TestLogger {
    start: Instant,
    notes: Mutex<Vec<Note>>,
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLogger {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            notes: Mutex::new(Vec::new()),
        }
    }

    pub fn info(&self, category: &str, message: impl Into<String>) {
        self.info_ctx(category, message, |_| {});
    }

    /// Record a note; `fill` pushes `(key, value)` pairs shown under it.
    pub fn info_ctx<F>(&self, category: &str, message: impl Into<String>, fill: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        let mut fields = Vec::new();
        fill(&mut fields);
        let note = Note {
            at: self.start.elapsed(),
            category: category.to_string(),
            message: message.into(),
            fields,
        };
        self.notes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(note);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn render(&self) -> String {
        let notes = self
            .notes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = String::new();
        for note in notes.iter() {
            let _ = writeln!(
                out,
                "[{:>8.3}s] {:<8} {}",
                note.at.as_secs_f64(),
                note.category,
                note.message
            );
            for (key, value) in &note.fields {
                let _ = writeln!(out, "             {key}: {value}");
            }
        }
        out
    }
}
