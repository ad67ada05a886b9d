//! Per-test scratch directory plus a note buffer that is dumped if the test panics.

use super::logging::TestLogger;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestHarness {
    name: String,
    dir: TempDir,
    logger: TestLogger,
}

impl TestHarness {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let dir = TempDir::new().expect("create temp dir");
        let logger = TestLogger::new();
        logger.info_ctx("setup", format!("{name} started"), |ctx| {
            ctx.push(("dir".into(), dir.path().display().to_string()));
        });
        Self { name, dir, logger }
    }

    pub const fn log(&self) -> &TestLogger {
        &self.logger
    }

    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn temp_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn create_dir(&self, relative: impl AsRef<Path>) -> PathBuf {
        let path = self.temp_path(relative);
        std::fs::create_dir_all(&path).expect("create test dir");
        self.logger.info("setup", format!("mkdir {}", path.display()));
        path
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if std::thread::panicking() {
            eprintln!(
                "\n--- {} failed after {:.3}s ---",
                self.name,
                self.logger.elapsed().as_secs_f64()
            );
            eprint!("{}", self.logger.render());
            eprintln!("--- end of notes ---");
        }
    }
}
