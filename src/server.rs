//! Lifecycle of the server under test.
//!
//! [`ServerCommand::start`] spawns one server process with its combined output captured to a
//! per-configuration log file. [`ServerHandle::stop`] terminates the whole process tree in two
//! phases (TERM, then KILL after a bounded wait) and always closes the log file.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How to launch the server binary.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub binary: PathBuf,
    /// Arguments placed before the model selector (the backend subcommand).
    pub prefix_args: Vec<String>,
    /// Value of the server's own `--max-tokens` limit.
    pub max_tokens: u32,
    pub env: BTreeMap<String, String>,
    /// Directory receiving per-configuration log files.
    pub log_dir: PathBuf,
}

impl ServerCommand {
    /// Full argument list for one configuration.
    pub fn args(&self, model: &str, parser: Option<&str>, port: u16) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "-m".to_string(),
            model.to_string(),
            "--port".to_string(),
            port.to_string(),
            "--max-tokens".to_string(),
            self.max_tokens.to_string(),
        ]);
        if let Some(parser) = parser {
            args.extend(["--tool-call-parser".to_string(), parser.to_string()]);
        }
        args
    }

    /// Log file path for a configuration label.
    pub fn log_path(&self, label: &str, port: u16) -> PathBuf {
        let safe: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        self.log_dir.join(format!("server-{safe}-{port}.log"))
    }

    /// Spawn the server without waiting for it to become ready.
    pub fn start(
        &self,
        label: &str,
        model: &str,
        parser: Option<&str>,
        port: u16,
    ) -> Result<ServerHandle> {
        std::fs::create_dir_all(&self.log_dir)?;
        let log_path = self.log_path(label, port);
        let log_file = File::create(&log_path)?;
        let stderr = log_file.try_clone()?;
        let args = self.args(model, parser, port);

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(stderr));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|err| Error::spawn(format!("{}: {err}", self.binary.display())))?;
        let pid = child.id();
        info!(
            label,
            pid,
            port,
            binary = %self.binary.display(),
            log = %log_path.display(),
            "Server started"
        );
        debug!(args = ?args, "Server command line");

        Ok(ServerHandle {
            child: Some(child),
            pid,
            port,
            label: label.to_string(),
            log_path,
            log_file: Some(log_file),
        })
    }
}

/// Bounded waits for the two stop phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    pub graceful: Duration,
    pub kill: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            graceful: Duration::from_secs(10),
            kill: Duration::from_secs(5),
        }
    }
}

/// How a [`ServerHandle::stop`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The handle was already stopped.
    NotRunning,
    /// The process had exited before stop was called.
    AlreadyExited,
    /// The process exited after the graceful signal.
    Terminated,
    /// The process needed the forced kill.
    Killed,
    /// The process was still alive after both waits.
    Unresponsive,
}

/// One running server process, its log and its port.
#[derive(Debug)]
pub struct ServerHandle {
    child: Option<Child>,
    pid: u32,
    port: u16,
    label: String,
    log_path: PathBuf,
    log_file: Option<File>,
}

impl ServerHandle {
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub const fn is_log_open(&self) -> bool {
        self.log_file.is_some()
    }

    /// Whether the process has exited (or was already stopped).
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            None => true,
            Some(child) => !matches!(child.try_wait(), Ok(None)),
        }
    }

    /// Last `max_bytes` of the captured log, lossily decoded. Empty when unreadable.
    pub fn log_tail(&self, max_bytes: usize) -> String {
        read_tail(&self.log_path, max_bytes).unwrap_or_default()
    }

    /// Terminate the process tree and close the log. Safe to call more than once.
    pub fn stop(&mut self, timeouts: StopTimeouts) -> StopOutcome {
        let outcome = self.terminate(timeouts);
        self.log_file = None;
        match outcome {
            StopOutcome::NotRunning => {}
            StopOutcome::Unresponsive => warn!(
                label = %self.label,
                pid = self.pid,
                "Server did not exit after forced kill"
            ),
            other => info!(label = %self.label, pid = self.pid, outcome = ?other, "Server stopped"),
        }
        outcome
    }

    fn terminate(&mut self, timeouts: StopTimeouts) -> StopOutcome {
        let Some(mut child) = self.child.take() else {
            return StopOutcome::NotRunning;
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = self.pid, status = %status, "Server had already exited");
            return StopOutcome::AlreadyExited;
        }

        terminate_process_tree(self.pid);
        if let Ok(Some(_)) = wait_for_exit(&mut child, timeouts.graceful) {
            return StopOutcome::Terminated;
        }

        warn!(
            pid = self.pid,
            grace_secs = timeouts.graceful.as_secs_f64(),
            "Server ignored TERM, escalating to KILL"
        );
        kill_process_tree(self.pid);
        let _ = child.kill();
        match wait_for_exit(&mut child, timeouts.kill) {
            Ok(Some(_)) => StopOutcome::Killed,
            Ok(None) | Err(_) => StopOutcome::Unresponsive,
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                kill_process_tree(self.pid);
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Fail fast when the server binary is missing; nothing else aborts a run.
pub fn ensure_binary(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::BinaryNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Smallest cool-down accepted from settings.
pub const MIN_COOL_DOWN: Duration = Duration::from_secs(1);

/// Sleep between configurations so the port and accelerator memory are released.
pub fn cool_down(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    debug!(secs = duration.as_secs_f64(), "Cooling down");
    thread::sleep(duration);
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }
}

fn read_tail(path: &Path, max_bytes: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(max_bytes as u64);
    file.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn terminate_process_tree(pid: u32) {
    signal_process_tree(pid, sysinfo::Signal::Term);
}

fn kill_process_tree(pid: u32) {
    signal_process_tree(pid, sysinfo::Signal::Kill);
}

/// Signal `pid` and all of its descendants, deepest first.
fn signal_process_tree(pid: u32, signal: sysinfo::Signal) {
    let root = sysinfo::Pid::from_u32(pid);
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let mut children_map: HashMap<sysinfo::Pid, Vec<sysinfo::Pid>> = HashMap::new();
    for (p, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children_map.entry(parent).or_default().push(*p);
        }
    }

    let mut tree = Vec::new();
    collect_process_tree(root, &children_map, &mut tree);

    for pid in tree.into_iter().rev() {
        let Some(process) = sys.process(pid) else {
            continue;
        };
        match process.kill_with(signal) {
            Some(true) => {}
            Some(false) | None if signal == sysinfo::Signal::Kill => {
                let _ = process.kill();
            }
            Some(false) | None => debug!(pid = %pid, ?signal, "Signal not delivered"),
        }
    }
}

fn collect_process_tree(
    pid: sysinfo::Pid,
    children_map: &HashMap<sysinfo::Pid, Vec<sysinfo::Pid>>,
    out: &mut Vec<sysinfo::Pid>,
) {
    out.push(pid);
    if let Some(children) = children_map.get(&pid) {
        for child in children {
            collect_process_tree(*child, children_map, out);
        }
    }
}
