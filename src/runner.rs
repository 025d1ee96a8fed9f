//! The stage runner: run one external program, capture what it did.
//!
//! Every stage of the pipeline is an external process. This module owns the
//! one place where processes get spawned, fed, waited on and reaped.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::diagnostics::HarnessError;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Per-stream capture bound used unless an invocation sets its own.
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024 * 1024;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal exit with a status code
    Exited(i32),
    /// Killed by a signal (unix only)
    Signaled(i32),
    /// Killed by the harness after the wall-clock bound expired
    TimedOut,
}

impl ExitState {
    pub fn success(&self) -> bool {
        matches!(self, ExitState::Exited(0))
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitState::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt as _;
            if let Some(signal) = status.signal() {
                return ExitState::Signaled(signal);
            }
        }
        ExitState::Exited(1)
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Exited(code) => write!(f, "exited with status {code}"),
            ExitState::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            ExitState::TimedOut => write!(f, "timed out"),
        }
    }
}

/// A fully described external-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// File streamed to the child's standard input; `None` means no input.
    pub stdin: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Bytes kept per output stream; the rest is read and discarded.
    pub output_limit: usize,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Shell-like rendering for logs and reports.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(stdin) = &self.stdin {
            line.push_str(" < ");
            line.push_str(&stdin.display().to_string());
        }
        line
    }
}

/// The outcome of one invocation. Captured bytes are never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub state: ExitState,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set when the stream hit the invocation's output limit.
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl StageResult {
    pub fn success(&self) -> bool {
        self.state.success()
    }
}

/// The single capability every stage needs.
///
/// A nonzero exit is a normal `Ok` result. Implementations return `Err` only
/// when the process could not be run at all.
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<StageResult, HarnessError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, invocation: &Invocation) -> Result<StageResult, HarnessError> {
        (**self).run(invocation)
    }
}

/// Runs invocations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<StageResult, HarnessError> {
        debug!(command = %invocation.command_line(), "spawning");

        let stdin = match &invocation.stdin {
            Some(path) => Stdio::from(File::open(path).map_err(|e| {
                HarnessError::io(path, "cannot open as standard input", e)
            })?),
            None => Stdio::null(),
        };

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // The child leads a fresh group so a timeout reaches its descendants.
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        })?;

        // Drain both pipes while waiting.
        let limit = invocation.output_limit;
        let stdout = child.stdout.take().map(|r| drain(r, limit));
        let stderr = child.stderr.take().map(|r| drain(r, limit));

        let state = wait_with_timeout(&mut child, invocation.timeout)
            .map_err(|e| HarnessError::io(&invocation.program, "failed waiting for child", e))?;
        if state == ExitState::TimedOut {
            warn!(command = %invocation.command_line(), "killed after timeout");
        }

        let (stdout, stdout_truncated) = collect(stdout, &invocation.program)?;
        let (stderr, stderr_truncated) = collect(stderr, &invocation.program)?;
        if stdout_truncated || stderr_truncated {
            warn!(
                command = %invocation.command_line(),
                limit,
                stdout_truncated,
                stderr_truncated,
                "output exceeded capture limit"
            );
        }
        debug!(
            command = %invocation.command_line(),
            %state,
            stdout_len = stdout.len(),
            "finished"
        );

        Ok(StageResult {
            state,
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
        })
    }
}

type Captured = (Vec<u8>, bool);

fn drain<R: Read + Send + 'static>(reader: R, limit: usize) -> JoinHandle<io::Result<Captured>> {
    thread::spawn(move || read_to_end_capped(reader, limit))
}

/// Reads until EOF, keeping at most `cap` bytes. The flag reports truncation.
///
/// Reading continues past the cap so the writer never blocks on a full pipe.
fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> io::Result<Captured> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if truncated {
            continue;
        }
        let remaining = cap.saturating_sub(buf.len());
        if n <= remaining {
            buf.extend_from_slice(&chunk[..n]);
        } else {
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
        }
    }
    Ok((buf, truncated))
}

fn collect(
    handle: Option<JoinHandle<io::Result<Captured>>>,
    program: &Path,
) -> Result<Captured, HarnessError> {
    let Some(handle) = handle else {
        return Ok((Vec::new(), false));
    };
    match handle.join() {
        Ok(Ok(captured)) => Ok(captured),
        Ok(Err(e)) => Err(HarnessError::io(program, "failed reading child output", e)),
        Err(_) => Err(HarnessError::io(
            program,
            "output reader panicked",
            io::Error::new(io::ErrorKind::Other, "reader thread panicked"),
        )),
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<ExitState> {
    let Some(limit) = timeout else {
        return child.wait().map(ExitState::from_status);
    };
    let deadline = Instant::now().checked_add(limit);

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ExitState::from_status(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_process_tree(child);
            child.wait()?;
            return Ok(ExitState::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills the child and, on unix, every process left in its group.
///
/// Descendants inherit the output pipes; until they die the drain threads
/// never see EOF.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal. The child is not reaped yet,
            // so its pid (and group id) cannot have been reused.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    // The child may exit between try_wait and kill.
    let _ = child.kill();
}
