//! The five-stage differential pipeline for a single test case.
//!
//! reference execution → compilation → linking → candidate execution →
//! comparison. Each stage consumes the filesystem artifact of the previous
//! one, so the order is fixed and the first failing stage ends the run.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::artifacts::ArtifactPaths;
use crate::config::{HarnessConfig, ToolConfig};
use crate::corpus::TestCase;
use crate::diagnostics::{HarnessError, VerdictKind};
use crate::runner::{ExitState, Invocation, ProcessRunner, StageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Reference,
    Compile,
    Link,
    Execute,
    Compare,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Reference => "reference",
            Stage::Compile => "compile",
            Stage::Link => "link",
            Stage::Execute => "execute",
            Stage::Compare => "compare",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What went wrong in a stage that ran but did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub command: String,
    pub state: ExitState,
    /// Captured diagnostics; reported, never used to decide the verdict.
    pub stderr: Vec<u8>,
    /// Set when the stage exited cleanly but broke its contract.
    pub reason: Option<String>,
}

impl StageFailure {
    fn from_result(stage: Stage, invocation: &Invocation, result: StageResult) -> Self {
        Self {
            stage,
            command: invocation.command_line(),
            state: result.state,
            stderr: result.stderr,
            reason: None,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage: `{}` {}", self.stage, self.command, self.state)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    ReferenceExecutionError(StageFailure),
    CompilationError(StageFailure),
    LinkError(StageFailure),
    ExecutionError(StageFailure),
    OutputMismatch { expected: Vec<u8>, actual: Vec<u8> },
}

impl Verdict {
    pub fn kind(&self) -> VerdictKind {
        match self {
            Verdict::Pass => VerdictKind::Pass,
            Verdict::ReferenceExecutionError(_) => VerdictKind::ReferenceExecutionError,
            Verdict::CompilationError(_) => VerdictKind::CompilationError,
            Verdict::LinkError(_) => VerdictKind::LinkError,
            Verdict::ExecutionError(_) => VerdictKind::ExecutionError,
            Verdict::OutputMismatch { .. } => VerdictKind::OutputMismatch,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Verdict::ReferenceExecutionError(f)
            | Verdict::CompilationError(f)
            | Verdict::LinkError(f)
            | Verdict::ExecutionError(f) => Some(f),
            Verdict::Pass | Verdict::OutputMismatch { .. } => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Verdict::Pass => None,
            Verdict::OutputMismatch { .. } => Some(Stage::Compare),
            other => other.failure().map(|f| f.stage),
        }
    }
}

/// Tool invocations shared by every test case of a session.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub artifacts: ArtifactPaths,
    pub reference: ToolConfig,
    pub linker: ToolConfig,
    pub timeout: Option<Duration>,
    pub output_limit: usize,
}

impl Toolchain {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            artifacts: ArtifactPaths::from_config(config),
            reference: config.reference.clone(),
            linker: config.linker.clone(),
            timeout: config.timeout(),
            output_limit: config.max_output_bytes,
        }
    }

    fn reference(&self, case: &TestCase) -> Invocation {
        Invocation::new(&self.reference.program)
            .args(self.reference.args.iter().cloned())
            .stdin_file(case.source_path())
            .timeout(self.timeout)
            .output_limit(self.output_limit)
    }

    fn compile(&self, case: &TestCase) -> Invocation {
        Invocation::new(self.artifacts.compiler())
            .arg(path_arg(case.source_path()))
            .timeout(self.timeout)
            .output_limit(self.output_limit)
    }

    fn link(&self, case: &TestCase) -> Invocation {
        Invocation::new(&self.linker.program)
            .args(self.linker.args.iter().cloned())
            .arg(path_arg(case.ir_path()))
            .arg(path_arg(self.artifacts.runtime_archive()))
            .arg("-o")
            .arg(path_arg(case.executable_path()))
            .timeout(self.timeout)
            .output_limit(self.output_limit)
    }

    fn execute(&self, case: &TestCase) -> Invocation {
        Invocation::new(direct_path(case.executable_path()))
            .timeout(self.timeout)
            .output_limit(self.output_limit)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A bare file name would be looked up on PATH; anchor it to the working
/// directory instead.
pub(crate) fn direct_path(path: &Path) -> PathBuf {
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Path::new(".").join(path),
        _ => path.to_path_buf(),
    }
}

pub struct TestPipeline<R> {
    runner: R,
    toolchain: Toolchain,
}

impl<R: ProcessRunner> TestPipeline<R> {
    pub fn new(runner: R, toolchain: Toolchain) -> Self {
        Self { runner, toolchain }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs all five stages, stopping at the first failure.
    ///
    /// `Err` is reserved for harness problems (a tool cannot be spawned,
    /// an artifact cannot be touched); misbehaviour of the system under test
    /// is always an `Ok` verdict.
    pub fn execute(&self, case: &TestCase) -> Result<Verdict, HarnessError> {
        let reference = self.toolchain.reference(case);
        let result = self.runner.run(&reference)?;
        if !result.success() {
            return Ok(Verdict::ReferenceExecutionError(StageFailure::from_result(
                Stage::Reference,
                &reference,
                result,
            )));
        }
        if result.stdout_truncated {
            let reason = self.truncation_reason();
            return Ok(Verdict::ReferenceExecutionError(
                StageFailure::from_result(Stage::Reference, &reference, result).with_reason(reason),
            ));
        }
        let expected = result.stdout;
        debug!(case = case.name(), bytes = expected.len(), "reference output captured");

        // A leftover IR file must not stand in for one this run failed to write.
        remove_if_exists(case.ir_path())?;
        let compile = self.toolchain.compile(case);
        let result = self.runner.run(&compile)?;
        if !result.success() {
            return Ok(Verdict::CompilationError(StageFailure::from_result(
                Stage::Compile,
                &compile,
                result,
            )));
        }
        if !case.ir_path().exists() {
            let failure = StageFailure::from_result(Stage::Compile, &compile, result)
                .with_reason(format!("no IR artifact at {}", case.ir_path().display()));
            return Ok(Verdict::CompilationError(failure));
        }

        let link = self.toolchain.link(case);
        let result = self.runner.run(&link)?;
        if !result.success() {
            return Ok(Verdict::LinkError(StageFailure::from_result(
                Stage::Link,
                &link,
                result,
            )));
        }

        let execute = self.toolchain.execute(case);
        let result = self.runner.run(&execute)?;
        if !result.success() {
            return Ok(Verdict::ExecutionError(StageFailure::from_result(
                Stage::Execute,
                &execute,
                result,
            )));
        }
        if result.stdout_truncated {
            let reason = self.truncation_reason();
            return Ok(Verdict::ExecutionError(
                StageFailure::from_result(Stage::Execute, &execute, result).with_reason(reason),
            ));
        }
        let actual = result.stdout;

        if expected == actual {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::OutputMismatch { expected, actual })
        }
    }
}

impl<R> TestPipeline<R> {
    /// Cut-off output cannot be compared, so it fails the stage that made it.
    fn truncation_reason(&self) -> String {
        format!("stdout exceeded {} bytes", self.toolchain.output_limit)
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<(), HarnessError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::io(path, "cannot remove artifact", e)),
    }
}
