//! One-time build precondition shared by every pipeline run.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::diagnostics::HarnessError;
use crate::runner::{ExitState, Invocation, ProcessRunner};

/// Observable state of the gate.
///
/// Transitions only move forward, except that a build command that could not
/// be spawned at all drops back to `NotBuilt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NotBuilt,
    /// The build command is running; other callers block until it ends.
    Building,
    Built,
    Failed,
}

#[derive(Debug, Clone)]
struct BuildFailure {
    command: String,
    state: ExitState,
    stderr: String,
}

impl BuildFailure {
    fn to_error(&self) -> HarnessError {
        HarnessError::Build {
            command: self.command.clone(),
            state: self.state,
            stderr: self.stderr.clone(),
        }
    }
}

/// Runs the build command at most once per gate.
///
/// The gate is an explicit token handed to the corpus driver rather than
/// process-global state; [`BuildGate::prebuilt`] gives a token that never
/// builds. Concurrent callers block until the first build finishes. A failed
/// build is remembered and reported again without rebuilding.
#[derive(Debug)]
pub struct BuildGate {
    command: Invocation,
    building: AtomicBool,
    outcome: OnceCell<Result<(), BuildFailure>>,
}

impl BuildGate {
    pub fn new(command: Invocation) -> Self {
        Self {
            command,
            building: AtomicBool::new(false),
            outcome: OnceCell::new(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Invocation::new(&config.build.program)
                .args(config.build.args.iter().cloned())
                .timeout(None),
        )
    }

    /// A gate whose artifacts are already known to be current.
    pub fn prebuilt() -> Self {
        let gate = Self::new(Invocation::new("true"));
        let _ = gate.outcome.set(Ok(()));
        gate
    }

    pub fn state(&self) -> BuildState {
        match self.outcome.get() {
            None if self.building.load(Ordering::Acquire) => BuildState::Building,
            None => BuildState::NotBuilt,
            Some(Ok(())) => BuildState::Built,
            Some(Err(_)) => BuildState::Failed,
        }
    }

    pub fn ensure_built<R: ProcessRunner + ?Sized>(&self, runner: &R) -> Result<(), HarnessError> {
        let outcome = self.outcome.get_or_try_init(|| -> Result<_, HarnessError> {
            info!(command = %self.command.command_line(), "building compiler and runtime");
            self.building.store(true, Ordering::Release);
            let result = runner.run(&self.command);
            self.building.store(false, Ordering::Release);
            let result = result?;
            if result.success() {
                info!("build finished");
                return Ok(Ok(()));
            }
            error!(state = %result.state, "build failed");
            Ok(Err(BuildFailure {
                command: self.command.command_line(),
                state: result.state,
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            }))
        })?;
        outcome.as_ref().map(|_| ()).map_err(BuildFailure::to_error)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::runner::StageResult;

    /// Counts invocations and answers every call with one fixed exit state.
    struct CountingRunner {
        calls: Cell<usize>,
        state: ExitState,
        seen: RefCell<Vec<Invocation>>,
    }

    impl CountingRunner {
        fn new(state: ExitState) -> Self {
            Self {
                calls: Cell::new(0),
                state,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for CountingRunner {
        fn run(&self, invocation: &Invocation) -> Result<StageResult, HarnessError> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push(invocation.clone());
            Ok(StageResult {
                state: self.state,
                stdout: Vec::new(),
                stderr: b"error: could not compile".to_vec(),
                stdout_truncated: false,
                stderr_truncated: false,
            })
        }
    }

    /// Records the gate's state as seen from inside the build command.
    struct ObservingRunner<'a> {
        gate: &'a BuildGate,
        seen: Cell<Option<BuildState>>,
    }

    impl ProcessRunner for ObservingRunner<'_> {
        fn run(&self, _invocation: &Invocation) -> Result<StageResult, HarnessError> {
            self.seen.set(Some(self.gate.state()));
            Ok(StageResult {
                state: ExitState::Exited(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
                stdout_truncated: false,
                stderr_truncated: false,
            })
        }
    }

    struct UnspawnableRunner;

    impl ProcessRunner for UnspawnableRunner {
        fn run(&self, invocation: &Invocation) -> Result<StageResult, HarnessError> {
            Err(HarnessError::Spawn {
                program: invocation.program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        }
    }

    #[test]
    fn second_call_does_not_rebuild() {
        let gate = BuildGate::from_config(&HarnessConfig::default());
        let runner = CountingRunner::new(ExitState::Exited(0));
        assert_eq!(gate.state(), BuildState::NotBuilt);

        gate.ensure_built(&runner).unwrap();
        gate.ensure_built(&runner).unwrap();

        assert_eq!(runner.calls.get(), 1);
        assert_eq!(gate.state(), BuildState::Built);
        assert_eq!(runner.seen.borrow()[0].command_line(), "cargo build");
    }

    #[test]
    fn failure_is_fatal_and_remembered() {
        let gate = BuildGate::from_config(&HarnessConfig::default());
        let runner = CountingRunner::new(ExitState::Exited(101));

        let err = gate.ensure_built(&runner).unwrap_err();
        assert!(err.is_build_failure());
        let again = gate.ensure_built(&runner).unwrap_err();
        assert!(again.is_build_failure());

        assert_eq!(runner.calls.get(), 1);
        assert_eq!(gate.state(), BuildState::Failed);
        match err {
            HarnessError::Build { stderr, state, .. } => {
                assert_eq!(state, ExitState::Exited(101));
                assert!(stderr.contains("could not compile"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn state_is_building_while_the_command_runs() {
        let gate = BuildGate::from_config(&HarnessConfig::default());
        let runner = ObservingRunner {
            gate: &gate,
            seen: Cell::new(None),
        };
        gate.ensure_built(&runner).unwrap();
        assert_eq!(runner.seen.get(), Some(BuildState::Building));
        assert_eq!(gate.state(), BuildState::Built);
    }

    #[test]
    fn prebuilt_gate_never_runs_the_build() {
        let gate = BuildGate::prebuilt();
        let runner = CountingRunner::new(ExitState::Exited(1));
        assert_eq!(gate.state(), BuildState::Built);
        gate.ensure_built(&runner).unwrap();
        assert_eq!(runner.calls.get(), 0);
    }

    #[test]
    fn spawn_failure_propagates_without_settling_state() {
        let gate = BuildGate::from_config(&HarnessConfig::default());
        let err = gate.ensure_built(&UnspawnableRunner).unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
        assert_eq!(gate.state(), BuildState::NotBuilt);
    }
}
