//! Unified error and classification types for the harness.
//!
//! Two kinds of failure exist and they never mix:
//!
//! - [`HarnessError`] is for the harness itself: the build gate failed, a
//!   program could not be spawned, the config is unreadable, the corpus is
//!   malformed. These abort the run and are rendered through `miette`.
//! - Stage failures of the system under test are ordinary values
//!   ([`crate::pipeline::Verdict`]), classified by [`VerdictKind`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::runner::ExitState;

/// Type-safe classification of a pipeline verdict.
///
/// Used for reporting and for test assertions that only care about which
/// stage failed, not about the captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    /// Both sides ran and produced byte-identical output
    Pass,
    /// The reference interpreter failed; no ground truth
    ReferenceExecutionError,
    /// The candidate compiler rejected or crashed on the source
    CompilationError,
    /// The native toolchain could not produce an executable
    LinkError,
    /// The linked executable crashed or exited nonzero
    ExecutionError,
    /// Both sides succeeded with different output
    OutputMismatch,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Pass => "Pass",
            VerdictKind::ReferenceExecutionError => "ReferenceExecutionError",
            VerdictKind::CompilationError => "CompilationError",
            VerdictKind::LinkError => "LinkError",
            VerdictKind::ExecutionError => "ExecutionError",
            VerdictKind::OutputMismatch => "OutputMismatch",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, VerdictKind::Pass)
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that mean the harness cannot produce meaningful verdicts.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("build failed: `{command}` {state}")]
    #[diagnostic(
        code(harness::build::failed),
        help("the compiler binary and runtime archive must build before any test case can run")
    )]
    Build {
        command: String,
        state: ExitState,
        stderr: String,
    },

    #[error("failed to spawn `{program}`")]
    #[diagnostic(
        code(harness::process::spawn),
        help("check that the program is installed and on PATH, or fix its path in the config")
    )]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error on '{}': {message}", .path.display())]
    #[diagnostic(code(harness::io))]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config '{}': {message}", .path.display())]
    #[diagnostic(code(harness::config::invalid))]
    Config { path: PathBuf, message: String },

    #[error("cannot enumerate corpus directory '{}': {message}", .dir.display())]
    #[diagnostic(code(harness::corpus::discovery))]
    Discovery { dir: PathBuf, message: String },

    #[error("duplicate test case name '{name}'")]
    #[diagnostic(
        code(harness::corpus::duplicate),
        help("executables are written as ./<name>; names must be unique across the corpus")
    )]
    DuplicateName { name: String },

    #[error("unknown test case '{name}': no source file at '{}'", .path.display())]
    #[diagnostic(code(harness::corpus::unknown))]
    UnknownTestCase { name: String, path: PathBuf },
}

impl HarnessError {
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>, source: io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    pub fn is_build_failure(&self) -> bool {
        matches!(self, HarnessError::Build { .. })
    }
}

/// Prints a HarnessError with full miette diagnostics
pub fn print_error(error: HarnessError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}
