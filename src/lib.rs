//! Differential correctness harness for the compilisp compiler.
//!
//! Each test program is run twice: once through a trusted Scheme
//! interpreter and once compiled to LLVM IR, linked against the runtime
//! archive and executed natively. The two standard outputs must match
//! byte for byte.

pub use crate::diagnostics::{HarnessError, VerdictKind};

pub mod artifacts;
pub mod build_gate;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod diagnostics;
pub mod pipeline;
pub mod report;
pub mod runner;

pub use crate::corpus::{CaseOutcome, CorpusDriver, TestCase};
pub use crate::pipeline::{TestPipeline, Verdict};
