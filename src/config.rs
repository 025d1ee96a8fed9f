//! Harness configuration.
//!
//! Every field has a default matching the stock compilisp checkout, so an
//! empty (or absent) config file runs the usual corpus.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::diagnostics::HarnessError;
use crate::runner::DEFAULT_OUTPUT_LIMIT;

/// The corpus shipped with the compiler.
pub const DEFAULT_CASES: &[&str] = &[
    "one_plus_two",
    "begin_01",
    "let_sum",
    "let_nested",
    "conditional",
    "conditional_many",
    "conditional_display",
    "define_expr_01",
    "define_procedure_01",
    "define_procedure_02",
];

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A program plus its fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolConfig {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where test programs live and how their artifacts are named.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CorpusConfig {
    pub dir: PathBuf,
    pub source_suffix: String,
    pub ir_suffix: String,
    /// Directory linked executables are written to.
    pub output_dir: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("tests"),
            source_suffix: "scheme".to_string(),
            ir_suffix: "ll".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HarnessConfig {
    /// Builds the compiler binary and runtime archive.
    pub build: ToolConfig,
    pub compiler: PathBuf,
    pub runtime_archive: PathBuf,
    /// Trusted interpreter; the program is fed on standard input.
    pub reference: ToolConfig,
    /// Native toolchain driver used for linking.
    pub linker: ToolConfig,
    pub corpus: CorpusConfig,
    /// Wall-clock bound per external process; 0 disables it.
    pub timeout_secs: u64,
    /// Bytes captured per output stream of each process.
    pub max_output_bytes: usize,
    pub cases: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            build: ToolConfig::new("cargo", ["build"]),
            compiler: PathBuf::from("target/debug/compilisp"),
            runtime_archive: PathBuf::from("target/debug/libruntime.a"),
            reference: ToolConfig::new("scheme", ["--quiet"]),
            linker: ToolConfig::new("clang", Vec::<String>::new()),
            corpus: CorpusConfig::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_OUTPUT_LIMIT,
            cases: DEFAULT_CASES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HarnessConfig {
    /// Loads a YAML config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path)
            .map_err(|e| HarnessError::io(path, "cannot read config file", e))?;
        Self::from_yaml(&text).map_err(|message| HarnessError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, String> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
