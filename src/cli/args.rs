//! Command-line arguments for the harness.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::HarnessConfig;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "compilisp-harness",
    version,
    about = "Differential tests: compiled compilisp programs against a reference Scheme interpreter."
)]
pub struct HarnessArgs {
    #[command(subcommand)]
    pub command: Command,

    /// YAML config file; built-in defaults are used when absent.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every spawned process.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build, then run test cases through the full pipeline.
    Run {
        /// Test case names; defaults to the configured case list.
        names: Vec<String>,
        /// Run every program found in the corpus directory.
        #[arg(long, conflicts_with = "names")]
        all: bool,
        /// Only run cases whose name contains this substring.
        #[arg(long)]
        filter: Option<String>,
        /// Stop at the first case that does not pass.
        #[arg(long)]
        fail_fast: bool,
        /// Assume the compiler and runtime are already built.
        #[arg(long)]
        skip_build: bool,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List the programs in the corpus directory.
    List {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Build the compiler and runtime only.
    Build {
        #[command(flatten)]
        overrides: Overrides,
    },
}

impl Command {
    pub fn overrides(&self) -> &Overrides {
        match self {
            Command::Run { overrides, .. }
            | Command::List { overrides }
            | Command::Build { overrides } => overrides,
        }
    }
}

/// Per-invocation overrides of config file values.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// Directory holding `<name>.scheme` programs.
    #[arg(long)]
    pub corpus_dir: Option<PathBuf>,
    /// Path of the compiler binary.
    #[arg(long)]
    pub compiler: Option<PathBuf>,
    /// Path of the runtime archive.
    #[arg(long)]
    pub runtime: Option<PathBuf>,
    /// Reference interpreter program.
    #[arg(long)]
    pub reference: Option<PathBuf>,
    /// Linker driver program.
    #[arg(long)]
    pub linker: Option<PathBuf>,
    /// Per-process timeout in seconds; 0 disables it.
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(dir) = &self.corpus_dir {
            config.corpus.dir = dir.clone();
        }
        if let Some(compiler) = &self.compiler {
            config.compiler = compiler.clone();
        }
        if let Some(runtime) = &self.runtime {
            config.runtime_archive = runtime.clone();
        }
        if let Some(reference) = &self.reference {
            config.reference.program = reference.clone();
        }
        if let Some(linker) = &self.linker {
            config.linker.program = linker.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_names_and_flags() {
        let args = HarnessArgs::try_parse_from([
            "compilisp-harness",
            "run",
            "let_sum",
            "begin_01",
            "--fail-fast",
            "--timeout",
            "5",
        ])
        .unwrap();
        match args.command {
            Command::Run {
                names,
                fail_fast,
                all,
                overrides,
                ..
            } => {
                assert_eq!(names, vec!["let_sum", "begin_01"]);
                assert!(fail_fast);
                assert!(!all);
                assert_eq!(overrides.timeout, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn all_conflicts_with_names() {
        assert!(HarnessArgs::try_parse_from(["compilisp-harness", "run", "--all", "x"]).is_err());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut config = HarnessConfig::default();
        Overrides {
            linker: Some(PathBuf::from("cc")),
            timeout: Some(0),
            ..Overrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.linker.program, PathBuf::from("cc"));
        assert_eq!(config.timeout(), None);
        assert_eq!(config.compiler, PathBuf::from("target/debug/compilisp"));
    }
}
