//! The harness command-line interface.
//!
//! Parses arguments, assembles config, and drives the library. Everything
//! printed for humans goes through [`crate::report`]; every harness error
//! goes through miette.

use std::io;
use std::process;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use crate::build_gate::BuildGate;
use crate::config::HarnessConfig;
use crate::corpus::{CorpusDriver, CorpusLayout};
use crate::diagnostics::{print_error, HarnessError};
use crate::pipeline::{TestPipeline, Toolchain};
use crate::report::{self, RunSummary};
use crate::runner::SystemRunner;

pub mod args;

use args::{Command, HarnessArgs};

/// The main entry point for the CLI.
pub fn run() {
    let args = HarnessArgs::parse();
    init_tracing(args.verbose);

    match execute(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            if let HarnessError::Build { stderr, .. } = &e {
                eprintln!("{stderr}");
            }
            print_error(e);
            process::exit(1);
        }
    }
}

/// Runs one command; `Ok(false)` means the command ran but something failed.
pub fn execute(args: HarnessArgs) -> Result<bool, HarnessError> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    args.command.overrides().apply(&mut config);

    match args.command {
        Command::Run {
            names,
            all,
            filter,
            fail_fast,
            skip_build,
            ..
        } => {
            let layout = CorpusLayout::from_config(&config.corpus);
            let mut selected = if !names.is_empty() {
                names
            } else if all {
                layout.discover()?
            } else {
                config.cases.clone()
            };
            if let Some(filter) = &filter {
                selected.retain(|name| name.contains(filter.as_str()));
            }

            let gate = if skip_build {
                BuildGate::prebuilt()
            } else {
                BuildGate::from_config(&config)
            };
            let pipeline = TestPipeline::new(SystemRunner, Toolchain::from_config(&config));
            let driver = CorpusDriver::new(&gate, pipeline, layout).fail_fast(fail_fast);
            run_corpus(&driver, &selected)
        }

        Command::List { .. } => {
            let layout = CorpusLayout::from_config(&config.corpus);
            let names = layout.discover()?;
            if names.is_empty() {
                println!("  No programs found in {}.", layout.dir().display());
            }
            for name in names {
                println!("{name}");
            }
            Ok(true)
        }

        Command::Build { .. } => {
            BuildGate::from_config(&config).ensure_built(&SystemRunner)?;
            println!("Build finished");
            Ok(true)
        }
    }
}

fn run_corpus(
    driver: &CorpusDriver<'_, SystemRunner>,
    names: &[String],
) -> Result<bool, HarnessError> {
    if names.is_empty() {
        println!("No test cases selected.");
        return Ok(true);
    }

    let mut stdout = StandardStream::stdout(color_choice());
    let mut summary = RunSummary::default();
    for outcome in driver.run_all(names)? {
        let outcome = outcome?;
        summary.record(&outcome.verdict);
        report::print_outcome(&mut stdout, &outcome).map_err(stdout_error)?;
    }
    report::print_summary(&mut stdout, &summary).map_err(stdout_error)?;
    Ok(!summary.has_failures())
}

fn stdout_error(e: io::Error) -> HarnessError {
    HarnessError::io("<stdout>", "cannot write report", e)
}

fn color_choice() -> ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
