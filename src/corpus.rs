//! Test cases, corpus discovery and the corpus driver.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::build_gate::BuildGate;
use crate::config::CorpusConfig;
use crate::diagnostics::HarnessError;
use crate::pipeline::{direct_path, remove_if_exists, TestPipeline, Verdict};
use crate::runner::ProcessRunner;

/// One guest-language program and the artifacts derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    name: String,
    source_path: PathBuf,
    ir_path: PathBuf,
    executable_path: PathBuf,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        ir_path: impl Into<PathBuf>,
        executable_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            ir_path: ir_path.into(),
            executable_path: executable_path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Where the compiler is expected to write its IR.
    pub fn ir_path(&self) -> &Path {
        &self.ir_path
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }
}

/// Naming conventions of a corpus directory.
///
/// `<dir>/<name>.<source_suffix>` is the program, `<dir>/<name>.<ir_suffix>`
/// is the compiler's output and `<output_dir>/<name>` the linked binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusLayout {
    dir: PathBuf,
    source_suffix: String,
    ir_suffix: String,
    output_dir: PathBuf,
}

impl CorpusLayout {
    pub fn from_config(config: &CorpusConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            source_suffix: config.source_suffix.clone(),
            ir_suffix: config.ir_suffix.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn test_case(&self, name: &str) -> TestCase {
        TestCase::new(
            name,
            self.dir.join(format!("{name}.{}", self.source_suffix)),
            self.dir.join(format!("{name}.{}", self.ir_suffix)),
            direct_path(&self.output_dir.join(name)),
        )
    }

    /// Names of all programs in the corpus directory, sorted.
    ///
    /// Only the top level is scanned; the compiler writes IR next to its
    /// input, so nested directories would not follow the naming convention.
    pub fn discover(&self) -> Result<Vec<String>, HarnessError> {
        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| HarnessError::Discovery {
                dir: self.dir.clone(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !path
                .extension()
                .is_some_and(|ext| ext == self.source_suffix.as_str())
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Builds test cases for `names`, rejecting duplicates and missing sources.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<TestCase>, HarnessError> {
        let mut seen = HashSet::new();
        let mut cases = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(HarnessError::DuplicateName {
                    name: name.to_string(),
                });
            }
            let case = self.test_case(name);
            if !case.source_path().is_file() {
                return Err(HarnessError::UnknownTestCase {
                    name: name.to_string(),
                    path: case.source_path().to_path_buf(),
                });
            }
            cases.push(case);
        }
        Ok(cases)
    }
}

/// One entry of a corpus run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub name: String,
    pub verdict: Verdict,
}

/// Drives the pipeline over a list of test cases.
pub struct CorpusDriver<'g, R> {
    gate: &'g BuildGate,
    pipeline: TestPipeline<R>,
    layout: CorpusLayout,
    fail_fast: bool,
}

impl<'g, R: ProcessRunner> CorpusDriver<'g, R> {
    pub fn new(gate: &'g BuildGate, pipeline: TestPipeline<R>, layout: CorpusLayout) -> Self {
        Self {
            gate,
            pipeline,
            layout,
            fail_fast: false,
        }
    }

    /// Stop after the first verdict that is not a pass.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Validates `names` and returns a lazy run over them.
    ///
    /// Nothing is spawned until the first item is pulled; the build gate is
    /// passed before the first test case. An `Err` item ends the sequence.
    pub fn run_all<S: AsRef<str>>(&self, names: &[S]) -> Result<CorpusRun<'_, 'g, R>, HarnessError> {
        let cases = self.layout.resolve(names)?;
        Ok(CorpusRun {
            driver: self,
            cases: cases.into_iter(),
            finished: false,
        })
    }

    fn run_case(&self, case: &TestCase) -> Result<CaseOutcome, HarnessError> {
        self.gate.ensure_built(self.pipeline.runner())?;
        let verdict = self.pipeline.execute(case)?;
        info!(case = case.name(), verdict = %verdict.kind(), "test case finished");
        if verdict.is_pass() {
            remove_if_exists(case.executable_path())?;
        }
        Ok(CaseOutcome {
            name: case.name().to_string(),
            verdict,
        })
    }
}

/// Lazy, single-pass sequence of outcomes, one per requested name.
pub struct CorpusRun<'d, 'g, R> {
    driver: &'d CorpusDriver<'g, R>,
    cases: std::vec::IntoIter<TestCase>,
    finished: bool,
}

impl<R: ProcessRunner> Iterator for CorpusRun<'_, '_, R> {
    type Item = Result<CaseOutcome, HarnessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let case = self.cases.next()?;
        let outcome = self.driver.run_case(&case);
        match &outcome {
            Err(_) => self.finished = true,
            Ok(o) if self.driver.fail_fast && !o.verdict.is_pass() => self.finished = true,
            Ok(_) => {}
        }
        Some(outcome)
    }
}
