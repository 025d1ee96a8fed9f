//! Human-facing output for corpus runs.
//!
//! All functions write to a `WriteColor` so the CLI can hand in a colored
//! stdout stream and tests can hand in an uncolored buffer.

use std::io::{self, Write};

use difference::{Changeset, Difference};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::corpus::CaseOutcome;
use crate::diagnostics::VerdictKind;
use crate::pipeline::{StageFailure, Verdict};

/// Stderr beyond this many bytes is cut in reports.
const STDERR_EXCERPT: usize = 2048;

/// Pass/fail tally for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    /// Failures per kind, in first-seen order.
    pub failures_by_kind: Vec<(VerdictKind, usize)>,
}

impl RunSummary {
    pub fn record(&mut self, verdict: &Verdict) {
        let kind = verdict.kind();
        if kind.is_pass() {
            self.passed += 1;
            return;
        }
        self.failed += 1;
        match self.failures_by_kind.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, count)) => *count += 1,
            None => self.failures_by_kind.push((kind, 1)),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        (self.passed as f64 / self.total() as f64) * 100.0
    }
}

/// One line per case, followed by failure details.
pub fn print_outcome<W: WriteColor>(out: &mut W, outcome: &CaseOutcome) -> io::Result<()> {
    let verdict = &outcome.verdict;
    if verdict.is_pass() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, "✓")?;
        out.reset()?;
        writeln!(out, " {}", outcome.name)?;
        return Ok(());
    }

    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
    write!(out, "✗")?;
    out.reset()?;
    writeln!(out, " {} ({})", outcome.name, verdict.kind())?;

    match verdict {
        Verdict::OutputMismatch { expected, actual } => print_mismatch(out, expected, actual),
        other => match other.failure() {
            Some(failure) => print_stage_failure(out, failure),
            None => Ok(()),
        },
    }
}

pub fn print_summary<W: WriteColor>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(out)?;
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "Test Summary")?;
    out.reset()?;
    writeln!(out, "════════════")?;
    if summary.passed > 0 {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(out, "✓ Passed: {}", summary.passed)?;
        out.reset()?;
    }
    if summary.failed > 0 {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(out, "✗ Failed: {}", summary.failed)?;
        out.reset()?;
        for (kind, count) in &summary.failures_by_kind {
            writeln!(out, "    {kind}: {count}")?;
        }
    }
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(
        out,
        "Success rate: {:.1}% ({}/{})",
        summary.success_rate(),
        summary.passed,
        summary.total()
    )?;
    out.reset()
}

fn print_stage_failure<W: WriteColor>(out: &mut W, failure: &StageFailure) -> io::Result<()> {
    writeln!(out, "    {failure}")?;
    if failure.stderr.is_empty() {
        return Ok(());
    }
    let text = String::from_utf8_lossy(&failure.stderr);
    let excerpt = truncate(&text, STDERR_EXCERPT);
    out.set_color(ColorSpec::new().set_dimmed(true))?;
    for line in excerpt.lines() {
        writeln!(out, "    | {line}")?;
    }
    if excerpt.len() < text.len() {
        writeln!(out, "    | ... ({} more bytes)", text.len() - excerpt.len())?;
    }
    out.reset()
}

fn print_mismatch<W: WriteColor>(out: &mut W, expected: &[u8], actual: &[u8]) -> io::Result<()> {
    let expected_text = String::from_utf8_lossy(expected);
    let actual_text = String::from_utf8_lossy(actual);
    writeln!(out, "    --- reference (expected)")?;
    writeln!(out, "    +++ compiled (actual)")?;

    let changeset = Changeset::new(&expected_text, &actual_text, "\n");
    for diff in &changeset.diffs {
        let (sign, color, chunk) = match diff {
            Difference::Same(x) => (' ', None, x),
            Difference::Rem(x) => ('-', Some(Color::Red), x),
            Difference::Add(x) => ('+', Some(Color::Green), x),
        };
        out.set_color(ColorSpec::new().set_fg(color))?;
        for line in chunk.split('\n') {
            writeln!(out, "    {sign}{line}")?;
        }
        out.reset()?;
    }

    // Line diffs hide differences in trailing newlines and invalid UTF-8.
    writeln!(out, "    expected bytes: {}", escape(expected))?;
    writeln!(out, "    actual bytes:   {}", escape(actual))
}

fn escape(bytes: &[u8]) -> String {
    let mut text = String::from("\"");
    for &b in bytes {
        text.extend(std::ascii::escape_default(b).map(char::from));
    }
    text.push('"');
    text
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
