use crate::runone::FileResult;
use crate::subtest::CheckFailure;
use anyhow::{Context, Result};
use colored::*;
use ebbc_common::PassTimes;
use ebbc_filecheck::CheckError;
use serde::Serialize;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixture status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Panicked,
}

impl TestStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Passed)
    }

    pub fn symbol(&self) -> ColoredString {
        match self {
            TestStatus::Passed => "✓".green(),
            TestStatus::Failed => "✗".red(),
            TestStatus::Panicked => "‼".red(),
        }
    }

    pub fn description(&self) -> ColoredString {
        match self {
            TestStatus::Passed => "PASSED".green(),
            TestStatus::Failed => "FAILED".red(),
            TestStatus::Panicked => "PANICKED".red().bold(),
        }
    }
}

/// Fixture result for reporting
#[derive(Debug, Serialize)]
pub struct TestResult {
    pub path: PathBuf,
    pub status: TestStatus,
    pub message: Option<String>,
    /// Set when a directive failed, with the IR it ran against.
    #[serde(skip)]
    pub mismatch: Option<CheckFailure>,
    pub duration_ms: u64,
    #[serde(skip)]
    pub times: PassTimes,
}

impl TestResult {
    pub fn from_file(path: &Path, file: FileResult) -> Self {
        let duration_ms = file.duration.as_millis() as u64;
        match file.result {
            Ok(()) => Self {
                path: path.to_path_buf(),
                status: TestStatus::Passed,
                message: None,
                mismatch: None,
                duration_ms,
                times: file.times,
            },
            Err(err) => Self {
                path: path.to_path_buf(),
                status: TestStatus::Failed,
                message: Some(format!("{:#}", err)),
                mismatch: err.chain().find_map(|e| e.downcast_ref::<CheckFailure>()).cloned(),
                duration_ms,
                times: file.times,
            },
        }
    }

    pub fn panicked(path: &Path, message: String, duration: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            status: TestStatus::Panicked,
            message: Some(message),
            mismatch: None,
            duration_ms: duration.as_millis() as u64,
            times: PassTimes::new(),
        }
    }

    /// Print a single fixture result
    pub fn print(&self, verbose: bool) {
        println!("{} {}: {}", self.status.symbol(), self.path.display(), self.status.description());

        if let Some(msg) = &self.message {
            if verbose || !self.status.is_success() {
                println!("  {}", msg.dimmed());
            }
        }

        if let Some(failure) = &self.mismatch {
            print_mismatch(failure);
        }
    }
}

/// Show the failing directive against the output line it stopped at, then
/// the whole output with that line marked.
fn print_mismatch(failure: &CheckFailure) {
    let at = match &failure.error {
        CheckError::ExpectationMismatch { directive, text, .. } => {
            let pattern = directive.split_once(':').map_or(directive.as_str(), |(_, p)| p.trim());
            println!("\n  {}", "Directive vs. output:".yellow());
            print!("    ");
            for change in TextDiff::from_words(pattern, text.as_str()).iter_all_changes() {
                let word = change.value();
                match change.tag() {
                    ChangeTag::Delete => print!("{}", word.red().strikethrough()),
                    ChangeTag::Insert => print!("{}", word.green()),
                    ChangeTag::Equal => print!("{}", word),
                }
            }
            println!();
            Some(text.as_str())
        }
        _ => None,
    };

    println!("\n  {}", "Output:".yellow());
    let mut marked = false;
    for (number, line) in failure.output.lines().enumerate() {
        let here = !marked && at.map_or(false, |at| line.trim() == at.trim());
        marked |= here;
        if here {
            println!("  {} {:4} {}", ">".red().bold(), number + 1, line.red());
        } else {
            println!("    {:4} {}", number + 1, line);
        }
    }
}

/// Run summary
#[derive(Debug, Default, Serialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub panicked: usize,
    pub duration_ms: u64,
    #[serde(skip)]
    pub times: PassTimes,
}

impl TestSummary {
    /// Add a fixture result to the summary
    pub fn add(&mut self, result: &TestResult) {
        self.total += 1;
        self.duration_ms += result.duration_ms;
        self.times += &result.times;

        match result.status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Panicked => self.panicked += 1,
        }
    }

    /// Print the summary, with the pass timings when asked for.
    pub fn print(&self, timing: bool) {
        if timing {
            println!("\n{}", self.times);
        }

        println!("\n{}", "=".repeat(60));
        println!("{:^60}", "Filetest Results");
        println!("{}", "=".repeat(60));

        println!("Total:          {}", self.total);
        println!("Passed:         {}", self.passed.to_string().green());
        if self.failed > 0 {
            println!("Failed:         {}", self.failed.to_string().red());
        }
        if self.panicked > 0 {
            println!("Panicked:       {}", self.panicked.to_string().red().bold());
        }
        println!("Duration:       {:.2}s", self.duration_ms as f64 / 1000.0);
        println!("{}", "=".repeat(60));

        if self.total == 0 {
            println!("\n{}", "No fixtures were run!".yellow().bold());
        } else if self.exit_code() == 0 {
            println!("\n{}", "All fixtures passed!".green().bold());
        } else {
            println!(
                "\n{}",
                format!("{} fixtures had issues", self.failed + self.panicked).red().bold()
            );
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.panicked == 0 {
            0
        } else {
            1
        }
    }
}

/// Write the results, the summary and the summed pass times as JSON.
pub fn write_json(path: &Path, results: &[TestResult], summary: &TestSummary) -> Result<()> {
    let timing: Vec<_> = summary
        .times
        .entries()
        .map(|(pass, time)| {
            json!({
                "pass": pass.description(),
                "total_ms": time.total.as_secs_f64() * 1000.0,
                "self_ms": time.self_time().as_secs_f64() * 1000.0,
            })
        })
        .collect();
    let report = json!({
        "summary": summary,
        "timing": timing,
        "results": results,
    });
    let text = serde_json::to_string_pretty(&report)?;
    fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))
}

/// Progress reporter for parallel execution
pub struct ProgressReporter {
    progress_bar: indicatif::ProgressBar,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        let progress_bar = indicatif::ProgressBar::new(total as u64);
        progress_bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        Self { progress_bar }
    }

    pub fn update(&self, message: &str) {
        self.progress_bar.set_message(message.to_string());
        self.progress_bar.inc(1);
    }

    pub fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebbc_common::{Pass, PassTimer};
    use pretty_assertions::assert_eq;

    fn failed_file() -> FileResult {
        let failure = CheckFailure {
            error: CheckError::ExpectationMismatch {
                directive: "check: return v2".to_string(),
                line: 7,
                text: "return v3".to_string(),
            },
            output: "ebb0:\n    return v3\n".to_string(),
        };
        FileResult {
            result: Err(anyhow::Error::new(failure).context("cat of %f at line 2")),
            times: PassTimes::new(),
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn failures_keep_the_directive_mismatch() {
        let result = TestResult::from_file(Path::new("a.ebb"), failed_file());
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(
            result.message.as_deref(),
            Some("cat of %f at line 2: line 7: `check: return v2` failed at: return v3")
        );
        assert_eq!(result.mismatch.as_ref().map(|m| m.error.line()), Some(7));
        assert_eq!(result.duration_ms, 3);
    }

    #[test]
    fn summary_counts_and_sums_times() {
        let timer = PassTimer::new();
        drop(timer.start(Pass::ParseText));
        let passed = TestResult::from_file(
            Path::new("b.ebb"),
            FileResult {
                result: Ok(()),
                times: timer.into_times(),
                duration: Duration::from_millis(1),
            },
        );
        let failed = TestResult::from_file(Path::new("a.ebb"), failed_file());
        let panicked = TestResult::panicked(Path::new("c.ebb"), "boom".to_string(), Duration::ZERO);

        let mut summary = TestSummary::default();
        for result in [&passed, &failed, &panicked] {
            summary.add(result);
        }
        assert_eq!((summary.total, summary.passed, summary.failed, summary.panicked), (3, 1, 1, 1));
        assert_eq!(summary.duration_ms, 4);
        assert_eq!(summary.times.get(Pass::ParseText), passed.times.get(Pass::ParseText));
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn json_report_shape() {
        let result = TestResult::panicked(Path::new("c.ebb"), "boom".to_string(), Duration::ZERO);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "panicked");
        assert_eq!(value["message"], "boom");
        assert_eq!(value["path"], "c.ebb");
        assert!(value.get("times").is_none());
    }
}
