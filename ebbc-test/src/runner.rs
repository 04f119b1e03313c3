use crate::config::RunConfig;
use crate::reporter::{ProgressReporter, TestResult};
use crate::runone;
use anyhow::{Context, Result};
use log::info;
use rayon::prelude::*;
use std::any::Any;
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Runs fixtures on a pool of worker threads.
pub struct TestRunner {
    config: RunConfig,
}

impl TestRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Run every fixture in `paths`. Results come back in the order of
    /// `paths` whatever order the workers finish in.
    pub fn run(&self, paths: &[PathBuf]) -> Result<Vec<TestResult>> {
        if !self.config.parallel || paths.len() <= 1 {
            return Ok(paths.iter().map(|path| run_single(path)).collect());
        }

        info!("running {} fixtures on {} threads", paths.len(), self.config.jobs);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .context("cannot start the worker threads")?;

        let progress = ProgressReporter::new(paths.len());
        let results: Vec<TestResult> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let result = run_single(path);
                    progress.update(&path.display().to_string());
                    result
                })
                .collect()
        });
        progress.finish();
        Ok(results)
    }
}

/// Run one fixture. A panic in the pipeline fails the fixture instead of
/// the whole run.
fn run_single(path: &Path) -> TestResult {
    let start = Instant::now();
    match panic::catch_unwind(|| runone::run(path)) {
        Ok(file) => TestResult::from_file(path, file),
        Err(payload) => TestResult::panicked(path, panic_message(payload.as_ref()), start.elapsed()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::TestStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn panic_payloads() {
        let payload = panic::catch_unwind(|| panic!("index out of bounds")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "panicked: index out of bounds");
        let n = 3;
        let payload = panic::catch_unwind(|| panic!("bad value v{}", n)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "panicked: bad value v3");
    }

    #[test]
    fn unreadable_fixtures_fail() {
        let runner = TestRunner::new(RunConfig {
            parallel: false,
            ..RunConfig::default()
        });
        let results = runner.run(&[PathBuf::from("no/such/fixture.ebb")]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::Failed);
        assert!(results[0].message.as_deref().unwrap_or("").starts_with("cannot read no/such/fixture.ebb"));
    }
}
