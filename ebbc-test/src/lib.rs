//! EBB codegen test engine - Filetest Runner
//!
//! Runs `*.ebb` fixtures through the pipeline stages named by their `test`
//! lines and checks the printed IR against their directives. Fixtures run
//! in parallel, one per rayon task.

pub mod cli;
pub mod config;
pub mod reporter;
pub mod runner;
pub mod runone;
pub mod subtest;

pub use config::RunConfig;
pub use reporter::{TestResult, TestStatus, TestSummary};
pub use runner::TestRunner;
