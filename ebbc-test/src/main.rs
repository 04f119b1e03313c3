use anyhow::Result;
use clap::Parser;
use colored::*;
use ebbc_test::cli::Cli;
use ebbc_test::config::discover;
use ebbc_test::reporter::write_json;
use ebbc_test::{TestRunner, TestSummary};
use log::info;
use std::process;

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = cli.run_config();

    let paths = discover(&cli.paths, config.filter.as_deref())?;
    info!("found {} fixtures", paths.len());

    let results = TestRunner::new(config.clone()).run(&paths)?;
    let mut summary = TestSummary::default();
    for result in &results {
        result.print(config.verbose);
        summary.add(result);
    }
    summary.print(config.timing);

    if let Some(path) = &config.json {
        write_json(path, &results, &summary)?;
    }
    Ok(summary.exit_code())
}
