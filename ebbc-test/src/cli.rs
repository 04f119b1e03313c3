use crate::config::RunConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ebt",
    about = "Filetest runner for the EBB code generator",
    long_about = "ebt - EBB filetest runner\n\nRuns `.ebb` fixtures through the legalizer, ABI assignment and register allocator in parallel and checks the printed IR against the directives in each fixture.",
    version
)]
pub struct Cli {
    /// Fixture files or directories searched for `*.ebb` files
    #[arg(value_name = "PATH", default_value = "filetests")]
    pub paths: Vec<PathBuf>,

    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Only run fixtures whose path contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Print the summed pass timings
    #[arg(long)]
    pub timing: bool,

    /// Write a JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Print the IR of passing fixtures too
    #[arg(short, long)]
    pub verbose: bool,

    /// Run fixtures one at a time on the main thread
    #[arg(long)]
    pub no_parallel: bool,
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        let defaults = RunConfig::default();
        RunConfig {
            jobs: self.jobs.unwrap_or(defaults.jobs).max(1),
            filter: self.filter.clone(),
            timing: self.timing,
            json: self.json.clone(),
            verbose: self.verbose,
            parallel: !self.no_parallel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_search_filetests() {
        let cli = Cli::parse_from(["ebt"]);
        assert_eq!(cli.paths, vec![PathBuf::from("filetests")]);
        let config = cli.run_config();
        assert!(config.parallel);
        assert!(config.jobs >= 1);
    }

    #[test]
    fn options() {
        let cli = Cli::parse_from(["ebt", "a.ebb", "dir", "-j", "0", "--filter", "regalloc", "--timing", "--json", "out.json", "--no-parallel"]);
        let config = cli.run_config();
        assert_eq!(cli.paths.len(), 2);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.filter.as_deref(), Some("regalloc"));
        assert!(config.timing);
        assert_eq!(config.json, Some(PathBuf::from("out.json")));
        assert!(!config.parallel);
    }
}
