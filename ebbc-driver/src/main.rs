//! EBB code generator driver
//!
//! Runs one pipeline stage over every function of a `.ebb` file and prints
//! the resulting IR. Header lines of the file (`set`, `isa`) configure the
//! target; `--isa` replaces the file's choice.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use ebbc_codegen::isa::{self, Flags};
use ebbc_codegen::{Context, Function, TargetIsa};
use ebbc_common::PassTimer;
use ebbc_reader::parse_test;
use log::debug;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ebbc")]
#[command(about = "EBB code generator")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and print the functions
    Cat(Args),
    /// Legalize for the target and assign ABI locations
    Legalize(Args),
    /// Legalize and allocate registers
    Regalloc(Args),
    /// Run the IR verifier
    Verify(Args),
}

#[derive(clap::Args)]
struct Args {
    /// Input `.ebb` file
    file: PathBuf,

    /// Target ISA, replacing any `isa` line in the file
    #[arg(long, value_enum)]
    isa: Option<IsaName>,

    /// Print pass timings to stderr
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum IsaName {
    Riscv,
    Intel,
}

impl IsaName {
    fn name(self) -> &'static str {
        match self {
            IsaName::Riscv => "riscv",
            IsaName::Intel => "intel",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Cat,
    Legalize,
    Regalloc,
    Verify,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let (stage, args) = match cli.command {
        Commands::Cat(args) => (Stage::Cat, args),
        Commands::Legalize(args) => (Stage::Legalize, args),
        Commands::Regalloc(args) => (Stage::Regalloc, args),
        Commands::Verify(args) => (Stage::Verify, args),
    };
    if let Err(e) = run(stage, &args) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        process::exit(1);
    }
}

fn run(stage: Stage, args: &Args) -> Result<()> {
    let text = fs::read_to_string(&args.file).with_context(|| format!("cannot read {}", args.file.display()))?;
    let file = parse_test(&text).with_context(|| format!("cannot parse {}", args.file.display()))?;
    let timer = PassTimer::new();

    for (i, (func, details)) in file.functions.into_iter().enumerate() {
        let isa = target(details.target.isa.clone(), args.isa, &details.target.flags)?;
        if i > 0 {
            println!();
        }
        let func = process_function(stage, func, isa.as_deref(), &timer)
            .with_context(|| format!("{}:{}", args.file.display(), details.location))?;
        print!("{}", func.display(isa.as_deref()));
    }

    if args.timing {
        eprint!("{}", timer.into_times());
    }
    Ok(())
}

/// The file's ISA, or the one named on the command line built with the
/// file's shared flags.
fn target(file_isa: Option<Arc<dyn TargetIsa>>, name: Option<IsaName>, flags: &Flags) -> Result<Option<Arc<dyn TargetIsa>>> {
    match name {
        Some(name) => Ok(Some(isa::lookup(name.name(), flags.clone(), &[])?)),
        None => Ok(file_isa),
    }
}

fn process_function(stage: Stage, mut func: Function, isa: Option<&dyn TargetIsa>, timer: &PassTimer) -> Result<Function> {
    debug!("%{}: running {}", func.name, stage_name(stage));
    if stage == Stage::Cat {
        return Ok(func);
    }
    if stage == Stage::Verify {
        ebbc_codegen::verifier::verify_function(&func)?;
        return Ok(func);
    }

    let isa = isa.with_context(|| format!("`{}` needs a target: add an `isa` line or pass --isa", stage_name(stage)))?;
    let context = Context::new(isa, timer);
    match stage {
        Stage::Legalize => {
            context.legalize(&mut func)?;
            context.assign_locations(&mut func)?;
        }
        _ => context.regalloc(&mut func)?,
    }
    Ok(func)
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Cat => "cat",
        Stage::Legalize => "legalize",
        Stage::Regalloc => "regalloc",
        Stage::Verify => "verify",
    }
}
