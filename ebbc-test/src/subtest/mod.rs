//! Test kinds
//!
//! Each `test` line of a fixture selects a [`SubTest`]. Every function of the
//! fixture is run through every subtest in the order of the `test` lines.

mod cat;
mod legalizer;
mod regalloc;
mod verifier;

use ebbc_codegen::ir::Function;
use ebbc_codegen::TargetIsa;
use ebbc_common::{Pass, PassTimer};
use ebbc_filecheck::{Bindings, CheckError, Checker};
use ebbc_reader::{Details, TestCommand};
use std::borrow::Cow;
use thiserror::Error;

/// Everything a subtest knows about the function it runs on.
pub struct Context<'a> {
    pub details: &'a Details,
    pub checker: &'a Checker,
    pub isa: Option<&'a dyn TargetIsa>,
    pub timer: &'a PassTimer,
    /// Directive variables, shared by all functions of the fixture.
    pub bindings: &'a mut Bindings,
}

pub trait SubTest {
    fn name(&self) -> &'static str;

    /// Does `run` change the function? Mutating tests get their own copy.
    fn is_mutating(&self) -> bool {
        false
    }

    fn needs_isa(&self) -> bool {
        false
    }

    fn run(&self, func: Cow<Function>, context: &mut Context) -> anyhow::Result<()>;
}

pub fn new(parsed: &TestCommand) -> anyhow::Result<Box<dyn SubTest>> {
    if !parsed.options.is_empty() {
        anyhow::bail!("no options allowed on `test {}`", parsed);
    }
    match parsed.command.as_str() {
        "cat" => Ok(Box::new(cat::TestCat)),
        "verifier" => Ok(Box::new(verifier::TestVerifier)),
        "legalizer" => Ok(Box::new(legalizer::TestLegalizer)),
        "regalloc" => Ok(Box::new(regalloc::TestRegalloc)),
        other => anyhow::bail!("unknown test command `{}`", other),
    }
}

/// Directive failure, with the text the directives ran against.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct CheckFailure {
    pub error: CheckError,
    pub output: String,
}

/// Check `text` against the directives of the function.
pub fn run_filecheck(text: &str, context: &mut Context) -> anyhow::Result<()> {
    let _tt = context.timer.start(Pass::Filecheck);
    context
        .checker
        .check(text, context.bindings)
        .map_err(|error| {
            CheckFailure {
                error,
                output: text.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_commands() {
        let command = |name: &str| TestCommand {
            command: name.to_string(),
            options: Vec::new(),
        };
        for name in ["cat", "verifier", "legalizer", "regalloc"] {
            assert_eq!(new(&command(name)).unwrap().name(), name);
        }
        assert!(new(&command("licm")).is_err());

        let mut with_options = command("cat");
        with_options.options.push(ebbc_reader::TestOption::Flag("x".to_string()));
        assert!(new(&with_options).is_err());
    }
}
