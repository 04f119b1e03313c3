//! Parsed form of a fixture file

use ebbc_codegen::ir::Function;
use ebbc_codegen::isa::{Flags, TargetIsa};
use ebbc_common::SourceLocation;
use std::fmt;
use std::sync::Arc;

/// A `test <kind> [options]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub command: String,
    pub options: Vec<TestOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOption {
    Flag(String),
    Value(String, String),
}

impl fmt::Display for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for option in &self.options {
            match option {
                TestOption::Flag(name) => write!(f, " {}", name)?,
                TestOption::Value(name, value) => write!(f, " {}={}", name, value)?,
            }
        }
        Ok(())
    }
}

/// A comment with the line it was found on. The text excludes the `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: u32,
    pub text: String,
}

/// Target configuration in force where a function was declared.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub flags: Flags,
    pub isa: Option<Arc<dyn TargetIsa>>,
}

/// Everything about a function besides the IR itself.
#[derive(Debug, Clone)]
pub struct Details {
    pub location: SourceLocation,
    /// Comments in the function and after it, up to the next function.
    pub comments: Vec<Comment>,
    pub target: TargetSpec,
}

#[derive(Debug, Clone)]
pub struct TestFile {
    pub commands: Vec<TestCommand>,
    /// Comments before the first function.
    pub preamble_comments: Vec<Comment>,
    pub functions: Vec<(Function, Details)>,
}
