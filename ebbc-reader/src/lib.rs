//! EBB codegen test engine - Fixture Reader
//!
//! Turns fixture text into IR functions. A fixture starts with header lines:
//!
//! - `test <kind> [options]` selects what the harness does with the file
//! - `set <flag>[=<value>]` changes the shared target flags
//! - `isa <name> [<flag>[=<value>] ...]` selects the target
//!
//! followed by functions. Comments are kept with the function they follow,
//! since they carry the test directives.

pub mod lexer;
pub mod parser;
pub mod testfile;

pub use parser::{parse_functions, parse_test};
pub use testfile::{Comment, Details, TargetSpec, TestCommand, TestFile, TestOption};
