//! EBB codegen test engine - Directive Verifier
//!
//! Fixture comments state what the printed IR must look like:
//!
//! ```text
//! ; regex: V=v\d+
//! ; check: $(cst=$V) = iconst.i32 0x3b9a_ca00
//! ; nextln: v1 = iadd v0, $cst
//! ; not: spill
//! ```
//!
//! A [`CheckerBuilder`] collects the directives, and [`Checker::check`] runs
//! them against text. Variables live in a [`Bindings`] environment owned by
//! the caller, so values captured while checking one function can be used
//! by the directives of the next one in the same file.

pub mod checker;
pub mod error;
pub mod pattern;

pub use checker::{Checker, CheckerBuilder, Directive, DirectiveKind};
pub use error::{CheckError, CheckResult};
pub use pattern::Bindings;
