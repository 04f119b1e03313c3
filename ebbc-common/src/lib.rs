//! EBB codegen test engine - Common Types and Utilities
//!
//! This crate contains the error taxonomy, source locations and pass timing
//! shared by the reader, the code generator and the test runner.

pub mod error;
pub mod source_loc;
pub mod timing;

pub use error::{CodegenError, CodegenResult};
pub use source_loc::SourceLocation;
pub use timing::{Pass, PassTimer, PassTimes};
