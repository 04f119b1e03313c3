//! EBB codegen test engine - Code Generator
//!
//! This crate holds the in-memory IR and every pass that transforms it:
//!
//! - IR data structures and the textual printer
//! - Target ISA descriptions (`riscv`, `intel`)
//! - Legalization of instructions the target cannot execute
//! - Assignment of signature locations for the calling convention
//! - Register allocation with a CSSA coalescer
//! - The IR verifier

pub mod abi;
pub mod context;
pub mod dominator_tree;
pub mod flowgraph;
pub mod ir;
pub mod isa;
pub mod legalizer;
pub mod regalloc;
pub mod verifier;
pub mod write;

pub use context::Context;
pub use ir::Function;
pub use isa::TargetIsa;
