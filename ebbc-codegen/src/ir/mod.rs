//! Representation of EBB IR functions.

pub mod builder;
pub mod condcodes;
pub mod dfg;
pub mod entities;
pub mod extfunc;
pub mod function;
pub mod immediates;
pub mod instructions;
pub mod layout;
pub mod types;
pub mod valueloc;

pub use builder::InsertBuilder;
pub use condcodes::IntCC;
pub use dfg::{DataFlowGraph, ValueDef};
pub use entities::{Ebb, FuncRef, Inst, SigRef, Value};
pub use extfunc::{AbiParam, ArgumentPurpose, CallConv, ExtFuncData, Signature};
pub use function::Function;
pub use immediates::{Ieee32, Ieee64, Imm64};
pub use instructions::{InstructionData, InstructionFormat, Opcode};
pub use layout::Layout;
pub use types::Type;
pub use valueloc::{RegUnit, ValueLoc, ValueLocations};
