//! Target ISA descriptions
//!
//! A [`TargetIsa`] answers the questions the passes ask about a target: which
//! instructions it can execute, which registers exist, how arguments are
//! passed and which registers survive a call. A configured ISA is immutable
//! and shared as `Arc<dyn TargetIsa>`.

pub mod intel;
pub mod registers;
pub mod riscv;
pub mod settings;

pub use registers::{RegBank, RegClass, RegInfo};
pub use settings::{Flags, OptLevel, SettingError};

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::Inst;
use crate::ir::extfunc::CallConv;
use crate::ir::types::Type;
use crate::ir::valueloc::RegUnit;
use ebbc_common::CodegenResult;
use std::fmt;
use std::sync::Arc;

/// What the legalizer should do with an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegalizeAction {
    /// The target executes the instruction as is.
    Legal,
    /// Rewrite the instruction into simpler ones.
    Expand,
    /// No rewrite can make the instruction legal.
    Unsupported(String),
}

/// Registers used to pass arguments and return values under one calling
/// convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiRegisters {
    pub int_args: Vec<RegUnit>,
    pub float_args: Vec<RegUnit>,
    pub int_returns: Vec<RegUnit>,
    pub float_returns: Vec<RegUnit>,
    /// Argument registers are picked by parameter position rather than by
    /// counting parameters of the same class.
    pub positional: bool,
    /// First stack offset available for arguments.
    pub stack_base: i32,
}

pub trait TargetIsa: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn flags(&self) -> &Flags;

    fn register_info(&self) -> &RegInfo;

    /// Decide how the legalizer treats `inst`.
    fn legalize_action(&self, dfg: &DataFlowGraph, inst: Inst) -> LegalizeAction;

    fn abi_registers(&self, call_conv: CallConv) -> CodegenResult<AbiRegisters>;

    /// Register holding the return address on entry, for ISAs that pass it
    /// in a register.
    fn link_register(&self) -> Option<RegUnit> {
        None
    }

    /// Registers that are never allocated nor used for arguments.
    fn reserved_registers(&self) -> &[RegUnit];

    /// Allocatable registers of `class`, in allocation order.
    fn allocatable_registers(&self, class: RegClass) -> &[RegUnit];

    fn callee_saved_registers(&self) -> &[RegUnit];

    fn is_callee_saved(&self, unit: RegUnit) -> bool {
        self.callee_saved_registers().contains(&unit)
    }

    fn pointer_type(&self) -> Type {
        Type::pointer(self.flags().is_64bit)
    }

    /// Largest immediate operand an `_imm` instruction can encode.
    fn imm_fits(&self, imm: i64) -> bool;
}

/// Build a configured ISA from its name, the shared flags and the flags given
/// on the `isa` line.
pub fn lookup(
    name: &str,
    flags: Flags,
    isa_flags: &[(String, Option<String>)],
) -> Result<Arc<dyn TargetIsa>, SettingError> {
    match name {
        "riscv" => Ok(Arc::new(riscv::Isa::new(flags, isa_flags)?)),
        "intel" => Ok(Arc::new(intel::Isa::new(flags, isa_flags)?)),
        _ => Err(SettingError::UnknownIsa(name.to_string())),
    }
}

/// Reject `i64` values on 32-bit targets.
fn check_width(flags: &Flags, dfg: &DataFlowGraph, inst: Inst) -> Option<String> {
    if flags.is_64bit {
        return None;
    }
    let wide = value_types(dfg, inst).any(|ty| ty == Type::I64);
    if wide {
        Some("i64 values need a 64-bit target".to_string())
    } else {
        None
    }
}

/// Types of all results and operands of `inst`.
fn value_types<'a>(dfg: &'a DataFlowGraph, inst: Inst) -> impl Iterator<Item = Type> + 'a {
    dfg.inst_results(inst)
        .iter()
        .copied()
        .chain(dfg[inst].arguments())
        .filter_map(move |v| dfg.try_value_type(v))
}
