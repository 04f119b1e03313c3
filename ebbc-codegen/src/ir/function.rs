//! Functions

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::Ebb;
use crate::ir::extfunc::Signature;
use crate::ir::layout::Layout;
use crate::ir::valueloc::ValueLocations;
use crate::isa::TargetIsa;
use crate::write::DisplayFunction;

/// A function in the EBB IR. It owns its EBBs, instructions, values and
/// preamble tables.
#[derive(Debug, Clone, Default)]
pub struct Function {
    /// Name without the leading `%`.
    pub name: String,
    pub signature: Signature,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub locations: ValueLocations,
}

impl Function {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_signature(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            ..Self::default()
        }
    }

    pub fn entry_block(&self) -> Option<Ebb> {
        self.layout.entry_block()
    }

    /// Printable form of the function. Register names come from `isa`.
    pub fn display<'a>(&'a self, isa: Option<&'a dyn TargetIsa>) -> DisplayFunction<'a> {
        DisplayFunction::new(self, isa)
    }
}
