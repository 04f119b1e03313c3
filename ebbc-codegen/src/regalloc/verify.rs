//! Location verifier
//!
//! Checks the result of register allocation. Any failure here is a bug in the
//! allocator, so it is reported as an internal error.

use super::liveness::Interference;
use crate::ir::entities::{Inst, Value};
use crate::ir::function::Function;
use crate::ir::instructions::Opcode;
use crate::ir::valueloc::ValueLoc;
use crate::isa::TargetIsa;
use crate::write::write_instruction;
use ebbc_common::{CodegenError, CodegenResult};

pub fn verify_locations(func: &Function, isa: &dyn TargetIsa, graph: &Interference) -> CodegenResult<()> {
    let verifier = LocationVerifier { func, isa };
    verifier.entry_params()?;
    for ebb in func.layout.ebbs() {
        for &param in func.dfg.ebb_params(ebb) {
            verifier.assigned(param, ebb)?;
        }
        for &inst in func.layout.ebb_insts(ebb) {
            verifier.inst(inst)?;
        }
    }
    verifier.interference(graph)
}

struct LocationVerifier<'a> {
    func: &'a Function,
    isa: &'a dyn TargetIsa,
}

impl LocationVerifier<'_> {
    fn loc(&self, value: Value) -> ValueLoc {
        self.func.locations.get(value)
    }

    fn show(&self, loc: ValueLoc) -> String {
        match loc {
            ValueLoc::Unassigned => "-".to_string(),
            ValueLoc::Reg(unit) => self.isa.register_info().display_regunit(unit),
            ValueLoc::Stack(offset) => offset.to_string(),
        }
    }

    fn error(&self, inst: Inst, message: impl Into<String>) -> CodegenError {
        let mut text = String::new();
        if write_instruction(&mut text, self.func, Some(self.isa.register_info()), inst).is_err() {
            text = inst.to_string();
        }
        CodegenError::internal(format!("`{}`", text), message)
    }

    fn assigned(&self, value: Value, entity: impl ToString) -> CodegenResult<()> {
        if self.loc(value).is_assigned() {
            Ok(())
        } else {
            Err(CodegenError::internal(entity, format!("{} has no location", value)))
        }
    }

    fn entry_params(&self) -> CodegenResult<()> {
        let entry = match self.func.entry_block() {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let params = self.func.dfg.ebb_params(entry);
        for (&param, abi) in params.iter().zip(&self.func.signature.params) {
            if abi.location.is_assigned() && self.loc(param) != abi.location {
                return Err(CodegenError::internal(
                    entry,
                    format!(
                        "{} is in {} but the signature passes it in {}",
                        param,
                        self.show(self.loc(param)),
                        self.show(abi.location)
                    ),
                ));
            }
        }
        Ok(())
    }

    fn inst(&self, inst: Inst) -> CodegenResult<()> {
        let data = &self.func.dfg[inst];
        let results = self.func.dfg.inst_results(inst);
        for &result in results {
            self.assigned(result, inst)?;
        }
        let args = data.arguments();
        for &arg in &args {
            self.assigned(arg, inst)?;
        }

        let opcode = data.opcode();
        if opcode.is_move() {
            let (src, dst) = match (args.first(), results.first()) {
                (Some(&src), Some(&dst)) => (self.loc(src), self.loc(dst)),
                _ => return Ok(()),
            };
            let ok = match opcode {
                Opcode::Copy => !src.is_stack() && !dst.is_stack(),
                Opcode::Spill => !src.is_stack() && dst.is_stack(),
                _ => src.is_stack() && !dst.is_stack(),
            };
            if !ok {
                return Err(self.error(
                    inst,
                    format!("{} cannot move from {} to {}", opcode, self.show(src), self.show(dst)),
                ));
            }
            return Ok(());
        }

        let fixed = data.num_fixed_args();
        for &arg in &args[..fixed] {
            if self.loc(arg).is_stack() {
                return Err(self.error(inst, format!("operand {} is on the stack", arg)));
            }
        }
        if !opcode.is_call() {
            for &result in results {
                if self.loc(result).is_stack() {
                    return Err(self.error(inst, format!("result {} is on the stack", result)));
                }
            }
        }

        let variable = &args[fixed..];
        if let Some((dest, _)) = data.branch_info() {
            let params = self.func.dfg.ebb_params(dest);
            self.matching(inst, variable, params.iter().map(|&p| self.loc(p)))?;
        } else if opcode.is_call() {
            let sig = self.func.dfg.call_signature(inst).and_then(|s| self.func.dfg.signature(s));
            if let Some(sig) = sig {
                self.matching(inst, variable, sig.params.iter().map(|p| p.location))?;
                self.matching(inst, results, sig.returns.iter().map(|r| r.location))?;
            }
        } else if opcode == Opcode::Return {
            self.matching(inst, variable, self.func.signature.returns.iter().map(|r| r.location))?;
        }
        Ok(())
    }

    /// Each value must sit where the other side expects it, when that side
    /// has an opinion.
    fn matching(&self, inst: Inst, values: &[Value], expected: impl Iterator<Item = ValueLoc>) -> CodegenResult<()> {
        for (&value, want) in values.iter().zip(expected) {
            let got = self.loc(value);
            if want.is_assigned() && got != want {
                return Err(self.error(
                    inst,
                    format!("{} is in {} but is expected in {}", value, self.show(got), self.show(want)),
                ));
            }
        }
        Ok(())
    }

    fn interference(&self, graph: &Interference) -> CodegenResult<()> {
        for (a, b) in graph.pairs() {
            if let (ValueLoc::Reg(ra), ValueLoc::Reg(rb)) = (self.loc(a), self.loc(b)) {
                if ra == rb {
                    return Err(CodegenError::internal(
                        a,
                        format!("interferes with {} but both are in {}", b, self.show(ValueLoc::Reg(ra))),
                    ));
                }
            }
        }
        for ebb in self.func.layout.ebbs() {
            let values = self
                .func
                .dfg
                .ebb_params(ebb)
                .iter()
                .chain(self.func.layout.ebb_insts(ebb).iter().flat_map(|&i| self.func.dfg.inst_results(i)));
            for &value in values {
                if let ValueLoc::Reg(unit) = self.loc(value) {
                    if graph.crosses_call(value) && !self.isa.is_callee_saved(unit) {
                        return Err(CodegenError::internal(
                            value,
                            format!("lives across a call in caller-saved {}", self.show(ValueLoc::Reg(unit))),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
