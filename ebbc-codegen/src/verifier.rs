//! IR verifier
//!
//! Structural and type checks run between passes when `enable_verifier` is
//! set, and by the `verifier` test kind. EBB argument counts are checked by
//! [`check_ebb_params`], so a ghost parameter is reported as an invalid CFG
//! here as well.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::{check_ebb_params, ControlFlowGraph};
use crate::ir::dfg::ValueDef;
use crate::ir::entities::{Ebb, Inst, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::Type;
use crate::write::write_instruction;
use ebbc_common::{CodegenError, CodegenResult};
use log::trace;

pub fn verify_function(func: &Function) -> CodegenResult<()> {
    let cfg = ControlFlowGraph::with_function(func);
    let domtree = DominatorTree::with_function(func, &cfg);
    let verifier = Verifier {
        func,
        domtree: &domtree,
    };
    verifier.run(&cfg)
}

struct Verifier<'a> {
    func: &'a Function,
    domtree: &'a DominatorTree,
}

impl Verifier<'_> {
    fn run(&self, cfg: &ControlFlowGraph) -> CodegenResult<()> {
        let entry = self
            .func
            .entry_block()
            .ok_or_else(|| CodegenError::verifier(format!("%{}", self.func.name), "function has no EBBs"))?;
        self.entry_params(entry)?;

        for ebb in self.func.layout.ebbs() {
            self.ebb_structure(ebb)?;
            for &param in self.func.dfg.ebb_params(ebb) {
                if self.func.dfg.value_def(param) == ValueDef::Detached {
                    return Err(CodegenError::verifier(ebb, format!("parameter {} is detached", param)));
                }
            }
            for &inst in self.func.layout.ebb_insts(ebb) {
                trace!("verifying {} in {}", inst, ebb);
                self.operands_defined(ebb, inst)?;
                self.typecheck(inst)?;
            }
        }
        check_ebb_params(self.func, cfg)?;
        self.branch_arg_types()
    }

    fn error(&self, inst: Inst, message: impl Into<String>) -> CodegenError {
        let mut text = String::new();
        if write_instruction(&mut text, self.func, None, inst).is_err() {
            text = inst.to_string();
        }
        CodegenError::verifier(format!("`{}`", text), message)
    }

    fn entry_params(&self, entry: Ebb) -> CodegenResult<()> {
        let params = self.func.dfg.ebb_params(entry);
        let sig = &self.func.signature.params;
        if params.len() != sig.len() {
            return Err(CodegenError::verifier(
                entry,
                format!(
                    "entry block has {} parameters but the signature has {}",
                    params.len(),
                    sig.len()
                ),
            ));
        }
        for (&param, abi) in params.iter().zip(sig.iter()) {
            let ty = self.func.dfg.value_type(param);
            if ty != abi.value_type {
                return Err(CodegenError::verifier(
                    entry,
                    format!(
                        "entry parameter {} has type {}, signature says {}",
                        param, ty, abi.value_type
                    ),
                ));
            }
        }
        Ok(())
    }

    fn ebb_structure(&self, ebb: Ebb) -> CodegenResult<()> {
        let insts = self.func.layout.ebb_insts(ebb);
        let last = match insts.last() {
            Some(&last) => last,
            None => return Err(CodegenError::verifier(ebb, "EBB is empty")),
        };
        if !self.func.dfg[last].opcode().is_terminator() {
            return Err(self.error(last, format!("{} does not end with a terminator", ebb)));
        }
        for &inst in &insts[..insts.len() - 1] {
            if self.func.dfg[inst].opcode().is_terminator() {
                return Err(self.error(inst, format!("terminator in the middle of {}", ebb)));
            }
        }
        Ok(())
    }

    fn operands_defined(&self, ebb: Ebb, inst: Inst) -> CodegenResult<()> {
        for &result in self.func.dfg.inst_results(inst) {
            if !self.func.dfg.value_is_attached(result) {
                return Err(self.error(inst, format!("result {} is detached", result)));
            }
        }
        for arg in self.func.dfg[inst].arguments() {
            if !self.func.dfg.value_is_attached(arg) {
                return Err(self.error(inst, format!("use of undefined value {}", arg)));
            }
            if !self.domtree.is_reachable(ebb) {
                continue;
            }
            if !self.def_dominates(arg, ebb, inst) {
                return Err(self.error(inst, format!("use of {} is not dominated by its definition", arg)));
            }
        }
        Ok(())
    }

    fn def_dominates(&self, value: Value, ebb: Ebb, inst: Inst) -> bool {
        let layout = &self.func.layout;
        match self.func.dfg.value_def(value) {
            ValueDef::Result(def_inst, _) => match layout.inst_ebb(def_inst) {
                Some(def_ebb) if def_ebb == ebb => {
                    layout.inst_position(def_inst) < layout.inst_position(inst)
                }
                Some(def_ebb) => self.domtree.dominates(def_ebb, ebb),
                None => false,
            },
            ValueDef::Param(def_ebb, _) => def_ebb == ebb || self.domtree.dominates(def_ebb, ebb),
            ValueDef::Detached => false,
        }
    }

    fn typecheck(&self, inst: Inst) -> CodegenResult<()> {
        let dfg = &self.func.dfg;
        let data = &dfg[inst];
        let opcode = data.opcode();
        let ty = |v: Value| dfg.value_type(v);
        let result = dfg.first_result(inst).map(|v| dfg.value_type(v));
        let fail = |msg: String| Err(self.error(inst, msg));

        match data {
            InstructionData::UnaryImm { imm, .. } => {
                let res = match result {
                    Some(res) if res.is_int() => res,
                    _ => return fail(format!("{} must produce an integer", opcode)),
                };
                if !imm_fits(res, imm.value()) {
                    return fail(format!("immediate {} does not fit in {}", imm.value(), res));
                }
            }
            InstructionData::UnaryBool { .. } => {
                if result != Some(Type::B1) {
                    return fail(format!("{} must produce a b1", opcode));
                }
            }
            InstructionData::Unary { arg, .. } => {
                let arg_ty = ty(*arg);
                let res = result.unwrap_or(arg_ty);
                let ok = match opcode {
                    Opcode::Bnot => arg_ty.is_int() || arg_ty.is_bool(),
                    Opcode::Popcnt => arg_ty.is_int(),
                    Opcode::Bint => arg_ty.is_bool() && res.is_int(),
                    Opcode::Uextend | Opcode::Sextend => {
                        arg_ty.is_int() && res.is_int() && res.bits() > arg_ty.bits()
                    }
                    Opcode::Ireduce => arg_ty.is_int() && res.is_int() && res.bits() < arg_ty.bits(),
                    _ => true,
                };
                if !ok {
                    return fail(format!("{} cannot take {} to {}", opcode, arg_ty, res));
                }
            }
            InstructionData::Binary { args, .. } => {
                let (a, b) = (ty(args[0]), ty(args[1]));
                let ok = match opcode {
                    Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => a.is_float() && a == b,
                    Opcode::Band | Opcode::Bor | Opcode::Bxor | Opcode::BandNot | Opcode::BorNot | Opcode::BxorNot => {
                        (a.is_int() || a.is_bool()) && a == b
                    }
                    Opcode::Ishl | Opcode::Ushr | Opcode::Sshr | Opcode::Rotl | Opcode::Rotr => {
                        a.is_int() && b.is_int()
                    }
                    _ => a.is_int() && a == b,
                };
                if !ok {
                    return fail(format!("{} cannot combine {} and {}", opcode, a, b));
                }
            }
            InstructionData::BinaryImm { arg, imm, .. } | InstructionData::IntCompareImm { arg, imm, .. } => {
                if !ty(*arg).is_int() {
                    return fail(format!("{} needs an integer operand, got {}", opcode, ty(*arg)));
                }
                if !imm_fits(ty(*arg), imm.value()) {
                    return fail(format!("immediate {} does not fit in {}", imm.value(), ty(*arg)));
                }
            }
            InstructionData::Ternary { args, .. } => {
                let (a, b, c) = (ty(args[0]), ty(args[1]), ty(args[2]));
                let ok = match opcode {
                    Opcode::Select => (a.is_bool() || a.is_int()) && b == c,
                    _ => a.is_int() && a == b && c == Type::B1,
                };
                if !ok {
                    return fail(format!("{} cannot take {}, {}, {}", opcode, a, b, c));
                }
            }
            InstructionData::IntCompare { args, .. } => {
                let (a, b) = (ty(args[0]), ty(args[1]));
                if !(a.is_int() && a == b) {
                    return fail(format!("{} cannot compare {} and {}", opcode, a, b));
                }
            }
            InstructionData::Branch { arg, .. } => {
                let a = ty(*arg);
                if !(a.is_int() || a.is_bool()) {
                    return fail(format!("{} cannot test a {}", opcode, a));
                }
            }
            InstructionData::BranchIcmp { cmp, .. } => {
                let (a, b) = (ty(cmp[0]), ty(cmp[1]));
                if !(a.is_int() && a == b) {
                    return fail(format!("{} cannot compare {} and {}", opcode, a, b));
                }
            }
            InstructionData::Call { args, .. } | InstructionData::CallIndirect { args, .. } => {
                let sig = dfg
                    .call_signature(inst)
                    .and_then(|s| dfg.signature(s))
                    .ok_or_else(|| self.error(inst, "call through an undeclared signature"))?;
                let expected: Vec<Type> = sig.params.iter().map(|p| p.value_type).collect();
                self.value_list_types(inst, "call argument", args, &expected)?;
            }
            InstructionData::MultiAry { args, .. } => {
                let expected: Vec<Type> = self
                    .func
                    .signature
                    .returns
                    .iter()
                    .map(|p| p.value_type)
                    .collect();
                self.value_list_types(inst, "return value", args, &expected)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn value_list_types(&self, inst: Inst, what: &str, args: &[Value], expected: &[Type]) -> CodegenResult<()> {
        if args.len() != expected.len() {
            return Err(self.error(
                inst,
                format!("{} count: expected {}, got {}", what, expected.len(), args.len()),
            ));
        }
        for (i, (&arg, &want)) in args.iter().zip(expected.iter()).enumerate() {
            let have = self.func.dfg.value_type(arg);
            if have != want {
                return Err(self.error(
                    inst,
                    format!("{} {} ({}) has type {}, expected {}", what, i, arg, have, want),
                ));
            }
        }
        Ok(())
    }

    fn branch_arg_types(&self) -> CodegenResult<()> {
        for ebb in self.func.layout.ebbs() {
            for &inst in self.func.layout.ebb_insts(ebb) {
                if let Some((dest, args)) = self.func.dfg[inst].branch_info() {
                    let expected: Vec<Type> = self
                        .func
                        .dfg
                        .ebb_params(dest)
                        .iter()
                        .map(|&p| self.func.dfg.value_type(p))
                        .collect();
                    self.value_list_types(inst, &format!("{} argument", dest), args, &expected)?;
                }
            }
        }
        Ok(())
    }
}

/// An immediate fits an `n`-bit integer type when it is a signed or an
/// unsigned `n`-bit number.
fn imm_fits(ty: Type, imm: i64) -> bool {
    let bits = ty.bits();
    if bits >= 64 {
        return true;
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    (min..=max).contains(&imm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AbiParam, CallConv, InsertBuilder, Signature};
    use pretty_assertions::assert_eq;

    fn add_imm(ty: Type, imm: i64) -> Function {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(ty));
        sig.returns.push(AbiParam::new(ty));
        let mut func = Function::with_name_signature("add_imm", sig);
        let ebb = func.dfg.make_ebb();
        func.layout.append_ebb(ebb);
        let x = func.dfg.append_ebb_param(ebb, ty);
        let mut pos = InsertBuilder::at_end(&mut func, ebb);
        let sum = pos.binary_imm(Opcode::IaddImm, x, imm);
        pos.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args: vec![sum],
            },
            None,
        );
        func
    }

    #[test]
    fn immediates_must_fit_the_controlling_type() {
        verify_function(&add_imm(Type::I32, -0x8000_0000)).unwrap();
        verify_function(&add_imm(Type::I32, 0xffff_ffff)).unwrap();
        verify_function(&add_imm(Type::I64, i64::MIN)).unwrap();

        let err = verify_function(&add_imm(Type::I32, i64::MIN)).unwrap_err();
        assert_eq!(err.message(), "immediate -9223372036854775808 does not fit in i32");
        let err = verify_function(&add_imm(Type::I8, 256)).unwrap_err();
        assert_eq!(err.message(), "immediate 256 does not fit in i8");
    }

    #[test]
    fn iconst_range() {
        assert!(imm_fits(Type::I16, -0x8000));
        assert!(imm_fits(Type::I16, 0xffff));
        assert!(!imm_fits(Type::I16, -0x8001));
        assert!(!imm_fits(Type::I16, 0x1_0000));
    }
}
