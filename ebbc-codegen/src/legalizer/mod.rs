//! Legalize instructions for a target ISA
//!
//! The legalizer walks the function in layout order and asks the ISA about
//! every instruction. Illegal instructions are rewritten in place by the
//! expansions in [`expand`]; the walk then resumes at the first instruction
//! the expansion produced, so the new instructions are legalized as well.
//! Running the legalizer on its own output changes nothing.

mod expand;

use crate::ir::entities::Inst;
use crate::ir::function::Function;
use crate::isa::{LegalizeAction, TargetIsa};
use crate::write::write_instruction;
use ebbc_common::{CodegenError, CodegenResult};
use log::{debug, trace};

/// Upper bound on rewrites per instruction originally in the function.
const REWRITE_BUDGET: usize = 64;

pub fn legalize_function(func: &mut Function, isa: &dyn TargetIsa) -> CodegenResult<()> {
    let mut budget = REWRITE_BUDGET * func.dfg.num_insts().max(1);
    let mut next_ebb = func.layout.entry_block();

    while let Some(ebb) = next_ebb {
        let mut pos = 0;
        while let Some(&inst) = func.layout.ebb_insts(ebb).get(pos) {
            match isa.legalize_action(&func.dfg, inst) {
                LegalizeAction::Legal => pos += 1,
                LegalizeAction::Expand => {
                    if budget == 0 {
                        return Err(CodegenError::internal(
                            describe(func, inst),
                            "legalization does not terminate",
                        ));
                    }
                    budget -= 1;
                    debug!("expanding {} in {}", describe(func, inst), ebb);
                    let prev = pos.checked_sub(1).map(|p| func.layout.ebb_insts(ebb)[p]);
                    if !expand::expand(func, inst)? {
                        return Err(unsupported(func, inst, "no legal expansion"));
                    }
                    // Revisit everything the expansion inserted.
                    pos = prev
                        .and_then(|p| func.layout.inst_position(p))
                        .map_or(0, |p| p + 1);
                }
                LegalizeAction::Unsupported(reason) => {
                    return Err(unsupported(func, inst, &reason));
                }
            }
        }
        trace!("{} is legal", ebb);
        next_ebb = func.layout.next_ebb(ebb);
    }
    Ok(())
}

fn unsupported(func: &Function, inst: Inst, reason: &str) -> CodegenError {
    CodegenError::UnsupportedOperation {
        opcode: func.dfg[inst].opcode().to_string(),
        ty: func
            .dfg
            .ctrl_type(inst)
            .map_or_else(|| "void".to_string(), |t| t.to_string()),
        inst: describe(func, inst),
        message: reason.to_string(),
    }
}

fn describe(func: &Function, inst: Inst) -> String {
    let mut text = String::new();
    match write_instruction(&mut text, func, None, inst) {
        Ok(()) => format!("`{}`", text),
        Err(_) => inst.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AbiParam, CallConv, Ebb, InsertBuilder, InstructionData, Opcode, Signature, Type, Value};
    use crate::isa::{self, Flags};
    use crate::verifier::verify_function;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn riscv() -> Arc<dyn TargetIsa> {
        isa::lookup("riscv", Flags::new(), &[]).unwrap()
    }

    fn function(params: &[Type], returns: &[Type]) -> (Function, Ebb, Vec<Value>) {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params = params.iter().map(|&t| AbiParam::new(t)).collect();
        sig.returns = returns.iter().map(|&t| AbiParam::new(t)).collect();
        let mut func = Function::with_name_signature("f", sig);
        let ebb = func.dfg.make_ebb();
        func.layout.append_ebb(ebb);
        let args = params.iter().map(|&t| func.dfg.append_ebb_param(ebb, t)).collect();
        (func, ebb, args)
    }

    fn ret(func: &mut Function, ebb: Ebb, args: Vec<Value>) {
        InsertBuilder::at_end(func, ebb).build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args,
            },
            None,
        );
    }

    fn legalized(mut func: Function, isa: &dyn TargetIsa) -> String {
        legalize_function(&mut func, isa).unwrap();
        verify_function(&func).unwrap();
        func.display(None).to_string()
    }

    #[test]
    fn carry_out_becomes_add_and_compare() {
        let (mut func, ebb, args) = function(&[Type::I32, Type::I32], &[Type::I32, Type::B1]);
        let add = InsertBuilder::at_end(&mut func, ebb).build(
            InstructionData::Binary {
                opcode: Opcode::IaddCout,
                args: [args[0], args[1]],
            },
            None,
        );
        let results = func.dfg.inst_results(add).to_vec();
        ret(&mut func, ebb, results);
        assert_eq!(
            legalized(func, &*riscv()),
            indoc! {"
                function %f(i32, i32) -> i32, b1 system_v {
                ebb0(v0: i32, v1: i32):
                    v2 = iadd v0, v1
                    v3 = icmp ult v2, v0
                    return v2, v3
                }
            "}
        );
    }

    #[test]
    fn large_immediates_are_materialized() {
        let (mut func, ebb, args) = function(&[Type::I32], &[Type::I32]);
        let sum = InsertBuilder::at_end(&mut func, ebb).binary_imm(Opcode::IaddImm, args[0], 1_000_000_000);
        ret(&mut func, ebb, vec![sum]);
        let isa = riscv();
        let expected = indoc! {"
            function %f(i32) -> i32 system_v {
            ebb0(v0: i32):
                v2 = iconst.i32 0x3b9a_ca00
                v1 = iadd v0, v2
                return v1
            }
        "};
        legalize_function(&mut func, &*isa).unwrap();
        assert_eq!(func.display(None).to_string(), expected);

        // A second run finds nothing to do.
        legalize_function(&mut func, &*isa).unwrap();
        assert_eq!(func.display(None).to_string(), expected);
    }

    #[test]
    fn band_not_inverts_its_second_operand_on_intel() {
        let isa = isa::lookup("intel", Flags::new(), &[]).unwrap();
        let (mut func, ebb, args) = function(&[Type::I32, Type::I32], &[Type::I32]);
        let masked = InsertBuilder::at_end(&mut func, ebb).binary(Opcode::BandNot, args[0], args[1]);
        ret(&mut func, ebb, vec![masked]);
        assert_eq!(
            legalized(func, &*isa),
            indoc! {"
                function %f(i32, i32) -> i32 system_v {
                ebb0(v0: i32, v1: i32):
                    v3 = bnot v1
                    v2 = band v0, v3
                    return v2
                }
            "}
        );
    }

    #[test]
    fn rotates_are_legalized_recursively() {
        let (mut func, ebb, args) = function(&[Type::I32, Type::I32], &[Type::I32]);
        let rot = InsertBuilder::at_end(&mut func, ebb).binary(Opcode::Rotl, args[0], args[1]);
        ret(&mut func, ebb, vec![rot]);
        assert_eq!(
            legalized(func, &*riscv()),
            indoc! {"
                function %f(i32, i32) -> i32 system_v {
                ebb0(v0: i32, v1: i32):
                    v3 = ishl v0, v1
                    v6 = iconst.i32 32
                    v4 = isub v6, v1
                    v5 = ushr v0, v4
                    v2 = bor v3, v5
                    return v2
                }
            "}
        );
    }

    #[test]
    fn select_splits_the_ebb() {
        let (mut func, ebb, args) = function(&[Type::B1, Type::I32, Type::I32], &[Type::I32]);
        let mut pos = InsertBuilder::at_end(&mut func, ebb);
        let select = pos.build(
            InstructionData::Ternary {
                opcode: Opcode::Select,
                args: [args[0], args[1], args[2]],
            },
            None,
        );
        let chosen = func.dfg.inst_results(select)[0];
        let sum = InsertBuilder::at_end(&mut func, ebb).binary(Opcode::Iadd, chosen, args[1]);
        ret(&mut func, ebb, vec![sum]);
        assert_eq!(
            legalized(func, &*riscv()),
            indoc! {"
                function %f(b1, i32, i32) -> i32 system_v {
                ebb0(v0: b1, v1: i32, v2: i32):
                    brnz v0, ebb1(v1)
                    jump ebb1(v2)

                ebb1(v3: i32):
                    v4 = iadd v3, v1
                    return v4
                }
            "}
        );
    }

    #[test]
    fn popcount_is_expanded_without_popcnt() {
        let (mut func, ebb, args) = function(&[Type::I32], &[Type::I32]);
        let count = InsertBuilder::at_end(&mut func, ebb).unary(Opcode::Popcnt, args[0]);
        ret(&mut func, ebb, vec![count]);
        let text = legalized(func, &*riscv());
        assert!(!text.contains("popcnt"));
        assert!(text.contains("iconst.i32 0x5555_5555"));
        assert!(text.contains("v1 = band_imm"));
    }

    #[test]
    fn wide_values_need_a_64bit_target() {
        let (mut func, ebb, args) = function(&[Type::I64], &[Type::I64]);
        let sum = InsertBuilder::at_end(&mut func, ebb).binary(Opcode::Iadd, args[0], args[0]);
        ret(&mut func, ebb, vec![sum]);
        let err = legalize_function(&mut func, &*riscv()).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
        match err {
            CodegenError::UnsupportedOperation { opcode, ty, .. } => {
                assert_eq!(opcode, "iadd");
                assert_eq!(ty, "i64");
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn multiply_by_constant_needs_the_m_extension() {
        let (mut func, ebb, args) = function(&[Type::I32], &[Type::I32]);
        let product = InsertBuilder::at_end(&mut func, ebb).binary_imm(Opcode::ImulImm, args[0], 3);
        ret(&mut func, ebb, vec![product]);
        let err = legalize_function(&mut func, &*riscv()).unwrap_err();
        assert!(err.to_string().starts_with("Unsupported operation `imul.i32`"));
    }
}
