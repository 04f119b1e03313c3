//! Register allocation
//!
//! The allocator works on conventional SSA and gives every value a register
//! or a stack slot:
//!
//! 1. EBB parameters must all have an incoming definition. A ghost parameter
//!    makes the CFG invalid for allocation.
//! 2. Values constrained by the calling convention are isolated behind copies
//!    ([`constraints`]).
//! 3. The function is converted to conventional SSA ([`coalescing`]).
//! 4. Copies are coalesced where their two sides do not interfere.
//! 5. Congruence classes are colored, spilling when registers run out
//!    ([`coloring`], [`spilling`]).
//! 6. The result is checked ([`verify`]).

pub mod coalescing;
pub mod coloring;
pub mod constraints;
pub mod liveness;
pub mod spilling;
pub mod verify;
pub mod virtregs;

use crate::flowgraph::{check_ebb_params, ControlFlowGraph};
use crate::ir::entities::{Inst, Value};
use crate::ir::function::Function;
use crate::isa::TargetIsa;
use ebbc_common::{CodegenResult, Pass, PassTimer};
use liveness::{Interference, Liveness};
use log::debug;
use virtregs::VirtRegs;

/// Allocate registers for `func`, replacing any locations it already has.
pub fn allocate(func: &mut Function, isa: &dyn TargetIsa, timer: &PassTimer) -> CodegenResult<()> {
    let _tt = timer.start(Pass::Regalloc);
    let cfg = ControlFlowGraph::with_function(func);
    check_ebb_params(func, &cfg)?;

    func.locations.clear();
    let mut vregs = VirtRegs::new();
    let abi_copies = constraints::insert_abi_copies(func, &mut vregs);
    let cssa_copies = {
        let _tt = timer.start(Pass::RaCssa);
        coalescing::convert_to_cssa(func, &mut vregs)?
    };
    debug!(
        "%{}: {} constraint copies, {} edge copies",
        func.name,
        abi_copies.len(),
        cssa_copies.len()
    );

    let mut graph = {
        let _tt = timer.start(Pass::RaLiveness);
        Interference::build(func, &Liveness::compute(func))
    };
    {
        let _tt = timer.start(Pass::RaCoalescing);
        let candidates: Vec<Inst> = cssa_copies.into_iter().chain(abi_copies).collect();
        coalescing::coalesce(func, isa, &mut vregs, &mut graph, &candidates);
    }

    let graph = coloring::color(func, isa, &mut vregs, timer)?;

    let _tt = timer.start(Pass::VerifyLocations);
    verify::verify_locations(func, isa, &graph)
}

/// Instructions of `func` in layout order.
pub(crate) fn all_insts(func: &Function) -> Vec<Inst> {
    func.layout
        .ebbs()
        .flat_map(|ebb| func.layout.ebb_insts(ebb).iter().copied())
        .collect()
}

/// Replace every use of `old` by `new`, except in `skip`.
pub(crate) fn replace_uses(func: &mut Function, old: Value, new: Value, skip: Option<Inst>) {
    for inst in all_insts(func) {
        if Some(inst) != skip {
            func.dfg[inst].replace_value(old, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::legalize_signatures;
    use crate::ir::{
        AbiParam, CallConv, Ebb, ExtFuncData, FuncRef, InsertBuilder, InstructionData, IntCC, Opcode, SigRef,
        Signature, Type, ValueLoc,
    };
    use crate::isa::{self, Flags};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn riscv() -> Arc<dyn TargetIsa> {
        isa::lookup("riscv", Flags::new(), &[]).unwrap()
    }

    fn function(name: &str, params: &[Type], returns: &[Type]) -> (Function, Ebb, Vec<Value>) {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params = params.iter().map(|&t| AbiParam::new(t)).collect();
        sig.returns = returns.iter().map(|&t| AbiParam::new(t)).collect();
        let mut func = Function::with_name_signature(name, sig);
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

    fn allocated(func: &mut Function, isa: &dyn TargetIsa) -> CodegenResult<()> {
        legalize_signatures(func, isa)?;
        allocate(func, isa, &PassTimer::new())
    }

    #[test]
    fn ghost_parameters_are_an_invalid_cfg() {
        let (mut func, entry, _) = function("ghost", &[], &[]);
        ret(&mut func, entry, vec![]);
        let ebb1 = func.dfg.make_ebb();
        func.layout.append_ebb(ebb1);
        func.dfg.append_ebb_param(ebb1, Type::I32);
        ret(&mut func, ebb1, vec![]);

        let isa = riscv();
        let err = allocate(&mut func, &*isa, &PassTimer::new()).unwrap_err();
        assert_eq!(err.kind(), "invalid-cfg");
        assert!(err.to_string().contains("ebb1"));
    }

    #[test]
    fn arguments_stay_in_their_abi_registers() {
        let (mut func, ebb, args) = function("add", &[Type::I32, Type::I32], &[Type::I32]);
        let sum = InsertBuilder::at_end(&mut func, ebb).binary(Opcode::Iadd, args[0], args[1]);
        ret(&mut func, ebb, vec![sum]);

        let isa = riscv();
        allocated(&mut func, &*isa).unwrap();
        assert_eq!(
            func.display(Some(&*isa)).to_string(),
            indoc! {"
                function %add(i32 [%x10], i32 [%x11], i32 link [%x1]) -> i32 [%x10], i32 link [%x1] system_v {
                ebb0(v0: i32 [%x10], v1: i32 [%x11], v3: i32 [%x1]):
                    [%x10] v2 = iadd v0, v1
                    return v2, v3
                }
            "}
        );
    }

    #[test]
    fn loop_arguments_match_their_parameters() {
        let (mut func, entry, args) = function("count", &[Type::I32], &[Type::I32]);
        let header = func.dfg.make_ebb();
        func.layout.append_ebb(header);
        let counter = func.dfg.append_ebb_param(header, Type::I32);

        let mut pos = InsertBuilder::at_end(&mut func, entry);
        let zero = pos.iconst(Type::I32, 0);
        pos.jump(header, vec![zero]);

        let mut pos = InsertBuilder::at_end(&mut func, header);
        let next = pos.binary_imm(Opcode::IaddImm, counter, 1);
        let more = pos.icmp(IntCC::UnsignedLessThan, next, args[0]);
        pos.build(
            InstructionData::Branch {
                opcode: Opcode::Brnz,
                arg: more,
                destination: header,
                args: vec![next],
            },
            None,
        );
        ret(&mut func, header, vec![next]);

        let isa = riscv();
        allocated(&mut func, &*isa).unwrap();
        for inst in all_insts(&func) {
            if let Some((dest, branch_args)) = func.dfg[inst].branch_info() {
                let fixed = func.dfg[inst].num_fixed_args();
                let all = func.dfg[inst].arguments();
                let passed = &all[fixed..];
                assert_eq!(passed.len(), branch_args.len());
                for (&arg, &param) in passed.iter().zip(func.dfg.ebb_params(dest)) {
                    assert_eq!(func.locations.get(arg), func.locations.get(param));
                    assert!(func.locations.get(arg).reg().is_some());
                }
            }
        }
    }

    #[test]
    fn values_live_across_calls_use_callee_saved_registers() {
        let (mut func, ebb, args) = function("twice", &[Type::I32], &[Type::I32]);
        let mut callee = Signature::new(CallConv::SystemV);
        callee.params.push(AbiParam::new(Type::I32));
        callee.returns.push(AbiParam::new(Type::I32));
        func.dfg.signatures.push(callee);
        func.dfg.ext_funcs.push(ExtFuncData {
            name: "g".to_string(),
            signature: SigRef::new(0),
        });

        let call = InsertBuilder::at_end(&mut func, ebb).build(
            InstructionData::Call {
                opcode: Opcode::Call,
                func_ref: FuncRef::new(0),
                args: vec![args[0]],
            },
            None,
        );
        let result = func.dfg.inst_results(call)[0];
        let add = InsertBuilder::at_end(&mut func, ebb).build(
            InstructionData::Binary {
                opcode: Opcode::Iadd,
                args: [result, args[0]],
            },
            None,
        );
        let sum = func.dfg.inst_results(add)[0];
        ret(&mut func, ebb, vec![sum]);

        let isa = riscv();
        allocated(&mut func, &*isa).unwrap();
        let saved = func.dfg[add].arguments()[1];
        let unit = func.locations.get(saved).reg().unwrap();
        assert!(isa.is_callee_saved(unit), "{} is in x{}", saved, unit);
        let passed = func.dfg[call].arguments()[0];
        assert_eq!(func.locations.get(passed), ValueLoc::Reg(10));
    }

    #[test]
    fn stack_parameters_are_filled_only_when_used() {
        let params = [Type::I32; 9];
        let (mut func, ebb, args) = function("unused", &params, &[Type::I32]);
        ret(&mut func, ebb, vec![args[0]]);
        let isa = riscv();
        allocated(&mut func, &*isa).unwrap();
        assert_eq!(func.locations.get(args[8]), ValueLoc::Stack(0));
        let text = func.display(Some(&*isa)).to_string();
        assert!(!text.contains(" = fill "), "{}", text);

        let (mut func, ebb, args) = function("used", &params, &[Type::I32]);
        ret(&mut func, ebb, vec![args[8]]);
        allocated(&mut func, &*isa).unwrap();
        let text = func.display(Some(&*isa)).to_string();
        assert!(text.contains(" = fill v8"), "{}", text);
    }

    #[test]
    fn register_pressure_is_relieved_by_spilling() {
        let (mut func, ebb, _) = function("pressure", &[], &[Type::I32]);
        let mut pos = InsertBuilder::at_end(&mut func, ebb);
        let constants: Vec<Value> = (0..30).map(|n| pos.iconst(Type::I32, n)).collect();
        let mut sum = constants[0];
        for &c in &constants[1..] {
            sum = pos.binary(Opcode::Iadd, sum, c);
        }
        ret(&mut func, ebb, vec![sum]);

        let isa = riscv();
        allocated(&mut func, &*isa).unwrap();
        let text = func.display(Some(&*isa)).to_string();
        assert!(text.contains(" = spill "), "{}", text);
        assert!(text.contains(" = fill "), "{}", text);
        assert!(text.contains("[-4] "), "{}", text);
    }
}
