//! Conventional SSA and copy coalescing
//!
//! Conversion to conventional SSA gives every EBB parameter a congruence
//! class together with a fresh copy of each argument passed to it. The
//! arguments are copied twice, first into temporaries and then into the
//! class, so that the copies on one edge behave as a parallel move.
//!
//! A conditional branch whose destination parameters are still needed after
//! it, or which tests one of them, cannot host these copies. Such an edge is
//! split: the branch goes to a new EBB that performs the copies and jumps on.
//!
//! The coalescer then removes copies whose two sides can share a location.
//! Forward edges are visited before back-edges, and ABI copies last.

use super::liveness::{Interference, Liveness};
use super::virtregs::{ClassId, VirtRegs};
use super::{all_insts, replace_uses};
use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::entities::{Ebb, Inst, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::valueloc::{RegUnit, ValueLoc};
use crate::ir::InsertBuilder;
use crate::isa::TargetIsa;
use ebbc_common::{CodegenError, CodegenResult};
use log::{debug, trace};

/// Rewrite `func` into conventional SSA and return the inserted copies in
/// the order they should be coalesced.
pub fn convert_to_cssa(func: &mut Function, vregs: &mut VirtRegs) -> CodegenResult<Vec<Inst>> {
    let cfg = ControlFlowGraph::with_function(func);
    let domtree = DominatorTree::with_function(func, &cfg);
    let liveness = Liveness::compute(func);

    let mut edges: Vec<(bool, Inst)> = Vec::new();
    for inst in all_insts(func) {
        let dest = match func.dfg[inst].branch_info() {
            Some((dest, _)) if !func.dfg.ebb_params(dest).is_empty() => dest,
            _ => continue,
        };
        let pred = func
            .layout
            .inst_ebb(inst)
            .ok_or_else(|| CodegenError::internal(inst, "branch is not in the layout"))?;
        let back_edge = match (domtree.rpo_number(dest), domtree.rpo_number(pred)) {
            (Some(d), Some(p)) => d <= p,
            _ => false,
        };
        edges.push((back_edge, inst));
    }
    // Stable: layout order within each group.
    edges.sort_by_key(|&(back_edge, _)| back_edge);

    for ebb in func.layout.ebbs().collect::<Vec<_>>() {
        for &param in func.dfg.ebb_params(ebb) {
            vregs.class_id(param);
        }
    }

    let mut copies = Vec::new();
    for (_, branch) in edges {
        let branch = if needs_split(func, &liveness, branch) {
            split_edge(func, branch)?
        } else {
            branch
        };
        copies.extend(isolate_edge(func, vregs, branch));
    }
    Ok(copies)
}

fn needs_split(func: &Function, liveness: &Liveness, branch: Inst) -> bool {
    let data = &func.dfg[branch];
    if data.opcode() == Opcode::Jump {
        return false;
    }
    let dest = match data.branch_info() {
        Some((dest, _)) => dest,
        None => return false,
    };
    let tested = &data.arguments()[..data.num_fixed_args()];
    func.dfg
        .ebb_params(dest)
        .iter()
        .any(|p| liveness.live_after(branch).contains(p) || tested.contains(p))
}

/// Send `branch` to a new EBB that jumps on to the original destination with
/// the original arguments. Returns the new jump.
fn split_edge(func: &mut Function, branch: Inst) -> CodegenResult<Inst> {
    let pred = func
        .layout
        .inst_ebb(branch)
        .ok_or_else(|| CodegenError::internal(branch, "branch is not in the layout"))?;
    let split = func.dfg.make_ebb();
    let (dest, args) = match func.dfg[branch].branch_info_mut() {
        Some((dest, args)) => {
            let old = *dest;
            *dest = split;
            (old, std::mem::take(args))
        }
        None => return Err(CodegenError::internal(branch, "not a branch")),
    };
    func.layout.insert_ebb_after(split, pred);
    debug!("split edge {} -> {} through {}", pred, dest, split);
    Ok(InsertBuilder::at_end(func, split).jump(dest, args))
}

fn copy(arg: Value) -> InstructionData {
    InstructionData::Unary {
        opcode: Opcode::Copy,
        arg,
    }
}

/// Two rounds of copies before `branch`; the second round joins the
/// destination parameter classes. Returns the copies, class copies first.
fn isolate_edge(func: &mut Function, vregs: &mut VirtRegs, branch: Inst) -> Vec<Inst> {
    let (dest, args): (Ebb, Vec<Value>) = match func.dfg[branch].branch_info() {
        Some((dest, args)) => (dest, args.to_vec()),
        None => return Vec::new(),
    };
    let params = func.dfg.ebb_params(dest).to_vec();

    let mut temps = Vec::new();
    for &arg in &args {
        let inst = InsertBuilder::before(func, branch).build(copy(arg), None);
        temps.push((inst, func.dfg.inst_results(inst)[0]));
    }
    let mut joins = Vec::new();
    for &(_, temp) in &temps {
        joins.push(InsertBuilder::before(func, branch).build(copy(temp), None));
    }

    let mut new_args = Vec::new();
    for (&join, &param) in joins.iter().zip(&params) {
        let value = func.dfg.inst_results(join)[0];
        vregs.union(param, value);
        new_args.push(value);
    }
    if let Some((_, args)) = func.dfg[branch].branch_info_mut() {
        *args = new_args;
    }
    trace!("isolated {} -> {}", branch, dest);
    joins.into_iter().chain(temps.into_iter().map(|(inst, _)| inst)).collect()
}

/// Remove the copies that can be coalesced, in the given order.
pub fn coalesce(
    func: &mut Function,
    isa: &dyn TargetIsa,
    vregs: &mut VirtRegs,
    graph: &mut Interference,
    candidates: &[Inst],
) {
    let mut removed = 0;
    for &inst in candidates {
        let (src, dst) = match (&func.dfg[inst], func.dfg.first_result(inst)) {
            (
                InstructionData::Unary {
                    opcode: Opcode::Copy,
                    arg,
                },
                Some(dst),
            ) => (*arg, dst),
            _ => continue,
        };
        if func.layout.inst_ebb(inst).is_none() || !can_merge(isa, vregs, graph, src, dst) {
            trace!("keeping {} = copy {}", dst, src);
            continue;
        }
        replace_uses(func, dst, src, Some(inst));
        func.layout.remove_inst(inst);
        func.dfg.detach_results(inst);
        graph.merge(src, dst);
        vregs.union(src, dst);
        vregs.forget(dst);
        removed += 1;
    }
    debug!("coalesced {} of {} copies in %{}", removed, candidates.len(), func.name);
}

fn can_merge(isa: &dyn TargetIsa, vregs: &mut VirtRegs, graph: &Interference, src: Value, dst: Value) -> bool {
    let (cs, cd) = (vregs.class_id(src), vregs.class_id(dst));
    if cs == cd {
        return true;
    }
    let (s, d) = (vregs.class(cs).clone(), vregs.class(cd).clone());
    for &x in &s.values {
        for &y in &d.values {
            if (x, y) != (src, dst) && graph.interferes(x, y) {
                return false;
            }
        }
    }

    let fixed = match (s.fixed, d.fixed) {
        (Some(a), Some(b)) if a != b => return false,
        (a, b) => a.or(b),
    };
    let unit = match fixed {
        None => return true,
        Some(ValueLoc::Reg(unit)) => unit,
        Some(_) => return false,
    };
    let merged: Vec<Value> = s.values.iter().chain(&d.values).copied().collect();
    if merged.iter().any(|&v| graph.crosses_call(v)) && !isa.is_callee_saved(unit) {
        return false;
    }
    !pinned_conflict(vregs, graph, &[cs, cd], &merged, unit)
}

/// Does another class pinned to `unit` interfere with `values`?
fn pinned_conflict(vregs: &VirtRegs, graph: &Interference, skip: &[ClassId], values: &[Value], unit: RegUnit) -> bool {
    vregs.ids().filter(|id| !skip.contains(id)).any(|id| {
        let class = vregs.class(id);
        class.fixed == Some(ValueLoc::Reg(unit))
            && class
                .values
                .iter()
                .any(|&other| values.iter().any(|&v| graph.interferes(v, other)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::legalize_signatures;
    use crate::ir::{AbiParam, CallConv, IntCC, Signature, Type, ValueDef};
    use crate::isa::{self, Flags};
    use crate::regalloc::allocate;
    use crate::verifier::verify_function;
    use ebbc_common::PassTimer;
    use pretty_assertions::assert_eq;

    /// ebb0(v0, v1): jump ebb1(v0, v1, 0)
    /// ebb1(a, b, n): m = iadd_imm n, 1; c = icmp ult m, a
    ///                brnz c, ebb1(b, a, m); d = isub a, b; return d
    ///
    /// The back-edge swaps `a` and `b`, which are still needed after the
    /// branch.
    fn swap_loop() -> (Function, Ebb, Inst) {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params = vec![AbiParam::new(Type::I32); 2];
        sig.returns.push(AbiParam::new(Type::I32));
        let mut func = Function::with_name_signature("swap", sig);
        let entry = func.dfg.make_ebb();
        let header = func.dfg.make_ebb();
        func.layout.append_ebb(entry);
        func.layout.append_ebb(header);
        let x = func.dfg.append_ebb_param(entry, Type::I32);
        let y = func.dfg.append_ebb_param(entry, Type::I32);
        let a = func.dfg.append_ebb_param(header, Type::I32);
        let b = func.dfg.append_ebb_param(header, Type::I32);
        let n = func.dfg.append_ebb_param(header, Type::I32);

        let mut pos = InsertBuilder::at_end(&mut func, entry);
        let zero = pos.iconst(Type::I32, 0);
        pos.jump(header, vec![x, y, zero]);

        let mut pos = InsertBuilder::at_end(&mut func, header);
        let m = pos.binary_imm(Opcode::IaddImm, n, 1);
        let c = pos.icmp(IntCC::UnsignedLessThan, m, a);
        let branch = pos.build(
            InstructionData::Branch {
                opcode: Opcode::Brnz,
                arg: c,
                destination: header,
                args: vec![b, a, m],
            },
            None,
        );
        let d = pos.binary(Opcode::Isub, a, b);
        pos.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args: vec![d],
            },
            None,
        );
        (func, header, branch)
    }

    #[test]
    fn live_parameters_split_the_back_edge() {
        let (mut func, header, branch) = swap_loop();
        let mut vregs = VirtRegs::new();
        let copies = convert_to_cssa(&mut func, &mut vregs).unwrap();

        // Two rounds of three copies on each of the two edges.
        assert_eq!(copies.len(), 12);
        assert_eq!(func.layout.num_ebbs(), 3);

        let (split, args) = func.dfg[branch].branch_info().unwrap();
        assert_ne!(split, header);
        assert!(args.is_empty());
        assert_eq!(func.layout.next_ebb(header), Some(split));

        let jump = *func.layout.ebb_insts(split).last().unwrap();
        let (dest, passed) = func.dfg[jump].branch_info().unwrap();
        assert_eq!(dest, header);
        let passed = passed.to_vec();
        let params = func.dfg.ebb_params(header).to_vec();
        for (&arg, &param) in passed.iter().zip(&params) {
            match func.dfg.value_def(arg) {
                ValueDef::Result(inst, _) => assert_eq!(func.dfg[inst].opcode(), Opcode::Copy),
                other => panic!("{} is defined by {:?}", arg, other),
            }
            assert_eq!(vregs.class_id(arg), vregs.class_id(param));
        }
    }

    #[test]
    fn jumps_are_never_split() {
        let (mut func, header, _) = swap_loop();
        let entry = func.entry_block().unwrap();
        convert_to_cssa(&mut func, &mut VirtRegs::new()).unwrap();
        let jump = *func.layout.ebb_insts(entry).last().unwrap();
        assert_eq!(func.dfg[jump].branch_info().map(|(dest, _)| dest), Some(header));
    }

    #[test]
    fn swapped_arguments_land_in_their_parameters() {
        let (mut func, header, branch) = swap_loop();
        let isa = isa::lookup("riscv", Flags::new(), &[]).unwrap();
        legalize_signatures(&mut func, &*isa).unwrap();
        allocate(&mut func, &*isa, &PassTimer::new()).unwrap();
        verify_function(&func).unwrap();

        let (split, _) = func.dfg[branch].branch_info().unwrap();
        assert_ne!(split, header);
        for ebb in func.layout.ebbs() {
            for &inst in func.layout.ebb_insts(ebb) {
                let (dest, args) = match func.dfg[inst].branch_info() {
                    Some(info) => info,
                    None => continue,
                };
                for (&arg, &param) in args.iter().zip(func.dfg.ebb_params(dest)) {
                    let loc = func.locations.get(arg);
                    assert!(loc.reg().is_some(), "{} has no register", arg);
                    assert_eq!(loc, func.locations.get(param), "{} -> {} in {}", arg, param, dest);
                }
            }
        }
    }
}
