//! Spill code
//!
//! Once some classes live on the stack, instructions are brought in line with
//! the locations of their values. Moves become `copy`, `spill` or `fill`
//! depending on which side is in memory. Other instructions read and write
//! registers only: a stack operand is filled into a temporary first and a
//! stack result is written to a temporary and spilled afterwards. Branch, call
//! and return arguments are exempt because their locations are dictated by the
//! destination.
//!
//! The pass only looks at the current locations, so running it again after
//! more classes were spilled completes the rewrite.

use super::all_insts;
use super::virtregs::VirtRegs;
use crate::ir::entities::{Inst, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::InsertBuilder;
use log::trace;
use std::collections::BTreeMap;

pub fn insert_spill_code(func: &mut Function, vregs: &mut VirtRegs) {
    for inst in all_insts(func) {
        if func.dfg[inst].opcode().is_move() {
            fix_move(func, vregs, inst);
        } else {
            fill_operands(func, vregs, inst);
            if !func.dfg[inst].opcode().is_call() {
                spill_results(func, vregs, inst);
            }
        }
    }
}

fn on_stack(vregs: &VirtRegs, value: Value) -> bool {
    vregs.location(value).map_or(false, |loc| loc.is_stack())
}

fn unary(opcode: Opcode, arg: Value) -> InstructionData {
    InstructionData::Unary { opcode, arg }
}

fn fix_move(func: &mut Function, vregs: &mut VirtRegs, inst: Inst) {
    let src = match func.dfg[inst] {
        InstructionData::Unary { arg, .. } => arg,
        _ => return,
    };
    let dst = match func.dfg.first_result(inst) {
        Some(dst) => dst,
        None => return,
    };
    let opcode = match (on_stack(vregs, src), on_stack(vregs, dst)) {
        (false, false) => Opcode::Copy,
        (false, true) => Opcode::Spill,
        (true, false) => Opcode::Fill,
        (true, true) => {
            // Memory to memory goes through a register.
            let temp = fill(func, vregs, inst, src);
            func.dfg[inst] = unary(Opcode::Spill, temp);
            return;
        }
    };
    func.dfg[inst].set_opcode(opcode);
}

/// Insert `temp = fill value` before `inst`.
fn fill(func: &mut Function, vregs: &mut VirtRegs, inst: Inst, value: Value) -> Value {
    let fill = InsertBuilder::before(func, inst).build(unary(Opcode::Fill, value), None);
    let temp = func.dfg.inst_results(fill)[0];
    vregs.add_temp(temp);
    trace!("{} = fill {} before {}", temp, value, inst);
    temp
}

fn fill_operands(func: &mut Function, vregs: &mut VirtRegs, inst: Inst) {
    let fixed = func.dfg[inst].num_fixed_args();
    let args = func.dfg[inst].arguments();
    let mut filled: BTreeMap<Value, Value> = BTreeMap::new();
    for (i, &arg) in args[..fixed].iter().enumerate() {
        if !on_stack(vregs, arg) {
            continue;
        }
        let temp = match filled.get(&arg) {
            Some(&temp) => temp,
            None => {
                let temp = fill(func, vregs, inst, arg);
                filled.insert(arg, temp);
                temp
            }
        };
        if let Some(slot) = func.dfg[inst].arguments_mut().into_iter().nth(i) {
            *slot = temp;
        }
    }
}

fn spill_results(func: &mut Function, vregs: &mut VirtRegs, inst: Inst) {
    let stack_results: Vec<Value> = func
        .dfg
        .inst_results(inst)
        .iter()
        .copied()
        .filter(|&r| on_stack(vregs, r))
        .collect();
    let mut after = inst;
    for result in stack_results {
        let temp = match func.dfg.replace_result(result) {
            Some(temp) => temp,
            None => continue,
        };
        vregs.add_temp(temp);
        let spill = InsertBuilder::after(func, after).build_without_results(unary(Opcode::Spill, temp));
        func.dfg.attach_result(spill, result);
        after = spill;
        trace!("{} = spill {} after {}", result, temp, inst);
    }
}
