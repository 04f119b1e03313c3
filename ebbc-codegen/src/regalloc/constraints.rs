//! ABI constraints
//!
//! Values the calling convention pins to a location are isolated behind
//! copies so that only the copy is constrained: used entry parameters are
//! copied at the top of the entry EBB, call arguments and return values are
//! copied right before their instruction, and call results are copied right
//! after the call. The coalescer removes every copy it can.

use super::virtregs::VirtRegs;
use super::{all_insts, replace_uses};
use crate::ir::entities::{Inst, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::valueloc::ValueLoc;
use crate::ir::InsertBuilder;

/// Insert the constraint copies and return them in layout order.
pub fn insert_abi_copies(func: &mut Function, vregs: &mut VirtRegs) -> Vec<Inst> {
    let mut copies = Vec::new();
    entry_params(func, vregs, &mut copies);
    for inst in all_insts(func) {
        let opcode = func.dfg[inst].opcode();
        if opcode.is_call() {
            call(func, vregs, inst, &mut copies);
        } else if opcode == Opcode::Return {
            let locations: Vec<ValueLoc> = func.signature.returns.iter().map(|r| r.location).collect();
            copy_args_before(func, vregs, inst, &locations, &mut copies);
        }
    }
    copies
}

fn copy(arg: Value) -> InstructionData {
    InstructionData::Unary {
        opcode: Opcode::Copy,
        arg,
    }
}

fn entry_params(func: &mut Function, vregs: &mut VirtRegs, copies: &mut Vec<Inst>) {
    let entry = match func.entry_block() {
        Some(entry) => entry,
        None => return,
    };
    let first = match func.layout.first_inst(entry) {
        Some(first) => first,
        None => return,
    };
    let params = func.dfg.ebb_params(entry).to_vec();
    let locations: Vec<ValueLoc> = func.signature.params.iter().map(|p| p.location).collect();
    for (&param, &loc) in params.iter().zip(&locations) {
        if !loc.is_assigned() {
            continue;
        }
        vregs.fix(param, loc);
        if !is_used(func, param) {
            continue;
        }
        let inst = InsertBuilder::before(func, first).build(copy(param), None);
        let moved = func.dfg.inst_results(inst)[0];
        replace_uses(func, param, moved, Some(inst));
        copies.push(inst);
    }
}

fn is_used(func: &Function, value: Value) -> bool {
    all_insts(func)
        .into_iter()
        .any(|inst| func.dfg[inst].arguments().contains(&value))
}

/// Copy the variable arguments of `inst` into fresh values pinned to
/// `locations`.
fn copy_args_before(
    func: &mut Function,
    vregs: &mut VirtRegs,
    inst: Inst,
    locations: &[ValueLoc],
    copies: &mut Vec<Inst>,
) {
    let fixed = func.dfg[inst].num_fixed_args();
    let args = func.dfg[inst].arguments();
    for (i, (&arg, &loc)) in args[fixed..].iter().zip(locations).enumerate() {
        if !loc.is_assigned() {
            continue;
        }
        let copy_inst = InsertBuilder::before(func, inst).build(copy(arg), None);
        let pinned = func.dfg.inst_results(copy_inst)[0];
        vregs.fix(pinned, loc);
        if let Some(slot) = func.dfg[inst].arguments_mut().into_iter().nth(fixed + i) {
            *slot = pinned;
        }
        copies.push(copy_inst);
    }
}

fn call(func: &mut Function, vregs: &mut VirtRegs, inst: Inst, copies: &mut Vec<Inst>) {
    let sig = match func.dfg.call_signature(inst).and_then(|s| func.dfg.signature(s)) {
        Some(sig) => sig.clone(),
        None => return,
    };
    let params: Vec<ValueLoc> = sig.params.iter().map(|p| p.location).collect();
    copy_args_before(func, vregs, inst, &params, copies);

    let results: Vec<(Value, ValueLoc)> = func
        .dfg
        .inst_results(inst)
        .iter()
        .copied()
        .zip(sig.returns.iter().map(|r| r.location))
        .filter(|&(_, loc)| loc.is_assigned())
        .collect();
    let mut moved = Vec::new();
    let mut pos = InsertBuilder::after(func, inst);
    for &(result, _) in &results {
        let copy_inst = pos.build(copy(result), None);
        moved.push(copy_inst);
    }
    for (&(result, loc), &copy_inst) in results.iter().zip(&moved) {
        vregs.fix(result, loc);
        let value = func.dfg.inst_results(copy_inst)[0];
        replace_uses(func, result, value, Some(copy_inst));
        copies.push(copy_inst);
    }
}
