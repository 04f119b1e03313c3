//! Coloring
//!
//! Classes are colored one at a time. Classes with a location already, from
//! the ABI or from an earlier spill, keep it. The others are visited in the
//! order of their first definition and take the first register of their bank
//! that no interfering class holds. A class live across a call may only use
//! callee-saved registers.
//!
//! When a class cannot be colored, it or one of its neighbors is moved to a
//! stack slot. Spill code is then inserted and coloring starts over with
//! fresh liveness, because the fills and spills change the live ranges.

use super::liveness::{Interference, Liveness};
use super::spilling::insert_spill_code;
use super::virtregs::{ClassId, VirtRegs};
use crate::ir::entities::Value;
use crate::ir::function::Function;
use crate::ir::valueloc::{RegUnit, ValueLoc};
use crate::isa::{RegClass, TargetIsa};
use ebbc_common::{CodegenError, CodegenResult, Pass, PassTimer};
use log::debug;
use std::collections::BTreeMap;

/// Stack frame below the incoming arguments.
#[derive(Debug, Default)]
struct Frame {
    size: i32,
}

impl Frame {
    /// A new slot for a value of `bytes` bytes, aligned to its size.
    fn slot(&mut self, bytes: i32) -> i32 {
        let bytes = bytes.max(1);
        self.size = (self.size + bytes + bytes - 1) / bytes * bytes;
        -self.size
    }
}

enum Outcome {
    Colored(BTreeMap<ClassId, ValueLoc>),
    Spilled,
}

/// Give every class a location, spilling as needed, and record the locations
/// in `func.locations`. Returns the final interference graph.
pub fn color(
    func: &mut Function,
    isa: &dyn TargetIsa,
    vregs: &mut VirtRegs,
    timer: &PassTimer,
) -> CodegenResult<Interference> {
    let mut frame = Frame::default();
    let mut rounds = 0;
    loop {
        rounds += 1;
        {
            let _tt = timer.start(Pass::RaSpilling);
            insert_spill_code(func, vregs);
        }
        let graph = {
            let _tt = timer.start(Pass::RaLiveness);
            Interference::build(func, &Liveness::compute(func))
        };
        let _tt = timer.start(Pass::RaColoring);
        match try_color(func, isa, vregs, &graph, &mut frame)? {
            Outcome::Colored(assignment) => {
                for (id, loc) in assignment {
                    for &value in &vregs.class(id).values {
                        func.locations.set(value, loc);
                    }
                }
                debug!("colored %{} in {} rounds, frame of {} bytes", func.name, rounds, frame.size);
                return Ok(graph);
            }
            Outcome::Spilled => continue,
        }
    }
}

/// Definition order of every value in the layout. Also makes sure every value
/// has a class.
fn def_order(func: &Function, vregs: &mut VirtRegs) -> BTreeMap<Value, usize> {
    let mut order = BTreeMap::new();
    for ebb in func.layout.ebbs() {
        for &param in func.dfg.ebb_params(ebb) {
            vregs.class_id(param);
            let n = order.len();
            order.insert(param, n);
        }
        for &inst in func.layout.ebb_insts(ebb) {
            for &result in func.dfg.inst_results(inst) {
                vregs.class_id(result);
                let n = order.len();
                order.insert(result, n);
            }
        }
    }
    order
}

fn try_color(
    func: &Function,
    isa: &dyn TargetIsa,
    vregs: &mut VirtRegs,
    graph: &Interference,
    frame: &mut Frame,
) -> CodegenResult<Outcome> {
    let order = def_order(func, vregs);
    let first_def = |vregs: &VirtRegs, id: ClassId| -> usize {
        vregs
            .class(id)
            .values
            .iter()
            .filter_map(|v| order.get(v).copied())
            .min()
            .unwrap_or(usize::MAX)
    };

    let mut assignment: BTreeMap<ClassId, ValueLoc> = BTreeMap::new();
    let mut free: Vec<ClassId> = Vec::new();
    for id in vregs.ids().collect::<Vec<_>>() {
        match vregs.class(id).location() {
            Some(loc) => {
                assignment.insert(id, loc);
            }
            None => free.push(id),
        }
    }
    free.sort_by_key(|&id| first_def(&*vregs, id));

    for id in free {
        let class = vregs.class(id);
        let value = class.values[0];
        let bank = RegClass::for_type(func.dfg.value_type(value));
        let crosses = class.values.iter().any(|&v| graph.crosses_call(v));
        let taken: Vec<RegUnit> = neighbors(vregs, graph, id)
            .into_iter()
            .filter_map(|n| assignment.get(&n).and_then(|loc| loc.reg()))
            .collect();
        let unit = isa
            .allocatable_registers(bank)
            .iter()
            .copied()
            .filter(|&unit| !crosses || isa.is_callee_saved(unit))
            .find(|unit| !taken.contains(unit));
        if let Some(unit) = unit {
            assignment.insert(id, ValueLoc::Reg(unit));
            continue;
        }

        let victim = if class.spillable {
            Some(id)
        } else {
            neighbors(vregs, graph, id)
                .into_iter()
                .filter(|n| vregs.class(*n).spillable)
                .filter(|n| assignment.get(n).map_or(false, |loc| loc.reg().is_some()))
                .max_by_key(|&n| first_def(&*vregs, n))
        };
        let victim = victim.ok_or_else(|| {
            CodegenError::register_pressure(value, format!("no {:?} register left and nothing to spill", bank))
        })?;
        let first = vregs.class(victim).values[0];
        let slot = frame.slot(func.dfg.value_type(first).bytes() as i32);
        debug!("spilling {} to [{}]", first, slot);
        vregs.spill(victim, slot);
        return Ok(Outcome::Spilled);
    }
    Ok(Outcome::Colored(assignment))
}

/// Classes with a member interfering with a member of `id`.
fn neighbors(vregs: &VirtRegs, graph: &Interference, id: ClassId) -> Vec<ClassId> {
    let mut out: Vec<ClassId> = vregs
        .class(id)
        .values
        .iter()
        .flat_map(|&v| graph.neighbors(v))
        .filter_map(|n| vregs.get(n))
        .filter(|&n| n != id)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
