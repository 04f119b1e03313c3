//! Liveness analysis and the interference graph
//!
//! Liveness is a backward dataflow problem over the EBBs of the layout. Any
//! branch may leave an EBB, so the values live after a branch include the
//! live-in set of its destination.
//!
//! Two values interfere when one is live where the other is defined. A value
//! defined by an instruction interferes with everything live after it and
//! with the other results; an EBB parameter interferes with the live-in set
//! of its EBB and with the other parameters.

use crate::ir::entities::{Ebb, Inst, Value};
use crate::ir::function::Function;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct Liveness {
    live_in: BTreeMap<Ebb, BTreeSet<Value>>,
    live_after: BTreeMap<Inst, BTreeSet<Value>>,
    empty: BTreeSet<Value>,
}

impl Liveness {
    pub fn compute(func: &Function) -> Self {
        let mut liveness = Self::default();
        let ebbs: Vec<Ebb> = func.layout.ebbs().collect();
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for &ebb in ebbs.iter().rev() {
                let mut live = BTreeSet::new();
                for &inst in func.layout.ebb_insts(ebb).iter().rev() {
                    let data = &func.dfg[inst];
                    if let Some((dest, _)) = data.branch_info() {
                        live.extend(liveness.live_in(dest).iter().copied());
                    }
                    liveness.live_after.insert(inst, live.clone());
                    for result in func.dfg.inst_results(inst) {
                        live.remove(result);
                    }
                    live.extend(data.arguments());
                }
                for param in func.dfg.ebb_params(ebb) {
                    live.remove(param);
                }
                if liveness.live_in(ebb) != &live {
                    liveness.live_in.insert(ebb, live);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        trace!("liveness of %{} stable after {} rounds", func.name, rounds);
        liveness
    }

    /// Values live on entry to `ebb`, not counting its parameters.
    pub fn live_in(&self, ebb: Ebb) -> &BTreeSet<Value> {
        self.live_in.get(&ebb).unwrap_or(&self.empty)
    }

    /// Values live right after `inst`, including those live into the
    /// destination if `inst` is a branch.
    pub fn live_after(&self, inst: Inst) -> &BTreeSet<Value> {
        self.live_after.get(&inst).unwrap_or(&self.empty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Interference {
    edges: BTreeMap<Value, BTreeSet<Value>>,
    /// Values live across at least one call.
    crossing: BTreeSet<Value>,
}

impl Interference {
    pub fn build(func: &Function, liveness: &Liveness) -> Self {
        let mut graph = Self::default();
        for ebb in func.layout.ebbs() {
            let params = func.dfg.ebb_params(ebb);
            for &param in params {
                for &other in liveness.live_in(ebb).iter().chain(params) {
                    graph.add(param, other);
                }
            }
            for &inst in func.layout.ebb_insts(ebb) {
                let results = func.dfg.inst_results(inst);
                let after = liveness.live_after(inst);
                for &result in results {
                    for &other in after.iter().chain(results) {
                        graph.add(result, other);
                    }
                }
                if func.dfg[inst].opcode().is_call() {
                    graph
                        .crossing
                        .extend(after.iter().copied().filter(|v| !results.contains(v)));
                }
            }
        }
        graph
    }

    fn add(&mut self, a: Value, b: Value) {
        if a == b {
            return;
        }
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    pub fn interferes(&self, a: Value, b: Value) -> bool {
        self.edges.get(&a).map_or(false, |n| n.contains(&b))
    }

    pub fn neighbors(&self, value: Value) -> impl Iterator<Item = Value> + '_ {
        self.edges.get(&value).into_iter().flatten().copied()
    }

    pub fn crosses_call(&self, value: Value) -> bool {
        self.crossing.contains(&value)
    }

    /// All interfering pairs, each reported once.
    pub fn pairs(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.edges
            .iter()
            .flat_map(|(&a, n)| n.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
    }

    /// `dst` was replaced by `src` everywhere: `src` inherits its edges.
    pub fn merge(&mut self, src: Value, dst: Value) {
        let neighbors = self.edges.remove(&dst).unwrap_or_default();
        for n in neighbors {
            if let Some(set) = self.edges.get_mut(&n) {
                set.remove(&dst);
            }
            self.add(src, n);
        }
        if self.crossing.remove(&dst) {
            self.crossing.insert(src);
        }
    }
}
