//! Control flow graph
//!
//! Any branch instruction may leave an EBB, not only the terminator, so a
//! predecessor is identified by the branch instruction as well as its EBB.

use crate::ir::entities::{Ebb, Inst};
use crate::ir::function::Function;
use ebbc_common::{CodegenError, CodegenResult};
use std::collections::{BTreeMap, BTreeSet};

/// A branch from `ebb` through `inst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPredecessor {
    pub ebb: Ebb,
    pub inst: Inst,
}

#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    preds: BTreeMap<Ebb, Vec<BlockPredecessor>>,
    succs: BTreeMap<Ebb, Vec<Ebb>>,
}

impl ControlFlowGraph {
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::default();
        for ebb in func.layout.ebbs() {
            cfg.succs.entry(ebb).or_default();
            cfg.preds.entry(ebb).or_default();
            for &inst in func.layout.ebb_insts(ebb) {
                if let Some((dest, _)) = func.dfg[inst].branch_info() {
                    cfg.preds
                        .entry(dest)
                        .or_default()
                        .push(BlockPredecessor { ebb, inst });
                    let succs = cfg.succs.entry(ebb).or_default();
                    if !succs.contains(&dest) {
                        succs.push(dest);
                    }
                }
            }
        }
        cfg
    }

    pub fn preds(&self, ebb: Ebb) -> &[BlockPredecessor] {
        self.preds.get(&ebb).map_or(&[], |p| p.as_slice())
    }

    /// Successors in the order their branches appear.
    pub fn succs(&self, ebb: Ebb) -> &[Ebb] {
        self.succs.get(&ebb).map_or(&[], |s| s.as_slice())
    }

    /// EBBs reachable from `entry`.
    pub fn reachable_from(&self, entry: Ebb) -> BTreeSet<Ebb> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![entry];
        while let Some(ebb) = stack.pop() {
            if seen.insert(ebb) {
                stack.extend(self.succs(ebb).iter().copied());
            }
        }
        seen
    }
}

/// Check that every EBB parameter receives a value on every incoming edge and
/// that no parameter is a ghost: a non-entry parameter with no live incoming
/// edge at all.
pub fn check_ebb_params(func: &Function, cfg: &ControlFlowGraph) -> CodegenResult<()> {
    let entry = match func.entry_block() {
        Some(entry) => entry,
        None => return Ok(()),
    };
    let reachable = cfg.reachable_from(entry);

    for ebb in func.layout.ebbs() {
        let params = func.dfg.ebb_params(ebb);
        let preds = cfg.preds(ebb);

        if ebb == entry {
            if let Some(pred) = preds.first() {
                return Err(CodegenError::invalid_cfg(
                    ebb,
                    format!("entry block is the target of a branch in {}", pred.ebb),
                ));
            }
            continue;
        }

        for pred in preds {
            let args = func.dfg[pred.inst].branch_info().map_or(0, |(_, args)| args.len());
            if args < params.len() {
                return Err(CodegenError::invalid_cfg(
                    ebb,
                    format!(
                        "parameter {} has no incoming argument on the branch in {}",
                        params[args], pred.ebb
                    ),
                ));
            }
            if args > params.len() {
                return Err(CodegenError::invalid_cfg(
                    ebb,
                    format!(
                        "branch in {} passes {} arguments to {} parameters",
                        pred.ebb,
                        args,
                        params.len()
                    ),
                ));
            }
        }

        if let Some(&first) = params.first() {
            if !preds.iter().any(|p| reachable.contains(&p.ebb)) {
                return Err(CodegenError::invalid_cfg(
                    ebb,
                    format!("parameter {} is a ghost value with no incoming definition", first),
                ));
            }
        }
    }
    Ok(())
}
