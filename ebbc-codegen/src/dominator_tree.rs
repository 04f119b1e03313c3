//! Dominator tree over EBBs
//!
//! Computed with the iterative algorithm of Cooper, Harvey and Kennedy on the
//! reverse post-order of the reachable EBBs.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::entities::Ebb;
use crate::ir::function::Function;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct DominatorTree {
    rpo: Vec<Ebb>,
    rpo_number: BTreeMap<Ebb, usize>,
    idom: BTreeMap<Ebb, Ebb>,
}

impl DominatorTree {
    pub fn with_function(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut domtree = Self::default();
        let entry = match func.entry_block() {
            Some(entry) => entry,
            None => return domtree,
        };
        domtree.rpo = reverse_postorder(entry, cfg);
        for (n, &ebb) in domtree.rpo.iter().enumerate() {
            domtree.rpo_number.insert(ebb, n);
        }
        domtree.idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &ebb in domtree.rpo.iter().skip(1) {
                let mut new_idom: Option<Ebb> = None;
                for pred in cfg.preds(ebb) {
                    if !domtree.idom.contains_key(&pred.ebb) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred.ebb,
                        Some(current) => domtree.intersect(current, pred.ebb),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if domtree.idom.get(&ebb) != Some(&new_idom) {
                        domtree.idom.insert(ebb, new_idom);
                        changed = true;
                    }
                }
            }
        }
        domtree
    }

    fn intersect(&self, mut a: Ebb, mut b: Ebb) -> Ebb {
        while a != b {
            while self.rpo_number[&a] > self.rpo_number[&b] {
                a = self.idom[&a];
            }
            while self.rpo_number[&b] > self.rpo_number[&a] {
                b = self.idom[&b];
            }
        }
        a
    }

    /// Reachable EBBs in reverse post-order.
    pub fn cfg_rpo(&self) -> &[Ebb] {
        &self.rpo
    }

    pub fn rpo_number(&self, ebb: Ebb) -> Option<usize> {
        self.rpo_number.get(&ebb).copied()
    }

    pub fn is_reachable(&self, ebb: Ebb) -> bool {
        self.rpo_number.contains_key(&ebb)
    }

    /// Immediate dominator. The entry block and unreachable EBBs have none.
    pub fn idom(&self, ebb: Ebb) -> Option<Ebb> {
        self.idom.get(&ebb).copied().filter(|&d| d != ebb)
    }

    /// Does `a` dominate `b`? Every EBB dominates itself.
    pub fn dominates(&self, a: Ebb, mut b: Ebb) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        loop {
            if a == b {
                return true;
            }
            match self.idom(b) {
                Some(up) => b = up,
                None => return false,
            }
        }
    }
}

fn reverse_postorder(entry: Ebb, cfg: &ControlFlowGraph) -> Vec<Ebb> {
    let mut visited = BTreeSet::new();
    let mut postorder = Vec::new();
    // (ebb, index of the next successor to visit)
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);
    while let Some(top) = stack.last_mut() {
        let (ebb, next) = *top;
        let succs = cfg.succs(ebb);
        if next < succs.len() {
            top.1 += 1;
            let succ = succs[next];
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(ebb);
            stack.pop();
        }
    }
    postorder.reverse();
    postorder
}
