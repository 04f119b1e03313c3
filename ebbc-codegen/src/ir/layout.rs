//! Function layout: the order of EBBs and of the instructions inside them.

use crate::ir::entities::{Ebb, Inst};

#[derive(Debug, Clone, Default)]
pub struct Layout {
    ebb_order: Vec<Ebb>,
    ebb_insts: Vec<Option<Vec<Inst>>>,
    inst_ebb: Vec<Option<Ebb>>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ebb_inserted(&self, ebb: Ebb) -> bool {
        matches!(self.ebb_insts.get(ebb.index()), Some(Some(_)))
    }

    fn slot(&mut self, ebb: Ebb) {
        if ebb.index() >= self.ebb_insts.len() {
            self.ebb_insts.resize(ebb.index() + 1, None);
        }
        debug_assert!(self.ebb_insts[ebb.index()].is_none(), "{} inserted twice", ebb);
        self.ebb_insts[ebb.index()] = Some(Vec::new());
    }

    pub fn append_ebb(&mut self, ebb: Ebb) {
        self.slot(ebb);
        self.ebb_order.push(ebb);
    }

    /// Insert `ebb` right after `after` in the EBB order.
    pub fn insert_ebb_after(&mut self, ebb: Ebb, after: Ebb) {
        self.slot(ebb);
        let pos = self
            .ebb_order
            .iter()
            .position(|&e| e == after)
            .map_or(self.ebb_order.len(), |p| p + 1);
        self.ebb_order.insert(pos, ebb);
    }

    pub fn ebbs(&self) -> impl Iterator<Item = Ebb> + '_ {
        self.ebb_order.iter().copied()
    }

    pub fn entry_block(&self) -> Option<Ebb> {
        self.ebb_order.first().copied()
    }

    pub fn next_ebb(&self, ebb: Ebb) -> Option<Ebb> {
        let pos = self.ebb_order.iter().position(|&e| e == ebb)?;
        self.ebb_order.get(pos + 1).copied()
    }

    pub fn num_ebbs(&self) -> usize {
        self.ebb_order.len()
    }

    pub fn ebb_insts(&self, ebb: Ebb) -> &[Inst] {
        match self.ebb_insts.get(ebb.index()) {
            Some(Some(insts)) => insts,
            _ => &[],
        }
    }

    pub fn first_inst(&self, ebb: Ebb) -> Option<Inst> {
        self.ebb_insts(ebb).first().copied()
    }

    pub fn inst_ebb(&self, inst: Inst) -> Option<Ebb> {
        self.inst_ebb.get(inst.index()).copied().flatten()
    }

    /// Position of `inst` inside its EBB.
    pub fn inst_position(&self, inst: Inst) -> Option<usize> {
        let ebb = self.inst_ebb(inst)?;
        self.ebb_insts(ebb).iter().position(|&i| i == inst)
    }

    fn set_inst_ebb(&mut self, inst: Inst, ebb: Option<Ebb>) {
        if inst.index() >= self.inst_ebb.len() {
            self.inst_ebb.resize(inst.index() + 1, None);
        }
        self.inst_ebb[inst.index()] = ebb;
    }

    fn insts_mut(&mut self, ebb: Ebb) -> &mut Vec<Inst> {
        match self.ebb_insts.get_mut(ebb.index()) {
            Some(Some(insts)) => insts,
            _ => panic!("{} is not in the layout", ebb),
        }
    }

    pub fn append_inst(&mut self, inst: Inst, ebb: Ebb) {
        self.insts_mut(ebb).push(inst);
        self.set_inst_ebb(inst, Some(ebb));
    }

    /// Insert `inst` at position `pos` of `ebb`.
    pub fn insert_inst_at(&mut self, inst: Inst, ebb: Ebb, pos: usize) {
        self.insts_mut(ebb).insert(pos, inst);
        self.set_inst_ebb(inst, Some(ebb));
    }

    pub fn insert_inst_before(&mut self, inst: Inst, before: Inst) {
        let ebb = self.inst_ebb(before).expect("instruction not in layout");
        let pos = self.inst_position(before).unwrap_or(0);
        self.insert_inst_at(inst, ebb, pos);
    }

    pub fn insert_inst_after(&mut self, inst: Inst, after: Inst) {
        let ebb = self.inst_ebb(after).expect("instruction not in layout");
        let pos = self.inst_position(after).map_or(0, |p| p + 1);
        self.insert_inst_at(inst, ebb, pos);
    }

    pub fn remove_inst(&mut self, inst: Inst) {
        if let Some(ebb) = self.inst_ebb(inst) {
            self.insts_mut(ebb).retain(|&i| i != inst);
            self.set_inst_ebb(inst, None);
        }
    }

    /// Move `before` and every instruction following it into `new_ebb`, which
    /// is inserted right after the original EBB.
    pub fn split_ebb(&mut self, new_ebb: Ebb, before: Inst) {
        let old_ebb = self.inst_ebb(before).expect("instruction not in layout");
        let pos = self.inst_position(before).unwrap_or(0);
        let tail = self.insts_mut(old_ebb).split_off(pos);
        self.insert_ebb_after(new_ebb, old_ebb);
        for &inst in &tail {
            self.set_inst_ebb(inst, Some(new_ebb));
        }
        *self.insts_mut(new_ebb) = tail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_split() {
        let mut layout = Layout::new();
        let (e0, e1, e2) = (Ebb::new(0), Ebb::new(1), Ebb::new(2));
        let i = Inst::new;
        layout.append_ebb(e0);
        layout.append_ebb(e1);
        layout.append_inst(i(0), e0);
        layout.append_inst(i(2), e0);
        layout.insert_inst_before(i(1), i(2));
        layout.insert_inst_after(i(3), i(2));
        assert_eq!(layout.ebb_insts(e0), &[i(0), i(1), i(2), i(3)]);

        layout.split_ebb(e2, i(2));
        assert_eq!(layout.ebbs().collect::<Vec<_>>(), vec![e0, e2, e1]);
        assert_eq!(layout.ebb_insts(e0), &[i(0), i(1)]);
        assert_eq!(layout.ebb_insts(e2), &[i(2), i(3)]);
        assert_eq!(layout.inst_ebb(i(3)), Some(e2));
        assert_eq!(layout.next_ebb(e2), Some(e1));

        layout.remove_inst(i(1));
        assert_eq!(layout.ebb_insts(e0), &[i(0)]);
        assert_eq!(layout.inst_ebb(i(1)), None);
    }
}
