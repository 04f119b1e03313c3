//! Congruence classes of values
//!
//! All values of a class end up in the same location. A class starts as a
//! single value and grows when the coalescer removes a copy between two
//! classes. EBB parameters and the arguments passed to them share a class
//! from the moment the function is in conventional SSA form.

use crate::ir::entities::Value;
use crate::ir::valueloc::ValueLoc;
use std::collections::BTreeMap;

/// Index of a congruence class.
pub type ClassId = usize;

#[derive(Debug, Clone)]
pub struct Class {
    pub values: Vec<Value>,
    /// Location required by the ABI.
    pub fixed: Option<ValueLoc>,
    /// Stack slot chosen by the spiller.
    pub spill_slot: Option<i32>,
    /// Temporaries made by the spiller must stay in registers.
    pub spillable: bool,
}

impl Class {
    /// The location this class has before coloring, if any.
    pub fn location(&self) -> Option<ValueLoc> {
        self.fixed.or(self.spill_slot.map(ValueLoc::Stack))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VirtRegs {
    class_of: BTreeMap<Value, ClassId>,
    classes: Vec<Class>,
}

impl VirtRegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// The class of `value`, created on first use.
    pub fn class_id(&mut self, value: Value) -> ClassId {
        if let Some(&id) = self.class_of.get(&value) {
            return id;
        }
        let id = self.classes.len();
        self.classes.push(Class {
            values: vec![value],
            fixed: None,
            spill_slot: None,
            spillable: true,
        });
        self.class_of.insert(value, id);
        id
    }

    pub fn get(&self, value: Value) -> Option<ClassId> {
        self.class_of.get(&value).copied()
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id]
    }

    /// Classes that still contain values, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len()).filter(move |&id| !self.classes[id].values.is_empty())
    }

    pub fn members(&self, value: Value) -> &[Value] {
        match self.get(value) {
            Some(id) => &self.classes[id].values,
            None => &[],
        }
    }

    /// Pin the class of `value` to `loc`. Fixed classes are never spilled.
    pub fn fix(&mut self, value: Value, loc: ValueLoc) {
        let id = self.class_id(value);
        self.classes[id].fixed = Some(loc);
        self.classes[id].spillable = false;
    }

    pub fn fixed(&self, value: Value) -> Option<ValueLoc> {
        self.get(value).and_then(|id| self.classes[id].fixed)
    }

    /// Location of the class of `value` before coloring.
    pub fn location(&self, value: Value) -> Option<ValueLoc> {
        self.get(value).and_then(|id| self.classes[id].location())
    }

    /// A spiller temporary.
    pub fn add_temp(&mut self, value: Value) {
        let id = self.class_id(value);
        self.classes[id].spillable = false;
    }

    pub fn spill(&mut self, id: ClassId, slot: i32) {
        self.classes[id].spill_slot = Some(slot);
        self.classes[id].spillable = false;
    }

    /// Merge the classes of `a` and `b`.
    pub fn union(&mut self, a: Value, b: Value) -> ClassId {
        let (ia, ib) = (self.class_id(a), self.class_id(b));
        if ia == ib {
            return ia;
        }
        let moved = std::mem::take(&mut self.classes[ib].values);
        for &v in &moved {
            self.class_of.insert(v, ia);
        }
        let other = self.classes[ib].clone();
        let class = &mut self.classes[ia];
        class.values.extend(moved);
        class.fixed = class.fixed.or(other.fixed);
        class.spill_slot = class.spill_slot.or(other.spill_slot);
        class.spillable &= other.spillable;
        ia
    }

    /// Drop a value that no longer exists in the function.
    pub fn forget(&mut self, value: Value) {
        if let Some(id) = self.class_of.remove(&value) {
            self.classes[id].values.retain(|&v| v != value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_keeps_the_fixed_location() {
        let mut vregs = VirtRegs::new();
        let (a, b, c) = (Value::new(0), Value::new(1), Value::new(2));
        vregs.fix(b, ValueLoc::Reg(10));
        vregs.union(a, b);
        assert_eq!(vregs.fixed(a), Some(ValueLoc::Reg(10)));
        assert_eq!(vregs.members(b), &[a, b]);
        assert!(!vregs.class(vregs.get(a).unwrap()).spillable);

        vregs.class_id(c);
        vregs.forget(b);
        assert_eq!(vregs.members(a), &[a]);
        assert_eq!(vregs.ids().count(), 2);
    }
}
