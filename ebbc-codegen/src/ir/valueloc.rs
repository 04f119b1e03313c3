//! Value locations
//!
//! The register allocator gives every value a [`ValueLoc`]. Signatures use the
//! same type for the locations of their parameters and return values.

use crate::ir::entities::Value;

/// A register unit number. Its meaning is defined by the target ISA.
pub type RegUnit = u16;

/// Where a value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ValueLoc {
    #[default]
    Unassigned,
    Reg(RegUnit),
    /// Byte offset from the stack pointer at function entry. Incoming stack
    /// arguments have positive offsets, spill slots negative ones.
    Stack(i32),
}

impl ValueLoc {
    pub fn is_assigned(self) -> bool {
        self != ValueLoc::Unassigned
    }

    pub fn reg(self) -> Option<RegUnit> {
        match self {
            ValueLoc::Reg(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_stack(self) -> bool {
        matches!(self, ValueLoc::Stack(_))
    }
}

/// Locations of the values in one function, indexed by value number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueLocations {
    locs: Vec<ValueLoc>,
}

impl ValueLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: Value) -> ValueLoc {
        self.locs.get(value.index()).copied().unwrap_or_default()
    }

    pub fn set(&mut self, value: Value, loc: ValueLoc) {
        if value.index() >= self.locs.len() {
            self.locs.resize(value.index() + 1, ValueLoc::Unassigned);
        }
        self.locs[value.index()] = loc;
    }

    pub fn clear(&mut self) {
        self.locs.clear();
    }
}
