//! Register banks and register names

use crate::ir::types::Type;
use crate::ir::valueloc::RegUnit;

/// Register class a value is allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Gpr,
    Fpr,
}

impl RegClass {
    pub fn for_type(ty: Type) -> RegClass {
        if ty.is_float() {
            RegClass::Fpr
        } else {
            RegClass::Gpr
        }
    }
}

/// A contiguous range of register units with names.
#[derive(Debug, Clone)]
pub struct RegBank {
    pub class: RegClass,
    pub first_unit: RegUnit,
    pub names: Vec<String>,
}

impl RegBank {
    /// A bank whose registers are named `{prefix}{n}`.
    pub fn numbered(class: RegClass, first_unit: RegUnit, prefix: &str, count: usize) -> Self {
        Self {
            class,
            first_unit,
            names: (0..count).map(|n| format!("{}{}", prefix, n)).collect(),
        }
    }

    pub fn named(class: RegClass, first_unit: RegUnit, names: &[&str]) -> Self {
        Self {
            class,
            first_unit,
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn contains(&self, unit: RegUnit) -> bool {
        unit >= self.first_unit && usize::from(unit - self.first_unit) < self.names.len()
    }
}

/// All register banks of a target.
#[derive(Debug, Clone)]
pub struct RegInfo {
    pub banks: Vec<RegBank>,
}

impl RegInfo {
    /// Name of a register unit including the `%` sigil.
    pub fn display_regunit(&self, unit: RegUnit) -> String {
        for bank in &self.banks {
            if bank.contains(unit) {
                return format!("%{}", bank.names[usize::from(unit - bank.first_unit)]);
            }
        }
        format!("%r{}", unit)
    }

    /// Look up a register by name, without the `%` sigil.
    pub fn parse_regunit(&self, name: &str) -> Option<RegUnit> {
        self.banks.iter().find_map(|bank| {
            bank.names
                .iter()
                .position(|n| n == name)
                .map(|i| bank.first_unit + i as RegUnit)
        })
    }

    pub fn class_of(&self, unit: RegUnit) -> Option<RegClass> {
        self.banks
            .iter()
            .find(|bank| bank.contains(unit))
            .map(|bank| bank.class)
    }
}
