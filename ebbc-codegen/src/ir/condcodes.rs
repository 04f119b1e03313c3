//! Integer condition codes for `icmp`, `icmp_imm` and `br_icmp`

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntCC {
    Equal,
    NotEqual,
    SignedLessThan,
    SignedGreaterThanOrEqual,
    SignedGreaterThan,
    SignedLessThanOrEqual,
    UnsignedLessThan,
    UnsignedGreaterThanOrEqual,
    UnsignedGreaterThan,
    UnsignedLessThanOrEqual,
}

impl IntCC {
    /// The condition that holds exactly when `self` does not.
    pub fn inverse(self) -> IntCC {
        use IntCC::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            SignedLessThan => SignedGreaterThanOrEqual,
            SignedGreaterThanOrEqual => SignedLessThan,
            SignedGreaterThan => SignedLessThanOrEqual,
            SignedLessThanOrEqual => SignedGreaterThan,
            UnsignedLessThan => UnsignedGreaterThanOrEqual,
            UnsignedGreaterThanOrEqual => UnsignedLessThan,
            UnsignedGreaterThan => UnsignedLessThanOrEqual,
            UnsignedLessThanOrEqual => UnsignedGreaterThan,
        }
    }

    fn name(self) -> &'static str {
        use IntCC::*;
        match self {
            Equal => "eq",
            NotEqual => "ne",
            SignedLessThan => "slt",
            SignedGreaterThanOrEqual => "sge",
            SignedGreaterThan => "sgt",
            SignedLessThanOrEqual => "sle",
            UnsignedLessThan => "ult",
            UnsignedGreaterThanOrEqual => "uge",
            UnsignedGreaterThan => "ugt",
            UnsignedLessThanOrEqual => "ule",
        }
    }
}

impl fmt::Display for IntCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntCC {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use IntCC::*;
        Ok(match s {
            "eq" => Equal,
            "ne" => NotEqual,
            "slt" => SignedLessThan,
            "sge" => SignedGreaterThanOrEqual,
            "sgt" => SignedGreaterThan,
            "sle" => SignedLessThanOrEqual,
            "ult" => UnsignedLessThan,
            "uge" => UnsignedGreaterThanOrEqual,
            "ugt" => UnsignedGreaterThan,
            "ule" => UnsignedLessThanOrEqual,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_is_an_involution() {
        for name in ["eq", "ne", "slt", "sge", "sgt", "sle", "ult", "uge", "ugt", "ule"] {
            let cc: IntCC = name.parse().unwrap();
            assert_eq!(cc.to_string(), name);
            assert_eq!(cc.inverse().inverse(), cc);
            assert_ne!(cc.inverse(), cc);
        }
    }
}
