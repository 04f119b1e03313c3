//! Value types

use std::fmt;

/// The type of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    B1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Type {
    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "b1" => Type::B1,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            _ => return None,
        })
    }

    pub fn is_int(self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_bool(self) -> bool {
        self == Type::B1
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn bits(self) -> u32 {
        match self {
            Type::B1 => 1,
            Type::I8 => 8,
            Type::I16 => 16,
            Type::I32 | Type::F32 => 32,
            Type::I64 | Type::F64 => 64,
        }
    }

    /// Size in bytes of a stack slot holding this type.
    pub fn bytes(self) -> u32 {
        (self.bits() + 7) / 8
    }

    /// Integer type with the same width as a pointer on the target.
    pub fn pointer(is_64bit: bool) -> Type {
        if is_64bit {
            Type::I64
        } else {
            Type::I32
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::B1 => "b1",
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for ty in [Type::B1, Type::I8, Type::I16, Type::I32, Type::I64, Type::F32, Type::F64] {
            assert_eq!(Type::from_name(&ty.to_string()), Some(ty));
        }
        assert_eq!(Type::from_name("i128"), None);
    }

    #[test]
    fn widths() {
        assert_eq!(Type::B1.bytes(), 1);
        assert_eq!(Type::I16.bytes(), 2);
        assert_eq!(Type::F64.bits(), 64);
        assert!(Type::I8.is_int() && !Type::B1.is_int());
    }
}
