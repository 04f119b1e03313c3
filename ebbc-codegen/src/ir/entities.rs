//! IR entity references
//!
//! Values, EBBs, instructions, signatures and function references are all
//! small copyable indexes into the tables owned by a function. Values and EBBs
//! keep the number they were written with in the source text.

use std::fmt;

macro_rules! entity {
    ($(#[$attr:meta])* $name:ident, $prefix:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: usize) -> Self {
                $name(index as u32)
            }

            pub fn from_u32(n: u32) -> Self {
                $name(n)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

entity!(
    /// An SSA value: `v12`.
    Value,
    "v"
);
entity!(
    /// An extended basic block: `ebb3`.
    Ebb,
    "ebb"
);
entity!(
    /// An instruction. Instructions are not named in the text format.
    Inst,
    "inst"
);
entity!(
    /// A signature in the function preamble: `sig0`.
    SigRef,
    "sig"
);
entity!(
    /// An external function declared in the preamble: `fn0`.
    FuncRef,
    "fn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_display_with_prefix() {
        assert_eq!(Value::new(12).to_string(), "v12");
        assert_eq!(Ebb::new(3).to_string(), "ebb3");
        assert_eq!(SigRef::new(0).to_string(), "sig0");
        assert_eq!(FuncRef::new(1).to_string(), "fn1");
        assert_eq!(Inst::from_u32(7).index(), 7);
    }
}
