//! Instruction formats and opcodes
//!
//! Every instruction is an [`InstructionData`] variant. The variant is the
//! instruction format; it fixes the operand layout, and the opcode inside the
//! variant says what the instruction computes.

use crate::ir::condcodes::IntCC;
use crate::ir::entities::{Ebb, FuncRef, SigRef, Value};
use crate::ir::immediates::{Ieee32, Ieee64, Imm64};
use std::fmt;
use std::str::FromStr;

/// Operand layout of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionFormat {
    NullAry,
    UnaryImm,
    UnaryIeee32,
    UnaryIeee64,
    UnaryBool,
    Unary,
    Binary,
    BinaryImm,
    Ternary,
    IntCompare,
    IntCompareImm,
    Jump,
    Branch,
    BranchIcmp,
    Call,
    CallIndirect,
    MultiAry,
}

macro_rules! opcodes {
    ($($variant:ident => $name:expr, $format:ident;)*) => {
        /// An instruction opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }

            pub fn format(self) -> InstructionFormat {
                match self {
                    $(Opcode::$variant => InstructionFormat::$format,)*
                }
            }
        }
    };
}

opcodes! {
    Iconst => "iconst", UnaryImm;
    F32const => "f32const", UnaryIeee32;
    F64const => "f64const", UnaryIeee64;
    Bconst => "bconst", UnaryBool;

    Iadd => "iadd", Binary;
    Isub => "isub", Binary;
    Imul => "imul", Binary;
    Udiv => "udiv", Binary;
    Sdiv => "sdiv", Binary;
    Urem => "urem", Binary;
    Srem => "srem", Binary;
    IaddCout => "iadd_cout", Binary;
    IsubBout => "isub_bout", Binary;
    IaddCin => "iadd_cin", Ternary;
    IaddCarry => "iadd_carry", Ternary;
    IsubBin => "isub_bin", Ternary;
    IsubBorrow => "isub_borrow", Ternary;

    IaddImm => "iadd_imm", BinaryImm;
    ImulImm => "imul_imm", BinaryImm;
    IrsubImm => "irsub_imm", BinaryImm;
    BandImm => "band_imm", BinaryImm;
    BorImm => "bor_imm", BinaryImm;
    BxorImm => "bxor_imm", BinaryImm;
    IshlImm => "ishl_imm", BinaryImm;
    UshrImm => "ushr_imm", BinaryImm;
    SshrImm => "sshr_imm", BinaryImm;

    Band => "band", Binary;
    Bor => "bor", Binary;
    Bxor => "bxor", Binary;
    BandNot => "band_not", Binary;
    BorNot => "bor_not", Binary;
    BxorNot => "bxor_not", Binary;
    Bnot => "bnot", Unary;

    Ishl => "ishl", Binary;
    Ushr => "ushr", Binary;
    Sshr => "sshr", Binary;
    Rotl => "rotl", Binary;
    Rotr => "rotr", Binary;
    Popcnt => "popcnt", Unary;

    Icmp => "icmp", IntCompare;
    IcmpImm => "icmp_imm", IntCompareImm;
    Select => "select", Ternary;

    Bint => "bint", Unary;
    Uextend => "uextend", Unary;
    Sextend => "sextend", Unary;
    Ireduce => "ireduce", Unary;

    Fadd => "fadd", Binary;
    Fsub => "fsub", Binary;
    Fmul => "fmul", Binary;
    Fdiv => "fdiv", Binary;

    Copy => "copy", Unary;
    Spill => "spill", Unary;
    Fill => "fill", Unary;

    Jump => "jump", Jump;
    Brz => "brz", Branch;
    Brnz => "brnz", Branch;
    BrIcmp => "br_icmp", BranchIcmp;
    Return => "return", MultiAry;
    Trap => "trap", NullAry;
    Call => "call", Call;
    CallIndirect => "call_indirect", CallIndirect;
}

impl Opcode {
    /// Instructions that end an EBB.
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::Return | Opcode::Trap)
    }

    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallIndirect)
    }

    /// Register-to-register, register-to-stack and stack-to-register moves.
    pub fn is_move(self) -> bool {
        matches!(self, Opcode::Copy | Opcode::Spill | Opcode::Fill)
    }

    /// Opcodes whose result type cannot be inferred from the operands and is
    /// written as a `.type` suffix.
    pub fn requires_typevar(self) -> bool {
        matches!(
            self,
            Opcode::Iconst | Opcode::Bconst | Opcode::Bint | Opcode::Uextend | Opcode::Sextend | Opcode::Ireduce
        )
    }

    /// The register form of an `_imm` opcode.
    pub fn without_imm(self) -> Option<Opcode> {
        Some(match self {
            Opcode::IaddImm => Opcode::Iadd,
            Opcode::ImulImm => Opcode::Imul,
            Opcode::IrsubImm => Opcode::Isub,
            Opcode::BandImm => Opcode::Band,
            Opcode::BorImm => Opcode::Bor,
            Opcode::BxorImm => Opcode::Bxor,
            Opcode::IshlImm => Opcode::Ishl,
            Opcode::UshrImm => Opcode::Ushr,
            Opcode::SshrImm => Opcode::Sshr,
            Opcode::IcmpImm => Opcode::Icmp,
            _ => return None,
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown opcode `{}`", s))
    }
}

/// Operands of an instruction, one variant per format.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionData {
    NullAry {
        opcode: Opcode,
    },
    UnaryImm {
        opcode: Opcode,
        imm: Imm64,
    },
    UnaryIeee32 {
        opcode: Opcode,
        imm: Ieee32,
    },
    UnaryIeee64 {
        opcode: Opcode,
        imm: Ieee64,
    },
    UnaryBool {
        opcode: Opcode,
        imm: bool,
    },
    Unary {
        opcode: Opcode,
        arg: Value,
    },
    Binary {
        opcode: Opcode,
        args: [Value; 2],
    },
    BinaryImm {
        opcode: Opcode,
        arg: Value,
        imm: Imm64,
    },
    Ternary {
        opcode: Opcode,
        args: [Value; 3],
    },
    IntCompare {
        opcode: Opcode,
        cond: IntCC,
        args: [Value; 2],
    },
    IntCompareImm {
        opcode: Opcode,
        cond: IntCC,
        arg: Value,
        imm: Imm64,
    },
    Jump {
        opcode: Opcode,
        destination: Ebb,
        args: Vec<Value>,
    },
    Branch {
        opcode: Opcode,
        arg: Value,
        destination: Ebb,
        args: Vec<Value>,
    },
    BranchIcmp {
        opcode: Opcode,
        cond: IntCC,
        cmp: [Value; 2],
        destination: Ebb,
        args: Vec<Value>,
    },
    Call {
        opcode: Opcode,
        func_ref: FuncRef,
        args: Vec<Value>,
    },
    CallIndirect {
        opcode: Opcode,
        sig_ref: SigRef,
        callee: Value,
        args: Vec<Value>,
    },
    MultiAry {
        opcode: Opcode,
        args: Vec<Value>,
    },
}

impl InstructionData {
    pub fn opcode(&self) -> Opcode {
        match *self {
            InstructionData::NullAry { opcode }
            | InstructionData::UnaryImm { opcode, .. }
            | InstructionData::UnaryIeee32 { opcode, .. }
            | InstructionData::UnaryIeee64 { opcode, .. }
            | InstructionData::UnaryBool { opcode, .. }
            | InstructionData::Unary { opcode, .. }
            | InstructionData::Binary { opcode, .. }
            | InstructionData::BinaryImm { opcode, .. }
            | InstructionData::Ternary { opcode, .. }
            | InstructionData::IntCompare { opcode, .. }
            | InstructionData::IntCompareImm { opcode, .. }
            | InstructionData::Jump { opcode, .. }
            | InstructionData::Branch { opcode, .. }
            | InstructionData::BranchIcmp { opcode, .. }
            | InstructionData::Call { opcode, .. }
            | InstructionData::CallIndirect { opcode, .. }
            | InstructionData::MultiAry { opcode, .. } => opcode,
        }
    }

    /// Change the opcode while keeping the operands. The new opcode must use
    /// the same format.
    pub fn set_opcode(&mut self, new: Opcode) {
        debug_assert_eq!(new.format(), self.opcode().format());
        match self {
            InstructionData::NullAry { opcode }
            | InstructionData::UnaryImm { opcode, .. }
            | InstructionData::UnaryIeee32 { opcode, .. }
            | InstructionData::UnaryIeee64 { opcode, .. }
            | InstructionData::UnaryBool { opcode, .. }
            | InstructionData::Unary { opcode, .. }
            | InstructionData::Binary { opcode, .. }
            | InstructionData::BinaryImm { opcode, .. }
            | InstructionData::Ternary { opcode, .. }
            | InstructionData::IntCompare { opcode, .. }
            | InstructionData::IntCompareImm { opcode, .. }
            | InstructionData::Jump { opcode, .. }
            | InstructionData::Branch { opcode, .. }
            | InstructionData::BranchIcmp { opcode, .. }
            | InstructionData::Call { opcode, .. }
            | InstructionData::CallIndirect { opcode, .. }
            | InstructionData::MultiAry { opcode, .. } => *opcode = new,
        }
    }

    /// All value operands: fixed operands first, then the variable list
    /// (EBB arguments, call arguments, return values).
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            InstructionData::NullAry { .. }
            | InstructionData::UnaryImm { .. }
            | InstructionData::UnaryIeee32 { .. }
            | InstructionData::UnaryIeee64 { .. }
            | InstructionData::UnaryBool { .. } => Vec::new(),
            InstructionData::Unary { arg, .. }
            | InstructionData::BinaryImm { arg, .. }
            | InstructionData::IntCompareImm { arg, .. } => vec![*arg],
            InstructionData::Binary { args, .. } | InstructionData::IntCompare { args, .. } => {
                args.to_vec()
            }
            InstructionData::Ternary { args, .. } => args.to_vec(),
            InstructionData::Jump { args, .. }
            | InstructionData::Call { args, .. }
            | InstructionData::MultiAry { args, .. } => args.clone(),
            InstructionData::Branch { arg, args, .. } => {
                let mut all = vec![*arg];
                all.extend_from_slice(args);
                all
            }
            InstructionData::BranchIcmp { cmp, args, .. } => {
                let mut all = cmp.to_vec();
                all.extend_from_slice(args);
                all
            }
            InstructionData::CallIndirect { callee, args, .. } => {
                let mut all = vec![*callee];
                all.extend_from_slice(args);
                all
            }
        }
    }

    /// Mutable references to all value operands, in the order of
    /// [`arguments`](Self::arguments).
    pub fn arguments_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstructionData::NullAry { .. }
            | InstructionData::UnaryImm { .. }
            | InstructionData::UnaryIeee32 { .. }
            | InstructionData::UnaryIeee64 { .. }
            | InstructionData::UnaryBool { .. } => Vec::new(),
            InstructionData::Unary { arg, .. }
            | InstructionData::BinaryImm { arg, .. }
            | InstructionData::IntCompareImm { arg, .. } => vec![arg],
            InstructionData::Binary { args, .. } | InstructionData::IntCompare { args, .. } => {
                args.iter_mut().collect()
            }
            InstructionData::Ternary { args, .. } => args.iter_mut().collect(),
            InstructionData::Jump { args, .. }
            | InstructionData::Call { args, .. }
            | InstructionData::MultiAry { args, .. } => args.iter_mut().collect(),
            InstructionData::Branch { arg, args, .. } => {
                std::iter::once(arg).chain(args.iter_mut()).collect()
            }
            InstructionData::BranchIcmp { cmp, args, .. } => {
                cmp.iter_mut().chain(args.iter_mut()).collect()
            }
            InstructionData::CallIndirect { callee, args, .. } => {
                std::iter::once(callee).chain(args.iter_mut()).collect()
            }
        }
    }

    /// Number of leading operands that are not part of the variable list.
    pub fn num_fixed_args(&self) -> usize {
        match self {
            InstructionData::Jump { .. }
            | InstructionData::Call { .. }
            | InstructionData::MultiAry { .. } => 0,
            InstructionData::Branch { .. } | InstructionData::CallIndirect { .. } => 1,
            InstructionData::BranchIcmp { .. } => 2,
            _ => self.arguments().len(),
        }
    }

    /// Replace every use of `old` by `new`. Returns true if anything changed.
    pub fn replace_value(&mut self, old: Value, new: Value) -> bool {
        let mut changed = false;
        for arg in self.arguments_mut() {
            if *arg == old {
                *arg = new;
                changed = true;
            }
        }
        changed
    }

    /// Destination and arguments of a branch or jump.
    pub fn branch_info(&self) -> Option<(Ebb, &[Value])> {
        match self {
            InstructionData::Jump {
                destination, args, ..
            }
            | InstructionData::Branch {
                destination, args, ..
            }
            | InstructionData::BranchIcmp {
                destination, args, ..
            } => Some((*destination, args.as_slice())),
            _ => None,
        }
    }

    pub fn branch_info_mut(&mut self) -> Option<(&mut Ebb, &mut Vec<Value>)> {
        match self {
            InstructionData::Jump {
                destination, args, ..
            }
            | InstructionData::Branch {
                destination, args, ..
            }
            | InstructionData::BranchIcmp {
                destination, args, ..
            } => Some((destination, args)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_names_parse_back() {
        for &op in Opcode::ALL {
            assert_eq!(op.name().parse::<Opcode>(), Ok(op));
        }
        assert!("iaddd".parse::<Opcode>().is_err());
    }

    #[test]
    fn branch_operands_split_into_fixed_and_variable() {
        let v = Value::new;
        let data = InstructionData::BranchIcmp {
            opcode: Opcode::BrIcmp,
            cond: IntCC::UnsignedLessThan,
            cmp: [v(1), v(2)],
            destination: Ebb::new(3),
            args: vec![v(4), v(1)],
        };
        assert_eq!(data.arguments(), vec![v(1), v(2), v(4), v(1)]);
        assert_eq!(data.num_fixed_args(), 2);
        assert_eq!(data.branch_info(), Some((Ebb::new(3), &[v(4), v(1)][..])));
    }

    #[test]
    fn replace_value_rewrites_every_occurrence() {
        let v = Value::new;
        let mut data = InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [v(1), v(1)],
        };
        assert!(data.replace_value(v(1), v(7)));
        assert_eq!(data.arguments(), vec![v(7), v(7)]);
        assert!(!data.replace_value(v(1), v(8)));
    }

    #[test]
    fn imm_opcodes_map_to_register_forms() {
        assert_eq!(Opcode::IaddImm.without_imm(), Some(Opcode::Iadd));
        assert_eq!(Opcode::IcmpImm.without_imm(), Some(Opcode::Icmp));
        assert_eq!(Opcode::Iadd.without_imm(), None);
    }
}
