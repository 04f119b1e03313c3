//! RISC-V
//!
//! Register units 0-31 are `x0`-`x31`, units 32-63 are `f0`-`f31`. The base
//! integer ISA has no multiply or divide, no carry flags, no rotates, no
//! population count and no conditional select; immediates are 12-bit signed.
//! `supports_m`, `supports_f` and `supports_d` enable the standard extensions.
//! The return address arrives in `x1`.

use super::settings::parse_bool;
use super::{check_width, value_types, AbiRegisters, Flags, LegalizeAction, RegBank, RegClass, RegInfo, SettingError, TargetIsa};
use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::Inst;
use crate::ir::extfunc::CallConv;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::Type;
use crate::ir::valueloc::RegUnit;
use ebbc_common::{CodegenError, CodegenResult};

const FPR: RegUnit = 32;

/// Return address register.
pub const LINK: RegUnit = 1;

/// `x0` (zero), `x2` (stack pointer), `x3` (global pointer), `x4` (thread pointer).
const RESERVED: [RegUnit; 4] = [0, 2, 3, 4];

/// Caller-saved temporaries and argument registers first, callee-saved last.
const GPR_ORDER: [RegUnit; 27] = [
    5, 6, 7, 10, 11, 12, 13, 14, 15, 16, 17, 28, 29, 30, 31, 8, 9, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27,
];

const FPR_ORDER: [RegUnit; 32] = [
    FPR, FPR + 1, FPR + 2, FPR + 3, FPR + 4, FPR + 5, FPR + 6, FPR + 7, FPR + 10, FPR + 11,
    FPR + 12, FPR + 13, FPR + 14, FPR + 15, FPR + 16, FPR + 17, FPR + 28, FPR + 29, FPR + 30,
    FPR + 31, FPR + 8, FPR + 9, FPR + 18, FPR + 19, FPR + 20, FPR + 21, FPR + 22, FPR + 23,
    FPR + 24, FPR + 25, FPR + 26, FPR + 27,
];

const CALLEE_SAVED: [RegUnit; 24] = [
    8, 9, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, FPR + 8, FPR + 9, FPR + 18, FPR + 19, FPR + 20,
    FPR + 21, FPR + 22, FPR + 23, FPR + 24, FPR + 25, FPR + 26, FPR + 27,
];

#[derive(Debug)]
pub struct Isa {
    flags: Flags,
    regs: RegInfo,
    /// Integer multiply and divide (`M` extension).
    supports_m: bool,
    /// Single precision floats (`F` extension).
    supports_f: bool,
    /// Double precision floats (`D` extension).
    supports_d: bool,
}

impl Isa {
    pub fn new(flags: Flags, isa_flags: &[(String, Option<String>)]) -> Result<Self, SettingError> {
        let mut isa = Self {
            flags,
            regs: RegInfo {
                banks: vec![
                    RegBank::numbered(RegClass::Gpr, 0, "x", 32),
                    RegBank::numbered(RegClass::Fpr, FPR, "f", 32),
                ],
            },
            supports_m: false,
            supports_f: false,
            supports_d: false,
        };
        for (name, value) in isa_flags {
            let value = value.as_deref();
            match name.as_str() {
                "supports_m" => isa.supports_m = parse_bool(name, value)?,
                "supports_f" => isa.supports_f = parse_bool(name, value)?,
                "supports_d" => isa.supports_d = parse_bool(name, value)?,
                _ => return Err(SettingError::BadName(name.clone())),
            }
        }
        Ok(isa)
    }

    fn imm_operand(data: &InstructionData) -> Option<i64> {
        match data {
            InstructionData::BinaryImm { imm, .. } | InstructionData::IntCompareImm { imm, .. } => {
                Some(imm.value())
            }
            _ => None,
        }
    }
}

impl TargetIsa for Isa {
    fn name(&self) -> &'static str {
        "riscv"
    }

    fn flags(&self) -> &Flags {
        &self.flags
    }

    fn register_info(&self) -> &RegInfo {
        &self.regs
    }

    fn legalize_action(&self, dfg: &DataFlowGraph, inst: Inst) -> LegalizeAction {
        if let Some(reason) = check_width(&self.flags, dfg, inst) {
            return LegalizeAction::Unsupported(reason);
        }
        for ty in value_types(dfg, inst) {
            if ty == Type::F32 && !self.supports_f {
                return LegalizeAction::Unsupported("f32 values need supports_f".to_string());
            }
            if ty == Type::F64 && !self.supports_d {
                return LegalizeAction::Unsupported("f64 values need supports_d".to_string());
            }
        }

        let data = &dfg[inst];
        match data.opcode() {
            Opcode::IaddCout
            | Opcode::IaddCin
            | Opcode::IaddCarry
            | Opcode::IsubBout
            | Opcode::IsubBin
            | Opcode::IsubBorrow
            | Opcode::BandNot
            | Opcode::BorNot
            | Opcode::BxorNot
            | Opcode::Rotl
            | Opcode::Rotr
            | Opcode::Popcnt
            | Opcode::Select
            | Opcode::IrsubImm
            | Opcode::ImulImm => LegalizeAction::Expand,
            Opcode::Imul | Opcode::Udiv | Opcode::Sdiv | Opcode::Urem | Opcode::Srem => {
                if self.supports_m {
                    LegalizeAction::Legal
                } else {
                    LegalizeAction::Unsupported("multiply and divide need supports_m".to_string())
                }
            }
            Opcode::IaddImm | Opcode::BandImm | Opcode::BorImm | Opcode::BxorImm | Opcode::IcmpImm => {
                match Self::imm_operand(data) {
                    Some(imm) if !self.imm_fits(imm) => LegalizeAction::Expand,
                    _ => LegalizeAction::Legal,
                }
            }
            _ => LegalizeAction::Legal,
        }
    }

    fn abi_registers(&self, call_conv: CallConv) -> CodegenResult<AbiRegisters> {
        match call_conv {
            CallConv::SystemV | CallConv::Fast => Ok(AbiRegisters {
                int_args: (10..18).collect(),
                float_args: (FPR + 10..FPR + 18).collect(),
                int_returns: vec![10, 11],
                float_returns: vec![FPR + 10, FPR + 11],
                positional: false,
                stack_base: 0,
            }),
            CallConv::WindowsFastcall => Err(CodegenError::abi(
                "calling convention windows_fastcall is not supported by riscv",
            )),
        }
    }

    fn link_register(&self) -> Option<RegUnit> {
        Some(LINK)
    }

    fn reserved_registers(&self) -> &[RegUnit] {
        &RESERVED
    }

    fn allocatable_registers(&self, class: RegClass) -> &[RegUnit] {
        match class {
            RegClass::Gpr => &GPR_ORDER,
            RegClass::Fpr => &FPR_ORDER,
        }
    }

    fn callee_saved_registers(&self) -> &[RegUnit] {
        &CALLEE_SAVED
    }

    fn imm_fits(&self, imm: i64) -> bool {
        (-2048..=2047).contains(&imm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::immediates::Imm64;

    fn isa(flags: &[&str]) -> Isa {
        let flags: Vec<_> = flags.iter().map(|f| (f.to_string(), None)).collect();
        Isa::new(Flags::new(), &flags).unwrap()
    }

    #[test]
    fn register_names() {
        let isa = isa(&[]);
        let regs = isa.register_info();
        assert_eq!(regs.display_regunit(10), "%x10");
        assert_eq!(regs.display_regunit(FPR + 3), "%f3");
        assert_eq!(regs.parse_regunit("x1"), Some(LINK));
        assert_eq!(regs.parse_regunit("f31"), Some(FPR + 31));
        assert_eq!(regs.parse_regunit("rax"), None);
    }

    #[test]
    fn allocation_excludes_reserved_and_link() {
        let isa = isa(&[]);
        let gprs = isa.allocatable_registers(RegClass::Gpr);
        assert_eq!(gprs.len(), 27);
        for r in RESERVED.iter().chain(std::iter::once(&LINK)) {
            assert!(!gprs.contains(r));
        }
        assert_eq!(gprs[0], 5);
    }

    #[test]
    fn immediates_are_twelve_bits() {
        let isa = isa(&[]);
        let mut dfg = DataFlowGraph::new();
        let ebb = dfg.make_ebb();
        let x = dfg.append_ebb_param(ebb, Type::I32);
        let small = dfg.make_inst(InstructionData::BinaryImm {
            opcode: Opcode::IaddImm,
            arg: x,
            imm: Imm64::new(2047),
        });
        let large = dfg.make_inst(InstructionData::BinaryImm {
            opcode: Opcode::IaddImm,
            arg: x,
            imm: Imm64::new(2048),
        });
        assert_eq!(isa.legalize_action(&dfg, small), LegalizeAction::Legal);
        assert_eq!(isa.legalize_action(&dfg, large), LegalizeAction::Expand);
    }

    #[test]
    fn multiply_needs_the_m_extension() {
        let mut dfg = DataFlowGraph::new();
        let ebb = dfg.make_ebb();
        let x = dfg.append_ebb_param(ebb, Type::I32);
        let mul = dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Imul,
            args: [x, x],
        });
        assert!(matches!(
            isa(&[]).legalize_action(&dfg, mul),
            LegalizeAction::Unsupported(_)
        ));
        assert_eq!(isa(&["supports_m"]).legalize_action(&dfg, mul), LegalizeAction::Legal);
    }
}
