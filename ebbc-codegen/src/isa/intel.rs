//! Intel x86 (32-bit) and x86-64
//!
//! Register units 0-15 are the general purpose registers in encoding order
//! (`rax rcx rdx rbx rsp rbp rsi rdi r8`-`r15`, `e`-names in 32-bit mode), units
//! 16-31 are `xmm0`-`xmm15`. Immediates are 32-bit signed. `haswell` enables
//! BMI1 `andn` and `popcnt`.

use super::settings::parse_bool;
use super::{check_width, AbiRegisters, Flags, LegalizeAction, RegBank, RegClass, RegInfo, SettingError, TargetIsa};
use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::Inst;
use crate::ir::extfunc::CallConv;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::valueloc::RegUnit;
use ebbc_common::CodegenResult;

const RAX: RegUnit = 0;
const RCX: RegUnit = 1;
const RDX: RegUnit = 2;
const RBX: RegUnit = 3;
const RSP: RegUnit = 4;
const RBP: RegUnit = 5;
const RSI: RegUnit = 6;
const RDI: RegUnit = 7;
const XMM: RegUnit = 16;

const NAMES_64: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];
const NAMES_32: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];

const RESERVED: [RegUnit; 2] = [RSP, RBP];

const GPR_ORDER_64: [RegUnit; 14] = [RAX, RCX, RDX, RSI, RDI, 8, 9, 10, 11, RBX, 12, 13, 14, 15];
const GPR_ORDER_32: [RegUnit; 6] = [RAX, RCX, RDX, RBX, RSI, RDI];

const FPR_ORDER_64: [RegUnit; 16] = [
    XMM, XMM + 1, XMM + 2, XMM + 3, XMM + 4, XMM + 5, XMM + 6, XMM + 7, XMM + 8, XMM + 9, XMM + 10,
    XMM + 11, XMM + 12, XMM + 13, XMM + 14, XMM + 15,
];
const FPR_ORDER_32: [RegUnit; 8] = [XMM, XMM + 1, XMM + 2, XMM + 3, XMM + 4, XMM + 5, XMM + 6, XMM + 7];

const CALLEE_SAVED_64: [RegUnit; 5] = [RBX, 12, 13, 14, 15];
const CALLEE_SAVED_32: [RegUnit; 3] = [RBX, RSI, RDI];

#[derive(Debug)]
pub struct Isa {
    flags: Flags,
    regs: RegInfo,
    /// BMI1, POPCNT and friends.
    haswell: bool,
}

impl Isa {
    pub fn new(flags: Flags, isa_flags: &[(String, Option<String>)]) -> Result<Self, SettingError> {
        let regs = if flags.is_64bit {
            let xmm: Vec<String> = (0..16).map(|n| format!("xmm{}", n)).collect();
            let xmm: Vec<&str> = xmm.iter().map(String::as_str).collect();
            RegInfo {
                banks: vec![
                    RegBank::named(RegClass::Gpr, 0, &NAMES_64),
                    RegBank::named(RegClass::Fpr, XMM, &xmm),
                ],
            }
        } else {
            RegInfo {
                banks: vec![
                    RegBank::named(RegClass::Gpr, 0, &NAMES_32),
                    RegBank::numbered(RegClass::Fpr, XMM, "xmm", 8),
                ],
            }
        };
        let mut isa = Self {
            flags,
            regs,
            haswell: false,
        };
        for (name, value) in isa_flags {
            match name.as_str() {
                "haswell" => isa.haswell = parse_bool(name, value.as_deref())?,
                _ => return Err(SettingError::BadName(name.clone())),
            }
        }
        Ok(isa)
    }
}

impl TargetIsa for Isa {
    fn name(&self) -> &'static str {
        "intel"
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
        let data = &dfg[inst];
        match data.opcode() {
            Opcode::IaddCout
            | Opcode::IaddCin
            | Opcode::IaddCarry
            | Opcode::IsubBout
            | Opcode::IsubBin
            | Opcode::IsubBorrow
            | Opcode::BorNot
            | Opcode::BxorNot
            | Opcode::IrsubImm => LegalizeAction::Expand,
            Opcode::BandNot | Opcode::Popcnt => {
                if self.haswell {
                    LegalizeAction::Legal
                } else {
                    LegalizeAction::Expand
                }
            }
            _ => match data {
                InstructionData::BinaryImm { imm, .. } | InstructionData::IntCompareImm { imm, .. }
                    if !self.imm_fits(imm.value()) =>
                {
                    LegalizeAction::Expand
                }
                _ => LegalizeAction::Legal,
            },
        }
    }

    fn abi_registers(&self, call_conv: CallConv) -> CodegenResult<AbiRegisters> {
        if !self.flags.is_64bit {
            return Ok(AbiRegisters {
                int_args: Vec::new(),
                float_args: Vec::new(),
                int_returns: vec![RAX, RDX],
                float_returns: vec![XMM],
                positional: false,
                stack_base: 0,
            });
        }
        Ok(match call_conv {
            CallConv::SystemV | CallConv::Fast => AbiRegisters {
                int_args: vec![RDI, RSI, RDX, RCX, 8, 9],
                float_args: (XMM..XMM + 8).collect(),
                int_returns: vec![RAX, RDX],
                float_returns: vec![XMM, XMM + 1],
                positional: false,
                stack_base: 0,
            },
            CallConv::WindowsFastcall => AbiRegisters {
                int_args: vec![RCX, RDX, 8, 9],
                float_args: (XMM..XMM + 4).collect(),
                int_returns: vec![RAX],
                float_returns: vec![XMM],
                positional: true,
                stack_base: 32,
            },
        })
    }

    fn reserved_registers(&self) -> &[RegUnit] {
        &RESERVED
    }

    fn allocatable_registers(&self, class: RegClass) -> &[RegUnit] {
        match (class, self.flags.is_64bit) {
            (RegClass::Gpr, true) => &GPR_ORDER_64,
            (RegClass::Gpr, false) => &GPR_ORDER_32,
            (RegClass::Fpr, true) => &FPR_ORDER_64,
            (RegClass::Fpr, false) => &FPR_ORDER_32,
        }
    }

    fn callee_saved_registers(&self) -> &[RegUnit] {
        if self.flags.is_64bit {
            &CALLEE_SAVED_64
        } else {
            &CALLEE_SAVED_32
        }
    }

    fn imm_fits(&self, imm: i64) -> bool {
        i32::try_from(imm).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Type;

    fn isa(is_64bit: bool, haswell: bool) -> Isa {
        let mut flags = Flags::new();
        flags.is_64bit = is_64bit;
        let isa_flags = if haswell {
            vec![("haswell".to_string(), None)]
        } else {
            Vec::new()
        };
        Isa::new(flags, &isa_flags).unwrap()
    }

    #[test]
    fn register_names_follow_mode() {
        assert_eq!(isa(true, false).register_info().display_regunit(RDI), "%rdi");
        assert_eq!(isa(true, false).register_info().display_regunit(XMM + 9), "%xmm9");
        assert_eq!(isa(false, false).register_info().display_regunit(RAX), "%eax");
        assert_eq!(isa(false, false).register_info().parse_regunit("r8"), None);
    }

    #[test]
    fn band_not_needs_haswell() {
        let mut dfg = DataFlowGraph::new();
        let ebb = dfg.make_ebb();
        let x = dfg.append_ebb_param(ebb, Type::I32);
        let inst = dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::BandNot,
            args: [x, x],
        });
        assert_eq!(isa(true, false).legalize_action(&dfg, inst), LegalizeAction::Expand);
        assert_eq!(isa(true, true).legalize_action(&dfg, inst), LegalizeAction::Legal);
    }

    #[test]
    fn thirty_two_bit_mode_passes_everything_on_the_stack() {
        let regs = isa(false, false).abi_registers(CallConv::SystemV).unwrap();
        assert!(regs.int_args.is_empty());
        assert_eq!(regs.int_returns, vec![RAX, RDX]);
    }
}
