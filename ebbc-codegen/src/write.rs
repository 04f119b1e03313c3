//! Converting functions to text
//!
//! The output is the same syntax the reader accepts. Value locations are shown
//! once the function has any: `[%x10]` for a register, `[-8]` for a stack
//! slot and `[-]` for a value still waiting for one.

use crate::ir::entities::{Ebb, Inst, Value};
use crate::ir::extfunc::{AbiParam, ArgumentPurpose, Signature};
use crate::ir::function::Function;
use crate::ir::instructions::InstructionData;
use crate::ir::valueloc::ValueLoc;
use crate::isa::{RegInfo, TargetIsa};
use std::fmt::{self, Write};

/// Wrapper returned by [`Function::display`].
pub struct DisplayFunction<'a> {
    func: &'a Function,
    isa: Option<&'a dyn TargetIsa>,
}

impl<'a> DisplayFunction<'a> {
    pub fn new(func: &'a Function, isa: Option<&'a dyn TargetIsa>) -> Self {
        Self { func, isa }
    }
}

impl fmt::Display for DisplayFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, self.func, self.isa)
    }
}

/// A signature with register names resolved.
pub struct DisplaySignature<'a> {
    sig: &'a Signature,
    regs: Option<&'a RegInfo>,
}

impl<'a> DisplaySignature<'a> {
    pub fn new(sig: &'a Signature, regs: Option<&'a RegInfo>) -> Self {
        Self { sig, regs }
    }
}

impl fmt::Display for DisplaySignature<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_signature(f, self.sig, self.regs)
    }
}

pub fn write_function(w: &mut dyn Write, func: &Function, isa: Option<&dyn TargetIsa>) -> fmt::Result {
    let regs = isa.map(|isa| isa.register_info());
    write!(w, "function %{}", func.name)?;
    write_signature(w, &func.signature, regs)?;
    writeln!(w, " {{")?;

    let mut any = write_preamble(w, func, regs)?;
    for ebb in func.layout.ebbs() {
        if any {
            writeln!(w)?;
        }
        write_ebb(w, func, regs, ebb)?;
        any = true;
    }
    writeln!(w, "}}")
}

fn write_preamble(w: &mut dyn Write, func: &Function, regs: Option<&RegInfo>) -> Result<bool, fmt::Error> {
    let mut any = false;
    for (i, sig) in func.dfg.signatures.iter().enumerate() {
        write!(w, "    sig{} = ", i)?;
        write_signature(w, sig, regs)?;
        writeln!(w)?;
        any = true;
    }
    for (i, ext) in func.dfg.ext_funcs.iter().enumerate() {
        writeln!(w, "    fn{} = %{} {}", i, ext.name, ext.signature)?;
        any = true;
    }
    Ok(any)
}

/// `(i32, i32 link [%x1]) -> i32 system_v`
pub fn write_signature(w: &mut dyn Write, sig: &Signature, regs: Option<&RegInfo>) -> fmt::Result {
    write!(w, "(")?;
    write_abi_params(w, &sig.params, regs)?;
    write!(w, ")")?;
    if !sig.returns.is_empty() {
        write!(w, " -> ")?;
        write_abi_params(w, &sig.returns, regs)?;
    }
    write!(w, " {}", sig.call_conv)
}

fn write_abi_params(w: &mut dyn Write, params: &[AbiParam], regs: Option<&RegInfo>) -> fmt::Result {
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}", param.value_type)?;
        if param.purpose == ArgumentPurpose::Link {
            write!(w, " link")?;
        }
        if param.location.is_assigned() {
            write!(w, " [")?;
            write_loc(w, param.location, regs)?;
            write!(w, "]")?;
        }
    }
    Ok(())
}

fn write_loc(w: &mut dyn Write, loc: ValueLoc, regs: Option<&RegInfo>) -> fmt::Result {
    match loc {
        ValueLoc::Unassigned => write!(w, "-"),
        ValueLoc::Reg(unit) => match regs {
            Some(regs) => write!(w, "{}", regs.display_regunit(unit)),
            None => write!(w, "%r{}", unit),
        },
        ValueLoc::Stack(offset) => write!(w, "{}", offset),
    }
}

fn write_ebb(w: &mut dyn Write, func: &Function, regs: Option<&RegInfo>, ebb: Ebb) -> fmt::Result {
    write!(w, "{}", ebb)?;
    let params = func.dfg.ebb_params(ebb);
    if !params.is_empty() {
        write!(w, "(")?;
        for (i, &param) in params.iter().enumerate() {
            if i > 0 {
                write!(w, ", ")?;
            }
            write!(w, "{}: {}", param, func.dfg.value_type(param))?;
            let loc = func.locations.get(param);
            if loc.is_assigned() {
                write!(w, " [")?;
                write_loc(w, loc, regs)?;
                write!(w, "]")?;
            }
        }
        write!(w, ")")?;
    }
    writeln!(w, ":")?;
    for &inst in func.layout.ebb_insts(ebb) {
        write!(w, "    ")?;
        write_instruction(w, func, regs, inst)?;
        writeln!(w)?;
    }
    Ok(())
}

/// One instruction without indentation or line break.
pub fn write_instruction(w: &mut dyn Write, func: &Function, regs: Option<&RegInfo>, inst: Inst) -> fmt::Result {
    let results = func.dfg.inst_results(inst);
    if results.iter().any(|&v| func.locations.get(v).is_assigned()) {
        write!(w, "[")?;
        for (i, &v) in results.iter().enumerate() {
            if i > 0 {
                write!(w, ",")?;
            }
            write_loc(w, func.locations.get(v), regs)?;
        }
        write!(w, "] ")?;
    }
    if !results.is_empty() {
        write_value_list(w, results)?;
        write!(w, " = ")?;
    }

    let data = &func.dfg[inst];
    let opcode = data.opcode();
    write!(w, "{}", opcode)?;
    if opcode.requires_typevar() {
        if let Some(&v) = results.first() {
            write!(w, ".{}", func.dfg.value_type(v))?;
        }
    }
    write_operands(w, data)
}

fn write_value_list(w: &mut dyn Write, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}", v)?;
    }
    Ok(())
}

fn write_ebb_args(w: &mut dyn Write, args: &[Value]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    write!(w, "(")?;
    write_value_list(w, args)?;
    write!(w, ")")
}

fn write_operands(w: &mut dyn Write, data: &InstructionData) -> fmt::Result {
    match data {
        InstructionData::NullAry { .. } => Ok(()),
        InstructionData::UnaryImm { imm, .. } => write!(w, " {}", imm),
        InstructionData::UnaryIeee32 { imm, .. } => write!(w, " {}", imm),
        InstructionData::UnaryIeee64 { imm, .. } => write!(w, " {}", imm),
        InstructionData::UnaryBool { imm, .. } => write!(w, " {}", imm),
        InstructionData::Unary { arg, .. } => write!(w, " {}", arg),
        InstructionData::Binary { args, .. } => write!(w, " {}, {}", args[0], args[1]),
        InstructionData::BinaryImm { arg, imm, .. } => write!(w, " {}, {}", arg, imm),
        InstructionData::Ternary { args, .. } => {
            write!(w, " {}, {}, {}", args[0], args[1], args[2])
        }
        InstructionData::IntCompare { cond, args, .. } => {
            write!(w, " {} {}, {}", cond, args[0], args[1])
        }
        InstructionData::IntCompareImm { cond, arg, imm, .. } => {
            write!(w, " {} {}, {}", cond, arg, imm)
        }
        InstructionData::Jump {
            destination, args, ..
        } => {
            write!(w, " {}", destination)?;
            write_ebb_args(w, args)
        }
        InstructionData::Branch {
            arg,
            destination,
            args,
            ..
        } => {
            write!(w, " {}, {}", arg, destination)?;
            write_ebb_args(w, args)
        }
        InstructionData::BranchIcmp {
            cond,
            cmp,
            destination,
            args,
            ..
        } => {
            write!(w, " {} {}, {}, {}", cond, cmp[0], cmp[1], destination)?;
            write_ebb_args(w, args)
        }
        InstructionData::Call { func_ref, args, .. } => {
            write!(w, " {}(", func_ref)?;
            write_value_list(w, args)?;
            write!(w, ")")
        }
        InstructionData::CallIndirect {
            sig_ref,
            callee,
            args,
            ..
        } => {
            write!(w, " {}, {}(", sig_ref, callee)?;
            write_value_list(w, args)?;
            write!(w, ")")
        }
        InstructionData::MultiAry { args, .. } => {
            if args.is_empty() {
                return Ok(());
            }
            write!(w, " ")?;
            write_value_list(w, args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AbiParam, CallConv, InsertBuilder, InstructionData, Opcode, Signature, Type};
    use crate::isa::{self, Flags};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn add_function() -> Function {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(Type::I32));
        sig.params.push(AbiParam::new(Type::I32));
        sig.returns.push(AbiParam::new(Type::I32));
        let mut func = Function::with_name_signature("add", sig);
        let ebb = func.dfg.make_ebb();
        func.layout.append_ebb(ebb);
        let a = func.dfg.append_ebb_param(ebb, Type::I32);
        let b = func.dfg.append_ebb_param(ebb, Type::I32);
        let mut pos = InsertBuilder::at_end(&mut func, ebb);
        let sum = pos.binary(Opcode::Iadd, a, b);
        let big = pos.iconst(Type::I32, 1_000_000_000);
        let sum = pos.binary(Opcode::Iadd, sum, big);
        pos.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args: vec![sum],
            },
            None,
        );
        func
    }

    #[test]
    fn plain_function() {
        let func = add_function();
        assert_eq!(
            func.display(None).to_string(),
            indoc! {"
                function %add(i32, i32) -> i32 system_v {
                ebb0(v0: i32, v1: i32):
                    v2 = iadd v0, v1
                    v3 = iconst.i32 0x3b9a_ca00
                    v4 = iadd v2, v3
                    return v4
                }
            "}
        );
    }

    #[test]
    fn locations_use_isa_register_names() {
        let isa = isa::lookup("riscv", Flags::new(), &[]).unwrap();
        let mut func = add_function();
        func.signature.params[0].location = ValueLoc::Reg(10);
        func.locations.set(Value::new(0), ValueLoc::Reg(10));
        func.locations.set(Value::new(2), ValueLoc::Reg(5));
        func.locations.set(Value::new(3), ValueLoc::Stack(-8));
        let text = func.display(Some(&*isa)).to_string();
        assert!(text.starts_with("function %add(i32 [%x10], i32) -> i32 system_v {\n"));
        assert!(text.contains("ebb0(v0: i32 [%x10], v1: i32):"));
        assert!(text.contains("    [%x5] v2 = iadd v0, v1\n"));
        assert!(text.contains("    [-8] v3 = iconst.i32 0x3b9a_ca00\n"));
        assert!(text.contains("    v4 = iadd v2, v3\n"));
    }
}
