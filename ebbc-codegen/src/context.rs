//! Compilation pipeline
//!
//! A [`Context`] carries the target and the pass timer through the stages
//! that a fixture or the driver asks for. When the target flags enable it,
//! the IR verifier runs before legalization and after each stage.

use crate::abi::legalize_signatures;
use crate::ir::function::Function;
use crate::isa::TargetIsa;
use crate::legalizer::legalize_function;
use crate::regalloc::allocate;
use crate::verifier::verify_function;
use ebbc_common::{CodegenResult, Pass, PassTimer};
use log::debug;

pub struct Context<'a> {
    pub isa: &'a dyn TargetIsa,
    pub timer: &'a PassTimer,
}

impl<'a> Context<'a> {
    pub fn new(isa: &'a dyn TargetIsa, timer: &'a PassTimer) -> Self {
        Self { isa, timer }
    }

    /// Run the IR verifier unconditionally.
    pub fn verify(&self, func: &Function) -> CodegenResult<()> {
        let _tt = self.timer.start(Pass::Verifier);
        verify_function(func)
    }

    fn verify_if(&self, func: &Function) -> CodegenResult<()> {
        if self.isa.flags().enable_verifier {
            self.verify(func)
        } else {
            Ok(())
        }
    }

    /// Legalize `func`. Malformed input is reported by the verifier before
    /// any rewrite.
    pub fn legalize(&self, func: &mut Function) -> CodegenResult<()> {
        self.verify_if(func)?;
        debug!("legalizing %{} for {}", func.name, self.isa.name());
        {
            let _tt = self.timer.start(Pass::Legalize);
            legalize_function(func, self.isa)?;
        }
        self.verify_if(func)
    }

    pub fn assign_locations(&self, func: &mut Function) -> CodegenResult<()> {
        {
            let _tt = self.timer.start(Pass::Abi);
            legalize_signatures(func, self.isa)?;
        }
        self.verify_if(func)
    }

    /// Legalize, assign signature locations and allocate registers.
    pub fn regalloc(&self, func: &mut Function) -> CodegenResult<()> {
        self.legalize(func)?;
        self.assign_locations(func)?;
        allocate(func, self.isa, self.timer)?;
        self.verify_if(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AbiParam, CallConv, InsertBuilder, InstructionData, Opcode, Signature, Type};
    use crate::isa::{self, Flags};

    #[test]
    fn regalloc_runs_every_stage() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(Type::I32));
        sig.returns.push(AbiParam::new(Type::I32));
        let mut func = Function::with_name_signature("inc", sig);
        let ebb = func.dfg.make_ebb();
        func.layout.append_ebb(ebb);
        let x = func.dfg.append_ebb_param(ebb, Type::I32);
        let mut pos = InsertBuilder::at_end(&mut func, ebb);
        let big = pos.binary_imm(Opcode::IaddImm, x, 100_000);
        pos.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args: vec![big],
            },
            None,
        );

        let isa = isa::lookup("riscv", Flags::new(), &[]).unwrap();
        let timer = PassTimer::new();
        Context::new(&*isa, &timer).regalloc(&mut func).unwrap();

        let text = func.display(Some(&*isa)).to_string();
        assert!(text.contains("iconst.i32 0x0001_86a0"), "{}", text);
        assert!(text.contains("i32 link [%x1]"), "{}", text);
        let times = timer.into_times();
        assert!(times.get(Pass::Regalloc).total >= times.get(Pass::RaColoring).total);
    }

    #[test]
    fn ill_typed_input_is_reported_before_legalizing() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(Type::B1));
        sig.returns.push(AbiParam::new(Type::B1));
        let mut func = Function::with_name_signature("bits", sig);
        let ebb = func.dfg.make_ebb();
        func.layout.append_ebb(ebb);
        let flag = func.dfg.append_ebb_param(ebb, Type::B1);
        let mut pos = InsertBuilder::at_end(&mut func, ebb);
        let count = pos.unary(Opcode::Popcnt, flag);
        pos.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args: vec![count],
            },
            None,
        );

        let isa = isa::lookup("riscv", Flags::new(), &[]).unwrap();
        let timer = PassTimer::new();
        let err = Context::new(&*isa, &timer).legalize(&mut func).unwrap_err();
        assert_eq!(err.kind(), "verifier");
        assert_eq!(err.message(), "popcnt cannot take b1 to b1");
        assert!(!func.display(None).to_string().contains("ushr_imm"));
    }
}
