//! `test legalizer`: legalize instructions and signatures for the ISA, then
//! check the result.

use super::{run_filecheck, Context, SubTest};
use anyhow::anyhow;
use ebbc_codegen::ir::Function;
use std::borrow::Cow;

pub struct TestLegalizer;

impl SubTest for TestLegalizer {
    fn name(&self) -> &'static str {
        "legalizer"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn needs_isa(&self) -> bool {
        true
    }

    fn run(&self, func: Cow<Function>, context: &mut Context) -> anyhow::Result<()> {
        let isa = context.isa.ok_or_else(|| anyhow!("legalizer needs an ISA"))?;
        let mut func = func.into_owned();
        let comp = ebbc_codegen::Context::new(isa, context.timer);
        comp.legalize(&mut func)?;
        comp.assign_locations(&mut func)?;

        let text = func.display(Some(isa)).to_string();
        run_filecheck(&text, context)
    }
}
