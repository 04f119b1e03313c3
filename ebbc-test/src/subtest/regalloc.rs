//! `test regalloc`: legalize, assign signature locations and allocate
//! registers, then check the result.

use super::{run_filecheck, Context, SubTest};
use anyhow::anyhow;
use ebbc_codegen::ir::Function;
use std::borrow::Cow;

pub struct TestRegalloc;

impl SubTest for TestRegalloc {
    fn name(&self) -> &'static str {
        "regalloc"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn needs_isa(&self) -> bool {
        true
    }

    fn run(&self, func: Cow<Function>, context: &mut Context) -> anyhow::Result<()> {
        let isa = context.isa.ok_or_else(|| anyhow!("register allocator needs an ISA"))?;
        let mut func = func.into_owned();
        ebbc_codegen::Context::new(isa, context.timer).regalloc(&mut func)?;

        let text = func.display(Some(isa)).to_string();
        run_filecheck(&text, context)
    }
}
