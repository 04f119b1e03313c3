//! `test cat`: print the parsed function and check it.

use super::{run_filecheck, Context, SubTest};
use ebbc_codegen::ir::Function;
use std::borrow::Cow;

pub struct TestCat;

impl SubTest for TestCat {
    fn name(&self) -> &'static str {
        "cat"
    }

    fn run(&self, func: Cow<Function>, context: &mut Context) -> anyhow::Result<()> {
        let text = func.display(context.isa).to_string();
        run_filecheck(&text, context)
    }
}
