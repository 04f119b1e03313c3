//! `test verifier`: run the IR verifier.
//!
//! A function with `; error: TEXT` comments must fail verification with a
//! message containing one of the texts. Other functions must verify.

use super::{Context, SubTest};
use ebbc_codegen::ir::Function;
use ebbc_codegen::verifier::verify_function;
use ebbc_common::Pass;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*error:\s*(.*?)\s*$").expect("error directive syntax is a valid regex"));

pub struct TestVerifier;

impl SubTest for TestVerifier {
    fn name(&self) -> &'static str {
        "verifier"
    }

    fn run(&self, func: Cow<Function>, context: &mut Context) -> anyhow::Result<()> {
        let expected: Vec<(u32, String)> = context
            .details
            .comments
            .iter()
            .filter_map(|c| {
                ERROR
                    .captures(&c.text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| (c.line, m.as_str().to_string()))
            })
            .collect();

        let result = {
            let _tt = context.timer.start(Pass::Verifier);
            verify_function(&func)
        };
        match (result, expected.first()) {
            (Ok(()), None) => Ok(()),
            (Ok(()), Some((line, text))) => {
                anyhow::bail!("verifier passed, expected `{}` from line {}", text, line)
            }
            (Err(err), None) => Err(err.into()),
            (Err(err), Some(_)) => {
                let message = err.to_string();
                if expected.iter().any(|(_, text)| message.contains(text.as_str())) {
                    Ok(())
                } else {
                    anyhow::bail!("unexpected verifier error: {}", message)
                }
            }
        }
    }
}
