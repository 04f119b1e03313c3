//! Run one fixture

use crate::subtest::{self, Context, SubTest};
use anyhow::{Context as _, Result};
use ebbc_common::{Pass, PassTimer, PassTimes};
use ebbc_filecheck::{Bindings, Checker, CheckerBuilder};
use ebbc_reader::{parse_test, Comment};
use log::debug;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of one fixture, with the pass times it used.
#[derive(Debug)]
pub struct FileResult {
    pub result: Result<()>,
    pub times: PassTimes,
    pub duration: Duration,
}

pub fn run(path: &Path) -> FileResult {
    let timer = PassTimer::new();
    let start = Instant::now();
    let result = {
        let _tt = timer.start(Pass::ProcessFile);
        fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))
            .and_then(|text| run_text(&text, &timer))
    };
    FileResult {
        result,
        times: timer.into_times(),
        duration: start.elapsed(),
    }
}

/// Run the fixture in `text`.
pub fn run_text(text: &str, timer: &PassTimer) -> Result<()> {
    let file = {
        let _tt = timer.start(Pass::ParseText);
        parse_test(text)?
    };
    if file.functions.is_empty() {
        anyhow::bail!("no functions found");
    }
    let tests = file
        .commands
        .iter()
        .map(subtest::new)
        .collect::<Result<Vec<Box<dyn SubTest>>>>()?;
    if tests.is_empty() {
        anyhow::bail!("no test commands found");
    }

    let mut bindings = Bindings::new();
    for (i, (func, details)) in file.functions.iter().enumerate() {
        // `regex:` declarations before the first function apply to all.
        let preamble: &[Comment] = if i == 0 { &file.preamble_comments } else { &[] };
        let checker = build_checker(preamble.iter().chain(&details.comments))?;
        let isa = details.target.isa.as_deref();

        for test in &tests {
            if test.needs_isa() && isa.is_none() {
                anyhow::bail!("test {} needs an `isa` line before %{}", test.name(), func.name);
            }
            debug!("{} %{}", test.name(), func.name);
            let mut context = Context {
                details,
                checker: &checker,
                isa,
                timer,
                bindings: &mut bindings,
            };
            let input = if test.is_mutating() {
                Cow::Owned(func.clone())
            } else {
                Cow::Borrowed(func)
            };
            test.run(input, &mut context)
                .with_context(|| format!("{} of %{} at line {}", test.name(), func.name, details.location.line))?;
        }
    }
    Ok(())
}

fn build_checker<'a>(comments: impl Iterator<Item = &'a Comment>) -> Result<Checker> {
    let mut builder = CheckerBuilder::new();
    for comment in comments {
        builder.directive(&comment.text, comment.line)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtest::CheckFailure;
    use ebbc_common::CodegenError;
    use indoc::indoc;

    fn run_fixture(text: &str) -> Result<()> {
        run_text(text, &PassTimer::new())
    }

    #[test]
    fn passing_fixture() {
        run_fixture(indoc! {"
            test cat
            test verifier
            ; regex: V=v\\d+

            function %add(i32, i32) -> i32 system_v {
            ebb0(v0: i32, v1: i32):
                v2 = iadd v0, v1
                return v2
            }
            ; check: $(sum=$V) = iadd v0, v1
            ; nextln: return $sum
        "})
        .unwrap();
    }

    #[test]
    fn bindings_carry_over_to_later_functions() {
        run_fixture(indoc! {"
            test cat
            function %f() system_v {
            ebb0:
                v7 = iconst.i32 1
                return
            }
            ; check: $(one=v\\d+) = iconst.i32 1

            function %g() system_v {
            ebb0:
                v7 = iconst.i32 1
                return
            }
            ; check: $one = iconst
        "})
        .unwrap();
    }

    #[test]
    fn mismatches_keep_the_output() {
        let err = run_fixture(indoc! {"
            test cat
            function %f() system_v {
            ebb0:
                trap
            }
            ; check: return
        "})
        .unwrap_err();
        let failure = err
            .chain()
            .find_map(|e| e.downcast_ref::<CheckFailure>())
            .unwrap();
        assert_eq!(failure.error.line(), 6);
        assert!(failure.output.contains("    trap\n"));
        assert!(format!("{:#}", err).starts_with("cat of %f at line 2: "));
    }

    #[test]
    fn ghost_parameters_fail_the_fixture() {
        let err = run_fixture(indoc! {"
            test regalloc
            isa riscv
            function %ghost(i32) -> i32 system_v {
            ebb0(v0: i32):
                brz v0, ebb1
                return v0

            ebb1(v1: i32):
                return v1
            }
        "})
        .unwrap_err();
        let codegen = err.chain().find_map(|e| e.downcast_ref::<CodegenError>()).unwrap();
        assert_eq!(codegen.kind(), "invalid-cfg");
    }

    #[test]
    fn expected_verifier_errors() {
        run_fixture(indoc! {"
            test verifier
            function %f() system_v {
            ebb0:
                v1 = iconst.i32 1
            }
            ; error: terminator
        "})
        .unwrap();

        let err = run_fixture(indoc! {"
            test verifier
            function %f() system_v {
            ebb0:
                return
            }
            ; error: terminator
        "})
        .unwrap_err();
        assert_eq!(err.to_string(), "verifier of %f at line 2");
        assert!(format!("{:#}", err).contains("verifier passed, expected `terminator` from line 6"));
    }

    #[test]
    fn fixtures_need_tests_functions_and_isas() {
        assert!(run_fixture("test cat\n").is_err());
        assert!(run_fixture("function %f() system_v {\nebb0:\n    return\n}\n").is_err());
        let err = run_fixture("test legalizer\nfunction %f() system_v {\nebb0:\n    return\n}\n").unwrap_err();
        assert!(err.to_string().contains("needs an `isa` line"));
    }
}
