//! Directive parsing and matching
//!
//! Directives are matched in order against the text. A cursor marks the end
//! of the previous positive match:
//!
//! - `check:` searches from the cursor to the end of the text
//! - `sameln:` searches from the cursor to the end of its line
//! - `nextln:` searches the line after the one holding the cursor
//! - `not:` must not match between the previous and the next positive match,
//!   or the end of the text when no positive match follows
//! - `regex: NAME=PATTERN` declares a pattern for the following directives
//!
//! The text is treated as flat lines. EBB headers are ordinary lines.

use crate::error::{CheckError, CheckResult};
use crate::pattern::{compile, is_valid_name, Bindings, Compiled, PatternError};
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(check|sameln|nextln|not|regex):(.*)$").expect("directive syntax is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Check,
    SameLn,
    NextLn,
    Not,
    Regex,
}

impl DirectiveKind {
    pub fn name(self) -> &'static str {
        match self {
            DirectiveKind::Check => "check",
            DirectiveKind::SameLn => "sameln",
            DirectiveKind::NextLn => "nextln",
            DirectiveKind::Not => "not",
            DirectiveKind::Regex => "regex",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "check" => Some(DirectiveKind::Check),
            "sameln" => Some(DirectiveKind::SameLn),
            "nextln" => Some(DirectiveKind::NextLn),
            "not" => Some(DirectiveKind::Not),
            "regex" => Some(DirectiveKind::Regex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Pattern text after the colon, trimmed.
    pub pattern: String,
    /// Source line of the comment holding the directive.
    pub line: u32,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.pattern)
    }
}

impl Directive {
    /// Recognize a directive in the text of a comment, without the `;`.
    /// Comments that are not directives give `None`.
    pub fn parse(comment: &str, line: u32) -> CheckResult<Option<Directive>> {
        let caps = match DIRECTIVE.captures(comment) {
            Some(caps) => caps,
            None => return Ok(None),
        };
        let kind = match caps.get(1).and_then(|m| DirectiveKind::from_name(m.as_str())) {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let directive = Directive {
            kind,
            pattern: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
            line,
        };
        if kind == DirectiveKind::Regex {
            directive.declaration()?;
        }
        Ok(Some(directive))
    }

    /// Name and regex of a `regex:` directive.
    fn declaration(&self) -> CheckResult<(&str, &str)> {
        let (name, pattern) = self
            .pattern
            .split_once('=')
            .ok_or_else(|| self.syntax_error("expected `NAME=PATTERN`"))?;
        let (name, pattern) = (name.trim(), pattern.trim());
        if !is_valid_name(name) {
            return Err(self.syntax_error(format!("invalid variable name `{}`", name)));
        }
        Regex::new(pattern).map_err(|e| self.syntax_error(e.to_string()))?;
        Ok((name, pattern))
    }

    fn syntax_error(&self, message: impl Into<String>) -> CheckError {
        CheckError::Syntax {
            directive: self.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn mismatch(&self, text: &str) -> CheckError {
        CheckError::ExpectationMismatch {
            directive: self.to_string(),
            line: self.line,
            text: text.to_string(),
        }
    }

    fn compile(&self, env: &Bindings) -> CheckResult<Compiled> {
        compile(&self.pattern, env).map_err(|e| match e {
            PatternError::Syntax(message) => self.syntax_error(message),
            PatternError::Undefined(name) => CheckError::UndefinedVariable {
                directive: self.to_string(),
                line: self.line,
                name,
            },
        })
    }
}

/// Collects directives from the comments of a fixture.
#[derive(Debug, Default)]
pub struct CheckerBuilder {
    directives: Vec<Directive>,
}

impl CheckerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the directive in `comment`, if there is one. Returns whether the
    /// comment was a directive.
    pub fn directive(&mut self, comment: &str, line: u32) -> CheckResult<bool> {
        match Directive::parse(comment, line)? {
            Some(directive) => {
                self.directives.push(directive);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Add the directives found in the `;` comments of `text`, numbering
    /// lines from 1.
    pub fn text(&mut self, text: &str) -> CheckResult<&mut Self> {
        for (number, line) in text.lines().enumerate() {
            if let Some((_, comment)) = line.split_once(';') {
                self.directive(comment, number as u32 + 1)?;
            }
        }
        Ok(self)
    }

    pub fn finish(&mut self) -> Checker {
        Checker {
            directives: std::mem::take(&mut self.directives),
        }
    }
}

/// An ordered list of directives, ready to run against text.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    directives: Vec<Directive>,
}

impl Checker {
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Match every directive against `text`. Captured values are bound in
    /// `env` and stay there for later checks.
    pub fn check(&self, text: &str, env: &mut Bindings) -> CheckResult<()> {
        let mut cursor = Cursor { text, pos: 0 };
        let mut nots: Vec<(&Directive, Regex)> = Vec::new();

        for directive in &self.directives {
            trace!("line {}: {}", directive.line, directive);
            let (start, end) = match directive.kind {
                DirectiveKind::Regex => {
                    let (name, pattern) = directive.declaration()?;
                    env.define_pattern(name, pattern);
                    continue;
                }
                DirectiveKind::Not => {
                    let compiled = directive.compile(env)?;
                    if !compiled.captures.is_empty() {
                        return Err(directive.syntax_error("`not:` cannot define variables"));
                    }
                    nots.push((directive, compiled.regex));
                    continue;
                }
                DirectiveKind::Check => (cursor.pos, text.len()),
                DirectiveKind::SameLn => (cursor.pos, cursor.line_end(cursor.pos)),
                DirectiveKind::NextLn => cursor.next_line(),
            };

            let compiled = directive.compile(env)?;
            let caps = compiled
                .regex
                .captures_at(&text[..end], start)
                .ok_or_else(|| directive.mismatch(cursor.line_at(start)))?;
            let (match_start, match_end) = caps.get(0).map_or((start, start), |m| (m.start(), m.end()));

            cursor.reject(&mut nots, match_start)?;
            for name in &compiled.captures {
                if let Some(m) = caps.name(name) {
                    trace!("bound ${} = {}", name, m.as_str());
                    env.bind(name.as_str(), m.as_str());
                }
            }
            cursor.pos = match_end;
        }
        cursor.reject(&mut nots, text.len())
    }
}

struct Cursor<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn line_end(&self, from: usize) -> usize {
        self.text[from..].find('\n').map_or(self.text.len(), |i| from + i)
    }

    /// Range of the line after the cursor's line.
    fn next_line(&self) -> (usize, usize) {
        if self.pos == 0 {
            return (0, self.line_end(0));
        }
        let end = self.line_end(self.pos);
        if end == self.text.len() {
            (end, end)
        } else {
            (end + 1, self.line_end(end + 1))
        }
    }

    /// The line holding `pos`, or the following one when `pos` ends a line.
    fn line_at(&self, pos: usize) -> &'t str {
        let pos = if self.text[pos..].starts_with('\n') { pos + 1 } else { pos };
        let start = self.text[..pos].rfind('\n').map_or(0, |i| i + 1);
        let line = self.text[start..self.line_end(pos)].trim();
        if line.is_empty() && pos >= self.text.len() {
            "<end of output>"
        } else {
            line
        }
    }

    /// Fail if a pending `not:` matches between the cursor and `end`.
    fn reject(&self, nots: &mut Vec<(&Directive, Regex)>, end: usize) -> CheckResult<()> {
        for (directive, regex) in nots.drain(..) {
            if let Some(m) = regex.find_at(&self.text[..end], self.pos) {
                return Err(directive.mismatch(self.line_at(m.start())));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const OUTPUT: &str = indoc! {"
        function %f(i32) -> i32 system_v {
        ebb0(v0: i32):
            v5 = iconst.i32 0x3b9a_ca00
            v1 = iadd v0, v5
            [%x10] v2 = iadd v1, v1
            return v2
        }
    "};

    fn checker(directives: &str) -> Checker {
        CheckerBuilder::new().text(directives).unwrap().finish()
    }

    fn run(directives: &str) -> CheckResult<Bindings> {
        let mut env = Bindings::new();
        checker(directives).check(OUTPUT, &mut env)?;
        Ok(env)
    }

    #[test]
    fn captured_values_are_back_references() {
        let env = run(indoc! {"
            ; regex: V=v\\d+
            ; check: $(cst=$V) = iconst.i32 0x3b9a_ca00
            ; check: v1 = iadd v0, $cst
        "})
        .unwrap();
        assert_eq!(env.value("cst"), Some("v5"));

        let mut env = Bindings::new();
        env.define_pattern("V", r"v\d+");
        let checker = checker(indoc! {"
            ; check: $(cst=$V) = iconst.i32 0x3b9a_ca00
            ; check: v1 = iadd v0, $cst
        "});
        let other = OUTPUT.replace("iadd v0, v5", "iadd v0, v6");
        assert_eq!(
            checker.check(&other, &mut env),
            Err(CheckError::ExpectationMismatch {
                directive: "check: v1 = iadd v0, $cst".to_string(),
                line: 2,
                text: "v1 = iadd v0, v6".to_string(),
            })
        );
    }

    #[test]
    fn line_anchors() {
        run(indoc! {"
            ; check: ebb0(
            ; nextln: iconst
            ; sameln: 0x3b9a_ca00
            ; nextln: iadd v0
            ; check: [%x10]
            ; sameln: iadd v1, v1
            ; nextln: return
        "})
        .unwrap();

        let err = run(indoc! {"
            ; check: iconst
            ; nextln: return
        "})
        .unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(matches!(err, CheckError::ExpectationMismatch { ref text, .. } if text == "v1 = iadd v0, v5"));

        let err = run(indoc! {"
            ; check: v1 = iadd
            ; sameln: iconst
        "})
        .unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn not_checks_the_gap_between_matches() {
        run(indoc! {"
            ; check: iconst
            ; not: spill
            ; check: return
            ; not: iconst
        "})
        .unwrap();

        let err = run(indoc! {"
            ; check: ebb0
            ; not: v1 = iadd
            ; check: return
        "})
        .unwrap_err();
        assert_eq!(
            err,
            CheckError::ExpectationMismatch {
                directive: "not: v1 = iadd".to_string(),
                line: 2,
                text: "v1 = iadd v0, v5".to_string(),
            }
        );

        let err = run("; check: iadd\n; not: return\n").unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn bad_directives() {
        assert!(matches!(
            CheckerBuilder::new().text("; regex: V"),
            Err(CheckError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            CheckerBuilder::new().text("\n; regex: V=(unclosed"),
            Err(CheckError::Syntax { line: 2, .. })
        ));
        assert_eq!(
            run("; check: v1 = iadd v0, $cst"),
            Err(CheckError::UndefinedVariable {
                directive: "check: v1 = iadd v0, $cst".to_string(),
                line: 1,
                name: "cst".to_string(),
            })
        );
        assert!(matches!(run("; not: $(x=v1)"), Err(CheckError::Syntax { .. })));
    }

    #[test]
    fn plain_comments_are_not_directives() {
        let mut builder = CheckerBuilder::new();
        assert!(!builder.directive(" checks the carry", 1).unwrap());
        assert!(!builder.directive(" error: unreachable", 2).unwrap());
        assert!(builder.directive("check:", 3).unwrap());
        assert_eq!(builder.finish().directives().len(), 1);
    }
}
