//! Directive patterns
//!
//! Pattern text is literal except for:
//!
//! - `$name` which is the value bound to `name`, or the regex declared by a
//!   `regex: name=...` directive when no value is bound
//! - `$(name=PATTERN)` which matches the regex `PATTERN` and binds `name` to
//!   the matched text; `$other` inside `PATTERN` is expanded as above
//! - `$$` which is a literal `$`
//! - runs of whitespace, which match any run of spaces and tabs

use regex::Regex;
use std::collections::HashMap;

/// Variables visible to directives. Holds both `regex:` declarations and the
/// values captured so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    patterns: HashMap<String, String>,
    values: HashMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_pattern(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.patterns.insert(name.into(), pattern.into());
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn pattern(&self, name: &str) -> Option<&str> {
        self.patterns.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PatternError {
    Syntax(String),
    Undefined(String),
}

/// A pattern translated to a regex, with the variables it captures.
#[derive(Debug)]
pub(crate) struct Compiled {
    pub regex: Regex,
    pub captures: Vec<String>,
}

pub(crate) fn compile(source: &str, env: &Bindings) -> Result<Compiled, PatternError> {
    let mut regex = String::new();
    let mut captures: Vec<String> = Vec::new();
    let mut rest = source.trim();

    while let Some(c) = rest.chars().next() {
        if c == '$' {
            let after = &rest[1..];
            if let Some(tail) = after.strip_prefix('$') {
                regex.push_str(r"\$");
                rest = tail;
            } else if let Some(tail) = after.strip_prefix('(') {
                let close = matching_paren(tail).ok_or_else(|| PatternError::Syntax("unterminated `$(`".to_string()))?;
                let body = &tail[..close];
                rest = &tail[close + 1..];
                match body.split_once('=') {
                    Some((name, pattern)) => {
                        let name = name.trim();
                        check_name(name)?;
                        if captures.iter().any(|n| n == name) {
                            return Err(PatternError::Syntax(format!("`{}` is defined twice", name)));
                        }
                        regex.push_str(&format!("(?P<{}>{})", name, expand(pattern, env)?));
                        captures.push(name.to_string());
                    }
                    None => {
                        let name = body.trim();
                        check_name(name)?;
                        regex.push_str(&use_variable(name, env, &captures)?);
                    }
                }
            } else {
                let len = ident_len(after);
                if len == 0 {
                    return Err(PatternError::Syntax("expected a variable name after `$`".to_string()));
                }
                regex.push_str(&use_variable(&after[..len], env, &captures)?);
                rest = &after[len..];
            }
        } else if c.is_whitespace() {
            regex.push_str(r"[ \t]+");
            rest = rest.trim_start();
        } else {
            let (literal, tail) = rest.split_at(c.len_utf8());
            regex.push_str(&regex::escape(literal));
            rest = tail;
        }
    }

    let regex = Regex::new(&regex).map_err(|e| PatternError::Syntax(e.to_string()))?;
    Ok(Compiled { regex, captures })
}

/// Expand variables in the regex of a `$(name=...)` definition.
fn expand(pattern: &str, env: &Bindings) -> Result<String, PatternError> {
    let mut out = String::new();
    let mut rest = pattern.trim();
    while let Some(i) = rest.find('$') {
        out.push_str(&rest[..i]);
        let after = &rest[i + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push_str(r"\$");
            rest = tail;
            continue;
        }
        let len = ident_len(after);
        if len == 0 {
            // An end anchor.
            out.push('$');
        } else {
            out.push_str(&use_variable(&after[..len], env, &[])?);
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    Ok(out)
}

fn use_variable(name: &str, env: &Bindings, defined_here: &[String]) -> Result<String, PatternError> {
    if defined_here.iter().any(|n| n == name) {
        return Err(PatternError::Syntax(format!(
            "`${}` is used in the directive that defines it",
            name
        )));
    }
    if let Some(value) = env.value(name) {
        Ok(literal(value))
    } else if let Some(pattern) = env.pattern(name) {
        Ok(format!("(?:{})", pattern))
    } else {
        Err(PatternError::Undefined(name.to_string()))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A bound value only matches whole words: `v5` does not match in `v55`.
fn literal(value: &str) -> String {
    let mut out = String::new();
    if value.starts_with(is_word_char) {
        out.push_str(r"\b");
    }
    out.push_str(&regex::escape(value));
    if value.ends_with(is_word_char) {
        out.push_str(r"\b");
    }
    out
}

fn ident_len(s: &str) -> usize {
    if !s.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return 0;
    }
    s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len())
}

fn check_name(name: &str) -> Result<(), PatternError> {
    if !name.is_empty() && ident_len(name) == name.len() {
        Ok(())
    } else {
        Err(PatternError::Syntax(format!("invalid variable name `{}`", name)))
    }
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    check_name(name).is_ok()
}

/// Offset of the `)` closing a `$(` whose body starts `s`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}
