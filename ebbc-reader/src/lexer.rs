//! Fixture lexer
//!
//! Splits fixture text into tokens. Entity names (`v3`, `ebb1`, `sig0`,
//! `fn2`) and type names get their own token kinds so that the parser never
//! has to look inside an identifier. Comments are kept as tokens because the
//! test directives live in them.

use ebbc_codegen::ir::Type;
use ebbc_common::{CodegenError, CodegenResult, SourceLocation};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,
    Equal,
    Arrow,
    Minus,
    /// Text after `;`, without the semicolon.
    Comment(String),
    Value(u32),
    Ebb(u32),
    SigRef(u32),
    FuncRef(u32),
    Type(Type),
    /// `%name`, without the sigil. Function names and registers.
    Name(String),
    Identifier(String),
    /// Integer or float literal as written.
    Number(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LeftParen => write!(f, "`(`"),
            TokenKind::RightParen => write!(f, "`)`"),
            TokenKind::LeftBrace => write!(f, "`{{`"),
            TokenKind::RightBrace => write!(f, "`}}`"),
            TokenKind::LeftBracket => write!(f, "`[`"),
            TokenKind::RightBracket => write!(f, "`]`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Dot => write!(f, "`.`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::Equal => write!(f, "`=`"),
            TokenKind::Arrow => write!(f, "`->`"),
            TokenKind::Minus => write!(f, "`-`"),
            TokenKind::Comment(_) => write!(f, "comment"),
            TokenKind::Value(n) => write!(f, "`v{}`", n),
            TokenKind::Ebb(n) => write!(f, "`ebb{}`", n),
            TokenKind::SigRef(n) => write!(f, "`sig{}`", n),
            TokenKind::FuncRef(n) => write!(f, "`fn{}`", n),
            TokenKind::Type(ty) => write!(f, "`{}`", ty),
            TokenKind::Name(name) => write!(f, "`%{}`", name),
            TokenKind::Identifier(id) => write!(f, "`{}`", id),
            TokenKind::Number(text) => write!(f, "`{}`", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current_char()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn take_while(&mut self, mut pred: impl FnMut(char, &str) -> bool) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current_char() {
            if !pred(ch, &text) {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text
    }

    fn word(&mut self) -> String {
        self.take_while(|ch, _| ch.is_ascii_alphanumeric() || ch == '_')
    }

    /// Digits, hex digits, `_` separators, a decimal point and an exponent.
    fn number(&mut self) -> String {
        let mut text = String::new();
        if self.current_char() == Some('-') {
            self.advance();
            text.push('-');
        }
        text + &self.take_while(|ch, so_far| {
            let hex = so_far.starts_with("0x") || so_far.starts_with("0X");
            ch.is_ascii_alphanumeric()
                || ch == '_'
                || ch == '.'
                || ((ch == '-' || ch == '+') && !hex && so_far.ends_with(|c: char| c == 'e' || c == 'E'))
        })
    }

    pub fn tokenize(mut self) -> CodegenResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while self.current_char().map_or(false, char::is_whitespace) {
                self.advance();
            }
            let location = self.location();
            let ch = match self.current_char() {
                Some(ch) => ch,
                None => break,
            };
            let kind = match ch {
                ';' => {
                    self.advance();
                    TokenKind::Comment(self.take_while(|ch, _| ch != '\n'))
                }
                '(' | ')' | '{' | '}' | '[' | ']' | ',' | '.' | ':' | '=' => {
                    self.advance();
                    match ch {
                        '(' => TokenKind::LeftParen,
                        ')' => TokenKind::RightParen,
                        '{' => TokenKind::LeftBrace,
                        '}' => TokenKind::RightBrace,
                        '[' => TokenKind::LeftBracket,
                        ']' => TokenKind::RightBracket,
                        ',' => TokenKind::Comma,
                        '.' => TokenKind::Dot,
                        ':' => TokenKind::Colon,
                        _ => TokenKind::Equal,
                    }
                }
                '-' if self.peek_char(1) == Some('>') => {
                    self.advance();
                    self.advance();
                    TokenKind::Arrow
                }
                '-' if self.peek_char(1).map_or(false, |c| c.is_ascii_digit()) => TokenKind::Number(self.number()),
                '-' => {
                    self.advance();
                    TokenKind::Minus
                }
                '%' => {
                    self.advance();
                    let name = self.word();
                    if name.is_empty() {
                        return Err(CodegenError::syntax(location, "expected a name after `%`"));
                    }
                    TokenKind::Name(name)
                }
                c if c.is_ascii_digit() => TokenKind::Number(self.number()),
                c if c.is_ascii_alphabetic() || c == '_' => classify(self.word()),
                other => {
                    return Err(CodegenError::syntax(location, format!("unexpected character `{}`", other)));
                }
            };
            tokens.push(Token { kind, location });
        }
        Ok(tokens)
    }
}

/// Entity number after `prefix`, without leading zeros.
fn entity_number(word: &str, prefix: &str) -> Option<u32> {
    let digits = word.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

fn classify(word: String) -> TokenKind {
    if let Some(n) = entity_number(&word, "v") {
        TokenKind::Value(n)
    } else if let Some(n) = entity_number(&word, "ebb") {
        TokenKind::Ebb(n)
    } else if let Some(n) = entity_number(&word, "sig") {
        TokenKind::SigRef(n)
    } else if let Some(n) = entity_number(&word, "fn") {
        TokenKind::FuncRef(n)
    } else if let Some(ty) = Type::from_name(&word) {
        TokenKind::Type(ty)
    } else {
        TokenKind::Identifier(word)
    }
}

pub fn tokenize(input: &str) -> CodegenResult<Vec<Token>> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn instruction_line() {
        assert_eq!(
            kinds("[%x5, -8] v3 = iconst.i32 -0x1_0000 ; note"),
            vec![
                TokenKind::LeftBracket,
                TokenKind::Name("x5".to_string()),
                TokenKind::Comma,
                TokenKind::Number("-8".to_string()),
                TokenKind::RightBracket,
                TokenKind::Value(3),
                TokenKind::Equal,
                TokenKind::Identifier("iconst".to_string()),
                TokenKind::Dot,
                TokenKind::Type(Type::I32),
                TokenKind::Number("-0x1_0000".to_string()),
                TokenKind::Comment(" note".to_string()),
            ]
        );
    }

    #[test]
    fn entities_signatures_and_floats() {
        assert_eq!(
            kinds("fn0 = %g sig1 -> ebb02 [-] 1.5e-3"),
            vec![
                TokenKind::FuncRef(0),
                TokenKind::Equal,
                TokenKind::Name("g".to_string()),
                TokenKind::SigRef(1),
                TokenKind::Arrow,
                TokenKind::Identifier("ebb02".to_string()),
                TokenKind::LeftBracket,
                TokenKind::Minus,
                TokenKind::RightBracket,
                TokenKind::Number("1.5e-3".to_string()),
            ]
        );
    }

    #[test]
    fn locations_are_one_based() {
        let tokens = tokenize("ebb0:\n    return").unwrap();
        assert_eq!(tokens[0].location, SourceLocation::new(1, 1));
        assert_eq!(tokens[2].location, SourceLocation::new(2, 5));
    }

    #[test]
    fn stray_characters_are_syntax_errors() {
        let err = tokenize("v1 = iadd v2, #").unwrap_err();
        assert_eq!(err.to_string(), "Syntax error at 1:15: unexpected character `#`");
    }
}
