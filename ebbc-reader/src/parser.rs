//! Fixture parser
//!
//! A recursive descent parser over the token stream. Header lines (`test`,
//! `set`, `isa`) end at the end of their line; everything else is free form.
//!
//! Values and EBBs keep the numbers they have in the text. Result types are
//! inferred once every operand type is known, so an instruction may use a
//! value defined further down in the layout.

use crate::lexer::{tokenize, Token, TokenKind};
use crate::testfile::{Comment, Details, TargetSpec, TestCommand, TestFile, TestOption};
use ebbc_codegen::ir::{
    AbiParam, ArgumentPurpose, CallConv, Ebb, ExtFuncData, FuncRef, Function, Ieee32, Ieee64, Imm64, Inst,
    InstructionData, InstructionFormat, IntCC, Opcode, SigRef, Signature, Type, Value, ValueLoc,
};
use ebbc_codegen::isa::{self, Flags, TargetIsa};
use ebbc_common::{CodegenError, CodegenResult, SourceLocation};
use log::debug;
use std::sync::Arc;

/// Parse a whole fixture file.
pub fn parse_test(text: &str) -> CodegenResult<TestFile> {
    Parser::new(tokenize(text)?).parse_test_file()
}

/// Parse the functions of `text`, ignoring the test header.
pub fn parse_functions(text: &str) -> CodegenResult<Vec<Function>> {
    Ok(parse_test(text)?.functions.into_iter().map(|(func, _)| func).collect())
}

/// An instruction whose results are not typed yet.
struct PendingInst {
    inst: Inst,
    results: Vec<Value>,
    ctrl: Option<Type>,
    locations: Option<Vec<ValueLoc>>,
    location: SourceLocation,
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    comments: Vec<Comment>,
    flags: Flags,
    isa_decl: Option<(String, Vec<(String, Option<String>)>, SourceLocation)>,
    isa: Option<Arc<dyn TargetIsa>>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            comments: Vec::new(),
            flags: Flags::new(),
            isa_decl: None,
            isa: None,
        }
    }

    // Token access.

    /// Move comments at the current position aside.
    fn skip_comments(&mut self) {
        while let Some(Token {
            kind: TokenKind::Comment(text),
            location,
        }) = self.tokens.get(self.position)
        {
            self.comments.push(Comment {
                line: location.line,
                text: text.clone(),
            });
            self.position += 1;
        }
    }

    fn peek(&mut self) -> Option<TokenKind> {
        self.skip_comments();
        self.tokens.get(self.position).map(|t| t.kind.clone())
    }

    /// The next token if it is on `line`.
    fn peek_on_line(&mut self, line: u32) -> Option<TokenKind> {
        self.skip_comments();
        self.tokens
            .get(self.position)
            .filter(|t| t.location.line == line)
            .map(|t| t.kind.clone())
    }

    fn location(&mut self) -> SourceLocation {
        self.skip_comments();
        match self.tokens.get(self.position).or_else(|| self.tokens.last()) {
            Some(token) => token.location,
            None => SourceLocation::new(1, 1),
        }
    }

    fn next(&mut self) -> CodegenResult<Token> {
        self.skip_comments();
        match self.tokens.get(self.position) {
            Some(token) => {
                self.position += 1;
                Ok(token.clone())
            }
            None => Err(CodegenError::syntax(self.location(), "unexpected end of file")),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CodegenResult<Token> {
        let location = self.location();
        let token = self.next()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(CodegenError::syntax(location, format!("expected {}, found {}", kind, token.kind)))
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().as_ref() == Some(&kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    // Header.

    fn parse_test_file(mut self) -> CodegenResult<TestFile> {
        let mut file = TestFile {
            commands: Vec::new(),
            preamble_comments: Vec::new(),
            functions: Vec::new(),
        };
        loop {
            let kind = self.peek();
            let location = self.location();
            match kind {
                None => break,
                Some(TokenKind::Identifier(word)) => {
                    self.position += 1;
                    match word.as_str() {
                        "test" => {
                            let command = self.parse_test_command(location)?;
                            file.commands.push(command);
                        }
                        "set" => self.parse_set_line(location)?,
                        "isa" => self.parse_isa_line(location)?,
                        "function" => {
                            self.flush_comments(&mut file);
                            let (func, details) = self.parse_function(location)?;
                            debug!("parsed %{} at line {}", func.name, location.line);
                            file.functions.push((func, details));
                        }
                        other => {
                            return Err(CodegenError::syntax(
                                location,
                                format!("expected `test`, `set`, `isa` or `function`, found `{}`", other),
                            ))
                        }
                    }
                }
                Some(other) => {
                    return Err(CodegenError::syntax(
                        location,
                        format!("expected `test`, `set`, `isa` or `function`, found {}", other),
                    ))
                }
            }
        }
        self.flush_comments(&mut file);
        Ok(file)
    }

    /// Hand the collected comments to the last function, or to the preamble.
    fn flush_comments(&mut self, file: &mut TestFile) {
        let comments = std::mem::take(&mut self.comments);
        match file.functions.last_mut() {
            Some((_, details)) => details.comments.extend(comments),
            None => file.preamble_comments.extend(comments),
        }
    }

    /// `name[=value]` words up to the end of `line`.
    fn line_options(&mut self, line: u32) -> CodegenResult<Vec<(String, Option<String>, SourceLocation)>> {
        let mut options = Vec::new();
        while let Some(kind) = self.peek_on_line(line) {
            let location = self.location();
            self.position += 1;
            let name = word_text(&kind)
                .ok_or_else(|| CodegenError::syntax(location, format!("expected a setting, found {}", kind)))?;
            let value = if self.peek_on_line(line) == Some(TokenKind::Equal) {
                self.position += 1;
                let token = self.next()?;
                Some(word_text(&token.kind).ok_or_else(|| {
                    CodegenError::syntax(token.location, format!("expected a value, found {}", token.kind))
                })?)
            } else {
                None
            };
            options.push((name, value, location));
        }
        Ok(options)
    }

    fn parse_test_command(&mut self, location: SourceLocation) -> CodegenResult<TestCommand> {
        let mut options = self.line_options(location.line)?.into_iter();
        let command = match options.next() {
            Some((name, None, _)) => name,
            _ => return Err(CodegenError::syntax(location, "expected a test kind after `test`")),
        };
        let options = options
            .map(|(name, value, _)| match value {
                Some(value) => TestOption::Value(name, value),
                None => TestOption::Flag(name),
            })
            .collect();
        Ok(TestCommand { command, options })
    }

    fn parse_set_line(&mut self, location: SourceLocation) -> CodegenResult<()> {
        for (name, value, at) in self.line_options(location.line)? {
            self.flags
                .set(&name, value.as_deref())
                .map_err(|e| CodegenError::syntax(at, e.to_string()))?;
        }
        if let Some((name, isa_flags, at)) = self.isa_decl.clone() {
            self.isa = Some(self.build_isa(&name, &isa_flags, at)?);
        }
        Ok(())
    }

    fn parse_isa_line(&mut self, location: SourceLocation) -> CodegenResult<()> {
        let mut options = self.line_options(location.line)?.into_iter();
        let (name, at) = match options.next() {
            Some((name, None, at)) => (name, at),
            _ => return Err(CodegenError::syntax(location, "expected an ISA name after `isa`")),
        };
        let isa_flags: Vec<(String, Option<String>)> = options.map(|(n, v, _)| (n, v)).collect();
        self.isa = Some(self.build_isa(&name, &isa_flags, at)?);
        self.isa_decl = Some((name, isa_flags, at));
        Ok(())
    }

    fn build_isa(
        &self,
        name: &str,
        isa_flags: &[(String, Option<String>)],
        at: SourceLocation,
    ) -> CodegenResult<Arc<dyn TargetIsa>> {
        isa::lookup(name, self.flags.clone(), isa_flags).map_err(|e| CodegenError::syntax(at, e.to_string()))
    }

    // Functions.

    fn parse_function(&mut self, location: SourceLocation) -> CodegenResult<(Function, Details)> {
        let name = match self.next()? {
            Token {
                kind: TokenKind::Name(name),
                ..
            } => name,
            token => {
                return Err(CodegenError::syntax(
                    token.location,
                    format!("expected a function name, found {}", token.kind),
                ))
            }
        };
        let signature = self.parse_signature()?;
        let mut func = Function::with_name_signature(name, signature);
        self.expect(TokenKind::LeftBrace)?;
        self.parse_preamble(&mut func)?;

        let mut pending = Vec::new();
        let mut referenced = Vec::new();
        while let Some(TokenKind::Ebb(_)) = self.peek() {
            self.parse_ebb(&mut func, &mut pending, &mut referenced)?;
        }
        self.expect(TokenKind::RightBrace)?;

        for (ebb, at) in referenced {
            if !func.layout.is_ebb_inserted(ebb) {
                return Err(CodegenError::syntax(at, format!("undeclared EBB {}", ebb)));
            }
        }
        resolve_results(&mut func, pending)?;

        let details = Details {
            location,
            comments: Vec::new(),
            target: TargetSpec {
                flags: self.flags.clone(),
                isa: self.isa.clone(),
            },
        };
        Ok((func, details))
    }

    fn parse_preamble(&mut self, func: &mut Function) -> CodegenResult<()> {
        loop {
            let location = self.location();
            match self.peek() {
                Some(TokenKind::SigRef(n)) => {
                    self.position += 1;
                    if n as usize != func.dfg.signatures.len() {
                        return Err(CodegenError::syntax(
                            location,
                            format!("expected sig{}, signatures are numbered in order", func.dfg.signatures.len()),
                        ));
                    }
                    self.expect(TokenKind::Equal)?;
                    let sig = self.parse_signature()?;
                    func.dfg.signatures.push(sig);
                }
                Some(TokenKind::FuncRef(n)) => {
                    self.position += 1;
                    if n as usize != func.dfg.ext_funcs.len() {
                        return Err(CodegenError::syntax(
                            location,
                            format!("expected fn{}, functions are numbered in order", func.dfg.ext_funcs.len()),
                        ));
                    }
                    self.expect(TokenKind::Equal)?;
                    let name = match self.next()? {
                        Token {
                            kind: TokenKind::Name(name),
                            ..
                        } => name,
                        token => {
                            return Err(CodegenError::syntax(
                                token.location,
                                format!("expected a function name, found {}", token.kind),
                            ))
                        }
                    };
                    let signature = self.sig_ref(func)?;
                    func.dfg.ext_funcs.push(ExtFuncData { name, signature });
                }
                _ => return Ok(()),
            }
        }
    }

    fn sig_ref(&mut self, func: &Function) -> CodegenResult<SigRef> {
        let token = self.next()?;
        match token.kind {
            TokenKind::SigRef(n) if (n as usize) < func.dfg.signatures.len() => Ok(SigRef::from_u32(n)),
            TokenKind::SigRef(n) => Err(CodegenError::syntax(token.location, format!("undeclared signature sig{}", n))),
            other => Err(CodegenError::syntax(token.location, format!("expected a signature, found {}", other))),
        }
    }

    /// `(params) [-> returns] [call_conv]`
    fn parse_signature(&mut self) -> CodegenResult<Signature> {
        let mut sig = Signature::new(CallConv::SystemV);
        self.expect(TokenKind::LeftParen)?;
        if !self.eat(TokenKind::RightParen) {
            sig.params = self.parse_abi_params()?;
            self.expect(TokenKind::RightParen)?;
        }
        if self.eat(TokenKind::Arrow) {
            sig.returns = self.parse_abi_params()?;
        }
        if let Some(TokenKind::Identifier(word)) = self.peek() {
            if let Ok(call_conv) = word.parse::<CallConv>() {
                self.position += 1;
                sig.call_conv = call_conv;
            }
        }
        Ok(sig)
    }

    fn parse_abi_params(&mut self) -> CodegenResult<Vec<AbiParam>> {
        let mut params = Vec::new();
        loop {
            let ty = self.parse_type()?;
            let mut param = AbiParam::new(ty);
            if self.peek() == Some(TokenKind::Identifier("link".to_string())) {
                self.position += 1;
                param.purpose = ArgumentPurpose::Link;
            }
            if self.eat(TokenKind::LeftBracket) {
                param.location = self.parse_location()?;
                self.expect(TokenKind::RightBracket)?;
            }
            params.push(param);
            if !self.eat(TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    fn parse_type(&mut self) -> CodegenResult<Type> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Type(ty) => Ok(ty),
            TokenKind::Identifier(word) => Err(CodegenError::syntax(token.location, format!("unknown type `{}`", word))),
            other => Err(CodegenError::syntax(token.location, format!("expected a type, found {}", other))),
        }
    }

    /// `%reg`, a stack offset, or `-`.
    fn parse_location(&mut self) -> CodegenResult<ValueLoc> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Minus => Ok(ValueLoc::Unassigned),
            TokenKind::Number(text) => text
                .parse::<i32>()
                .map(ValueLoc::Stack)
                .map_err(|_| CodegenError::syntax(token.location, format!("invalid stack offset `{}`", text))),
            TokenKind::Name(reg) => {
                let isa = self.isa.as_ref().ok_or_else(|| {
                    CodegenError::syntax(token.location, "register locations need an `isa` line")
                })?;
                isa.register_info()
                    .parse_regunit(&reg)
                    .map(ValueLoc::Reg)
                    .ok_or_else(|| {
                        CodegenError::syntax(token.location, format!("unknown register `%{}` for {}", reg, isa.name()))
                    })
            }
            other => Err(CodegenError::syntax(token.location, format!("expected a location, found {}", other))),
        }
    }

    fn parse_ebb(
        &mut self,
        func: &mut Function,
        pending: &mut Vec<PendingInst>,
        referenced: &mut Vec<(Ebb, SourceLocation)>,
    ) -> CodegenResult<()> {
        let header = self.next()?;
        let ebb = match header.kind {
            TokenKind::Ebb(n) => Ebb::from_u32(n),
            other => return Err(CodegenError::syntax(header.location, format!("expected an EBB, found {}", other))),
        };
        func.dfg.ensure_ebb(ebb);
        if func.layout.is_ebb_inserted(ebb) {
            return Err(CodegenError::syntax(header.location, format!("duplicate definition of {}", ebb)));
        }
        func.layout.append_ebb(ebb);

        if self.eat(TokenKind::LeftParen) {
            loop {
                let location = self.location();
                let value = self.parse_value()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                func.dfg
                    .define_ebb_param(ebb, value, ty)
                    .map_err(|e| CodegenError::syntax(location, e))?;
                if self.eat(TokenKind::LeftBracket) {
                    let loc = self.parse_location()?;
                    self.expect(TokenKind::RightBracket)?;
                    func.locations.set(value, loc);
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RightParen)?;
        }
        self.expect(TokenKind::Colon)?;

        loop {
            match self.peek() {
                None | Some(TokenKind::Ebb(_)) | Some(TokenKind::RightBrace) => return Ok(()),
                Some(_) => {
                    let inst = self.parse_instruction(func, ebb, referenced)?;
                    pending.push(inst);
                }
            }
        }
    }

    fn parse_value(&mut self) -> CodegenResult<Value> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Value(n) => Ok(Value::from_u32(n)),
            other => Err(CodegenError::syntax(token.location, format!("expected a value, found {}", other))),
        }
    }

    fn parse_instruction(
        &mut self,
        func: &mut Function,
        ebb: Ebb,
        referenced: &mut Vec<(Ebb, SourceLocation)>,
    ) -> CodegenResult<PendingInst> {
        let location = self.location();
        let locations = if self.eat(TokenKind::LeftBracket) {
            let mut locs = vec![self.parse_location()?];
            while self.eat(TokenKind::Comma) {
                locs.push(self.parse_location()?);
            }
            self.expect(TokenKind::RightBracket)?;
            Some(locs)
        } else {
            None
        };

        let mut results = Vec::new();
        if let Some(TokenKind::Value(_)) = self.peek() {
            results.push(self.parse_value()?);
            while self.eat(TokenKind::Comma) {
                results.push(self.parse_value()?);
            }
            self.expect(TokenKind::Equal)?;
        }

        let opcode_token = self.next()?;
        let opcode = match &opcode_token.kind {
            TokenKind::Identifier(word) => word
                .parse::<Opcode>()
                .map_err(|e| CodegenError::syntax(opcode_token.location, e))?,
            other => {
                return Err(CodegenError::syntax(
                    opcode_token.location,
                    format!("expected an opcode, found {}", other),
                ))
            }
        };
        let ctrl = if self.eat(TokenKind::Dot) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let data = self.parse_operands(func, opcode, opcode_token.location.line, referenced)?;
        let inst = func.dfg.make_inst(data);
        func.layout.append_inst(inst, ebb);
        Ok(PendingInst {
            inst,
            results,
            ctrl,
            locations,
            location,
        })
    }

    fn parse_imm(&mut self) -> CodegenResult<Imm64> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(text) => text.parse().map_err(|e| CodegenError::syntax(token.location, e)),
            other => Err(CodegenError::syntax(token.location, format!("expected an immediate, found {}", other))),
        }
    }

    /// Text of a float literal, including `inf`, `-inf` and `NaN`.
    fn float_text(&mut self) -> CodegenResult<(String, SourceLocation)> {
        let token = self.next()?;
        let text = match token.kind {
            TokenKind::Number(text) | TokenKind::Identifier(text) => text,
            TokenKind::Minus => match self.next()?.kind {
                TokenKind::Identifier(text) => format!("-{}", text),
                other => return Err(CodegenError::syntax(token.location, format!("expected a float, found {}", other))),
            },
            other => return Err(CodegenError::syntax(token.location, format!("expected a float, found {}", other))),
        };
        Ok((text, token.location))
    }

    fn parse_cond(&mut self) -> CodegenResult<IntCC> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Identifier(word) => word
                .parse()
                .map_err(|_| CodegenError::syntax(token.location, format!("unknown condition code `{}`", word))),
            other => Err(CodegenError::syntax(token.location, format!("expected a condition code, found {}", other))),
        }
    }

    fn parse_ebb_ref(&mut self, referenced: &mut Vec<(Ebb, SourceLocation)>, func: &mut Function) -> CodegenResult<Ebb> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Ebb(n) => {
                let ebb = Ebb::from_u32(n);
                func.dfg.ensure_ebb(ebb);
                referenced.push((ebb, token.location));
                Ok(ebb)
            }
            other => Err(CodegenError::syntax(token.location, format!("expected an EBB, found {}", other))),
        }
    }

    /// `(v1, v2)`, possibly empty.
    fn parse_value_list(&mut self) -> CodegenResult<Vec<Value>> {
        self.expect(TokenKind::LeftParen)?;
        let mut values = Vec::new();
        if self.eat(TokenKind::RightParen) {
            return Ok(values);
        }
        loop {
            values.push(self.parse_value()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen)?;
        Ok(values)
    }

    fn parse_ebb_args(&mut self) -> CodegenResult<Vec<Value>> {
        if self.peek() == Some(TokenKind::LeftParen) {
            self.parse_value_list()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_operands(
        &mut self,
        func: &mut Function,
        opcode: Opcode,
        line: u32,
        referenced: &mut Vec<(Ebb, SourceLocation)>,
    ) -> CodegenResult<InstructionData> {
        let data = match opcode.format() {
            InstructionFormat::NullAry => InstructionData::NullAry { opcode },
            InstructionFormat::UnaryImm => InstructionData::UnaryImm {
                opcode,
                imm: self.parse_imm()?,
            },
            InstructionFormat::UnaryIeee32 => {
                let (text, at) = self.float_text()?;
                InstructionData::UnaryIeee32 {
                    opcode,
                    imm: text.parse::<Ieee32>().map_err(|e| CodegenError::syntax(at, e))?,
                }
            }
            InstructionFormat::UnaryIeee64 => {
                let (text, at) = self.float_text()?;
                InstructionData::UnaryIeee64 {
                    opcode,
                    imm: text.parse::<Ieee64>().map_err(|e| CodegenError::syntax(at, e))?,
                }
            }
            InstructionFormat::UnaryBool => {
                let token = self.next()?;
                let imm = match token.kind {
                    TokenKind::Identifier(word) if word == "true" => true,
                    TokenKind::Identifier(word) if word == "false" => false,
                    other => {
                        return Err(CodegenError::syntax(
                            token.location,
                            format!("expected `true` or `false`, found {}", other),
                        ))
                    }
                };
                InstructionData::UnaryBool { opcode, imm }
            }
            InstructionFormat::Unary => InstructionData::Unary {
                opcode,
                arg: self.parse_value()?,
            },
            InstructionFormat::Binary => {
                let a = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let b = self.parse_value()?;
                InstructionData::Binary { opcode, args: [a, b] }
            }
            InstructionFormat::BinaryImm => {
                let arg = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                InstructionData::BinaryImm {
                    opcode,
                    arg,
                    imm: self.parse_imm()?,
                }
            }
            InstructionFormat::Ternary => {
                let a = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let b = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let c = self.parse_value()?;
                InstructionData::Ternary { opcode, args: [a, b, c] }
            }
            InstructionFormat::IntCompare => {
                let cond = self.parse_cond()?;
                let a = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let b = self.parse_value()?;
                InstructionData::IntCompare {
                    opcode,
                    cond,
                    args: [a, b],
                }
            }
            InstructionFormat::IntCompareImm => {
                let cond = self.parse_cond()?;
                let arg = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                InstructionData::IntCompareImm {
                    opcode,
                    cond,
                    arg,
                    imm: self.parse_imm()?,
                }
            }
            InstructionFormat::Jump => {
                let destination = self.parse_ebb_ref(referenced, func)?;
                InstructionData::Jump {
                    opcode,
                    destination,
                    args: self.parse_ebb_args()?,
                }
            }
            InstructionFormat::Branch => {
                let arg = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let destination = self.parse_ebb_ref(referenced, func)?;
                InstructionData::Branch {
                    opcode,
                    arg,
                    destination,
                    args: self.parse_ebb_args()?,
                }
            }
            InstructionFormat::BranchIcmp => {
                let cond = self.parse_cond()?;
                let a = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let b = self.parse_value()?;
                self.expect(TokenKind::Comma)?;
                let destination = self.parse_ebb_ref(referenced, func)?;
                InstructionData::BranchIcmp {
                    opcode,
                    cond,
                    cmp: [a, b],
                    destination,
                    args: self.parse_ebb_args()?,
                }
            }
            InstructionFormat::Call => {
                let token = self.next()?;
                let func_ref = match token.kind {
                    TokenKind::FuncRef(n) if (n as usize) < func.dfg.ext_funcs.len() => FuncRef::from_u32(n),
                    TokenKind::FuncRef(n) => {
                        return Err(CodegenError::syntax(token.location, format!("undeclared function fn{}", n)))
                    }
                    other => {
                        return Err(CodegenError::syntax(
                            token.location,
                            format!("expected a function reference, found {}", other),
                        ))
                    }
                };
                InstructionData::Call {
                    opcode,
                    func_ref,
                    args: self.parse_value_list()?,
                }
            }
            InstructionFormat::CallIndirect => {
                let sig_ref = self.sig_ref(func)?;
                self.expect(TokenKind::Comma)?;
                let callee = self.parse_value()?;
                InstructionData::CallIndirect {
                    opcode,
                    sig_ref,
                    callee,
                    args: self.parse_value_list()?,
                }
            }
            InstructionFormat::MultiAry => {
                let mut args = Vec::new();
                if let Some(TokenKind::Value(_)) = self.peek_on_line(line) {
                    args.push(self.parse_value()?);
                    while self.peek_on_line(line) == Some(TokenKind::Comma) {
                        self.position += 1;
                        args.push(self.parse_value()?);
                    }
                }
                InstructionData::MultiAry { opcode, args }
            }
        };
        Ok(data)
    }
}

/// Text usable as a setting name or value.
fn word_text(kind: &TokenKind) -> Option<String> {
    match kind {
        TokenKind::Identifier(word) | TokenKind::Number(word) => Some(word.clone()),
        TokenKind::Type(ty) => Some(ty.to_string()),
        TokenKind::Value(_) | TokenKind::Ebb(_) | TokenKind::SigRef(_) | TokenKind::FuncRef(_) => {
            Some(kind.to_string().trim_matches('`').to_string())
        }
        _ => None,
    }
}

/// Type and define the results of every parsed instruction. An instruction
/// is typed once all its operands are.
fn resolve_results(func: &mut Function, mut pending: Vec<PendingInst>) -> CodegenResult<()> {
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for item in pending {
            let ready = func.dfg[item.inst]
                .arguments()
                .iter()
                .all(|&v| func.dfg.try_value_type(v).is_some());
            if ready {
                define_results(func, item)?;
            } else {
                waiting.push(item);
            }
        }
        if waiting.len() == before {
            let first = &waiting[0];
            let missing = func.dfg[first.inst]
                .arguments()
                .into_iter()
                .find(|&v| func.dfg.try_value_type(v).is_none());
            let message = match missing {
                Some(v) => format!("use of undefined value {}", v),
                None => "operands are never defined".to_string(),
            };
            return Err(CodegenError::syntax(first.location, message));
        }
        pending = waiting;
    }
    Ok(())
}

fn define_results(func: &mut Function, item: PendingInst) -> CodegenResult<()> {
    let data = &func.dfg[item.inst];
    let opcode = data.opcode();
    let types = func
        .dfg
        .result_types(data, item.ctrl)
        .map_err(|e| CodegenError::syntax(item.location, e))?;
    if types.len() != item.results.len() {
        return Err(CodegenError::syntax(
            item.location,
            format!("`{}` has {} results, {} given", opcode, types.len(), item.results.len()),
        ));
    }
    if let (Some(ctrl), Some(&inferred)) = (item.ctrl, types.first()) {
        if !opcode.requires_typevar() && ctrl != inferred {
            return Err(CodegenError::syntax(
                item.location,
                format!("declared type {} does not match the inferred type {}", ctrl, inferred),
            ));
        }
    }
    for (&value, ty) in item.results.iter().zip(types) {
        func.dfg
            .define_result(item.inst, value, ty)
            .map_err(|e| CodegenError::syntax(item.location, e))?;
    }
    if let Some(locs) = item.locations {
        if locs.len() != item.results.len() {
            return Err(CodegenError::syntax(
                item.location,
                format!("{} locations given for {} results", locs.len(), item.results.len()),
            ));
        }
        for (&value, loc) in item.results.iter().zip(locs) {
            func.locations.set(value, loc);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn syntax_error(text: &str) -> String {
        parse_test(text).unwrap_err().to_string()
    }

    #[test]
    fn header_lines_configure_following_functions() {
        let file = parse_test(indoc! {"
            ; leading note
            test regalloc
            test cat verbose level=2
            set is_64bit=1
            isa intel haswell

            function %f() system_v {
            ebb0:
                return
            }
            ; check: return
            set enable_verifier=0
            function %g() system_v {
            ebb0:
                trap
            }
        "})
        .unwrap();

        assert_eq!(file.commands.len(), 2);
        assert_eq!(file.commands[1].to_string(), "cat verbose level=2");
        assert_eq!(file.preamble_comments[0].text, " leading note");

        let (f, details) = &file.functions[0];
        assert_eq!(f.name, "f");
        assert_eq!(details.location, SourceLocation::new(7, 1));
        assert!(details.target.flags.is_64bit);
        assert!(details.target.flags.enable_verifier);
        assert_eq!(details.target.isa.as_ref().map(|isa| isa.name()), Some("intel"));
        assert_eq!(details.comments.len(), 1);
        assert_eq!(details.comments[0].line, 11);

        let (_, details) = &file.functions[1];
        assert!(!details.target.flags.enable_verifier);
        let isa = details.target.isa.as_ref().unwrap();
        assert!(!isa.flags().enable_verifier);
    }

    #[test]
    fn preamble_calls_and_locations() {
        let text = indoc! {"
            isa riscv
            function %caller(i32 [%x10], i64 [8]) -> i32 [%x10] fast {
                sig0 = (i32) -> i32 system_v
                fn0 = %callee sig0

            ebb0(v1: i32 [%x10], v2: i64 [8]):
                [%x11] v3 = call fn0(v1)
                [-8] v4 = iconst.i32 -3
                v5 = f32const -inf
                return v3
            }
        "};
        let funcs = parse_functions(text).unwrap();
        let func = &funcs[0];
        assert_eq!(func.signature.call_conv, CallConv::Fast);
        assert_eq!(func.signature.params[0].location, ValueLoc::Reg(10));
        assert_eq!(func.signature.params[1].location, ValueLoc::Stack(8));
        assert_eq!(func.dfg.ext_funcs[0].name, "callee");
        assert_eq!(func.locations.get(Value::new(3)), ValueLoc::Reg(11));
        assert_eq!(func.locations.get(Value::new(4)), ValueLoc::Stack(-8));
        assert_eq!(func.dfg.value_type(Value::new(5)), Type::F32);
        assert_eq!(func.dfg.value_type(Value::new(3)), Type::I32);
    }

    #[test]
    fn values_may_be_used_before_their_definition() {
        let funcs = parse_functions(indoc! {"
            function %loop(i32) -> i32 system_v {
            ebb0(v1: i32):
                jump ebb1(v1)

            ebb1(v2: i32):
                brz v2, ebb2
                jump ebb3

            ebb3:
                v4 = iadd v2, v3
                jump ebb1(v4)

            ebb2:
                v3 = iconst.i32 1
                return v2
            }
        "})
        .unwrap();
        let func = &funcs[0];
        assert_eq!(func.dfg.value_type(Value::new(4)), Type::I32);
        assert_eq!(func.layout.ebbs().map(|e| e.as_u32()).collect::<Vec<_>>(), vec![0, 1, 3, 2]);
    }

    #[test]
    fn undefined_references_are_reported() {
        assert_eq!(
            syntax_error("function %f() {\nebb0:\n    v2 = iadd v0, v1\n    return\n}"),
            "Syntax error at 3:5: use of undefined value v0"
        );
        assert_eq!(
            syntax_error("function %f() {\nebb0:\n    jump ebb7\n}"),
            "Syntax error at 3:10: undeclared EBB ebb7"
        );
        assert_eq!(
            syntax_error("function %f() {\nebb0:\n    v1 = call fn0()\n}"),
            "Syntax error at 3:15: undeclared function fn0"
        );
    }

    #[test]
    fn duplicates_are_reported() {
        assert_eq!(
            syntax_error("function %f(i32) {\nebb0(v1: i32):\n    v1 = iconst.i32 0\n    return\n}"),
            "Syntax error at 3:5: duplicate definition of v1"
        );
        assert_eq!(
            syntax_error("function %f() {\nebb0:\n    return\nebb0:\n    return\n}"),
            "Syntax error at 4:1: duplicate definition of ebb0"
        );
    }

    #[test]
    fn types_and_result_counts_are_checked() {
        assert_eq!(
            syntax_error("function %f(i32) {\nebb0(v1: i32):\n    v2 = iadd.i64 v1, v1\n    return\n}"),
            "Syntax error at 3:5: declared type i64 does not match the inferred type i32"
        );
        assert_eq!(
            syntax_error("function %f(i32) {\nebb0(v1: i32):\n    v2 = iadd_cout v1, v1\n    return\n}"),
            "Syntax error at 3:5: `iadd_cout` has 2 results, 1 given"
        );
        assert_eq!(
            syntax_error("function %f() {\nebb0:\n    v1 = iconst 1\n    return\n}"),
            "Syntax error at 3:5: `iconst` needs an explicit result type"
        );
        assert_eq!(
            syntax_error("function %f(i128) {\nebb0:\n    return\n}"),
            "Syntax error at 1:13: unknown type `i128`"
        );
    }

    #[test]
    fn registers_need_an_isa() {
        assert_eq!(
            syntax_error("function %f(i32 [%x10]) {\nebb0(v0: i32):\n    return\n}"),
            "Syntax error at 1:18: register locations need an `isa` line"
        );
        assert_eq!(
            syntax_error("isa riscv\nfunction %f(i32 [%rax]) {\nebb0(v0: i32):\n    return\n}"),
            "Syntax error at 2:18: unknown register `%rax` for riscv"
        );
    }

    #[test]
    fn header_errors() {
        assert_eq!(syntax_error("isa arm\n"), "Syntax error at 1:5: unknown ISA `arm`");
        assert_eq!(syntax_error("set bogus=1\n"), "Syntax error at 1:5: unknown setting `bogus`");
        assert_eq!(
            syntax_error("function %f() {\n    sig1 = ()\nebb0:\n    return\n}"),
            "Syntax error at 2:5: expected sig0, signatures are numbered in order"
        );
        assert_eq!(
            syntax_error("function %f() {\nebb0:\n    v1 = frobnicate\n}"),
            "Syntax error at 3:10: unknown opcode `frobnicate`"
        );
    }
}
