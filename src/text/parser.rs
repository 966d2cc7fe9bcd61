// Recursive-descent parser for the host program text form. The grammar mirrors what the IR
// printer emits, so a printed program parses back to an equal tree:
//
//   pipeline name(k: int32, in: buffer<uint8, 2>) { stmts }
//
// Statements are one per line and need no terminator. A `let` binds over the rest of its
// block, `{ ... }` opens a nested block, loops are `[parallel] for[<device>] (x, min, extent)`,
// stores are `buf[i, j] = value`, and anything else is an evaluated expression. Binary
// operators only continue an expression across a newline while inside brackets.
//
// Expressions are typed as they are built. Parameters and let/for bindings live in a
// Scope<Type>; a buffer parameter also declares the `<name>.buffer` handle and the int32
// `<name>.min.N`, `<name>.extent.N` and `<name>.stride.N` variables a real pipeline has. Casts
// of literals fold into typed immediates, and an unsuffixed literal adopts the type of the
// operand it is combined with, so `in[x] * 2` is a uint8 multiply when `in` holds uint8.

//! Parser for the host program text form.

use super::{HostProgram, Param, ParamKind};
use crate::ir::{BinOp, DeviceApi, Expr, ForKind, Intrinsic, Scope, Stmt, Type, TypeCode};
use hashbrown::HashSet;
use thiserror::Error;

/// A syntax or typing error, positioned at the offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a complete `pipeline` definition.
pub fn parse_program(text: &str) -> ParseResult<HostProgram> {
    let mut parser = Parser::new(text);
    let program = parser.parse_program()?;
    parser.skip_whitespace(true);
    if !parser.is_eof() {
        return Err(parser.error("Unexpected input after pipeline"));
    }
    Ok(program)
}

/// Element type and dimensionality of a buffer in scope.
#[derive(Debug, Clone, Copy)]
struct BufferDecl {
    ty: Type,
    dims: usize,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    /// Bracket nesting. Newlines are insignificant inside brackets.
    depth: usize,
    vars: Scope<Type>,
    buffers: Scope<BufferDecl>,
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '$'
}

/// Scalar names plus `<scalar>x<lanes>` vector names.
fn type_from_name(name: &str) -> Option<Type> {
    if let Some(ty) = Type::from_name(name) {
        return Some(ty);
    }
    let (base, lanes) = name.rsplit_once('x')?;
    let lanes: u16 = lanes.parse().ok()?;
    if lanes < 2 {
        return None;
    }
    Type::from_name(base).map(|ty| ty.with_lanes(lanes))
}

/// `value` as an immediate of `ty`, if it is a literal representable there.
fn fold_literal(ty: Type, value: &Expr) -> Option<Expr> {
    if ty.lanes != 1 {
        return None;
    }
    let folded = match (value, ty.code) {
        (Expr::IntImm { value, .. }, TypeCode::Int) => Expr::IntImm { value: *value, ty },
        (Expr::IntImm { value, .. }, TypeCode::UInt) if *value >= 0 => Expr::UIntImm { value: *value as u64, ty },
        (Expr::IntImm { value, .. }, TypeCode::Float) => Expr::FloatImm { value: *value as f64, ty },
        (Expr::UIntImm { value, .. }, TypeCode::UInt) => Expr::UIntImm { value: *value, ty },
        (Expr::UIntImm { value, .. }, TypeCode::Int) if *value <= i64::MAX as u64 => {
            Expr::IntImm { value: *value as i64, ty }
        }
        (Expr::FloatImm { value, .. }, TypeCode::Float) => Expr::FloatImm { value: *value, ty },
        _ => return None,
    };
    Some(folded)
}

/// Literals written without a type: plain integers and unsuffixed floats.
fn is_untyped_literal(value: &Expr) -> bool {
    match value {
        Expr::IntImm { ty, .. } => *ty == Type::int(32),
        Expr::FloatImm { ty, .. } => *ty == Type::float(64),
        _ => false,
    }
}

fn cast(ty: Type, value: Expr) -> Expr {
    match fold_literal(ty, &value) {
        Some(folded) => folded,
        None if value.ty() == ty => value,
        None => Expr::Cast { ty, value: Box::new(value) },
    }
}

fn negate(value: Expr) -> Expr {
    match value {
        Expr::IntImm { value, ty } => Expr::IntImm { value: -value, ty },
        Expr::FloatImm { value, ty } => Expr::FloatImm { value: -value, ty },
        other => {
            let ty = other.ty();
            let zero = fold_literal(ty, &Expr::int(0)).unwrap_or_else(|| Expr::int(0));
            Expr::binary(BinOp::Sub, zero, other)
        }
    }
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            depth: 0,
            vars: Scope::new(),
            buffers: Scope::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let consumed = &self.text[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = match consumed.rfind('\n') {
            Some(newline) => consumed.len() - newline,
            None => consumed.len() + 1,
        };
        ParseError { line, column, message: message.into() }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn describe_current(&self) -> String {
        match self.current_char() {
            Some(ch) => format!("'{ch}'"),
            None => "end of input".to_string(),
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment, up to but not including the newline
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(true);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> ParseResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!("Expected '{ch}' but found {}", self.describe_current())));
        }
        Ok(())
    }

    /// Consume the operator `op` if it comes next on this logical line.
    fn try_op(&mut self, op: &str) -> bool {
        self.skip_whitespace(self.depth > 0);
        if self.rest().starts_with(op) {
            self.pos += op.len();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace(true);
        let rest = self.rest();
        rest.starts_with(keyword) && !rest[keyword.len()..].starts_with(is_ident_char)
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn read_identifier(&mut self) -> ParseResult<&'a str> {
        self.skip_whitespace(true);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => return Err(self.error(format!("Expected identifier but found {}", self.describe_current()))),
        }
        while let Some(ch) = self.current_char() {
            if !is_ident_char(ch) {
                break;
            }
            self.advance();
        }

        Ok(&self.text[start..self.pos])
    }

    fn read_count(&mut self) -> ParseResult<usize> {
        self.skip_whitespace(true);
        let start = self.pos;
        while self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| self.error(format!("Expected a count but found {}", self.describe_current())))
    }

    fn parse_type(&mut self) -> ParseResult<Type> {
        let name = self.read_identifier()?;
        type_from_name(name).ok_or_else(|| self.error(format!("Unknown type '{name}'")))
    }

    fn parse_program(&mut self) -> ParseResult<HostProgram> {
        if !self.try_keyword("pipeline") {
            return Err(self.error(format!("Expected 'pipeline' but found {}", self.describe_current())));
        }
        let name = self.read_identifier()?.to_string();

        self.expect('(')?;
        let mut params = Vec::new();
        let mut seen = HashSet::new();
        if !self.try_read(')') {
            loop {
                let param = self.parse_param()?;
                if !seen.insert(param.name.clone()) {
                    return Err(self.error(format!("Duplicate parameter '{}'", param.name)));
                }
                params.push(param);
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }

        let body = self.parse_block()?;
        Ok(HostProgram { name, params, body })
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        let name = self.read_identifier()?.to_string();
        self.expect(':')?;

        let kind = if self.try_keyword("buffer") {
            self.expect('<')?;
            let ty = self.parse_type()?;
            self.expect(',')?;
            let dimensions = self.read_count()?;
            self.expect('>')?;
            self.declare_buffer(&name, ty, dimensions);
            ParamKind::Buffer { ty, dimensions }
        } else {
            let ty = self.parse_type()?;
            self.vars.push(&name, ty);
            ParamKind::Scalar(ty)
        };
        Ok(Param { name, kind })
    }

    fn declare_buffer(&mut self, name: &str, ty: Type, dims: usize) {
        self.vars.push(&format!("{name}.buffer"), Type::handle());
        for d in 0..dims {
            for field in ["min", "extent", "stride"] {
                self.vars.push(&format!("{name}.{field}.{d}"), Type::int(32));
            }
        }
        self.buffers.push(name, BufferDecl { ty, dims });
    }

    fn parse_block(&mut self) -> ParseResult<Stmt> {
        self.expect('{')?;
        self.parse_block_rest()
    }

    /// Statements up to and including the closing brace.
    fn parse_block_rest(&mut self) -> ParseResult<Stmt> {
        let mut stmts = Vec::new();
        loop {
            if self.try_read('}') {
                return Ok(Stmt::block(stmts));
            }
            if self.is_eof() {
                return Err(self.error("Unterminated block"));
            }

            if self.try_keyword("let") {
                let name = self.read_identifier()?.to_string();
                self.expect('=')?;
                let value = self.parse_expr()?;
                self.vars.push(&name, value.ty());
                let body = self.parse_block_rest();
                self.vars.pop(&name);
                stmts.push(Stmt::let_stmt(name, value, body?));
                return Ok(Stmt::block(stmts));
            }

            stmts.push(self.parse_stmt()?);
        }
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        self.skip_whitespace(true);
        if self.current_char() == Some('{') {
            return self.parse_block();
        }

        if self.try_keyword("assert") {
            self.expect('(')?;
            self.depth += 1;
            let condition = self.parse_expr()?;
            self.expect(',')?;
            let message = self.parse_expr()?;
            self.depth -= 1;
            self.expect(')')?;
            return Ok(Stmt::assert(condition, message));
        }
        if self.try_keyword("parallel") {
            if !self.try_keyword("for") {
                return Err(self.error("Expected 'for' after 'parallel'"));
            }
            return self.parse_for(ForKind::Parallel);
        }
        if self.try_keyword("for") {
            return self.parse_for(ForKind::Serial);
        }
        if self.try_keyword("allocate") {
            return self.parse_allocate();
        }
        if self.try_keyword("if") {
            return self.parse_if();
        }

        if let Some(store) = self.try_parse_store()? {
            return Ok(store);
        }
        Ok(Stmt::Evaluate(self.parse_expr()?))
    }

    fn parse_for(&mut self, kind: ForKind) -> ParseResult<Stmt> {
        self.skip_whitespace(false);
        let device = if self.current_char() == Some('<') {
            self.advance();
            let name = self.read_identifier()?;
            let device = DeviceApi::from_name(name).ok_or_else(|| self.error(format!("Unknown device '{name}'")))?;
            self.expect('>')?;
            device
        } else {
            DeviceApi::Host
        };

        self.expect('(')?;
        self.depth += 1;
        let name = self.read_identifier()?.to_string();
        self.expect(',')?;
        let min = self.parse_expr()?;
        let min = self.coerce(min, Type::int(32))?;
        self.expect(',')?;
        let extent = self.parse_expr()?;
        let extent = self.coerce(extent, Type::int(32))?;
        self.depth -= 1;
        self.expect(')')?;

        self.vars.push(&name, Type::int(32));
        let body = self.parse_block();
        self.vars.pop(&name);

        Ok(Stmt::For { name, min, extent, kind, device, body: Box::new(body?) })
    }

    fn parse_allocate(&mut self) -> ParseResult<Stmt> {
        let name = self.read_identifier()?.to_string();
        self.expect('[')?;
        self.depth += 1;
        let ty = self.parse_type()?;
        let mut extents = Vec::new();
        while self.try_op("*") {
            let extent = self.parse_unary()?;
            extents.push(self.coerce(extent, Type::int(32))?);
        }
        self.depth -= 1;
        self.expect(']')?;

        self.buffers.push(&name, BufferDecl { ty, dims: extents.len() });
        let body = self.parse_block();
        self.buffers.pop(&name);

        Ok(Stmt::Allocate { name, ty, extents, body: Box::new(body?) })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.expect('(')?;
        self.depth += 1;
        let condition = self.parse_expr()?;
        self.depth -= 1;
        self.expect(')')?;
        let then_case = self.parse_block()?;

        let else_case = if self.try_keyword("else") {
            self.skip_whitespace(true);
            let else_case = if self.current_char() == Some('{') {
                self.parse_block()?
            } else if self.try_keyword("if") {
                self.parse_if()?
            } else {
                return Err(self.error(format!("Expected '{{' or 'if' after 'else' but found {}", self.describe_current())));
            };
            Some(Box::new(else_case))
        } else {
            None
        };

        Ok(Stmt::IfThenElse { condition, then_case: Box::new(then_case), else_case })
    }

    /// `name[indices] = value`, or `None` with nothing consumed.
    fn try_parse_store(&mut self) -> ParseResult<Option<Stmt>> {
        let start = self.pos;
        let Ok(name) = self.read_identifier() else {
            self.pos = start;
            return Ok(None);
        };
        if self.current_char() != Some('[') {
            self.pos = start;
            return Ok(None);
        }
        self.advance();
        let indices = self.parse_list(']')?;

        self.skip_whitespace(false);
        if !self.rest().starts_with('=') || self.rest().starts_with("==") {
            self.pos = start;
            return Ok(None);
        }
        self.advance();

        let decl = self.buffer(name, indices.len())?;
        let indices = self.coerce_all(indices, Type::int(32))?;
        let value = self.parse_expr()?;
        let value = self.coerce(value, decl.ty)?;
        Ok(Some(Stmt::store(name, value, indices)))
    }

    fn buffer(&self, name: &str, indices: usize) -> ParseResult<BufferDecl> {
        let decl = *self.buffers.get(name).ok_or_else(|| self.error(format!("Unknown buffer '{name}'")))?;
        if decl.dims != indices {
            return Err(self.error(format!(
                "Buffer '{name}' has {} dimensions but is indexed with {indices}",
                decl.dims
            )));
        }
        Ok(decl)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn parse_list(&mut self, close: char) -> ParseResult<Vec<Expr>> {
        self.depth += 1;
        let mut items = Vec::new();
        if !self.try_read(close) {
            loop {
                items.push(self.parse_expr()?);
                if self.try_read(close) {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.depth -= 1;
        Ok(items)
    }

    fn coerce(&self, value: Expr, ty: Type) -> ParseResult<Expr> {
        if value.ty() == ty {
            return Ok(value);
        }
        if is_untyped_literal(&value) {
            if let Some(folded) = fold_literal(ty, &value) {
                return Ok(folded);
            }
        }
        Err(self.error(format!("Expected {ty} but found {value} of type {}", value.ty())))
    }

    fn coerce_all(&self, values: Vec<Expr>, ty: Type) -> ParseResult<Vec<Expr>> {
        values.into_iter().map(|value| self.coerce(value, ty)).collect()
    }

    /// Bring `a` and `b` to a common type by retyping an untyped literal.
    fn unify(&self, a: Expr, b: Expr) -> ParseResult<(Expr, Expr)> {
        let (ta, tb) = (a.ty(), b.ty());
        if ta == tb {
            return Ok((a, b));
        }
        if is_untyped_literal(&b) {
            if let Some(b) = fold_literal(ta, &b) {
                return Ok((a, b));
            }
        }
        if is_untyped_literal(&a) {
            if let Some(a) = fold_literal(tb, &a) {
                return Ok((a, b));
            }
        }
        Err(self.error(format!("Type mismatch between {a} ({ta}) and {b} ({tb})")))
    }

    fn binary(&self, op: BinOp, a: Expr, b: Expr) -> ParseResult<Expr> {
        let (a, b) = self.unify(a, b)?;
        Ok(Expr::binary(op, a, b))
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.try_op("||") {
            let rhs = self.parse_and()?;
            lhs = self.binary(BinOp::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.try_op("&&") {
            let rhs = self.parse_comparison()?;
            lhs = self.binary(BinOp::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_additive()?;
        // Two-character operators first so `<=` is not read as `<`.
        let ops = [
            ("==", BinOp::Eq),
            ("!=", BinOp::Ne),
            ("<=", BinOp::Le),
            (">=", BinOp::Ge),
            ("<", BinOp::Lt),
            (">", BinOp::Gt),
        ];
        for (symbol, op) in ops {
            if self.try_op(symbol) {
                let rhs = self.parse_additive()?;
                return self.binary(op, lhs, rhs);
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.try_op("+") {
                BinOp::Add
            } else if self.try_op("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.try_op("*") {
                BinOp::Mul
            } else if self.try_op("/") {
                BinOp::Div
            } else if self.try_op("%") {
                BinOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        self.skip_whitespace(true);
        match self.current_char() {
            Some('!') => {
                self.advance();
                let value = self.parse_unary()?;
                Ok(Expr::Not(Box::new(value)))
            }
            Some('-') => {
                self.advance();
                Ok(negate(self.parse_unary()?))
            }
            Some('(') => match self.try_cast() {
                Some(ty) => Ok(cast(ty, self.parse_unary()?)),
                None => self.parse_primary(),
            },
            _ => self.parse_primary(),
        }
    }

    /// `(type)` prefix, or `None` with nothing consumed.
    fn try_cast(&mut self) -> Option<Type> {
        let start = self.pos;
        self.advance();
        if let Ok(name) = self.read_identifier() {
            if let Some(ty) = type_from_name(name) {
                if !self.vars.contains(name) && self.try_read(')') {
                    return Some(ty);
                }
            }
        }
        self.pos = start;
        None
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        self.skip_whitespace(true);
        match self.current_char() {
            Some('(') => {
                self.advance();
                self.depth += 1;
                let expr = if self.try_keyword("let") { self.parse_let_expr()? } else { self.parse_expr()? };
                self.depth -= 1;
                self.expect(')')?;
                Ok(expr)
            }
            Some('"') => self.parse_string(),
            Some(ch) if ch.is_ascii_digit() => self.parse_number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.parse_name(),
            _ => Err(self.error(format!("Expected expression but found {}", self.describe_current()))),
        }
    }

    fn parse_let_expr(&mut self) -> ParseResult<Expr> {
        let name = self.read_identifier()?.to_string();
        self.expect('=')?;
        let value = self.parse_expr()?;
        if !self.try_keyword("in") {
            return Err(self.error(format!("Expected 'in' but found {}", self.describe_current())));
        }
        self.vars.push(&name, value.ty());
        let body = self.parse_expr();
        self.vars.pop(&name);
        Ok(Expr::Let { name, value: Box::new(value), body: Box::new(body?) })
    }

    fn parse_string(&mut self) -> ParseResult<Expr> {
        self.advance();
        let mut value = String::new();
        loop {
            let Some(ch) = self.current_char() else {
                return Err(self.error("Unterminated string literal"));
            };
            self.advance();
            match ch {
                '"' => return Ok(Expr::StringImm(value)),
                '\\' => {
                    let escaped = match self.current_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        _ => return Err(self.error(format!("Unsupported escape {}", self.describe_current()))),
                    };
                    self.advance();
                    value.push(escaped);
                }
                other => value.push(other),
            }
        }
    }

    fn parse_number(&mut self) -> ParseResult<Expr> {
        let start = self.pos;

        if self.rest().starts_with("0x") {
            self.pos += 2;
            let digits_start = self.pos;
            while self.current_char().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                self.advance();
            }
            return i64::from_str_radix(&self.text[digits_start..self.pos], 16)
                .map(Expr::int)
                .map_err(|_| self.error("Invalid hexadecimal literal"));
        }

        let skip_digits = |p: &mut Self| {
            while p.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
                p.advance();
            }
        };
        skip_digits(self);

        let mut is_float = false;
        if self.rest().starts_with('.') && self.rest()[1..].starts_with(|ch: char| ch.is_ascii_digit()) {
            is_float = true;
            self.advance();
            skip_digits(self);
        }
        if self.rest().starts_with(['e', 'E']) {
            let exponent = self.rest()[1..].trim_start_matches(['+', '-']);
            let sign_len = self.rest().len() - 1 - exponent.len();
            if sign_len <= 1 && exponent.starts_with(|ch: char| ch.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign_len;
                skip_digits(self);
            }
        }

        let literal = &self.text[start..self.pos];
        if is_float {
            let value: f64 = literal.parse().map_err(|_| self.error(format!("Invalid float literal '{literal}'")))?;
            let ty = if self.current_char() == Some('f') {
                self.advance();
                Type::float(32)
            } else {
                Type::float(64)
            };
            return Ok(Expr::FloatImm { value, ty });
        }

        if let Ok(value) = literal.parse::<i64>() {
            return Ok(Expr::int(value));
        }
        literal
            .parse::<u64>()
            .map(|value| Expr::uint(value, 64))
            .map_err(|_| self.error(format!("Integer literal '{literal}' out of range")))
    }

    /// A variable, load or call starting with an identifier.
    fn parse_name(&mut self) -> ParseResult<Expr> {
        let name = self.read_identifier()?;
        match self.current_char() {
            Some('(') => {
                self.advance();
                let args = self.parse_list(')')?;
                self.call(name, args)
            }
            Some('[') => {
                self.advance();
                let indices = self.parse_list(']')?;
                let decl = self.buffer(name, indices.len())?;
                let indices = self.coerce_all(indices, Type::int(32))?;
                Ok(Expr::load(decl.ty, name, indices))
            }
            _ => match self.vars.get(name) {
                Some(ty) => Ok(Expr::var(name, *ty)),
                None => Err(self.error(format!("Unknown variable '{name}'"))),
            },
        }
    }

    fn arity_error(&self, name: &str, expected: usize, found: usize) -> ParseError {
        self.error(format!("'{name}' takes {expected} arguments but was given {found}"))
    }

    fn call(&self, name: &str, args: Vec<Expr>) -> ParseResult<Expr> {
        match name {
            "select" => {
                let [condition, true_value, false_value]: [Expr; 3] =
                    args.try_into().map_err(|args: Vec<Expr>| self.arity_error(name, 3, args.len()))?;
                let (true_value, false_value) = self.unify(true_value, false_value)?;
                Ok(Expr::Select {
                    condition: Box::new(condition),
                    true_value: Box::new(true_value),
                    false_value: Box::new(false_value),
                })
            }
            "min" | "max" => {
                let [a, b]: [Expr; 2] =
                    args.try_into().map_err(|args: Vec<Expr>| self.arity_error(name, 2, args.len()))?;
                let op = if name == "min" { BinOp::Min } else { BinOp::Max };
                self.binary(op, a, b)
            }
            _ => match Intrinsic::from_name(name) {
                Some(intrinsic) => Ok(Expr::call_intrinsic(Type::handle(), intrinsic, args)),
                None => Ok(Expr::call_extern(Type::int(32), name, args)),
            },
        }
    }
}
