//! # Nyx Parser
//!
//! Recursive descent with operator-precedence climbing for expressions.
//!
//! Error isolation is at the top-level item: a structural error fails the
//! item being parsed, the parser synchronizes to the next item boundary, and
//! parsing continues. `parse_program` returns everything that parsed plus
//! every error; `parse_unit` is the strict variant that fails on the first
//! error.

use crate::ast::{
    BinaryOp, CompilationUnit, DecideArm, Expr, ExprKind, FnDef, Item, Literal, Stmt, StmtKind,
    TraitEntry, UnaryOp,
};
use crate::token::{Span, Token, TokenKind};
use nyx_error::{Error, ErrorKind, Result};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof));
        Self { tokens, pos: 0 }
    }

    /// Parse every top-level item, isolating errors per item.
    pub fn parse_program(mut self) -> (CompilationUnit, Vec<Error>) {
        let mut unit = CompilationUnit::new();
        let mut errors = Vec::new();

        while !self.at_eof() {
            // Stray semicolons between items are harmless.
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            match self.parse_item() {
                Ok(item) => unit.items.push(item),
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }
        (unit, errors)
    }

    /// Strict parse: exactly one AST root, or the first structural error.
    pub fn parse_unit(self) -> Result<CompilationUnit> {
        let (unit, mut errors) = self.parse_program();
        match errors.is_empty() {
            true => Ok(unit),
            false => Err(errors.remove(0)),
        }
    }

    // =========================================================================
    // Cursor helpers
    // =========================================================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_second_kind(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn at_eof(&self) -> bool {
        *self.peek_kind() == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token> {
        if self.peek_kind() == &kind {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected {} {}, found {}",
                kind.describe(),
                context,
                self.peek_kind().describe()
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<(String, Span)> {
        let span = self.peek().span;
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, span))
            }
            other => Err(self.error_here(format!(
                "expected identifier {}, found {}",
                context,
                other.describe()
            ))),
        }
    }

    /// Statement terminator: `;`, or the end of the enclosing block/input.
    fn expect_semi(&mut self) -> Result<()> {
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        match self.peek_kind() {
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            other => Err(self.error_here(format!("expected ';', found {}", other.describe()))),
        }
    }

    /// Build a parse error at the current token. A lexer error token turns
    /// into an UnexpectedCharacter error here.
    fn error_here(&self, message: String) -> Error {
        let token = self.peek();
        let kind = match token.kind {
            TokenKind::Unexpected(_) => ErrorKind::UnexpectedCharacter,
            _ => ErrorKind::ParseFailed,
        };
        let message = match token.kind {
            TokenKind::Unexpected(ch) => format!("unexpected character {:?}", ch),
            _ => message,
        };
        Error::new(kind, message)
            .with_operation("parser::parse")
            .with_position(token.span.line, token.span.column)
    }

    /// Skip to the next plausible item boundary after an error.
    fn synchronize(&mut self) {
        let mut depth = 0i32;
        self.advance();
        while !self.at_eof() {
            match self.peek_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth < 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::KwFn
                | TokenKind::KwLet
                | TokenKind::KwIf
                | TokenKind::KwWhile
                | TokenKind::KwReturn
                | TokenKind::KwSay
                | TokenKind::KwAdapt
                | TokenKind::KwPersonality
                | TokenKind::KwDecide
                    if depth == 0 =>
                {
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // =========================================================================
    // Items
    // =========================================================================

    fn parse_item(&mut self) -> Result<Item> {
        match self.peek_kind() {
            TokenKind::KwFn => Ok(Item::Function(self.parse_fn()?)),
            _ => Ok(Item::Statement(self.parse_stmt()?)),
        }
    }

    fn parse_fn(&mut self) -> Result<FnDef> {
        let span = self.peek().span;
        self.expect(TokenKind::KwFn, "to start a function")?;
        let (name, _) = self.expect_ident("after 'fn'")?;
        self.expect(TokenKind::LParen, "after the function name")?;

        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident("in the parameter list")?;
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "after the parameter list")?;
        }

        let body = self.parse_block()?;
        Ok(FnDef { name, params, body, span })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "to open a block")?;
        let mut body = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error_here("unterminated block".to_string()));
            }
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            body.push(self.parse_stmt()?);
        }
        Ok(body)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        match self.peek_kind() {
            TokenKind::KwLet => {
                self.advance();
                let (name, _) = self.expect_ident("after 'let'")?;
                self.expect(TokenKind::Assign, "after the variable name")?;
                let value = self.parse_expr()?;
                self.expect_semi()?;
                Ok(Stmt::new(StmtKind::Let { name, value }, span))
            }
            TokenKind::KwIf => self.parse_if(span),
            TokenKind::KwWhile => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::While { cond, body }, span))
            }
            TokenKind::KwReturn => {
                self.advance();
                let value = match self.peek_kind() {
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => None,
                    _ => Some(self.parse_expr()?),
                };
                self.expect_semi()?;
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::KwSay => {
                self.advance();
                self.expect(TokenKind::LParen, "after 'say'")?;
                let text = self.parse_expr()?;
                let emotion = if self.eat(&TokenKind::Comma) {
                    self.expect(TokenKind::KwEmotion, "to name the emotion argument")?;
                    self.expect(TokenKind::Colon, "after 'emotion'")?;
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::RParen, "to close 'say'")?;
                self.expect_semi()?;
                Ok(Stmt::new(StmtKind::Say { text, emotion }, span))
            }
            TokenKind::KwAdapt => {
                self.advance();
                self.expect(TokenKind::LParen, "after 'adapt'")?;
                let signal = self.parse_expr()?;
                self.expect(TokenKind::RParen, "to close 'adapt'")?;
                self.expect_semi()?;
                Ok(Stmt::new(StmtKind::Adapt(signal), span))
            }
            TokenKind::KwPersonality => {
                self.advance();
                let entries = self.parse_trait_map()?;
                Ok(Stmt::new(StmtKind::Personality(entries), span))
            }
            TokenKind::KwDecide => self.parse_decide(span),
            TokenKind::Ident(_) if *self.peek_second_kind() == TokenKind::Assign => {
                let (name, _) = self.expect_ident("on the left of '='")?;
                self.advance(); // '='
                let value = self.parse_expr()?;
                self.expect_semi()?;
                Ok(Stmt::new(StmtKind::Assign { name, value }, span))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect_semi()?;
                Ok(Stmt::new(StmtKind::Expr(expr), span))
            }
        }
    }

    fn parse_if(&mut self, span: Span) -> Result<Stmt> {
        self.expect(TokenKind::KwIf, "to start an if statement")?;
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.eat(&TokenKind::KwElse) {
            if *self.peek_kind() == TokenKind::KwIf {
                let nested_span = self.peek().span;
                Some(vec![self.parse_if(nested_span)?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::If { cond, then_body, else_body }, span))
    }

    /// `{ trait: number, ... }` - shared by personality blocks and decide
    /// arm weight maps.
    fn parse_trait_map(&mut self) -> Result<Vec<TraitEntry>> {
        self.expect(TokenKind::LBrace, "to open the trait map")?;
        let mut entries = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let (name, span) = self.expect_ident("as a trait name")?;
            self.expect(TokenKind::Colon, "after the trait name")?;
            let value = self.parse_number_literal()?;
            entries.push(TraitEntry { name, value, span });
            if !self.eat(&TokenKind::Comma) {
                self.expect(TokenKind::RBrace, "to close the trait map")?;
                break;
            }
        }
        Ok(entries)
    }

    fn parse_number_literal(&mut self) -> Result<f64> {
        let negative = self.eat(&TokenKind::Minus);
        let value = match self.peek_kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                n as f64
            }
            TokenKind::Float(x) => {
                self.advance();
                x
            }
            other => {
                return Err(self.error_here(format!(
                    "expected a number literal, found {}",
                    other.describe()
                )));
            }
        };
        Ok(if negative { -value } else { value })
    }

    fn parse_decide(&mut self, span: Span) -> Result<Stmt> {
        self.expect(TokenKind::KwDecide, "to start a decide statement")?;
        self.expect(TokenKind::LBrace, "after 'decide'")?;

        let mut arms = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error_here("unterminated decide statement".to_string()));
            }
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            let arm_span = self.peek().span;
            let weights = self.parse_trait_map()?;
            self.expect(TokenKind::FatArrow, "between the weights and the branch body")?;
            let body = self.parse_block()?;
            arms.push(DecideArm { weights, body, span: arm_span });
        }

        if arms.is_empty() {
            return Err(Error::parse_failed("decide needs at least one arm")
                .with_operation("parser::parse")
                .with_position(span.line, span.column));
        }
        Ok(Stmt::new(StmtKind::Decide(arms), span))
    }

    // =========================================================================
    // Expressions (precedence climbing)
    // =========================================================================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_binary(0)
    }

    fn binding_power(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        let entry = match kind {
            TokenKind::PipePipe => (BinaryOp::Or, 1),
            TokenKind::AmpAmp => (BinaryOp::And, 2),
            TokenKind::EqEq => (BinaryOp::Eq, 3),
            TokenKind::NotEq => (BinaryOp::Ne, 3),
            TokenKind::Lt => (BinaryOp::Lt, 4),
            TokenKind::Le => (BinaryOp::Le, 4),
            TokenKind::Gt => (BinaryOp::Gt, 4),
            TokenKind::Ge => (BinaryOp::Ge, 4),
            TokenKind::Plus => (BinaryOp::Add, 5),
            TokenKind::Minus => (BinaryOp::Sub, 5),
            TokenKind::Star => (BinaryOp::Mul, 6),
            TokenKind::Slash => (BinaryOp::Div, 6),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, bp)) = Self::binding_power(self.peek_kind()) {
            if bp < min_bp {
                break;
            }
            let span = self.peek().span;
            self.advance();
            let rhs = self.parse_binary(bp + 1)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let span = self.peek().span;
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary { op, operand: Box::new(operand) },
                span,
            ));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.peek().span;
        match self.peek_kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Int(n)), span))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Float(x)), span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Str(s)), span))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(true)), span))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(false)), span))
            }
            TokenKind::KwNull => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "to close the grouping")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::RParen, "after the arguments")?;
                    }
                    Ok(Expr::new(ExprKind::Call { name, args }, span))
                } else {
                    Ok(Expr::new(ExprKind::Variable(name), span))
                }
            }
            TokenKind::KwKnowledge => {
                self.advance();
                self.expect(TokenKind::LParen, "after 'knowledge'")?;
                let query = self.parse_expr()?;
                self.expect(TokenKind::RParen, "to close 'knowledge'")?;
                Ok(Expr::new(ExprKind::Knowledge { query: Box::new(query) }, span))
            }
            TokenKind::KwListen => {
                self.advance();
                self.expect(TokenKind::LParen, "after 'listen'")?;
                let timeout = if self.eat(&TokenKind::RParen) {
                    None
                } else {
                    self.expect(TokenKind::KwTimeout, "to name the timeout argument")?;
                    self.expect(TokenKind::Colon, "after 'timeout'")?;
                    let expr = self.parse_expr()?;
                    self.expect(TokenKind::RParen, "to close 'listen'")?;
                    Some(Box::new(expr))
                };
                Ok(Expr::new(ExprKind::Listen { timeout }, span))
            }
            TokenKind::KwTensor => {
                self.advance();
                self.parse_tensor(span)
            }
            other => Err(self.error_here(format!(
                "expected an expression, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_tensor(&mut self, span: Span) -> Result<Expr> {
        self.expect(TokenKind::LBracket, "after 'tensor'")?;
        let mut rows: Vec<Vec<Expr>> = Vec::new();
        let mut row: Vec<Expr> = Vec::new();

        loop {
            row.push(self.parse_expr()?);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::Semicolon => {
                    self.advance();
                    rows.push(std::mem::take(&mut row));
                }
                TokenKind::RBracket => {
                    self.advance();
                    rows.push(row);
                    break;
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected ',', ';' or ']' in tensor literal, found {}",
                        other.describe()
                    )));
                }
            }
        }

        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(Error::parse_failed("tensor rows must all have the same length")
                .with_operation("parser::parse")
                .with_position(span.line, span.column));
        }
        Ok(Expr::new(ExprKind::Tensor { rows }, span))
    }
}

/// Convenience wrapper: lex and strictly parse a source string.
pub fn parse_source(source: &str) -> Result<CompilationUnit> {
    Parser::new(crate::lexer::tokenize(source)).parse_unit()
}
