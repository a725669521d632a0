//! Token model: kinds, lexemes and source positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based source position. `offset` is the byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Span {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),

    // Identifiers and keywords
    Ident(String),
    KwFn,
    KwLet,
    KwIf,
    KwElse,
    KwWhile,
    KwReturn,
    KwTrue,
    KwFalse,
    KwNull,

    // Domain keywords
    KwPersonality,
    KwKnowledge,
    KwSay,
    KwListen,
    KwDecide,
    KwAdapt,
    KwTensor,
    KwEmotion,
    KwTimeout,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    FatArrow, // =>

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Assign, // =
    EqEq,   // ==
    NotEq,  // !=
    Lt,
    Le,
    Gt,
    Ge,
    Bang,
    AmpAmp,
    PipePipe,

    /// Lexer error recovery: a character that starts no token. Scanning
    /// continues after it; the parser reports it when reached.
    Unexpected(char),

    Eof,
}

impl TokenKind {
    /// Short human name used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(n) => format!("integer {}", n),
            TokenKind::Float(x) => format!("float {}", x),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Unexpected(ch) => format!("unexpected character {:?}", ch),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            TokenKind::KwFn => "fn",
            TokenKind::KwLet => "let",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwWhile => "while",
            TokenKind::KwReturn => "return",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwNull => "null",
            TokenKind::KwPersonality => "personality",
            TokenKind::KwKnowledge => "knowledge",
            TokenKind::KwSay => "say",
            TokenKind::KwListen => "listen",
            TokenKind::KwDecide => "decide",
            TokenKind::KwAdapt => "adapt",
            TokenKind::KwTensor => "tensor",
            TokenKind::KwEmotion => "emotion",
            TokenKind::KwTimeout => "timeout",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::FatArrow => "=>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Bang => "!",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
