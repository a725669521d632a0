//! # Nyx Lexer
//!
//! Single left-to-right pass over the source text. Whitespace and comments
//! are discarded. The lexer never aborts: a character that starts no token
//! becomes a `TokenKind::Unexpected` error token carrying its position, and
//! scanning continues with the next character.

use crate::token::{Span, Token, TokenKind};

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("fn", TokenKind::KwFn),
    ("let", TokenKind::KwLet),
    ("if", TokenKind::KwIf),
    ("else", TokenKind::KwElse),
    ("while", TokenKind::KwWhile),
    ("return", TokenKind::KwReturn),
    ("true", TokenKind::KwTrue),
    ("false", TokenKind::KwFalse),
    ("null", TokenKind::KwNull),
    // Domain keywords
    ("personality", TokenKind::KwPersonality),
    ("knowledge", TokenKind::KwKnowledge),
    ("say", TokenKind::KwSay),
    ("listen", TokenKind::KwListen),
    ("decide", TokenKind::KwDecide),
    ("adapt", TokenKind::KwAdapt),
    ("tensor", TokenKind::KwTensor),
    ("emotion", TokenKind::KwEmotion),
    ("timeout", TokenKind::KwTimeout),
];

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole source. The returned sequence is finite and always
    /// ends with a single `Eof` token.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column, self.pos as u32)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    self.bump();
                } else {
                    break;
                }
            }

            // Line comment: // ... \n
            if self.src[self.pos..].starts_with("//") {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            // Block comment: /* ... */  (unterminated swallows the rest)
            if self.src[self.pos..].starts_with("/*") {
                self.bump();
                self.bump();
                while !self.src[self.pos..].starts_with("*/") && self.peek().is_some() {
                    self.bump();
                }
                if self.peek().is_some() {
                    self.bump();
                    self.bump();
                }
                continue;
            }

            return;
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_ws_and_comments();
        let span = self.span();

        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Token::new(TokenKind::Eof, span),
        };

        if ch.is_ascii_digit() {
            return self.number(span);
        }
        if ch == '"' {
            return self.string(span);
        }
        if ch.is_alphabetic() || ch == '_' {
            return self.ident_or_keyword(span);
        }

        self.bump();
        let two = |lexer: &mut Self, kind: TokenKind| {
            lexer.bump();
            kind
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' => match self.peek() {
                Some('=') => two(self, TokenKind::EqEq),
                Some('>') => two(self, TokenKind::FatArrow),
                _ => TokenKind::Assign,
            },
            '!' => match self.peek() {
                Some('=') => two(self, TokenKind::NotEq),
                _ => TokenKind::Bang,
            },
            '<' => match self.peek() {
                Some('=') => two(self, TokenKind::Le),
                _ => TokenKind::Lt,
            },
            '>' => match self.peek() {
                Some('=') => two(self, TokenKind::Ge),
                _ => TokenKind::Gt,
            },
            '&' => match self.peek() {
                Some('&') => two(self, TokenKind::AmpAmp),
                _ => TokenKind::Unexpected('&'),
            },
            '|' => match self.peek() {
                Some('|') => two(self, TokenKind::PipePipe),
                _ => TokenKind::Unexpected('|'),
            },
            other => TokenKind::Unexpected(other),
        };
        Token::new(kind, span)
    }

    fn number(&mut self, span: Span) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }

        let is_float = self.peek() == Some('.')
            && self.peek_second().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.bump(); // '.'
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }

        let text = &self.src[start..self.pos];
        let kind = if is_float {
            match text.parse::<f64>() {
                Ok(x) => TokenKind::Float(x),
                Err(_) => TokenKind::Unexpected('.'),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Int(n),
                // Out-of-range integer literal; recover as an error token.
                Err(_) => TokenKind::Unexpected('9'),
            }
        };
        Token::new(kind, span)
    }

    fn string(&mut self, span: Span) -> Token {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    // Unterminated string: error token at the opening quote,
                    // scanning resumes at the newline/end.
                    return Token::new(TokenKind::Unexpected('"'), span);
                }
                Some('"') => {
                    self.bump();
                    return Token::new(TokenKind::Str(value), span);
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('r') => value.push('\r'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some(other) => {
                            // Unknown escape: keep it verbatim.
                            value.push('\\');
                            value.push(other);
                        }
                        None => return Token::new(TokenKind::Unexpected('"'), span),
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn ident_or_keyword(&mut self, span: Span) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let kind = KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == text)
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        Token::new(kind, span)
    }
}

/// Convenience wrapper: tokenize a source string.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n\t  "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 42 3.5"),
            vec![
                TokenKind::Int(1),
                TokenKind::Int(42),
                TokenKind::Float(3.5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_dot_without_digits_is_not_a_float() {
        // `3.foo` lexes as int, unexpected dot, ident
        let k = kinds("3.foo");
        assert_eq!(k[0], TokenKind::Int(3));
        assert_eq!(k[1], TokenKind::Unexpected('.'));
        assert_eq!(k[2], TokenKind::Ident("foo".into()));
    }

    #[test]
    fn test_string_with_escapes() {
        assert_eq!(
            kinds(r#""he said \"hi\"\n""#),
            vec![TokenKind::Str("he said \"hi\"\n".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_recovers() {
        let tokens = tokenize("say(\"oops\nlet x = 1;");
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Unexpected('"')));
        // scanning continued on the next line
        assert!(tokens.iter().any(|t| t.kind == TokenKind::KwLet));
    }

    #[test]
    fn test_domain_keywords() {
        assert_eq!(
            kinds("personality knowledge say listen decide adapt tensor"),
            vec![
                TokenKind::KwPersonality,
                TokenKind::KwKnowledge,
                TokenKind::KwSay,
                TokenKind::KwListen,
                TokenKind::KwDecide,
                TokenKind::KwAdapt,
                TokenKind::KwTensor,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= == != <= >= => && || !"),
            vec![
                TokenKind::Assign,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::FatArrow,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::Bang,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_discarded() {
        assert_eq!(
            kinds("1 // line\n/* block\n comment */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unexpected_character_does_not_abort() {
        let tokens = tokenize("let x @ 1;");
        let kinds: Vec<_> = tokens.iter().map(|t| &t.kind).collect();
        assert!(kinds.contains(&&TokenKind::Unexpected('@')));
        assert!(kinds.contains(&&TokenKind::Int(1)));
        assert!(kinds.contains(&&TokenKind::Semicolon));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("let\n  x = 1;");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.column, 1);
        let x = &tokens[1];
        assert_eq!(x.kind, TokenKind::Ident("x".into()));
        assert_eq!(x.span.line, 2);
        assert_eq!(x.span.column, 3);
    }

    #[test]
    fn test_restartable() {
        // tokenizing the same source twice yields the same stream
        let src = "fn add(a, b) { return a + b; }";
        assert_eq!(kinds(src), kinds(src));
    }
}
