//! # Nyx Compiler
//!
//! The front half of the Nyx pipeline: source text -> tokens -> AST ->
//! compiled unit. The back half (container format, VM) lives in `nyx-vm`.
//!
//! ```rust
//! use nyx_compiler::compile_source;
//!
//! let compiled = compile_source("print(1 + 2);").unwrap();
//! assert_eq!(compiled.constants.len(), 2);
//! ```

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{CompilationUnit, Expr, ExprKind, Item, Stmt, StmtKind};
pub use compiler::Compiler;
pub use lexer::{tokenize, Lexer};
pub use parser::{parse_source, Parser};
pub use token::{Span, Token, TokenKind};

use nyx_error::Result;
use nyx_vm::CompiledUnit;

/// Lex, parse and compile a source string in one step. Strict: the first
/// lex/parse/compile error fails the whole unit.
pub fn compile_source(source: &str) -> Result<CompiledUnit> {
    let unit = parse_source(source)?;
    Compiler::new().compile(&unit)
}

/// Like `compile_source`, with a unit name recorded in the metadata.
pub fn compile_named(source: &str, name: &str) -> Result<CompiledUnit> {
    let unit = parse_source(source)?;
    Compiler::new().with_source_name(name).compile(&unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_end_to_end() {
        let compiled = compile_source("let x = 1; print(x + 41);").unwrap();
        assert!(!compiled.code.is_empty());
    }

    #[test]
    fn test_compile_named_sets_metadata() {
        let compiled = compile_named("print(1);", "demo.nyx").unwrap();
        assert_eq!(compiled.metadata.get("name").map(String::as_str), Some("demo.nyx"));
    }

    #[test]
    fn test_compile_source_propagates_parse_errors() {
        let err = compile_source("bad syntax (").unwrap_err();
        assert_eq!(err.kind(), nyx_error::ErrorKind::ParseFailed);
    }
}
