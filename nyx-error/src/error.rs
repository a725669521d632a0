//! The main Error type for Nyx

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all Nyx operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use nyx_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::CollaboratorTimeout, "knowledge backend did not answer")
///     .with_operation("vm::knowledge_query")
///     .with_status(ErrorStatus::Temporary)
///     .with_context("query", "what is a closure")
///     .with_context("timeout_ms", "5000");
///
/// assert_eq!(err.kind(), ErrorKind::CollaboratorTimeout);
/// assert!(err.status().is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up a single context value by key (first match)
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the error status
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach a 1-based source position (line, column) as context.
    /// Lex/parse/compile errors carry their offending token's position this way.
    pub fn with_position(self, line: u32, column: u32) -> Self {
        self.with_context("line", line.to_string())
            .with_context("column", column.to_string())
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

// =============================================================================
// std::error::Error implementation
// =============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Convenient From implementations (be careful not to leak raw errors!)
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create an Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    /// Create a StackOverflow error
    pub fn stack_overflow() -> Self {
        Self::new(ErrorKind::StackOverflow, "stack depth exceeded maximum")
    }

    /// Create a StackUnderflow error
    pub fn stack_underflow() -> Self {
        Self::new(ErrorKind::StackUnderflow, "cannot pop from empty stack")
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }

    /// Create an UnresolvedSymbol error
    pub fn unresolved_symbol(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::UnresolvedSymbol, format!("no binding for '{}'", name))
            .with_context("symbol", name)
    }

    /// Create an ArityMismatch error
    pub fn arity_mismatch(name: impl Into<String>, expected: usize, got: usize) -> Self {
        let name = name.into();
        Self::new(
            ErrorKind::ArityMismatch,
            format!("'{}' takes {} argument(s), got {}", name, expected, got),
        )
        .with_context("function", name)
        .with_context("expected", expected.to_string())
        .with_context("got", got.to_string())
    }

    /// Create an InvalidConstant error
    pub fn invalid_constant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConstant, message)
    }

    /// Create a CollaboratorTimeout error
    pub fn collaborator_timeout(what: impl Into<String>) -> Self {
        let what = what.into();
        Self::new(ErrorKind::CollaboratorTimeout, format!("'{}' timed out", what))
            .with_context("collaborator", what)
            .temporary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::UnresolvedSymbol, "no binding for 'x'");
        assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
        assert_eq!(err.message(), "no binding for 'x'");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::CollaboratorFailed, "backend rejected query")
            .with_operation("vm::knowledge_query")
            .with_context("query", "closures")
            .with_context("attempt", "1");

        assert_eq!(err.operation(), "vm::knowledge_query");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("query", "closures".to_string()));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("storage::save")
            .with_operation("repl::persist_session");

        assert_eq!(err.operation(), "repl::persist_session");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "storage::save".to_string()));
    }

    #[test]
    fn test_temporary_status() {
        let err = Error::new(ErrorKind::CollaboratorTimeout, "no answer in 5s");
        assert!(err.is_retryable()); // CollaboratorTimeout defaults to temporary

        let err = Error::new(ErrorKind::BadMagic, "not an nxb file");
        assert!(!err.is_retryable()); // BadMagic defaults to permanent
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection refused").temporary();
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::CollaboratorTimeout, "voice backend unavailable")
            .with_operation("vm::listen")
            .with_context("timeout_ms", "3000");

        let display = format!("{}", err);
        assert!(display.contains("CollaboratorTimeout"));
        assert!(display.contains("temporary"));
        assert!(display.contains("vm::listen"));
        assert!(display.contains("timeout_ms: 3000"));
    }

    #[test]
    fn test_position_context() {
        let err = Error::parse_failed("expected ')' after arguments").with_position(3, 14);
        assert_eq!(err.context_value("line"), Some("3"));
        assert_eq!(err.context_value("column"), Some("14"));
    }

    #[test]
    fn test_convenience_constructors() {
        let err = Error::unresolved_symbol("frobnicate");
        assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
        assert!(err.message().contains("frobnicate"));

        let err = Error::arity_mismatch("greet", 2, 3);
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
        assert_eq!(err.context_value("expected"), Some("2"));

        let err = Error::stack_underflow();
        assert_eq!(err.kind(), ErrorKind::StackUnderflow);
    }

    #[test]
    fn test_set_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::new(ErrorKind::FileNotFound, "artifact.nxb not found").set_source(io_err);

        assert!(err.source_ref().is_some());
    }
}
