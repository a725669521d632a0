//! Nyx VM error types
//!
//! Re-exports nyx-error and provides VM-specific conveniences.

// Re-export the core error types
pub use nyx_error::{Error, ErrorKind, ErrorStatus, Result};

// =============================================================================
// VM-specific error constructors
// =============================================================================

/// Create a StackOverflow error
pub fn stack_overflow() -> Error {
    Error::stack_overflow()
}

/// Create a StackUnderflow error
pub fn stack_underflow() -> Error {
    Error::stack_underflow()
}

/// Create a TypeMismatch error
pub fn type_mismatch(expected: &'static str, got: &'static str) -> Error {
    Error::new(ErrorKind::TypeMismatch, format!("expected {}, got {}", expected, got))
        .with_context("expected", expected)
        .with_context("got", got)
}

/// Create a DivisionByZero error
pub fn division_by_zero() -> Error {
    Error::new(ErrorKind::DivisionByZero, "integer division by zero")
}

/// Create an IllegalOpcode error
pub fn illegal_opcode(byte: u8) -> Error {
    Error::new(ErrorKind::IllegalOpcode, format!("opcode byte 0x{:02x} is unassigned", byte))
        .with_context("byte", format!("0x{:02x}", byte))
}

/// Create an InvalidJump error
pub fn invalid_jump(target: u32, code_len: usize) -> Error {
    Error::new(
        ErrorKind::InvalidJump,
        format!("jump target {} outside code of {} instructions", target, code_len),
    )
    .with_context("target", target.to_string())
    .with_context("code_len", code_len.to_string())
}

/// Create a CallDepthExceeded error
pub fn call_depth_exceeded(max: usize) -> Error {
    Error::new(ErrorKind::CallDepthExceeded, format!("call depth exceeded max {}", max))
        .with_context("max_depth", max.to_string())
}

/// Create a BadMagic error
pub fn bad_magic(found: &[u8]) -> Error {
    Error::new(
        ErrorKind::BadMagic,
        format!("first 4 bytes {:?} are not the NXBC magic", found),
    )
}

/// Create an UnsupportedVersion error
pub fn unsupported_version(found: u32, supported: u32) -> Error {
    Error::new(
        ErrorKind::UnsupportedVersion,
        format!("format version {} (this build supports {})", found, supported),
    )
    .with_context("found", found.to_string())
    .with_context("supported", supported.to_string())
}

/// Create a TruncatedSection error
pub fn truncated_section(name: &'static str, needed: usize, available: usize) -> Error {
    Error::new(
        ErrorKind::TruncatedSection,
        format!("section '{}' needs {} more byte(s), {} available", name, needed, available),
    )
    .with_context("section", name)
}

/// Create a SerializationFailed error
pub fn serialization_failed(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::SerializationFailed, message)
}

/// Create a CollaboratorFailed error
pub fn collaborator_failed(which: &'static str, reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::CollaboratorFailed, reason).with_context("collaborator", which)
}

/// Create a CollaboratorTimeout error
pub fn collaborator_timeout(which: &'static str) -> Error {
    Error::collaborator_timeout(which)
}

/// Create a CollaboratorUnavailable error
pub fn collaborator_unavailable(which: &'static str, reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::CollaboratorUnavailable, reason)
        .with_context("collaborator", which)
        .temporary()
}

/// Create a StorageNotFound error
pub fn storage_not_found(key: impl Into<String>) -> Error {
    let key = key.into();
    Error::new(ErrorKind::StorageNotFound, format!("storage key '{}' not found", key))
        .with_context("key", key)
}

/// Create a StorageFailed error
pub fn storage_failed(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::StorageFailed, reason)
}

/// Create an IoFailed error
pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}
