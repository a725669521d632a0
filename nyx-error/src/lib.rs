//! # nyx-error
//!
//! Unified error handling for Nyx - following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., BadMagic, UnresolvedSymbol)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use nyx_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::BadMagic, "first 4 bytes are not 'NXBC'")
//!         .with_operation("container::deserialize")
//!         .with_context("path", "hello.nxb"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, nyx_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using Nyx Error
pub type Result<T> = std::result::Result<T, Error>;
