//! Shared types for the Menter runtime.
//!
//! This crate defines source spans, the structured error type used by every
//! stage, and the operator table consulted by both the lexer and the parser.

mod error;
mod span;
pub mod operator;

pub use error::{ErrorCategory, ErrorCode, MenterError};
pub use operator::{Operator, OperatorTable};
pub use span::{SourceText, Span};

/// Result type used throughout the Menter runtime.
pub type Result<T> = std::result::Result<T, MenterError>;
