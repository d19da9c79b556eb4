//! Runtime error types for the Menter evaluator.

use std::fmt;

use menter_types::ErrorCode;

use crate::diagnostics::Trace;
use crate::value::Value;

/// Evaluation error: failed lookups, bad calls, type errors and the
/// control-flow signals that unwind through the evaluator.
#[derive(Debug, Clone)]
pub enum EvalError {
    /// Unknown symbol, member or module export
    UndefinedSymbol(String),
    /// A call on something that is not a function
    NotCallable(String),
    /// Wrong number or shape of arguments
    ArgumentMismatch(String),
    /// Operand or receiver of the wrong type
    TypeMismatch(String),
    /// Access across module boundaries
    IllegalAccess(String),
    /// A custom type extension rejected an operation
    Extension(String),
    /// Generic runtime error
    Runtime(String),
    /// The host cancelled the evaluation
    Cancelled,
    /// An error with the call stack collected while unwinding
    Traced(Box<Trace>),
    /// `return` statement (used internally for control flow)
    Return(Value),
    /// `break` (used internally for control flow)
    Break,
    /// `continue` (used internally for control flow)
    Continue,
}

impl EvalError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UndefinedSymbol(_) => ErrorCode::UNDEFINED_SYMBOL,
            Self::NotCallable(_) => ErrorCode::NOT_CALLABLE,
            Self::ArgumentMismatch(_) => ErrorCode::ARGUMENT_MISMATCH,
            Self::TypeMismatch(_) => ErrorCode::TYPE_MISMATCH,
            Self::IllegalAccess(_) => ErrorCode::ILLEGAL_ACCESS,
            Self::Extension(_) => ErrorCode::EXTENSION_REJECTED,
            Self::Cancelled => ErrorCode::CANCELLED,
            Self::Traced(trace) => trace.code,
            Self::Runtime(_) | Self::Return(_) | Self::Break | Self::Continue => ErrorCode::RUNTIME,
        }
    }

    /// The message without the category prefix `Display` adds.
    pub fn message(&self) -> String {
        match self {
            Self::UndefinedSymbol(msg)
            | Self::NotCallable(msg)
            | Self::ArgumentMismatch(msg)
            | Self::TypeMismatch(msg)
            | Self::IllegalAccess(msg)
            | Self::Extension(msg)
            | Self::Runtime(msg) => msg.clone(),
            Self::Cancelled => "Execution cancelled".to_string(),
            Self::Traced(trace) => trace.message.clone(),
            Self::Return(_) => "return outside of a function".to_string(),
            Self::Break => "break outside of a loop".to_string(),
            Self::Continue => "continue outside of a loop".to_string(),
        }
    }

    /// `return`, `break` and `continue` travel as errors but are not failures.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::Return(_) | Self::Break | Self::Continue)
    }

    pub fn is_traced(&self) -> bool {
        matches!(self, Self::Traced(_))
    }

    /// Append context to the message of an error that has no stack yet.
    pub fn with_suffix(self, suffix: &str) -> Self {
        match self {
            Self::UndefinedSymbol(msg) => Self::UndefinedSymbol(msg + suffix),
            Self::NotCallable(msg) => Self::NotCallable(msg + suffix),
            Self::ArgumentMismatch(msg) => Self::ArgumentMismatch(msg + suffix),
            Self::TypeMismatch(msg) => Self::TypeMismatch(msg + suffix),
            Self::IllegalAccess(msg) => Self::IllegalAccess(msg + suffix),
            Self::Extension(msg) => Self::Extension(msg + suffix),
            Self::Runtime(msg) => Self::Runtime(msg + suffix),
            other => other,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedSymbol(msg) => write!(f, "undefined symbol: {msg}"),
            Self::NotCallable(msg) => write!(f, "not callable: {msg}"),
            Self::ArgumentMismatch(msg) => write!(f, "argument mismatch: {msg}"),
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Self::IllegalAccess(msg) => write!(f, "illegal access: {msg}"),
            Self::Extension(msg) => write!(f, "extension error: {msg}"),
            Self::Runtime(msg) => write!(f, "runtime error: {msg}"),
            Self::Cancelled => write!(f, "execution cancelled"),
            Self::Traced(trace) => write!(f, "{}{}", trace.message, trace.render()),
            Self::Return(_) => write!(f, "return"),
            Self::Break => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
