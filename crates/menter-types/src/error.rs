use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Fatal tokenizer failure; aborts loading the unit.
    Scan,
    /// Grammar mismatch; no partial tree is ever evaluated.
    Parse,
    /// Runtime failure carrying the call stack.
    Execution,
    /// Import ordering or binding failure; aborts the pending batch.
    Module,
}

/// Numeric error code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Scan errors (E100–E199) ──
    pub const UNEXPECTED_CHARACTER: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const UNTERMINATED_REGEX: Self = Self(102);
    pub const INVALID_NUMBER: Self = Self(103);

    // ── Parse errors (E200–E299) ──
    pub const UNREDUCED_INPUT: Self = Self(200);
    pub const MALFORMED_NODE: Self = Self(201);

    // ── Execution errors (E300–E399) ──
    pub const UNDEFINED_SYMBOL: Self = Self(300);
    pub const NOT_CALLABLE: Self = Self(301);
    pub const ARGUMENT_MISMATCH: Self = Self(302);
    pub const TYPE_MISMATCH: Self = Self(303);
    pub const ILLEGAL_ACCESS: Self = Self(304);
    pub const EXTENSION_REJECTED: Self = Self(305);
    pub const CANCELLED: Self = Self(306);
    pub const RUNTIME: Self = Self(399);

    // ── Module errors (E400–E499) ──
    pub const CIRCULAR_IMPORT: Self = Self(400);
    pub const DUPLICATE_MODULE: Self = Self(401);
    pub const DUPLICATE_IMPORT: Self = Self(402);
    pub const FORBIDDEN_IMPORT: Self = Self(403);
    pub const UNKNOWN_MODULE: Self = Self(404);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Scan,
            200..=299 => ErrorCategory::Parse,
            400..=499 => ErrorCategory::Module,
            _ => ErrorCategory::Execution,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Parse => write!(f, "parse"),
            Self::Execution => write!(f, "execution"),
            Self::Module => write!(f, "module"),
        }
    }
}

/// A structured Menter error, shared by every stage of the runtime.
///
/// `detail` holds stage-specific context: the offending source line for
/// scan errors, a reconstructed token window for parse errors, and the
/// formatted call stack with symbol tables for execution errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenterError {
    /// Name of the unit being loaded or evaluated.
    pub unit: String,
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl MenterError {
    pub fn new(unit: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            code,
            category: code.category(),
            message: message.into(),
            span: None,
            detail: String::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach context text; it is rendered directly after the message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn is(&self, category: ErrorCategory) -> bool {
        self.category == category
    }
}

impl fmt::Display for MenterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unit)?;
        if let Some(span) = self.span {
            write!(f, ":{span}")?;
        }
        write!(
            f,
            ": {} [{}] {}{}",
            self.code, self.category, self.message, self.detail
        )
    }
}

impl std::error::Error for MenterError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::UNEXPECTED_CHARACTER.category(), ErrorCategory::Scan);
        assert_eq!(ErrorCode::UNREDUCED_INPUT.category(), ErrorCategory::Parse);
        assert_eq!(ErrorCode::UNDEFINED_SYMBOL.category(), ErrorCategory::Execution);
        assert_eq!(ErrorCode::RUNTIME.category(), ErrorCategory::Execution);
        assert_eq!(ErrorCode::CIRCULAR_IMPORT.category(), ErrorCategory::Module);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::TYPE_MISMATCH.to_string(), "E303");
        assert_eq!(ErrorCode::UNKNOWN_MODULE.to_string(), "E404");
    }

    #[test]
    fn test_display_with_span_and_detail() {
        let err = MenterError::new("main", ErrorCode::UNEXPECTED_CHARACTER, "Unexpected character '@'")
            .with_span(Span::point(2, 4))
            .with_detail("\nx @ y\n  ^");
        assert_eq!(
            err.to_string(),
            "main:2:4: E100 [scan] Unexpected character '@'\nx @ y\n  ^"
        );
    }

    #[test]
    fn test_display_without_span() {
        let err = MenterError::new("eval", ErrorCode::CIRCULAR_IMPORT, "Circular dependency");
        assert_eq!(err.to_string(), "eval: E400 [module] Circular dependency");
        assert!(err.is(ErrorCategory::Module));
    }

    #[test]
    fn test_json_serialization() {
        let err = MenterError::new("eval", ErrorCode::UNDEFINED_SYMBOL, "Cannot resolve symbol 'x'");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"category\":\"execution\""));
        assert!(!json.contains("\"span\""));
        assert!(!json.contains("\"detail\""));

        let back: MenterError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::UNDEFINED_SYMBOL);
        assert_eq!(back.message, err.message);
    }

    #[test]
    fn test_error_determinism_100_iterations() {
        let make = || {
            MenterError::new("eval", ErrorCode::TYPE_MISMATCH, "Type mismatch")
                .with_span(Span::new(1, 2, 1, 5))
        };
        let first = serde_json::to_string(&make()).unwrap();
        for i in 0..100 {
            let json = serde_json::to_string(&make()).unwrap();
            assert_eq!(first, json, "Determinism failure at iteration {i}");
        }
    }
}
