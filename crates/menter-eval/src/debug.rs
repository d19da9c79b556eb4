//! Runtime debug switches.
//!
//! Everything the session enables is reported through `tracing`; a host
//! sees the output once it installs a subscriber.

use num_traits::ToPrimitive;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Flags accepted by `debug.switch`, besides `interpreter`.
pub const SWITCH_FLAGS: [&str; 5] = [
    "lexer",
    "parser",
    "parser progress",
    "interpreter resolve",
    "import order",
];

/// Highest interpreter verbosity level.
pub const MAX_EVALUATION_STYLE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSession {
    pub log_lexer: bool,
    pub log_parser: bool,
    /// Log every parser rewrite.
    pub log_parser_progress: bool,
    /// Log each symbol lookup.
    pub log_resolve: bool,
    pub log_import_order: bool,
    /// 0 is silent; 1 logs each evaluated node, 2 adds its result, 3 adds
    /// the visible symbols.
    pub evaluation_style: u8,
    /// Reconstructed statement text that logs the visible symbols when hit.
    pub breakpoint: Option<String>,
    /// Symbols whose values are listed in stack traces.
    pub stack_trace_values: Vec<String>,
    /// "Did you mean" candidates offered for an unknown symbol.
    pub suggestion_count: usize,
}

impl Default for DebugSession {
    fn default() -> Self {
        Self {
            log_lexer: false,
            log_parser: false,
            log_parser_progress: false,
            log_resolve: false,
            log_import_order: false,
            evaluation_style: 0,
            breakpoint: None,
            stack_trace_values: Vec::new(),
            suggestion_count: 3,
        }
    }
}

impl DebugSession {
    /// Set a flag from a script. Without a value the flag toggles;
    /// `interpreter` takes a verbosity level.
    pub fn switch(&mut self, flag: &str, value: Option<&Value>) -> EvalResult<()> {
        if flag == "interpreter" {
            self.evaluation_style = match value {
                Some(level) => {
                    let level = level
                        .numeric()
                        .and_then(|n| n.to_u8())
                        .filter(|l| *l <= MAX_EVALUATION_STYLE)
                        .ok_or_else(|| {
                            EvalError::ArgumentMismatch(format!(
                                "Interpreter debug level must be between 0 and {MAX_EVALUATION_STYLE}, got {}",
                                level.describe()
                            ))
                        })?;
                    level
                }
                None if self.evaluation_style == 0 => 1,
                None => 0,
            };
            return Ok(());
        }

        let slot = match flag {
            "lexer" => &mut self.log_lexer,
            "parser" => &mut self.log_parser,
            "parser progress" => &mut self.log_parser_progress,
            "interpreter resolve" => &mut self.log_resolve,
            "import order" => &mut self.log_import_order,
            _ => {
                return Err(EvalError::ArgumentMismatch(format!(
                    "Unknown debugger flag: {flag}, must be one of: {}",
                    SWITCH_FLAGS.join(", ")
                )))
            }
        };
        *slot = match value {
            Some(value) => value.truthy(),
            None => !*slot,
        };
        Ok(())
    }
}
