//! Call stacks, symbol listings and "did you mean" suggestions for
//! execution errors.
//!
//! Frames are collected while an error unwinds through the evaluator, so a
//! successful evaluation never pays for them.

use std::fmt::Write as _;

use indexmap::IndexMap;
use menter_types::{ErrorCode, MenterError};

use crate::env::Scope;
use crate::module::Unit;
use crate::value::Value;

/// Symbols listed per table before the listing is cut off.
const SYMBOL_LIST_LIMIT: usize = 20;

/// One evaluated node on the way to the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub unit: String,
    /// The node being evaluated, reconstructed as source.
    pub call_site: String,
    /// Set on the frame of a function call.
    pub function: Option<String>,
}

/// Symbol tables captured where the error was raised.
#[derive(Debug, Clone, Default)]
pub struct SymbolReport {
    /// `name = value (type)` for the symbols the debug session watches.
    pub debugger: Vec<String>,
    /// `name (type)` for symbols that are not unit globals.
    pub locals: Vec<String>,
    /// `name (type)` for the unit's globals.
    pub globals: Vec<String>,
}

impl SymbolReport {
    pub fn capture(scope: &Scope, unit: &Unit, watched: &[String]) -> Self {
        let globals = unit.symbols.borrow().clone();
        let mut locals = scope.effective();
        locals.retain(|name, _| !globals.contains_key(name));

        let debugger = watched
            .iter()
            .map(|name| {
                let value = locals
                    .get(name)
                    .or_else(|| globals.get(name))
                    .cloned()
                    .unwrap_or_else(Value::empty);
                format!("{name} = {}", value.describe())
            })
            .collect();

        Self {
            debugger,
            locals: typed_names(&locals),
            globals: typed_names(&globals),
        }
    }
}

fn typed_names(symbols: &IndexMap<String, Value>) -> Vec<String> {
    let mut names: Vec<String> = symbols
        .iter()
        .map(|(name, value)| format!("{name} ({})", value.type_name()))
        .collect();
    names.sort();
    names
}

fn format_symbol_list(names: &[String]) -> String {
    let mut out = names
        .iter()
        .take(SYMBOL_LIST_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > SYMBOL_LIST_LIMIT {
        out.push_str(", ...");
    }
    out
}

/// An execution error with the stack it unwound through.
#[derive(Debug, Clone)]
pub struct Trace {
    pub code: ErrorCode,
    pub message: String,
    /// Innermost frame first.
    pub frames: Vec<Frame>,
    pub symbols: SymbolReport,
}

impl Trace {
    pub fn new(code: ErrorCode, message: String, symbols: SymbolReport) -> Self {
        Self {
            code,
            message,
            frames: Vec::new(),
            symbols,
        }
    }

    /// Frame labels after rippling function names from older frames down
    /// to newer ones, as long as the unit stays the same.
    fn labels(&self) -> Vec<String> {
        let mut labels = vec![String::new(); self.frames.len()];
        let mut function: Option<&str> = None;
        let mut unit: Option<&str> = None;
        for (i, frame) in self.frames.iter().enumerate().rev() {
            if let Some(name) = frame.function.as_deref() {
                function = Some(name);
                unit = Some(&frame.unit);
            } else if unit != Some(frame.unit.as_str()) {
                function = None;
                unit = Some(&frame.unit);
            }
            labels[i] = match (frame.unit.is_empty(), function) {
                (false, Some(function)) => format!("{}.{function}", frame.unit),
                (false, None) => frame.unit.clone(),
                (true, Some(function)) => function.to_string(),
                (true, None) => "unknown".to_string(),
            };
        }
        labels
    }

    /// The stack listing and symbol tables, rendered after the message.
    pub fn render(&self) -> String {
        let labels = self.labels();
        let width = labels.iter().map(String::len).max().unwrap_or(0);
        let mut out = String::new();
        for (label, frame) in labels.iter().zip(&self.frames) {
            let _ = write!(out, "\n\tin [{label:<width$}] at {}", frame.call_site);
        }

        let symbols = &self.symbols;
        if !symbols.debugger.is_empty() {
            out.push_str("\n\tDebugger symbols:\n\t\t");
            out.push_str(&symbols.debugger.join("\n\t\t"));
        }
        if !symbols.locals.is_empty() {
            out.push_str("\n\tLocal symbols:  ");
            out.push_str(&format_symbol_list(&symbols.locals));
        }
        if !symbols.globals.is_empty() {
            out.push_str("\n\tGlobal symbols: ");
            out.push_str(&format_symbol_list(&symbols.globals));
        }
        out
    }

    pub fn into_error(self, unit: &str) -> MenterError {
        let detail = self.render();
        MenterError::new(unit, self.code, self.message).with_detail(detail)
    }
}

/// How closely `candidate` spells out `identifier`: each character of the
/// identifier found in order scores 1, or 0.5 when characters were skipped
/// in between.
pub fn similarity(identifier: &str, candidate: &str) -> f64 {
    let wanted: Vec<char> = identifier.to_lowercase().chars().collect();
    let mut next = 0;
    let mut score = 0.0;
    let mut adjacent = true;
    for c in candidate.to_lowercase().chars() {
        if next < wanted.len() && c == wanted[next] {
            score += if adjacent { 1.0 } else { 0.5 };
            next += 1;
            adjacent = true;
        } else {
            adjacent = false;
        }
    }
    score
}

/// The best `limit` candidates for a misspelled `identifier`.
pub fn suggestions(
    identifier: &str,
    candidates: impl IntoIterator<Item = String>,
    limit: usize,
) -> Vec<String> {
    let mut scored: Vec<(f64, String)> = Vec::new();
    for candidate in candidates {
        if candidate == identifier || scored.iter().any(|(_, c)| *c == candidate) {
            continue;
        }
        let score = similarity(identifier, &candidate);
        if score > 0.0 {
            scored.push((score, candidate));
        }
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(unit: &str, call_site: &str, function: Option<&str>) -> Frame {
        Frame {
            unit: unit.to_string(),
            call_site: call_site.to_string(),
            function: function.map(str::to_string),
        }
    }

    #[test]
    fn test_labels_ripple_until_unit_changes() {
        let mut trace = Trace::new(ErrorCode::RUNTIME, "boom".into(), SymbolReport::default());
        trace.frames = vec![
            frame("lib", "x.y", None),
            frame("lib", "fail()", Some("fail")),
            frame("main", "a + 1", None),
            frame("main", "run()", Some("run")),
        ];
        let rendered = trace.render();
        let lines: Vec<&str> = rendered.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines[0], "\tin [lib.fail] at x.y");
        assert_eq!(lines[1], "\tin [lib.fail] at fail()");
        assert_eq!(lines[2], "\tin [main.run] at a + 1");
        assert_eq!(lines[3], "\tin [main.run] at run()");
    }

    #[test]
    fn test_labels_are_padded() {
        let mut trace = Trace::new(ErrorCode::RUNTIME, "boom".into(), SymbolReport::default());
        trace.frames = vec![frame("a", "x", None), frame("main", "f()", Some("f"))];
        let rendered = trace.render();
        assert!(rendered.contains("\tin [a     ] at x"));
        assert!(rendered.contains("\tin [main.f] at f()"));
    }

    #[test]
    fn test_symbol_lists() {
        let symbols = SymbolReport {
            debugger: vec!["a = 5 (number)".into()],
            locals: vec!["x (number)".into()],
            globals: (0..25).map(|i| format!("g{i:02} (number)")).collect(),
        };
        let trace = Trace {
            code: ErrorCode::RUNTIME,
            message: "boom".into(),
            frames: Vec::new(),
            symbols,
        };
        let rendered = trace.render();
        assert!(rendered.contains("\n\tDebugger symbols:\n\t\ta = 5 (number)"));
        assert!(rendered.contains("\n\tLocal symbols:  x (number)"));
        assert!(rendered.contains("g19 (number), ..."));
        assert!(!rendered.contains("g20"));
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("prnt", "print"), 3.5);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("Size", "size"), 4.0);
    }

    #[test]
    fn test_suggestions_rank_best_first() {
        let candidates = ["print", "range", "println", "x"].map(String::from);
        let found = suggestions("prnt", candidates, 2);
        assert_eq!(found, vec!["print", "println"]);
    }
}
