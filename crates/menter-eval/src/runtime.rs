//! The host-facing runtime.
//!
//! A [`Runtime`] owns every loaded unit. Sources are parsed on `load` but
//! only evaluated by `finish_loading`, which links imports and runs the
//! pending units in dependency order. `evaluate` runs a snippet against a
//! fresh unit that sees everything loaded so far.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use menter_lexer::tokenize;
use menter_parser::{Parser, ParserNode};
use menter_types::{ErrorCode, MenterError, Operator, Result, SourceText};
use tracing::{debug, error, info};

use crate::builtins;
use crate::custom::CustomType;
use crate::debug::DebugSession;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{CallContext, Evaluator};
use crate::module::{self, Unit};
use crate::operators::OperatorRoutine;
use crate::options::RuntimeOptions;
use crate::value::{Data, Value};

/// Unit name used by [`Runtime::evaluate`].
pub const EVAL_UNIT: &str = "eval";

/// Requests cancellation of a running evaluation from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Runtime {
    evaluator: Evaluator,
    options: RuntimeOptions,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with the core modules loaded.
    pub fn new() -> Self {
        let mut runtime = Self {
            evaluator: Evaluator::new(),
            options: RuntimeOptions::default(),
        };
        builtins::register(&mut runtime.evaluator);
        for (name, source) in builtins::sources() {
            if let Err(err) = runtime.load(&source, name) {
                error!(unit = name, %err, "failed to load core module");
            }
        }
        if let Err(err) = runtime.finish_loading() {
            error!(%err, "failed to evaluate core modules");
        }
        runtime
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut runtime = Self::new();
        runtime.options = options;
        runtime
    }

    // ══════════════════════════════════════════════════════════════════════
    // Loading
    // ══════════════════════════════════════════════════════════════════════

    /// Parse `source` and register it as a pending unit.
    pub fn load(&mut self, source: &str, unit_name: &str) -> Result<()> {
        let root = self.parse(source, unit_name)?;
        let unit = Unit::new(unit_name);
        unit.absorb(root, &self.options)?;
        self.evaluator.units.push(unit);
        Ok(())
    }

    /// Link and evaluate every pending unit, each after the units it
    /// imports from.
    ///
    /// A module error discards the whole pending batch before anything in
    /// it runs.
    pub fn finish_loading(&mut self) -> Result<()> {
        let pending: Vec<Rc<Unit>> = self
            .evaluator
            .units
            .iter()
            .filter(|u| u.is_pending())
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let ordered = match self.order_pending(&pending) {
            Ok(ordered) => ordered,
            Err(err) => {
                self.evaluator
                    .units
                    .retain(|u| !pending.iter().any(|p| Rc::ptr_eq(p, u)));
                return Err(err);
            }
        };
        if self.evaluator.debug.log_import_order {
            let names: Vec<&str> = ordered.iter().map(|u| u.name.as_str()).collect();
            info!(order = ?names, "import order");
        }

        for unit in &ordered {
            self.evaluator
                .run_unit(unit)
                .map_err(|err| into_menter_error(&unit.name, err))?;
        }
        Ok(())
    }

    fn order_pending(&self, pending: &[Rc<Unit>]) -> Result<Vec<Rc<Unit>>> {
        for unit in pending {
            module::link(unit, &self.evaluator.units)?;
        }
        module::order(pending, self.evaluator.units.len())
    }

    fn parse(&self, source: &str, unit_name: &str) -> Result<ParserNode> {
        let source = SourceText::new(unit_name, source);
        let tokens = tokenize(&source, &self.evaluator.operators)?;
        if self.evaluator.debug.log_lexer {
            for token in &tokens {
                debug!(unit = unit_name, kind = ?token.kind, text = %token.text, "token");
            }
        }
        let root = Parser::new(&self.evaluator.operators)
            .with_progress_logging(self.evaluator.debug.log_parser_progress)
            .parse(&source, tokens)?;
        if self.evaluator.debug.log_parser {
            debug!(unit = unit_name, tree = %root.reconstruct(), "parse tree");
        }
        Ok(root)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Evaluation
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate `expression` against a fresh unit. Pending units are
    /// finished first.
    pub fn evaluate(&mut self, expression: &str) -> Result<Value> {
        self.reset_cancellation();
        self.finish_loading()?;
        let root = self.parse(expression, EVAL_UNIT)?;
        let unit = Unit::new(EVAL_UNIT);
        unit.absorb(root, &self.options)?;
        self.run_snippet(&unit)
    }

    /// Evaluate `expression` in the named unit, creating it on first use.
    /// Symbols defined by one call stay visible to the next.
    pub fn evaluate_in_context_of(&mut self, expression: &str, unit_name: &str) -> Result<Value> {
        self.reset_cancellation();
        self.finish_loading()?;
        let root = self.parse(expression, unit_name)?;
        let unit = match self.evaluator.units.iter().rev().find(|u| u.name == unit_name) {
            Some(unit) => unit.clone(),
            None => {
                let unit = Unit::new(unit_name);
                self.evaluator.units.push(unit.clone());
                unit
            }
        };
        unit.absorb(root, &self.options)?;
        self.run_snippet(&unit)
    }

    fn run_snippet(&mut self, unit: &Rc<Unit>) -> Result<Value> {
        if let Err(err) = module::link(unit, &self.evaluator.units) {
            unit.take_pending();
            unit.mark_evaluated();
            return Err(err);
        }
        self.evaluator
            .run_unit(unit)
            .map_err(|err| into_menter_error(&unit.name, err))
    }

    fn reset_cancellation(&self) {
        self.evaluator.cancel_flag().store(false, Ordering::Relaxed);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Host extension
    // ══════════════════════════════════════════════════════════════════════

    /// Install a custom type. Its prototype is exported under its tag from
    /// the module the type names.
    pub fn register_extension(&mut self, prototype: Rc<dyn CustomType>) -> Result<()> {
        let tag = prototype.tag().to_string();
        let module_name = prototype.module();
        let unit_name = format!("custom:{module_name}");
        self.evaluator
            .types
            .register(prototype.clone())
            .map_err(|e| MenterError::new(&unit_name, ErrorCode::EXTENSION_REJECTED, e.to_string()))?;

        let unit = match self.evaluator.units.iter().find(|u| u.name == unit_name) {
            Some(unit) => unit.clone(),
            None => {
                let unit = Unit::new(unit_name);
                unit.mark_evaluated();
                self.evaluator.units.push(unit.clone());
                unit
            }
        };
        unit.symbols
            .borrow_mut()
            .insert(tag.clone(), Value::new(Data::Type(prototype)));
        unit.export(&module_name, &tag);
        debug!(tag = %tag, module = %module_name, "registered custom type");
        Ok(())
    }

    /// Provide the implementation of `native name()` declared in units
    /// that export `module`.
    pub fn register_native<F>(&mut self, module: &str, name: &str, func: F)
    where
        F: Fn(&mut CallContext<'_>, Vec<Value>) -> EvalResult<Value> + 'static,
    {
        self.evaluator.register_native(module, name, Rc::new(func));
    }

    /// Add an operator for sources loaded from now on.
    pub fn register_operator(&mut self, operator: Operator, routine: OperatorRoutine) {
        self.evaluator.operators.register(operator.clone());
        self.evaluator.routines.insert(operator, routine);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Accessors
    // ══════════════════════════════════════════════════════════════════════

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RuntimeOptions {
        &mut self.options
    }

    pub fn debug_session(&self) -> &DebugSession {
        &self.evaluator.debug
    }

    pub fn debug_session_mut(&mut self) -> &mut DebugSession {
        &mut self.evaluator.debug
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.evaluator.cancel_flag())
    }

    /// Every unit loaded so far, in registration order.
    pub fn units(&self) -> &[Rc<Unit>] {
        &self.evaluator.units
    }

    /// Lines printed by scripts since the last [`Runtime::take_output`].
    pub fn output(&self) -> &[String] {
        &self.evaluator.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.evaluator.output)
    }
}

/// Attach the unit name and, for traced errors, the rendered stack.
fn into_menter_error(unit: &str, err: EvalError) -> MenterError {
    match err {
        EvalError::Traced(trace) => trace.into_error(unit),
        other => MenterError::new(unit, other.code(), other.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_modules_loaded() {
        let runtime = Runtime::new();
        let names: Vec<&str> = runtime.units().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["common", "system", "math", "reflect", "debug", "io"]);
        assert!(runtime.units().iter().all(|u| u.is_evaluated()));
    }

    #[test]
    fn test_cancel_handle_shares_flag() {
        let runtime = Runtime::new();
        let handle = runtime.cancel_handle();
        assert!(!handle.is_cancelled());
        runtime.cancel_handle().cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_traced_error_keeps_unit_name() {
        let err = into_menter_error("main", EvalError::Runtime("boom".into()));
        assert_eq!(err.unit, "main");
        assert_eq!(err.message, "boom");
    }
}
