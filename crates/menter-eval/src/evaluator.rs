//! Core tree-walking evaluator.
//!
//! Every node is evaluated against the unit it belongs to and a [`Scope`]
//! of local bindings. Errors travel up as [`EvalError`]; the first
//! non-structural node an error passes through captures the visible
//! symbols, and every node on the way out adds a [`Frame`].

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use menter_lexer::{Token, TokenKind};
use menter_parser::{into_code_block, reconstruct, Element, NodeKind, ParserNode};
use menter_types::{Operator, OperatorTable};
use tracing::{debug, info};

use crate::custom::TypeRegistry;
use crate::debug::DebugSession;
use crate::diagnostics::{suggestions, Frame, SymbolReport, Trace};
use crate::env::Scope;
use crate::error::{EvalError, EvalResult};
use crate::function::{Function, NativeFn, NativeFunction, NodeFunction};
use crate::module::{Module, Unit};
use crate::number;
use crate::operators::{OperatorRoutine, OperatorRoutines};
use crate::value::{Data, Key, RegexValue, Value};
use crate::value_functions;

/// How a symbol that does not exist is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Throw,
    /// Create the missing symbol; used for assignment targets.
    Create,
}

/// What a called function sees besides its parameters.
pub(crate) enum Receiver {
    None,
    /// `self` for a member call.
    Object(Value),
    /// `args` for a constructor call.
    Constructor,
}

/// Value passed along a pipeline into the final call of a chain.
struct Injection {
    value: Value,
    first: bool,
}

/// Where a symbol chain is being resolved. Accessing an imported module
/// switches the unit and limits lookups to its globals.
struct Path {
    unit: Rc<Unit>,
    scope: Scope,
    module: Option<Module>,
}

enum Lookup {
    Found(Value),
    Switched,
    Missing,
}

/// State shared by every evaluation of a runtime.
pub struct Evaluator {
    /// Registered units, in registration order.
    pub(crate) units: Vec<Rc<Unit>>,
    natives: HashMap<(String, String), NativeFn>,
    pub(crate) types: TypeRegistry,
    pub(crate) operators: OperatorTable,
    pub(crate) routines: OperatorRoutines,
    pub debug: DebugSession,
    /// Lines printed by scripts.
    pub output: Vec<String>,
    cancel: Arc<AtomicBool>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to native and value functions.
pub struct CallContext<'a> {
    pub evaluator: &'a mut Evaluator,
    /// The calling unit.
    pub unit: Rc<Unit>,
    /// The caller's scope.
    pub scope: Scope,
}

impl CallContext<'_> {
    /// Call a function value from host code.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> EvalResult<Value> {
        self.evaluator
            .call_function("", function, args, &self.unit, &self.scope, Receiver::None)
    }

    pub fn print(&mut self, line: String) {
        info!(target: "menter::print", unit = %self.unit.name, "{line}");
        self.evaluator.output.push(line);
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            natives: HashMap::new(),
            types: TypeRegistry::new(),
            operators: OperatorTable::standard(),
            routines: OperatorRoutines::standard(),
            debug: DebugSession::default(),
            output: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_native(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        func: NativeFn,
    ) {
        self.natives.insert((module.into(), name.into()), func);
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Fails once cancellation was requested.
    fn tick(&self) -> EvalResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(EvalError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Evaluate the pending statements of `unit` against its globals.
    pub(crate) fn run_unit(&mut self, unit: &Rc<Unit>) -> EvalResult<Value> {
        let statements = unit.take_pending();
        let scope = Scope::new(unit.symbols.clone());
        let result = self.eval_block(&statements, unit, &scope);
        unit.mark_evaluated();
        match result {
            Err(EvalError::Return(value)) => Ok(value),
            Err(EvalError::Break | EvalError::Continue) => Ok(Value::empty()),
            other => other,
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn eval(
        &mut self,
        element: &Element,
        unit: &Rc<Unit>,
        scope: &Scope,
        mode: Mode,
    ) -> EvalResult<Value> {
        if let Element::Node(node) = element {
            if matches!(
                node.kind,
                NodeKind::Root | NodeKind::Statement | NodeKind::CodeBlock | NodeKind::CurlyBracketPair
            ) {
                return self.eval_block(&node.children, unit, scope);
            }
        }

        if self.debug.evaluation_style > 0 {
            self.log_evaluation(element, unit, scope);
        }
        match self.eval_element(element, unit, scope, mode) {
            Ok(value) => {
                if self.debug.evaluation_style > 1 {
                    debug!(result = %value.describe(), "evaluated");
                }
                Ok(value)
            }
            Err(err) => Err(self.trace(err, element, unit, scope)),
        }
    }

    /// Evaluate statements in order; the last result is the block's value.
    pub(crate) fn eval_block(
        &mut self,
        statements: &[Element],
        unit: &Rc<Unit>,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let mut result = Value::empty();
        for statement in statements {
            self.tick()?;
            if let Some(breakpoint) = &self.debug.breakpoint {
                if reconstruct(statement) == *breakpoint {
                    let symbols = SymbolReport::capture(scope, unit, &self.debug.stack_trace_values);
                    info!(
                        unit = %unit.name,
                        breakpoint = %breakpoint,
                        debugger = ?symbols.debugger,
                        locals = ?symbols.locals,
                        globals = ?symbols.globals,
                        "breakpoint reached"
                    );
                }
            }
            result = self.eval(statement, unit, scope, Mode::Throw)?;
        }
        Ok(result)
    }

    fn eval_element(
        &mut self,
        element: &Element,
        unit: &Rc<Unit>,
        scope: &Scope,
        mode: Mode,
    ) -> EvalResult<Value> {
        let node = match element {
            Element::Token(token) => return self.eval_token(token, element, unit, scope, mode),
            Element::Node(node) => node,
        };
        match node.kind {
            NodeKind::Root | NodeKind::Statement | NodeKind::CodeBlock | NodeKind::CurlyBracketPair => {
                self.eval_block(&node.children, unit, scope)
            }
            NodeKind::Return => {
                let value = match node.child(0) {
                    Some(value) => self.eval(value, unit, scope, Mode::Throw)?,
                    None => Value::empty(),
                };
                Err(EvalError::Return(value))
            }
            NodeKind::Expression => self.eval_expression(node, unit, scope),
            NodeKind::Assignment => self.eval_assignment(node, unit, scope),
            NodeKind::IdentifierAccessed => self.resolve(element, unit, scope, mode, None),
            NodeKind::ParenthesisPair => self.eval_parenthesis(node, unit, scope, mode),
            NodeKind::Array | NodeKind::ListedElements | NodeKind::SquareBracketPair => {
                self.eval_array(node, unit, scope)
            }
            NodeKind::Map => self.eval_map(node, unit, scope),
            NodeKind::FunctionDeclaration => self.eval_declaration(node, unit, scope),
            NodeKind::FunctionInline => match node.children.as_slice() {
                [params, body] => self.node_function(params, body, unit, scope),
                _ => Err(malformed(node)),
            },
            NodeKind::FunctionCall => self.eval_call(node, unit, scope),
            NodeKind::Conditional => self.eval_conditional(node, unit, scope),
            NodeKind::LoopFor => self.eval_for(node, unit, scope),
            NodeKind::LoopWhile => self.eval_while(node, unit, scope),
            NodeKind::ConstructorCall => match node.child(0) {
                Some(Element::Node(call)) => self.construct(call, unit, scope),
                _ => Err(malformed(node)),
            },
            NodeKind::ImportStatement
            | NodeKind::ImportAsStatement
            | NodeKind::ImportInlineStatement
            | NodeKind::ExportStatement => Err(EvalError::Runtime(format!(
                "Imports and exports are only allowed at the top level of a unit: {}",
                node.reconstruct()
            ))),
            NodeKind::MapElement | NodeKind::ConditionalBranch => Err(malformed(node)),
        }
    }

    /// Wrap an error in a trace on its way out of `element`.
    fn trace(&self, err: EvalError, element: &Element, unit: &Rc<Unit>, scope: &Scope) -> EvalError {
        if err.is_control_flow() {
            return err;
        }
        let mut trace = match err {
            EvalError::Traced(trace) => trace,
            other => {
                let symbols = SymbolReport::capture(scope, unit, &self.debug.stack_trace_values);
                Box::new(Trace::new(other.code(), other.message(), symbols))
            }
        };
        trace.frames.push(Frame {
            unit: unit.name.clone(),
            call_site: reconstruct(element),
            function: None,
        });
        EvalError::Traced(trace)
    }

    fn log_evaluation(&self, element: &Element, unit: &Unit, scope: &Scope) {
        let kind = match element {
            Element::Node(node) => node.kind.to_string(),
            Element::Token(token) => format!("{:?}", token.kind),
        };
        if self.debug.evaluation_style >= 3 {
            let symbols = SymbolReport::capture(scope, unit, &[]);
            debug!(
                unit = %unit.name,
                kind = %kind,
                code = %reconstruct(element),
                locals = ?symbols.locals,
                "evaluate"
            );
        } else {
            debug!(unit = %unit.name, kind = %kind, code = %reconstruct(element), "evaluate");
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────

    fn eval_token(
        &mut self,
        token: &Token,
        element: &Element,
        unit: &Rc<Unit>,
        scope: &Scope,
        mode: Mode,
    ) -> EvalResult<Value> {
        match token.kind {
            TokenKind::Identifier => self.resolve(element, unit, scope, mode, None),
            TokenKind::Number => number::parse(&token.text)
                .map(Value::number)
                .ok_or_else(|| EvalError::Runtime(format!("Invalid number: {}", token.text))),
            TokenKind::String => Ok(Value::string(token.text.clone())),
            TokenKind::Boolean => Ok(Value::boolean(token.text == "true")),
            TokenKind::Regex => parse_regex(&token.text).map(Value::regex),
            TokenKind::Null | TokenKind::Pass => Ok(Value::empty()),
            TokenKind::Break => Err(EvalError::Break),
            TokenKind::Continue => Err(EvalError::Continue),
            _ => Err(EvalError::Runtime(format!("Unexpected token: {}", token.text))),
        }
    }

    fn eval_parenthesis(
        &mut self,
        node: &ParserNode,
        unit: &Rc<Unit>,
        scope: &Scope,
        mode: Mode,
    ) -> EvalResult<Value> {
        match node.children.as_slice() {
            [] => Ok(Value::empty()),
            [Element::Token(token)] if token.kind == TokenKind::Operator => {
                Ok(Value::function(Function::Operator(token.text.clone())))
            }
            [single] => self.eval(single, unit, scope, mode),
            _ => self.eval_array(node, unit, scope),
        }
    }

    /// Elements see the array built so far as `self`.
    fn eval_array(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let result = Value::new_object();
        let inner = scope.derive();
        inner.put_self(result.clone());
        for (i, child) in node.children.iter().enumerate() {
            let value = self.eval(child, unit, &inner, Mode::Throw)?;
            if let Some(object) = result.as_object() {
                object.borrow_mut().insert(Key::index(i), value.copy());
            }
        }
        Ok(result)
    }

    /// Map literals are built in three passes: `$extends` and `$fields`
    /// first, then the other entries, then `$init` is called.
    fn eval_map(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let result = Value::new_object();
        let inner = scope.derive();
        inner.put_self(result.clone());

        let mut entries = Vec::with_capacity(node.children.len());
        for entry in &node.children {
            let Element::Node(entry) = entry else {
                return Err(EvalError::Runtime(format!(
                    "Malformed map entry: {}",
                    reconstruct(entry)
                )));
            };
            let (Some(key), Some(value)) = (entry.child(0), entry.child(1)) else {
                return Err(malformed(entry));
            };
            let key = match key {
                Element::Token(token) if token.kind == TokenKind::Identifier => Key::text(&token.text),
                Element::Token(_) => Key::from_value(&self.eval(key, unit, &inner, Mode::Throw)?),
                other => Key::text(self.eval(other, unit, &inner, Mode::Throw)?.display()),
            };
            entries.push((key, value));
        }

        let Some(object) = result.as_object() else {
            return Ok(result);
        };
        let special = |name: &str| Key::text(name);

        for (_, value) in entries.iter().filter(|(k, _)| *k == special("$extends")) {
            let parents: Vec<&ParserNode> = match value {
                Element::Node(call) if call.kind == NodeKind::FunctionCall => vec![call],
                Element::Node(list) if list.kind == NodeKind::Array => list
                    .children
                    .iter()
                    .map(|c| c.as_node().filter(|n| n.kind == NodeKind::FunctionCall))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid_extends(value))?,
                _ => return Err(invalid_extends(value)),
            };
            for call in parents {
                let parent = self.construct(call, unit, &inner)?;
                let Some(parent_entries) = parent.as_object() else {
                    return Err(EvalError::TypeMismatch(format!(
                        "Invalid $extends value, expected an object: {}",
                        parent.describe()
                    )));
                };
                let copied: Vec<(Key, Value)> = parent_entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                object.borrow_mut().extend(copied);
            }
        }

        for (_, value) in entries.iter().filter(|(k, _)| *k == special("$fields")) {
            let Element::Node(list) = value else {
                return Err(EvalError::TypeMismatch(format!(
                    "Invalid $fields value, expected an array of identifiers: {}",
                    reconstruct(value)
                )));
            };
            let args = inner.get("args");
            for field in &list.children {
                let name = reconstruct(field);
                let found = args
                    .as_ref()
                    .and_then(|a| a.get(&Value::string(name.clone())))
                    .ok_or_else(|| {
                        EvalError::UndefinedSymbol(format!(
                            "Invalid $fields value, field not found in args: {name}"
                        ))
                    })?;
                object.borrow_mut().insert(Key::text(name), found.copy());
            }
        }

        let mut init = None;
        for (key, value) in &entries {
            if *key == special("$extends") || *key == special("$fields") {
                continue;
            }
            if *key == special("$init") {
                init = Some(*value);
                continue;
            }
            let evaluated = self.eval(value, unit, &inner, Mode::Throw)?;
            let key = match key {
                Key::Text(text) => Key::text(text.strip_prefix('$').unwrap_or(text)),
                other => other.clone(),
            };
            object.borrow_mut().insert(key, evaluated.copy());
        }

        if let Some(init) = init {
            let function = self.eval(init, unit, &inner, Mode::Throw)?;
            self.call_function(
                "$init",
                &function,
                Vec::new(),
                unit,
                &inner,
                Receiver::Object(result.clone()),
            )?;
        }
        Ok(result)
    }

    // ── Operators ─────────────────────────────────────────────────────────

    fn eval_expression(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let Some(operator) = &node.operator else {
            return Err(malformed(node));
        };
        if node.children.len() != operator.arity() {
            return Err(EvalError::ArgumentMismatch(format!(
                "Operator {} requires {} arguments, but {} were given",
                operator.symbol,
                operator.arity(),
                node.children.len()
            )));
        }
        if operator.is_pipeline() {
            return self.eval_pipeline(operator, node, unit, scope);
        }

        let routine = self.routine(operator)?;
        if operator.arity() == 2 && (operator.symbol == "&&" || operator.symbol == "||") {
            let left = self.eval(&node.children[0], unit, scope, Mode::Throw)?;
            let decided = if operator.symbol == "&&" { !left.truthy() } else { left.truthy() };
            if decided {
                return Ok(Value::boolean(left.truthy()));
            }
            let right = self.eval(&node.children[1], unit, scope, Mode::Throw)?;
            return routine(&[left, right]);
        }

        let mut args = Vec::with_capacity(node.children.len());
        for child in &node.children {
            args.push(self.eval(child, unit, scope, Mode::Throw)?);
        }
        routine(&args)
    }

    /// `x |> f(a)` calls `f(x, a)`; `x >| f(a)` calls `f(a, x)`. A target
    /// that is not a call is evaluated and called with `x` alone.
    fn eval_pipeline(
        &mut self,
        operator: &Operator,
        node: &ParserNode,
        unit: &Rc<Unit>,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let input = self.eval(&node.children[0], unit, scope, Mode::Throw)?;
        let first = operator.symbol == "|>";
        let target = &node.children[1];

        match target {
            Element::Node(call) if call.kind == NodeKind::FunctionCall && call.children.len() == 2 => {
                let callee = &call.children[0];
                let function = self.eval(callee, unit, scope, Mode::Throw)?;
                let mut args = self.eval_arguments(&call.children[1], unit, scope)?;
                if first {
                    args.insert(0, input);
                } else {
                    args.push(input);
                }
                self.call_function(&reconstruct(callee), &function, args, unit, scope, Receiver::None)
            }
            Element::Node(chain)
                if chain.kind == NodeKind::IdentifierAccessed
                    && chain.children.last().is_some_and(|s| s.is_node(NodeKind::FunctionCall)) =>
            {
                let injection = Injection { value: input, first };
                self.resolve(target, unit, scope, Mode::Throw, Some(injection))
            }
            _ => {
                let function = self.eval(target, unit, scope, Mode::Throw)?;
                self.call_function(&reconstruct(target), &function, vec![input], unit, scope, Receiver::None)
            }
        }
    }

    fn routine(&self, operator: &Operator) -> EvalResult<OperatorRoutine> {
        self.routines.get(operator).ok_or_else(|| {
            EvalError::Runtime(format!(
                "No routine registered for operator '{}'",
                operator.symbol
            ))
        })
    }

    /// Apply an operator used as a function value, choosing the variant by
    /// the number of arguments.
    fn apply_operator(&self, symbol: &str, args: &[Value]) -> EvalResult<Value> {
        let operator = self
            .operators
            .find_by_arity(symbol, args.len())
            .cloned()
            .ok_or_else(|| {
                EvalError::ArgumentMismatch(format!(
                    "Operator {symbol} does not take {} arguments",
                    args.len()
                ))
            })?;
        let routine = self.routine(&operator)?;
        routine(args)
    }

    // ── Assignment ────────────────────────────────────────────────────────

    fn eval_assignment(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let (Some(target), Some(value)) = (node.child(0), node.child(1)) else {
            return Err(malformed(node));
        };
        check_assignable(target)?;
        let value = self.eval(value, unit, scope, Mode::Throw)?;
        let variable = self.eval(target, unit, scope, Mode::Create)?;
        variable.inherit(&value);
        Ok(variable)
    }

    // ── Functions ─────────────────────────────────────────────────────────

    fn node_function(
        &self,
        params: &Element,
        body: &Element,
        unit: &Rc<Unit>,
        scope: &Scope,
    ) -> EvalResult<Value> {
        Ok(Value::function(Function::Node(NodeFunction {
            params: parameter_names(params)?,
            body: Rc::new(into_code_block(body.clone())),
            unit: unit.clone(),
            closure: scope.clone(),
        })))
    }

    fn eval_declaration(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        if node.children.first().is_some_and(|c| c.is_keyword("native")) {
            return self.eval_native(node, unit, scope);
        }
        let (callee, function) = match node.children.as_slice() {
            [callee, params, body] => (callee, self.node_function(params, body, unit, scope)?),
            [callee, inline] => (callee, self.eval(inline, unit, scope, Mode::Throw)?),
            _ => return Err(malformed(node)),
        };
        let target = self.eval(callee, unit, scope, Mode::Create)?;
        target.inherit(&function);
        Ok(target)
    }

    /// `native name()` binds the host function registered for one of the
    /// unit's modules, or for the unit itself.
    fn eval_native(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let Some(name_element) = node.child(1) else {
            return Err(malformed(node));
        };
        let Some(name) = name_element.as_token() else {
            return Err(malformed(node));
        };

        let mut candidates: Vec<String> = unit.modules().iter().map(|m| m.name.clone()).collect();
        candidates.push(unit.name.clone());
        let func = candidates
            .iter()
            .find_map(|module| self.natives.get(&(module.clone(), name.text.clone())).cloned())
            .ok_or_else(|| {
                EvalError::UndefinedSymbol(format!(
                    "Native function [{}] not found using candidates: [{}]",
                    name.text,
                    candidates.join(", ")
                ))
            })?;

        let function = Value::function(Function::Native(NativeFunction {
            name: name.text.clone(),
            func,
        }));
        let target = self.resolve(name_element, unit, scope, Mode::Create, None)?;
        target.inherit(&function);
        Ok(target)
    }

    fn eval_arguments(&mut self, pair: &Element, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Vec<Value>> {
        match pair {
            Element::Node(node) if node.kind == NodeKind::ParenthesisPair => node
                .children
                .iter()
                .map(|arg| self.eval(arg, unit, scope, Mode::Throw))
                .collect(),
            other => Ok(vec![self.eval(other, unit, scope, Mode::Throw)?]),
        }
    }

    fn eval_call(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let (Some(callee), Some(pair)) = (node.child(0), node.child(1)) else {
            return Err(malformed(node));
        };
        let function = self.eval(callee, unit, scope, Mode::Throw)?;
        let args = self.eval_arguments(pair, unit, scope)?;
        self.call_function(&reconstruct(callee), &function, args, unit, scope, Receiver::None)
    }

    /// `new Type(args)`: construct a host type, or call a function with
    /// its arguments also bound by name in `args`.
    fn construct(&mut self, call: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let (Some(callee), Some(pair)) = (call.child(0), call.child(1)) else {
            return Err(malformed(call));
        };
        let target = self.eval(callee, unit, scope, Mode::Throw)?;
        let args = self.eval_arguments(pair, unit, scope)?;
        let data = target.data().clone();
        match data {
            Data::Type(prototype) => prototype
                .construct(&args)
                .map(Value::custom)
                .map_err(|e| EvalError::Extension(e.to_string())),
            Data::Function(_) => self.call_function(
                &reconstruct(callee),
                &target,
                args,
                unit,
                scope,
                Receiver::Constructor,
            ),
            _ => Err(EvalError::NotCallable(format!(
                "Constructor call is not a function or a type: {}",
                reconstruct(callee)
            ))),
        }
    }

    pub(crate) fn call_function(
        &mut self,
        name: &str,
        function: &Value,
        args: Vec<Value>,
        unit: &Rc<Unit>,
        scope: &Scope,
        receiver: Receiver,
    ) -> EvalResult<Value> {
        let Some(callable) = function.as_function() else {
            return Err(EvalError::NotCallable(format!(
                "Value is not a function [{}]",
                function.display()
            )));
        };
        self.tick()?;

        let result = match &*callable {
            Function::Node(node) => self.call_node(name, function, node, args, receiver),
            Function::Native(native) => {
                let func = native.func.clone();
                let mut ctx = CallContext {
                    evaluator: self,
                    unit: unit.clone(),
                    scope: scope.clone(),
                };
                func(&mut ctx, args)
            }
            Function::Bound(bound) => {
                let mut ctx = CallContext {
                    evaluator: self,
                    unit: unit.clone(),
                    scope: scope.clone(),
                };
                (bound.func)(&mut ctx, &bound.receiver, args)
            }
            Function::Method(method) => method
                .receiver
                .call(&method.name, &args)
                .map_err(|e| EvalError::Extension(e.to_string())),
            Function::Operator(symbol) => self.apply_operator(symbol, &args),
        };
        match result {
            Err(EvalError::Return(value)) => Ok(value),
            other => other,
        }
    }

    /// Locals of a call: the receiver bindings, the defining unit's
    /// globals, the captured scope, then the parameters.
    fn call_node(
        &mut self,
        name: &str,
        value: &Value,
        function: &NodeFunction,
        args: Vec<Value>,
        receiver: Receiver,
    ) -> EvalResult<Value> {
        if function.params.len() != args.len() {
            return Err(EvalError::ArgumentMismatch(format!(
                "Function [{}] requires {} arguments, but {} were given",
                value.display(),
                function.params.len(),
                args.len()
            )));
        }

        let locals = Scope::function();
        match receiver {
            Receiver::Object(object) => {
                if let Some(parent) = object.get(&Value::string("$super")) {
                    locals.put("super", parent);
                }
                locals.put("self", object);
            }
            Receiver::Constructor => {
                let named = function
                    .params
                    .iter()
                    .zip(&args)
                    .map(|(param, arg)| (Key::text(param), arg.clone()))
                    .collect();
                locals.put("args", Value::object(named));
            }
            Receiver::None => {}
        }
        locals.put_all(&function.unit.symbols.borrow());
        locals.put_scope(&function.closure);
        for (param, arg) in function.params.iter().zip(args) {
            locals.put(param, arg);
        }

        match self.eval_block(&function.body.children, &function.unit, &locals) {
            Err(EvalError::Traced(mut trace)) => {
                if let Some(frame) = trace.frames.last_mut() {
                    if frame.function.is_none() && !name.is_empty() {
                        frame.function = Some(name.to_string());
                    }
                }
                Err(EvalError::Traced(trace))
            }
            other => other,
        }
    }

    // ── Control flow ──────────────────────────────────────────────────────

    fn eval_conditional(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let inner = scope.derive();
        for branch in &node.children {
            let Element::Node(branch) = branch else {
                return Err(malformed(node));
            };
            match branch.children.as_slice() {
                [condition, body] => {
                    if self.eval(condition, unit, &inner, Mode::Throw)?.truthy() {
                        return self.eval(body, unit, &inner, Mode::Throw);
                    }
                }
                [body] => return self.eval(body, unit, &inner, Mode::Throw),
                _ => return Err(malformed(branch)),
            }
        }
        Ok(Value::empty())
    }

    fn eval_for(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let [variable, iterable, body] = node.children.as_slice() else {
            return Err(malformed(node));
        };
        let names = loop_variables(variable)?;
        let items = self.eval(iterable, unit, scope, Mode::Throw)?.items()?;

        let mut result = Value::empty();
        for item in items {
            self.tick()?;
            let inner = scope.derive();
            bind_loop_variables(&names, item, &inner)?;
            match self.eval(body, unit, &inner, Mode::Throw) {
                Ok(value) => result = value,
                Err(EvalError::Break) => break,
                Err(EvalError::Continue) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    fn eval_while(&mut self, node: &ParserNode, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        let [condition, body] = node.children.as_slice() else {
            return Err(malformed(node));
        };
        let inner = scope.derive();
        let mut result = Value::empty();
        loop {
            self.tick()?;
            let test = self.eval(condition, unit, &inner, Mode::Throw)?;
            let Some(proceed) = test.as_bool() else {
                return Err(EvalError::TypeMismatch(format!(
                    "While condition is not a boolean: {}",
                    test.describe()
                )));
            };
            if !proceed {
                break;
            }
            match self.eval(body, unit, &inner, Mode::Throw) {
                Ok(value) => result = value,
                Err(EvalError::Break) => break,
                Err(EvalError::Continue) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Symbol resolution
    // ══════════════════════════════════════════════════════════════════════

    /// Resolve an identifier or an access chain such as `a.b[0].c(1)`.
    fn resolve(
        &mut self,
        element: &Element,
        unit: &Rc<Unit>,
        scope: &Scope,
        mode: Mode,
        mut injection: Option<Injection>,
    ) -> EvalResult<Value> {
        let segments = match element {
            Element::Node(node) if node.kind == NodeKind::IdentifierAccessed => node.children.as_slice(),
            other => std::slice::from_ref(other),
        };
        let last = segments.len().saturating_sub(1);
        let mut path = Path {
            unit: unit.clone(),
            scope: scope.clone(),
            module: None,
        };
        let mut value: Option<Value> = None;
        let mut receiver: Option<Value> = None;

        for (i, segment) in segments.iter().enumerate() {
            let is_final = i == last;

            let Some(current) = value.clone() else {
                let base = match segment {
                    Element::Token(token) if token.kind == TokenKind::Identifier => {
                        match self.resolve_name(&token.text, element, &mut path)? {
                            Lookup::Found(found) => found,
                            Lookup::Switched => continue,
                            Lookup::Missing if mode == Mode::Create => {
                                self.create_symbol(&token.text, element, &path, is_final)?
                            }
                            Lookup::Missing => {
                                return Err(self.unresolved(&token.text, element, None, &path))
                            }
                        }
                    }
                    other => self.eval(other, unit, scope, Mode::Throw)?,
                };
                value = Some(base);
                continue;
            };

            match segment {
                Element::Node(call) if call.kind == NodeKind::FunctionCall && call.children.len() <= 1 => {
                    let mut args = match call.child(0) {
                        Some(pair) => self.eval_arguments(pair, unit, scope)?,
                        None => Vec::new(),
                    };
                    if is_final {
                        if let Some(injection) = injection.take() {
                            if injection.first {
                                args.insert(0, injection.value);
                            } else {
                                args.push(injection.value);
                            }
                        }
                    }
                    let name = reconstruct(&segments[i - 1]);
                    let target = receiver.clone().map_or(Receiver::None, Receiver::Object);
                    let result = self
                        .call_function(&name, &current, args, unit, scope, target)
                        .map_err(|e| e.with_suffix(&format!(": {name}")))?;
                    value = Some(result);
                }
                _ => {
                    receiver = current.is_object().then(|| current.clone());
                    let key = self.eval_key(segment, unit, scope)?;
                    if let Some(member) = member(&current, &key) {
                        value = Some(member);
                        continue;
                    }
                    if mode == Mode::Create {
                        if let Some(created) = current.create(&key, is_final) {
                            value = Some(created);
                            continue;
                        }
                    }
                    return Err(self.unresolved(&key.display(), element, Some(&current), &path));
                }
            }
        }

        match (value, path.module) {
            (Some(value), _) => Ok(value),
            (None, Some(module)) => Ok(exported_symbols(&path.unit, &module)),
            (None, None) => Ok(Value::empty()),
        }
    }

    /// Look up the first name of a chain: locals, unit globals, then
    /// imports of the current unit.
    fn resolve_name(&self, name: &str, element: &Element, path: &mut Path) -> EvalResult<Lookup> {
        if self.debug.log_resolve {
            debug!(unit = %path.unit.name, symbol = name, "resolve");
        }

        if let Some(found) = path.scope.get(name) {
            if let Some(module) = &path.module {
                if !module.exports(name) {
                    return Err(EvalError::IllegalAccess(format!(
                        "Illegal access on [{}.{name}]: module does not export symbol",
                        module.name
                    )));
                }
            }
            return Ok(Lookup::Found(found));
        }
        if path.module.is_none() {
            if let Some(found) = path.unit.global(name) {
                return Ok(Lookup::Found(found));
            }
        }

        if let Some((import, target)) = path.unit.import_for(name) {
            if path.module.is_some() {
                return Err(EvalError::IllegalAccess(format!(
                    "Illegal access on [{}]: Cannot access reference to the [{}] module.\nAccessing symbols across modules is disallowed.",
                    reconstruct(element),
                    import.name
                )));
            }
            let module = target.module(&import.name).ok_or_else(|| {
                EvalError::UndefinedSymbol(format!("Unknown module: {}", import.name))
            })?;
            path.scope = Scope::new(target.symbols.clone());
            path.unit = target;
            path.module = Some(module);
            return Ok(Lookup::Switched);
        }

        if let Some((import, target)) = path.unit.inline_import_for(name) {
            if path.module.is_some() {
                return Err(EvalError::IllegalAccess(format!(
                    "Illegal access on [{}]: [{name}] references a symbol from the [{}] module.\nAccessing symbols across modules is disallowed.",
                    reconstruct(element),
                    import.name
                )));
            }
            return Ok(target.global(name).map_or(Lookup::Missing, Lookup::Found));
        }

        if name == "symbols" && path.module.is_some() {
            let globals = path
                .unit
                .symbols
                .borrow()
                .iter()
                .map(|(k, v)| (Key::text(k), v.clone()))
                .collect();
            return Ok(Lookup::Found(Value::object(globals)));
        }
        Ok(Lookup::Missing)
    }

    /// Bind a new symbol for an assignment target. Names in the middle of
    /// a chain start as objects.
    fn create_symbol(&self, name: &str, element: &Element, path: &Path, is_final: bool) -> EvalResult<Value> {
        if let Some(module) = &path.module {
            return Err(EvalError::IllegalAccess(format!(
                "Illegal access on [{}]: module {} does not export symbol {name}",
                reconstruct(element),
                module.name
            )));
        }
        let cell = if is_final { Value::empty() } else { Value::new_object() };
        path.scope.put(name, cell.clone());
        Ok(cell)
    }

    fn eval_key(&mut self, segment: &Element, unit: &Rc<Unit>, scope: &Scope) -> EvalResult<Value> {
        match segment {
            Element::Token(token) if token.kind == TokenKind::Identifier => {
                Ok(Value::string(token.text.clone()))
            }
            Element::Node(index) if index.kind == NodeKind::CodeBlock => match index.children.as_slice() {
                [single] => self.eval(single, unit, scope, Mode::Throw),
                statements => self.eval_block(statements, unit, scope),
            },
            other => self.eval(other, unit, scope, Mode::Throw),
        }
    }

    fn unresolved(&self, key: &str, element: &Element, previous: Option<&Value>, path: &Path) -> EvalError {
        let mut message = format!("Cannot resolve symbol '{key}' on [{}]", reconstruct(element));
        let candidates: Vec<String> = match previous {
            Some(previous) => {
                message.push_str(&format!("\nEvaluation stopped at value: {}", previous.display()));
                let mut names: Vec<String> = previous
                    .as_object()
                    .map(|o| o.borrow().keys().map(Key::to_string).collect())
                    .unwrap_or_default();
                names.extend(value_functions::names(previous));
                names
            }
            None => {
                let mut names: Vec<String> = path.scope.effective().into_keys().collect();
                names.extend(path.unit.symbols.borrow().keys().cloned());
                for import in path.unit.imports().iter() {
                    names.push(import.binding().to_string());
                    if import.inline {
                        if let Some(module) = import.target.as_ref().and_then(|t| t.module(&import.name)) {
                            names.extend(module.symbols);
                        }
                    }
                }
                names
            }
        };

        let found = suggestions(key, candidates, self.debug.suggestion_count);
        if !found.is_empty() {
            let quoted: Vec<String> = found.iter().map(|s| format!("'{s}'")).collect();
            message.push_str(&format!("\nDid you mean {}?", quoted.join(", ")));
        }
        EvalError::UndefinedSymbol(message)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════

fn malformed(node: &ParserNode) -> EvalError {
    EvalError::Runtime(format!("Malformed {} node: {}", node.kind, node.reconstruct()))
}

fn invalid_extends(value: &Element) -> EvalError {
    EvalError::TypeMismatch(format!(
        "Invalid $extends value, expected constructor call or an array of constructor calls: {}",
        reconstruct(value)
    ))
}

/// An entry of an object, else a member function of the value's type.
fn member(current: &Value, key: &Value) -> Option<Value> {
    if let Some(found) = current.get(key) {
        return Some(found);
    }
    key.as_string()
        .and_then(|name| value_functions::lookup(current, &name))
}

fn exported_symbols(unit: &Unit, module: &Module) -> Value {
    let entries = module
        .symbols
        .iter()
        .filter_map(|name| unit.global(name).map(|v| (Key::text(name), v)))
        .collect();
    Value::object(entries)
}

/// `r/pattern/flags`
fn parse_regex(text: &str) -> EvalResult<RegexValue> {
    let body = text.strip_prefix("r/").unwrap_or(text);
    let end = body
        .rfind('/')
        .ok_or_else(|| EvalError::Runtime(format!("Malformed regex literal: {text}")))?;
    let pattern = body[..end].replace("\\/", "/");
    RegexValue::new(&pattern, &body[end + 1..])
}

fn parameter_names(params: &Element) -> EvalResult<Vec<String>> {
    let identifiers = match params {
        Element::Node(pair) if pair.kind == NodeKind::ParenthesisPair => pair.children.as_slice(),
        other => std::slice::from_ref(other),
    };
    identifiers
        .iter()
        .map(|p| match p {
            Element::Token(t) if t.kind == TokenKind::Identifier => Ok(t.text.clone()),
            other => Err(EvalError::Runtime(format!(
                "Function parameters must be identifiers: {}",
                reconstruct(other)
            ))),
        })
        .collect()
}

fn loop_variables(variable: &Element) -> EvalResult<Vec<String>> {
    let names = match variable {
        Element::Token(t) if t.kind == TokenKind::Identifier => return Ok(vec![t.text.clone()]),
        Element::Node(list)
            if matches!(
                list.kind,
                NodeKind::ParenthesisPair | NodeKind::Array | NodeKind::SquareBracketPair
            ) =>
        {
            list.children.as_slice()
        }
        other => std::slice::from_ref(other),
    };
    names
        .iter()
        .map(|n| match n {
            Element::Token(t) if t.kind == TokenKind::Identifier => Ok(t.text.clone()),
            other => Err(EvalError::Runtime(format!(
                "Loop variables must be identifiers: {}",
                reconstruct(other)
            ))),
        })
        .collect()
}

/// Bind one iteration element. An element with as many entries as there
/// are variables is destructured; a single variable over a `[key, value]`
/// pair takes the value, otherwise the whole element.
fn bind_loop_variables(names: &[String], item: Value, scope: &Scope) -> EvalResult<()> {
    let parts = if item.is_object() { item.elements() } else { Vec::new() };
    if names.len() > 1 && parts.len() == names.len() {
        for (name, part) in names.iter().zip(parts) {
            scope.put_on_top(name, part);
        }
        return Ok(());
    }
    match names {
        [name] if parts.len() == 2 && item.is_array() => scope.put_on_top(name, parts[1].clone()),
        [name] => scope.put_on_top(name, item),
        _ => {
            return Err(EvalError::ArgumentMismatch(format!(
                "Expected {} variables, but got {} for iterator element: {}",
                names.len(),
                parts.len().max(1),
                item.display()
            )))
        }
    }
    Ok(())
}

/// Function calls cannot be assigned to.
fn check_assignable(target: &Element) -> EvalResult<()> {
    let Element::Node(node) = target else {
        return Ok(());
    };
    let hint = match node.kind {
        NodeKind::FunctionCall => {
            "Assignments are not allowed on function calls. Try removing the parentheses.".to_string()
        }
        NodeKind::IdentifierAccessed => {
            let Some((last, head)) = node.children.split_last() else {
                return Ok(());
            };
            if !(last.is_node(NodeKind::FunctionCall) || last.is_node(NodeKind::ParenthesisPair)) {
                return Ok(());
            }
            let params = match last {
                Element::Node(call) if call.kind == NodeKind::FunctionCall => {
                    call.child(0).map(reconstruct).unwrap_or_else(|| "()".to_string())
                }
                other => reconstruct(other),
            };
            let head = ParserNode::new(NodeKind::IdentifierAccessed, head.to_vec());
            format!(
                "To define a function on an object, use the '->' arrow syntax: {} = {params} -> {{ ... }}",
                head.reconstruct()
            )
        }
        _ => return Ok(()),
    };
    Err(EvalError::TypeMismatch(format!(
        "Cannot assign to {}\n{hint}",
        reconstruct(target)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regex_literal() {
        let regex = parse_regex("r/a\\/b/i").unwrap();
        assert_eq!(regex.pattern, "a/b");
        assert_eq!(regex.flags, "i");
        assert!(regex.regex.is_match("A/B"));
    }

    #[test]
    fn test_bind_destructures_pairs() {
        let scope = Scope::function();
        let names = vec!["k".to_string(), "v".to_string()];
        let pair = Value::array([Value::int(0), Value::string("x")]);
        bind_loop_variables(&names, pair, &scope).unwrap();
        assert_eq!(scope.get("k").unwrap().display(), "0");
        assert_eq!(scope.get("v").unwrap().display(), "x");
    }

    #[test]
    fn test_bind_single_variable_takes_value() {
        let scope = Scope::function();
        let pair = Value::array([Value::int(0), Value::string("x")]);
        bind_loop_variables(&["v".to_string()], pair, &scope).unwrap();
        assert_eq!(scope.get("v").unwrap().display(), "x");

        bind_loop_variables(&["c".to_string()], Value::string("y"), &scope).unwrap();
        assert_eq!(scope.get("c").unwrap().display(), "y");
    }

    #[test]
    fn test_bind_mismatch() {
        let scope = Scope::function();
        let names: Vec<String> = ["a", "b", "c"].map(String::from).to_vec();
        let err = bind_loop_variables(&names, Value::int(1), &scope).unwrap_err();
        assert_eq!(
            err.message(),
            "Expected 3 variables, but got 1 for iterator element: 1"
        );
    }

    #[test]
    fn test_tick_observes_cancellation() {
        let evaluator = Evaluator::new();
        assert!(evaluator.tick().is_ok());
        evaluator.cancel_flag().store(true, Ordering::Relaxed);
        assert!(matches!(evaluator.tick(), Err(EvalError::Cancelled)));
    }
}
