//! Callable values.

use std::fmt;
use std::rc::Rc;

use menter_parser::{reconstruct, NodeKind, ParserNode};

use crate::custom::CustomType;
use crate::env::Scope;
use crate::error::EvalResult;
use crate::evaluator::CallContext;
use crate::module::Unit;
use crate::value::Value;

/// Host function bound to a `native` declaration.
pub type NativeFn = Rc<dyn Fn(&mut CallContext<'_>, Vec<Value>) -> EvalResult<Value>>;

/// Built-in member function of a value type; receives the receiver.
pub type ValueFn = fn(&mut CallContext<'_>, &Value, Vec<Value>) -> EvalResult<Value>;

pub enum Function {
    /// Declared in source; closes over the scope it was created in.
    Node(NodeFunction),
    Native(NativeFunction),
    /// A value function such as `size` bound to its receiver.
    Bound(BoundFunction),
    /// A custom type method bound to its instance.
    Method(MethodFunction),
    /// A parenthesised operator, `(+)`.
    Operator(String),
}

pub struct NodeFunction {
    pub params: Vec<String>,
    pub body: Rc<ParserNode>,
    /// Unit whose globals and imports the body resolves against.
    pub unit: Rc<Unit>,
    pub closure: Scope,
}

pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

pub struct BoundFunction {
    pub name: &'static str,
    pub receiver: Value,
    pub func: ValueFn,
}

pub struct MethodFunction {
    pub name: String,
    pub receiver: Rc<dyn CustomType>,
}

impl Function {
    pub fn type_name(&self) -> &'static str {
        match self {
            Function::Node(_) => "function",
            Function::Native(_) | Function::Operator(_) => "native_function",
            Function::Bound(_) => "value_function",
            Function::Method(_) => "reflective_function",
        }
    }

    /// Number of declared parameters, for source functions.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Function::Node(f) => Some(f.params.len()),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Function::Node(f) => format!("({}) -> {}", f.params.join(", "), body_text(&f.body)),
            Function::Native(_) => "<<native function>>".to_string(),
            Function::Bound(f) => format!("<<value function {}>>", f.name),
            Function::Method(f) => format!("<<reflective function {}>>", f.name),
            Function::Operator(symbol) => format!("({symbol})"),
        }
    }
}

fn body_text(body: &ParserNode) -> String {
    if body.kind != NodeKind::CodeBlock {
        return body.reconstruct();
    }
    let statements: Vec<String> = body.children.iter().map(reconstruct).collect();
    if statements.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", statements.join("; "))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
