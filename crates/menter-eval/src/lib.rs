//! Menter evaluator: values, modules and the runtime.
//!
//! Hosts drive everything through [`Runtime`]: load sources, finish
//! loading, then evaluate snippets. Values are shared mutable cells, so the
//! runtime is single-threaded; only [`CancelHandle`] crosses threads.

mod builtins;
pub mod custom;
pub mod debug;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod function;
pub mod module;
pub mod number;
pub mod operators;
pub mod options;
pub mod runtime;
pub mod value;
pub mod value_functions;

pub use custom::{CustomType, ExtensionError, TypeRegistry};
pub use debug::DebugSession;
pub use diagnostics::{Frame, Trace};
pub use error::{EvalError, EvalResult};
pub use evaluator::{CallContext, Evaluator};
pub use function::{Function, NativeFn};
pub use module::{Import, Module, Unit};
pub use operators::OperatorRoutine;
pub use options::{OptionsError, RuntimeOptions};
pub use runtime::{CancelHandle, Runtime, EVAL_UNIT};
pub use value::{Data, Key, Value};

pub use bigdecimal::BigDecimal;
