//! Built-in modules.
//!
//! Each module is a small unit that declares its functions `native` and
//! exports them; the host side is registered under the module name, so
//! `import math` resolves like any other module.

use std::rc::Rc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_traits::{ToPrimitive, Zero};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{CallContext, Evaluator};
use crate::number::{self, Rounding};
use crate::value::{Key, Value};

type Native = fn(&mut CallContext<'_>, Vec<Value>) -> EvalResult<Value>;

const MODULES: &[(&str, &[(&str, Native)])] = &[
    ("common", &[("print", print), ("range", range)]),
    (
        "system",
        &[("print", print), ("getEnv", get_env), ("sleep", sleep)],
    ),
    (
        "math",
        &[
            ("range", range),
            ("sin", sin),
            ("cos", cos),
            ("tan", tan),
            ("sqrt", sqrt),
            ("ceil", ceil),
            ("floor", floor),
            ("round", round),
            ("abs", abs),
            ("min", min),
            ("max", max),
            ("toNumber", to_number),
        ],
    ),
    (
        "reflect",
        &[
            ("inherit", inherit),
            ("access", access),
            ("setVariable", set_variable),
            ("getVariable", get_variable),
            ("removeVariable", remove_variable),
            ("callFunctionByName", call_function_by_name),
            ("getImports", get_imports),
        ],
    ),
    (
        "debug",
        &[("switch", debug_switch), ("stackTraceValues", stack_trace_values)],
    ),
    ("io", &[("read", read)]),
];

pub(crate) fn register(evaluator: &mut Evaluator) {
    for (module, functions) in MODULES {
        for (name, func) in functions.iter() {
            evaluator.register_native(*module, *name, Rc::new(*func));
        }
    }
}

/// `(unit name, source)` for every built-in module.
pub(crate) fn sources() -> Vec<(&'static str, String)> {
    MODULES
        .iter()
        .map(|(module, functions)| {
            let names: Vec<&str> = functions.iter().map(|(name, _)| *name).collect();
            let mut source: String = names.iter().map(|n| format!("native {n}()\n")).collect();
            source.push_str(&format!("export [{}] as {module}\n", names.join(", ")));
            (*module, source)
        })
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════
// Argument helpers
// ══════════════════════════════════════════════════════════════════════════

fn expect_args(function: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(EvalError::ArgumentMismatch(format!(
            "{function}() expects {expected} arguments, but {} were given",
            args.len()
        )));
    }
    Ok(())
}

fn number_arg(function: &str, value: &Value) -> EvalResult<BigDecimal> {
    value.as_number().ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "{function}() expects a number as argument, got {}",
            value.describe()
        ))
    })
}

fn numbers(function: &str, args: &[Value]) -> EvalResult<Vec<BigDecimal>> {
    let values = match args {
        [single] if single.is_object() => single.elements(),
        _ => args.to_vec(),
    };
    values.iter().map(|v| number_arg(function, v)).collect()
}

fn unary(
    function: &str,
    args: &[Value],
    op: impl Fn(&BigDecimal) -> Option<BigDecimal>,
) -> EvalResult<Value> {
    expect_args(function, args, 1, 1)?;
    let n = number_arg(function, &args[0])?;
    op(&n).map(Value::number).ok_or_else(|| {
        EvalError::Runtime(format!("{function}() is undefined for {}", number::format(&n)))
    })
}

/// Apply a machine-float function; results that are not finite are undefined.
fn float(n: &BigDecimal, op: fn(f64) -> f64) -> Option<BigDecimal> {
    number::from_f64(op(number::to_f64(n)))
}

// ══════════════════════════════════════════════════════════════════════════
// common / system
// ══════════════════════════════════════════════════════════════════════════

fn print(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    let line: Vec<String> = args.iter().map(Value::display).collect();
    ctx.print(line.join(" "));
    Ok(Value::empty())
}

/// Inclusive range of numbers or single characters, counting down when
/// the start is past the end.
fn range(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    if args.len() < 2 || args.len() > 3 {
        return Err(EvalError::ArgumentMismatch(
            "range() expects 2 or 3 arguments".into(),
        ));
    }
    let step = match args.get(2) {
        Some(step) => step.as_number().ok_or_else(|| {
            EvalError::TypeMismatch("range() expects a number as step size".into())
        })?,
        None => BigDecimal::from(1),
    };
    if step.is_zero() {
        return Err(EvalError::ArgumentMismatch(
            "range() expects a non-zero step size".into(),
        ));
    }
    let step = step.abs();

    if let (Some(start), Some(end)) = (args[0].as_number(), args[1].as_number()) {
        let mut values = Vec::new();
        let mut i = start.clone();
        if start > end {
            while i >= end {
                values.push(Value::number(i.clone()));
                i = &i - &step;
            }
        } else {
            while i <= end {
                values.push(Value::number(i.clone()));
                i = &i + &step;
            }
        }
        return Ok(Value::array(values));
    }

    let (Some(start), Some(end)) = (args[0].as_string(), args[1].as_string()) else {
        return Err(EvalError::TypeMismatch(
            "range() expects 2 numbers or 2 one-character strings".into(),
        ));
    };
    let single = |s: &str| {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c as u32),
            _ => None,
        }
    };
    let (Some(start), Some(end)) = (single(start.as_str()), single(end.as_str())) else {
        return Err(EvalError::ArgumentMismatch(
            "range() expects 2 one-character strings".into(),
        ));
    };
    let step = step.to_usize().filter(|s| *s > 0).unwrap_or(1);
    let codes: Vec<u32> = if start > end {
        (end..=start).rev().step_by(step).collect()
    } else {
        (start..=end).step_by(step).collect()
    };
    Ok(Value::array(
        codes
            .into_iter()
            .filter_map(char::from_u32)
            .map(|c| Value::string(c.to_string()))
            .collect::<Vec<_>>(),
    ))
}

fn get_env(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("getEnv", &args, 1, 1)?;
    Ok(std::env::var(args[0].display()).map_or_else(|_| Value::empty(), Value::string))
}

fn sleep(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("sleep", &args, 1, 1)?;
    let millis = number_arg("sleep", &args[0])?.to_u64().unwrap_or(0);
    std::thread::sleep(Duration::from_millis(millis));
    Ok(args[0].clone())
}

// ══════════════════════════════════════════════════════════════════════════
// math
// ══════════════════════════════════════════════════════════════════════════

fn sin(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("sin", &args, |n| float(n, f64::sin))
}

fn cos(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("cos", &args, |n| float(n, f64::cos))
}

fn tan(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("tan", &args, |n| float(n, f64::tan))
}

fn sqrt(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("sqrt", &args, |n| float(n, f64::sqrt))
}

fn ceil(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("ceil", &args, |n| Some(number::ceil(n)))
}

fn floor(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("floor", &args, |n| Some(number::floor(n)))
}

fn abs(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    unary("abs", &args, |n| Some(n.abs()))
}

/// `round(x)` or `round(x, digits)`, halves away from zero.
fn round(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("round", &args, 1, 2)?;
    let n = number_arg("round", &args[0])?;
    let digits = match args.get(1) {
        Some(d) => number::to_integer(&number_arg("round", d)?)
            .and_then(|d| d.to_i64())
            .filter(|d| *d >= 0)
            .ok_or_else(|| {
                EvalError::ArgumentMismatch("round() expects a non-negative digit count".into())
            })?,
        None => 0,
    };
    Ok(Value::number(number::round(&n, digits, Rounding::HalfUp)))
}

fn min(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    Ok(numbers("min", &args)?
        .into_iter()
        .min()
        .map_or_else(Value::empty, Value::number))
}

fn max(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    Ok(numbers("max", &args)?
        .into_iter()
        .max()
        .map_or_else(Value::empty, Value::number))
}

fn to_number(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("toNumber", &args, 1, 1)?;
    if let Some(n) = args[0].numeric() {
        return Ok(Value::number(n));
    }
    let text = args[0].display();
    number::parse(&text)
        .map(Value::number)
        .ok_or_else(|| EvalError::TypeMismatch(format!("Cannot convert '{text}' to a number")))
}

// ══════════════════════════════════════════════════════════════════════════
// reflect
// ══════════════════════════════════════════════════════════════════════════

/// Copy the source's payload into the target cell.
fn inherit(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("inherit", &args, 2, 2)?;
    args[0].inherit(&args[1]);
    Ok(args[0].clone())
}

fn access(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("access", &args, 2, 2)?;
    Ok(args[0].get(&args[1]).unwrap_or_else(Value::empty))
}

fn set_variable(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("setVariable", &args, 2, 2)?;
    ctx.scope.put(&args[0].display(), args[1].clone());
    Ok(args[1].clone())
}

fn lookup_variable(ctx: &CallContext<'_>, name: &str) -> Option<Value> {
    ctx.scope.get(name).or_else(|| ctx.unit.global(name))
}

fn get_variable(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("getVariable", &args, 1, 1)?;
    Ok(lookup_variable(ctx, &args[0].display()).unwrap_or_else(Value::empty))
}

fn remove_variable(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("removeVariable", &args, 1, 1)?;
    ctx.scope.remove(&args[0].display());
    Ok(Value::empty())
}

fn call_function_by_name(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("callFunctionByName", &args, 1, 2)?;
    let name = args[0].display();
    let function = lookup_variable(ctx, &name).ok_or_else(|| {
        EvalError::UndefinedSymbol(format!("Cannot resolve function '{name}'"))
    })?;
    let call_args = args.get(1).map(Value::elements).unwrap_or_default();
    ctx.call(&function, call_args)
}

/// The calling unit's imports, each as an object of the module's exports.
fn get_imports(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("getImports", &args, 0, 0)?;
    let mut imports = IndexMap::new();
    for import in ctx.unit.imports().iter() {
        let Some(target) = &import.target else {
            continue;
        };
        let exports: IndexMap<Key, Value> = target
            .module(&import.name)
            .map(|m| m.symbols)
            .unwrap_or_default()
            .into_iter()
            .map(|symbol| {
                let value = target.global(&symbol).unwrap_or_else(Value::empty);
                (Key::text(symbol), value)
            })
            .collect();
        imports.insert(Key::text(import.binding()), Value::object(exports));
    }
    Ok(Value::object(imports))
}

// ══════════════════════════════════════════════════════════════════════════
// debug / io
// ══════════════════════════════════════════════════════════════════════════

fn debug_switch(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("switch", &args, 1, 2)?;
    ctx.evaluator
        .debug
        .switch(&args[0].display(), args.get(1))?;
    Ok(Value::empty())
}

/// Replace the symbols whose values are listed in stack traces.
fn stack_trace_values(ctx: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    ctx.evaluator.debug.stack_trace_values = args.iter().map(Value::display).collect();
    Ok(Value::empty())
}

/// The lines of a text file.
fn read(_: &mut CallContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    expect_args("read", &args, 1, 1)?;
    let path = args[0].display();
    let text = std::fs::read_to_string(&path)
        .map_err(|e| EvalError::Runtime(format!("Could not read file '{path}': {e}")))?;
    Ok(Value::array(
        text.lines().map(Value::string).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_declare_and_export() {
        let sources = sources();
        let (name, common) = &sources[0];
        assert_eq!(*name, "common");
        assert_eq!(common, "native print()\nnative range()\nexport [print, range] as common\n");
    }

    #[test]
    fn test_every_module_has_a_source() {
        let names: Vec<&str> = sources().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["common", "system", "math", "reflect", "debug", "io"]);
    }
}
