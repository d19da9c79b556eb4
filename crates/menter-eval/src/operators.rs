//! Evaluation routines for the operator table.
//!
//! Routines are keyed by symbol and operand sides, so the prefix `-` and
//! the binary `-` are separate entries. Pipelines (`|>`, `>|`) and the
//! short-circuiting `&&`/`||` need the evaluator and are handled there;
//! their routines here apply once both operands are known.

use std::collections::HashMap;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use menter_types::Operator;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::error::{EvalError, EvalResult};
use crate::number::{self, DIVISION_SCALE};
use crate::value::{next_index, Data, Key, Value};

pub type OperatorRoutine = Rc<dyn Fn(&[Value]) -> EvalResult<Value>>;

type Binary = fn(&str, &Value, &Value) -> EvalResult<Value>;

#[derive(Clone, Default)]
pub struct OperatorRoutines {
    routines: HashMap<(String, bool, bool), OperatorRoutine>,
}

impl OperatorRoutines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routines for every operator of [`menter_types::OperatorTable::standard`].
    pub fn standard() -> Self {
        let mut routines = Self::new();

        for symbol in ["+", "-", "*", "/", "%", "%%", "^", "^^", "<<", ">>", "&", "|"] {
            routines.binary(symbol, arithmetic, true);
        }
        for symbol in ["<", "<=", ">", ">=", "==", "!="] {
            routines.binary(symbol, comparison, false);
        }
        routines.binary("&&", logical, false);
        routines.binary("||", logical, false);
        routines.binary("::", concat, false);

        routines.insert(Operator::prefix("-", 140), Rc::new(|args: &[Value]| negate(&args[0])));
        routines.insert(
            Operator::prefix("+", 140),
            Rc::new(|args: &[Value]| {
                numeric_operand("+", &args[0]).map(Value::number)
            }),
        );
        routines.insert(Operator::prefix("!", 140), Rc::new(|args: &[Value]| not(&args[0])));
        routines.insert(
            Operator::postfix("!", 140),
            Rc::new(|args: &[Value]| factorial(&args[0])),
        );
        for (symbol, delta) in [("++", 1), ("--", -1)] {
            routines.insert(
                Operator::prefix(symbol, 140),
                Rc::new(move |args: &[Value]| step(symbol, &args[0], delta, false)),
            );
            routines.insert(
                Operator::postfix(symbol, 150),
                Rc::new(move |args: &[Value]| step(symbol, &args[0], delta, true)),
            );
        }
        routines
    }

    fn binary(&mut self, symbol: &'static str, routine: Binary, broadcasts: bool) {
        let apply: OperatorRoutine = if broadcasts {
            Rc::new(move |args: &[Value]| broadcast(symbol, &args[0], &args[1], routine))
        } else {
            Rc::new(move |args: &[Value]| routine(symbol, &args[0], &args[1]))
        };
        self.insert(Operator::binary(symbol, 0), apply);
    }

    /// Install `routine` for the operator's symbol and operand sides,
    /// replacing any earlier routine.
    pub fn insert(&mut self, operator: Operator, routine: OperatorRoutine) {
        self.routines
            .insert((operator.symbol, operator.left, operator.right), routine);
    }

    pub fn get(&self, operator: &Operator) -> Option<OperatorRoutine> {
        self.routines
            .get(&(operator.symbol.clone(), operator.left, operator.right))
            .cloned()
    }
}

fn cannot(symbol: &str, args: &[&Value]) -> EvalError {
    let shown: Vec<String> = args.iter().map(|v| v.describe()).collect();
    EvalError::TypeMismatch(format!(
        "Cannot perform operation '{symbol}' with arguments: {}",
        shown.join(", ")
    ))
}

fn numeric_operand(symbol: &str, value: &Value) -> EvalResult<BigDecimal> {
    value.numeric().ok_or_else(|| cannot(symbol, &[value]))
}

fn overflow(symbol: &str) -> EvalError {
    EvalError::Runtime(format!("Arithmetic overflow in '{symbol}'"))
}

fn integer(symbol: &str, value: &Value) -> EvalResult<BigInt> {
    let n = numeric_operand(symbol, value)?;
    number::to_integer(&n).ok_or_else(|| cannot(symbol, &[value]))
}

// ── Broadcasting ─────────────────────────────────────────────

/// Apply `routine` elementwise when either operand is an object.
fn broadcast(symbol: &str, a: &Value, b: &Value, routine: Binary) -> EvalResult<Value> {
    match (a.as_object(), b.as_object()) {
        (Some(left), Some(right)) => {
            let left: Vec<(Key, Value)> =
                left.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let right = right.borrow().clone();
            let same_keys =
                left.len() == right.len() && left.iter().all(|(k, _)| right.contains_key(k));
            if !same_keys {
                return Err(EvalError::TypeMismatch(format!(
                    "Operands of '{symbol}' must have the same keys: {}, {}",
                    a.display(),
                    b.display()
                )));
            }
            let mut result = indexmap::IndexMap::with_capacity(left.len());
            for (key, value) in left {
                let other = &right[&key];
                result.insert(key, broadcast(symbol, &value, other, routine)?);
            }
            Ok(Value::object(result))
        }
        (Some(left), None) => {
            let entries: Vec<(Key, Value)> =
                left.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let mut result = indexmap::IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                result.insert(key, broadcast(symbol, &value, b, routine)?);
            }
            Ok(Value::object(result))
        }
        (None, Some(right)) => {
            let entries: Vec<(Key, Value)> =
                right.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let mut result = indexmap::IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                result.insert(key, broadcast(symbol, a, &value, routine)?);
            }
            Ok(Value::object(result))
        }
        (None, None) => routine(symbol, a, b),
    }
}

// ── Binary routines ──────────────────────────────────────────

fn arithmetic(symbol: &str, a: &Value, b: &Value) -> EvalResult<Value> {
    if symbol == "+" {
        let is_string = |v: &Value| matches!(&*v.data(), Data::String(_));
        if is_string(a) || is_string(b) {
            return Ok(Value::string(a.display() + &b.display()));
        }
    }
    if symbol == "*" {
        if let (Some(x), Some(y)) = (a.as_string(), b.as_string()) {
            if a.numeric().is_none() || b.numeric().is_none() {
                return Ok(Value::string(x + &y));
            }
        }
    }
    if let (Some(x), Some(y)) = (a.as_bool(), b.as_bool()) {
        return match symbol {
            "&" => Ok(Value::boolean(x & y)),
            "|" => Ok(Value::boolean(x | y)),
            "^" => Ok(Value::boolean(x ^ y)),
            _ => Err(cannot(symbol, &[a, b])),
        };
    }

    let (Some(x), Some(y)) = (a.numeric(), b.numeric()) else {
        return Err(cannot(symbol, &[a, b]));
    };
    let result = match symbol {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => number::divide(&x, &y, DIVISION_SCALE).ok_or_else(division_by_zero)?,
        "%" | "%%" => {
            let remainder = number::remainder(&x, &y).ok_or_else(division_by_zero)?;
            if symbol == "%%" && remainder.is_negative() {
                remainder + y.abs()
            } else {
                remainder
            }
        }
        "^" | "^^" => number::power(&x, &y).ok_or_else(|| overflow(symbol))?,
        "<<" | ">>" | "&" | "|" => {
            let (i, j) = (integer(symbol, a)?, integer(symbol, b)?);
            let bits = match symbol {
                "<<" => j.to_usize().map(|shift| i << shift),
                ">>" => j.to_usize().map(|shift| i >> shift),
                "&" => Some(i & j),
                _ => Some(i | j),
            };
            BigDecimal::new(bits.ok_or_else(|| overflow(symbol))?, 0)
        }
        _ => return Err(cannot(symbol, &[a, b])),
    };
    Ok(Value::number(result))
}

fn division_by_zero() -> EvalError {
    EvalError::Runtime("Division by zero".into())
}

fn comparison(symbol: &str, a: &Value, b: &Value) -> EvalResult<Value> {
    let result = match symbol {
        "==" => a.equals(b),
        "!=" => !a.equals(b),
        _ => {
            let ordering = a.compare(b).map_err(|_| cannot(symbol, &[a, b]))?;
            match symbol {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
    };
    Ok(Value::boolean(result))
}

fn logical(symbol: &str, a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::boolean(match symbol {
        "&&" => a.truthy() && b.truthy(),
        _ => a.truthy() || b.truthy(),
    }))
}

/// `::` appends to arrays, merges objects and pairs up plain values.
fn concat(_symbol: &str, a: &Value, b: &Value) -> EvalResult<Value> {
    let elements = |v: &Value| -> Vec<Value> { v.elements() };
    match (a.as_object(), b.as_object()) {
        (Some(_), Some(_)) if a.is_array() && b.is_array() => {
            Ok(Value::array(elements(a).into_iter().chain(elements(b))))
        }
        (Some(left), Some(right)) => {
            let mut merged = left.borrow().clone();
            for (key, value) in right.borrow().iter() {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Value::object(merged))
        }
        (Some(left), None) => {
            let mut extended = left.borrow().clone();
            let key = Key::number(next_index(&extended));
            extended.insert(key, b.clone());
            Ok(Value::object(extended))
        }
        (None, Some(_)) if b.is_array() => {
            Ok(Value::array(std::iter::once(a.clone()).chain(elements(b))))
        }
        (None, Some(right)) => {
            let mut merged = indexmap::IndexMap::new();
            merged.insert(Key::index(0), a.clone());
            for (key, value) in right.borrow().iter() {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Value::object(merged))
        }
        (None, None) => Ok(Value::array([a.clone(), b.clone()])),
    }
}

// ── Unary routines ───────────────────────────────────────────

fn negate(value: &Value) -> EvalResult<Value> {
    if let Some(object) = value.as_object() {
        let entries: Vec<(Key, Value)> =
            object.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut result = indexmap::IndexMap::with_capacity(entries.len());
        for (key, element) in entries {
            result.insert(key, negate(&element)?);
        }
        return Ok(Value::object(result));
    }
    Ok(Value::number(-numeric_operand("-", value)?))
}

fn not(value: &Value) -> EvalResult<Value> {
    match value.as_bool() {
        Some(b) => Ok(Value::boolean(!b)),
        None => Err(cannot("!", &[value])),
    }
}

fn factorial(value: &Value) -> EvalResult<Value> {
    let n = numeric_operand("!", value)?;
    number::factorial(&n)
        .map(Value::number)
        .ok_or_else(|| cannot("!", &[value]))
}

/// `++`/`--` write the new number into the operand's cell. The postfix
/// form evaluates to the previous value.
fn step(symbol: &str, value: &Value, delta: i64, postfix: bool) -> EvalResult<Value> {
    let current = numeric_operand(symbol, value)?;
    let next = &current + number::from_i64(delta);
    value.set(Data::Number(next.normalized()));
    Ok(if postfix {
        Value::number(current)
    } else {
        value.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(symbol: &str, a: Value, b: Value) -> Value {
        let routines = OperatorRoutines::standard();
        let routine = routines.get(&Operator::binary(symbol, 0)).unwrap();
        routine(&[a, b]).unwrap()
    }

    fn array(items: &[i64]) -> Value {
        Value::array(items.iter().map(|i| Value::int(*i)))
    }

    #[test]
    fn test_string_concatenation_wins_over_coercion() {
        assert_eq!(apply("+", Value::string("4"), Value::int(45)).display(), "445");
        assert_eq!(apply("-", Value::string("4"), Value::int(1)).display(), "3");
    }

    #[test]
    fn test_division_and_modulo() {
        assert_eq!(apply("/", Value::int(6), Value::int(4)).display(), "1.5");
        assert_eq!(apply("%", Value::int(-7), Value::int(3)).display(), "-1");
        assert_eq!(apply("%%", Value::int(-7), Value::int(3)).display(), "2");
        let routines = OperatorRoutines::standard();
        let divide = routines.get(&Operator::binary("/", 0)).unwrap();
        assert!(divide(&[Value::int(1), Value::int(0)]).is_err());
    }

    #[test]
    fn test_power_and_bitwise() {
        assert_eq!(apply("^", Value::int(2), Value::int(10)).display(), "1024");
        assert_eq!(
            apply("^", Value::int(2), Value::int(100)).display(),
            "1267650600228229401496703205376"
        );
        assert_eq!(apply(">>", Value::int(-16), Value::int(2)).display(), "-4");
        assert_eq!(apply("<<", Value::int(1), Value::int(4)).display(), "16");
        assert_eq!(apply("&", Value::int(6), Value::int(3)).display(), "2");
        assert_eq!(apply("|", Value::boolean(false), Value::boolean(true)).display(), "true");
    }

    #[test]
    fn test_broadcasting() {
        assert_eq!(apply("*", array(&[1, 2]), Value::int(3)).display(), "[3, 6]");
        assert_eq!(apply("-", Value::int(10), array(&[1, 2])).display(), "[9, 8]");
        assert_eq!(apply("+", array(&[1, 2]), array(&[3, 4])).display(), "[4, 6]");

        let routines = OperatorRoutines::standard();
        let add = routines.get(&Operator::binary("+", 0)).unwrap();
        assert!(add(&[array(&[1, 2]), array(&[1])]).is_err());
    }

    #[test]
    fn test_concat() {
        assert_eq!(apply("::", array(&[1, 2]), Value::int(3)).display(), "[1, 2, 3]");
        assert_eq!(apply("::", Value::int(0), array(&[1])).display(), "[0, 1]");
        assert_eq!(apply("::", array(&[1]), array(&[2, 3])).display(), "[1, 2, 3]");
        assert_eq!(apply("::", Value::int(1), Value::int(2)).display(), "[1, 2]");
    }

    #[test]
    fn test_comparison() {
        assert_eq!(apply("<", Value::int(1), Value::int(2)).display(), "true");
        assert_eq!(apply("==", Value::string("a"), Value::string("a")).display(), "true");
        assert_eq!(apply("!=", Value::int(1), Value::string("1")).display(), "true");
    }

    #[test]
    fn test_unary() {
        let routines = OperatorRoutines::standard();
        let fact = routines.get(&Operator::postfix("!", 140)).unwrap();
        assert_eq!(fact(&[Value::int(5)]).unwrap().display(), "120");

        let increment = routines.get(&Operator::postfix("++", 150)).unwrap();
        let cell = Value::int(4);
        assert_eq!(increment(&[cell.clone()]).unwrap().display(), "4");
        assert_eq!(cell.display(), "5");

        let decrement = routines.get(&Operator::prefix("--", 140)).unwrap();
        assert_eq!(decrement(&[cell.clone()]).unwrap().display(), "4");

        let negate = routines.get(&Operator::prefix("-", 140)).unwrap();
        assert_eq!(negate(&[array(&[1, -2])]).unwrap().display(), "[-1, 2]");
    }

    #[test]
    fn test_type_error_message() {
        let routines = OperatorRoutines::standard();
        let sub = routines.get(&Operator::binary("-", 0)).unwrap();
        let err = sub(&[Value::boolean(true), Value::string("x")]).unwrap_err();
        assert_eq!(
            err.message(),
            "Cannot perform operation '-' with arguments: true (boolean), x (string)"
        );
    }
}
