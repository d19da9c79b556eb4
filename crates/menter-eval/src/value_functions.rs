//! Member functions every value type carries, such as `size`, `map` or
//! `split`. Accessing one binds it to its receiver.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_traits::{ToPrimitive, Zero};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::CallContext;
use crate::function::{BoundFunction, Function, MethodFunction, ValueFn};
use crate::number::{self, DIVISION_SCALE};
use crate::value::{is_array_map, next_index, Data, Key, Object, RegexValue, Value};

type Table = &'static [(&'static str, ValueFn)];

const OBJECT_FUNCTIONS: Table = &[
    ("size", size),
    ("keys", keys),
    ("values", values),
    ("entries", entries),
    ("containsValue", contains_value),
    ("contains", contains_value),
    ("containsKey", contains_key),
    ("push", push),
    ("pop", pop),
    ("map", map),
    ("mapKeys", map_keys),
    ("filter", filter),
    ("filterKeys", filter_keys),
    ("distinct", distinct),
    ("sort", sort),
    ("sortKey", sort_key),
    ("join", join),
    ("reduce", fold_left),
    ("foldl", fold_left),
    ("foldr", fold_right),
    ("sum", sum),
    ("avg", avg),
    ("max", max),
    ("min", min),
    ("head", head),
    ("tail", tail),
    ("cross", cross),
    ("frequency", frequency),
    ("rename", rename),
    ("removeKey", remove_key),
    ("retainKey", retain_key),
];

const STRING_FUNCTIONS: Table = &[
    ("size", size),
    ("charAt", char_at),
    ("matches", string_matches),
    ("replace", string_replace),
    ("replaceAll", string_replace_all),
    ("split", string_split),
    ("startsWith", starts_with),
    ("endsWith", ends_with),
    ("contains", string_contains),
    ("equals", string_equals),
    ("equalsIgnoreCase", string_equals_ignore_case),
    ("toUpperCase", to_upper_case),
    ("toLowerCase", to_lower_case),
    ("trim", trim),
];

const REGEX_FUNCTIONS: Table = &[
    ("matches", regex_matches),
    ("find", regex_find),
    ("split", regex_split),
    ("replace", regex_replace),
    ("pattern", regex_pattern),
];

const ITERATOR_FUNCTIONS: Table = &[
    ("hasNext", has_next),
    ("next", next),
];

/// Custom values report their own size; iterable ones also get the
/// collection functions over their elements.
const CUSTOM_FUNCTIONS: Table = &[("size", size)];

const ANY_FUNCTIONS: Table = &[
    ("type", type_of),
    ("iterator", iterator),
    ("forEach", for_each),
    ("functions", functions),
    ("isNull", is_null),
];

fn table_for(receiver: &Value) -> Table {
    match &*receiver.data() {
        Data::Object(_) => OBJECT_FUNCTIONS,
        Data::String(_) => STRING_FUNCTIONS,
        Data::Regex(_) => REGEX_FUNCTIONS,
        Data::Iterator(_) => ITERATOR_FUNCTIONS,
        Data::Custom(_) => CUSTOM_FUNCTIONS,
        _ => &[],
    }
}

fn bind(table: Table, receiver: &Value, name: &str) -> Option<Value> {
    table.iter().find(|(n, _)| *n == name).map(|(n, func)| {
        Value::function(Function::Bound(BoundFunction {
            name: *n,
            receiver: receiver.clone(),
            func: *func,
        }))
    })
}

/// The member function `name` of `receiver`, bound to it.
///
/// Collection functions on an iterable custom value are bound to an array
/// of its elements, taken when the function is looked up.
pub fn lookup(receiver: &Value, name: &str) -> Option<Value> {
    if let Some(custom) = receiver.as_custom() {
        if custom.methods().iter().any(|m| m == name) {
            return Some(Value::function(Function::Method(MethodFunction {
                name: name.to_string(),
                receiver: custom,
            })));
        }
        let is_collection_function =
            name != "size" && OBJECT_FUNCTIONS.iter().any(|(n, _)| *n == name);
        if is_collection_function {
            if let Some(items) = custom.iterate() {
                return bind(OBJECT_FUNCTIONS, &Value::array(items), name);
            }
        }
    }
    bind(table_for(receiver), receiver, name).or_else(|| bind(ANY_FUNCTIONS, receiver, name))
}

/// Member function names available on `receiver`.
pub fn names(receiver: &Value) -> Vec<String> {
    let mut names: Vec<String> = table_for(receiver)
        .iter()
        .chain(ANY_FUNCTIONS)
        .map(|(n, _)| n.to_string())
        .collect();
    if let Some(custom) = receiver.as_custom() {
        if custom.iterate().is_some() {
            names.extend(
                OBJECT_FUNCTIONS
                    .iter()
                    .filter(|(n, _)| *n != "size")
                    .map(|(n, _)| n.to_string()),
            );
        }
        names.extend(custom.methods());
    }
    names
}

// ══════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════

fn arg<'a>(args: &'a [Value], index: usize, function: &str) -> EvalResult<&'a Value> {
    args.get(index).ok_or_else(|| {
        EvalError::ArgumentMismatch(format!(
            "{function} requires at least {} arguments, but {} were given",
            index + 1,
            args.len()
        ))
    })
}

fn object_of(receiver: &Value, function: &str) -> EvalResult<Object> {
    receiver.as_object().ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "{function} requires an object, got {}",
            receiver.describe()
        ))
    })
}

fn snapshot(object: &Object) -> Vec<(Key, Value)> {
    object
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn string_of(receiver: &Value) -> String {
    receiver.as_string().unwrap_or_else(|| receiver.display())
}

fn arity(function: &Value) -> Option<usize> {
    function.as_function().and_then(|f| f.arity())
}

/// Call `function` with the entry's value, or with key and value when it
/// declares two parameters.
fn call_entry(
    ctx: &mut CallContext<'_>,
    function: &Value,
    key: &Key,
    value: &Value,
) -> EvalResult<Value> {
    if arity(function) == Some(2) {
        ctx.call(function, vec![key.to_value(), value.clone()])
    } else {
        ctx.call(function, vec![value.clone()])
    }
}

/// Rebuild a collection: arrays come back re-indexed, other objects keep
/// their keys.
fn collect(entries: Vec<(Key, Value)>, as_list: bool) -> Value {
    if as_list {
        Value::array(entries.into_iter().map(|(_, v)| v))
    } else {
        Value::object(entries.into_iter().collect())
    }
}

/// Ordering from a comparator function: a two-parameter function returns
/// a number whose sign orders the pair, a one-parameter function maps
/// each value to the key that is compared.
fn order(
    ctx: &mut CallContext<'_>,
    comparator: Option<&Value>,
    a: &Value,
    b: &Value,
) -> EvalResult<Ordering> {
    let Some(comparator) = comparator else {
        return a.compare(b);
    };
    if arity(comparator) == Some(1) {
        let x = ctx.call(comparator, vec![a.clone()])?;
        let y = ctx.call(comparator, vec![b.clone()])?;
        return x.compare(&y);
    }
    let result = ctx.call(comparator, vec![a.clone(), b.clone()])?;
    let n = result.numeric().ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "Comparator must return a number, got {}",
            result.describe()
        ))
    })?;
    Ok(n.cmp(&BigDecimal::zero()))
}

/// Stable merge sort with a fallible comparison.
fn try_sort<T>(
    mut items: Vec<T>,
    compare: &mut dyn FnMut(&T, &T) -> EvalResult<Ordering>,
) -> EvalResult<Vec<T>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = try_sort(items, compare)?;
    let right = try_sort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if compare(r, l)? == Ordering::Less {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn numeric_values(receiver: &Value, function: &str) -> EvalResult<Vec<BigDecimal>> {
    receiver
        .elements()
        .iter()
        .map(|v| {
            v.numeric().ok_or_else(|| {
                EvalError::TypeMismatch(format!("{function} requires numbers, got {}", v.describe()))
            })
        })
        .collect()
}

fn key_predicate(
    ctx: &mut CallContext<'_>,
    selector: &Value,
    key: &Key,
) -> EvalResult<bool> {
    if selector.is_function() {
        Ok(ctx.call(selector, vec![key.to_value()])?.truthy())
    } else {
        Ok(Key::from_value(selector) == *key)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Collections
// ══════════════════════════════════════════════════════════════════════════

fn size(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::int(receiver.size() as i64))
}

fn keys(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "keys")?;
    let keys: Vec<Value> = object.borrow().keys().map(Key::to_value).collect();
    Ok(Value::array(keys))
}

fn values(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "values")?;
    let values: Vec<Value> = object.borrow().values().map(Value::copy).collect();
    Ok(Value::array(values))
}

fn entries(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "entries")?;
    let entries = snapshot(&object).into_iter().map(|(key, value)| {
        let mut entry = IndexMap::new();
        entry.insert(Key::text("key"), key.to_value());
        entry.insert(Key::text("value"), value);
        Value::object(entry)
    });
    Ok(Value::array(entries.collect::<Vec<_>>()))
}

fn contains_value(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let needle = arg(&args, 0, "containsValue")?;
    Ok(Value::boolean(receiver.elements().iter().any(|v| v.equals(needle))))
}

fn contains_key(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "containsKey")?;
    let key = Key::from_value(arg(&args, 0, "containsKey")?);
    let found = object.borrow().contains_key(&key);
    Ok(Value::boolean(found))
}

fn push(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "push")?;
    let mut map = object.borrow_mut();
    match args.as_slice() {
        [value] => {
            let key = Key::number(next_index(&map));
            map.insert(key, value.clone());
        }
        [key, value] => {
            map.insert(Key::from_value(key), value.clone());
        }
        _ => {
            return Err(EvalError::ArgumentMismatch(format!(
                "push requires 1 or 2 arguments, but {} were given",
                args.len()
            )))
        }
    }
    Ok(receiver.clone())
}

fn pop(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "pop")?;
    let mut map = object.borrow_mut();
    let key = if is_array_map(&map) {
        map.keys().max_by_key(|k| k.as_index()).cloned()
    } else {
        args.first().map(Key::from_value)
    };
    Ok(key
        .and_then(|k| map.shift_remove(&k))
        .unwrap_or_else(Value::empty))
}

fn map(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "map")?;
    let function = arg(&args, 0, "map")?;
    let mut result = IndexMap::new();
    for (key, value) in snapshot(&object) {
        let mapped = call_entry(ctx, function, &key, &value)?;
        result.insert(key, mapped);
    }
    Ok(Value::object(result))
}

fn map_keys(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "mapKeys")?;
    let function = arg(&args, 0, "mapKeys")?;
    let mut result = IndexMap::new();
    for (key, value) in snapshot(&object) {
        let mapped = ctx.call(function, vec![key.to_value()])?;
        result.insert(Key::from_value(&mapped), value);
    }
    Ok(Value::object(result))
}

fn filter(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "filter")?;
    let function = arg(&args, 0, "filter")?;
    let as_list = receiver.is_array();
    let mut kept = Vec::new();
    for (key, value) in snapshot(&object) {
        if call_entry(ctx, function, &key, &value)?.truthy() {
            kept.push((key, value));
        }
    }
    Ok(collect(kept, as_list))
}

fn filter_keys(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "filterKeys")?;
    let function = arg(&args, 0, "filterKeys")?;
    let mut kept = Vec::new();
    for (key, value) in snapshot(&object) {
        if ctx.call(function, vec![key.to_value()])?.truthy() {
            kept.push((key, value));
        }
    }
    Ok(collect(kept, false))
}

fn distinct(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "distinct")?;
    let as_list = receiver.is_array();
    let mut kept: Vec<(Key, Value)> = Vec::new();
    for (key, value) in snapshot(&object) {
        if !kept.iter().any(|(_, v)| v.equals(&value)) {
            kept.push((key, value));
        }
    }
    Ok(collect(kept, as_list))
}

fn sort(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "sort")?;
    let as_list = receiver.is_array();
    let comparator = args.first();
    let sorted = try_sort(snapshot(&object), &mut |a, b| order(ctx, comparator, &a.1, &b.1))?;
    Ok(collect(sorted, as_list))
}

fn sort_key(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "sortKey")?;
    let comparator = args.first();
    let sorted = try_sort(snapshot(&object), &mut |a, b| {
        order(ctx, comparator, &a.0.to_value(), &b.0.to_value())
    })?;
    Ok(collect(sorted, false))
}

fn join(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let text = |i: usize, default: &str| args.get(i).map_or(default.to_string(), Value::display);
    let (separator, prefix, suffix) = (text(0, ", "), text(1, ""), text(2, ""));
    let parts: Vec<String> = receiver.elements().iter().map(Value::display).collect();
    Ok(Value::string(format!("{prefix}{}{suffix}", parts.join(&separator))))
}

/// `(init?, fn)`: the accumulator starts at `init`, or at the first element
/// folded when no initial value is given.
fn fold(
    ctx: &mut CallContext<'_>,
    receiver: &Value,
    args: Vec<Value>,
    name: &str,
    from_right: bool,
) -> EvalResult<Value> {
    let (init, function) = match args.as_slice() {
        [function] => (None, function),
        [init, function] => (Some(init.clone()), function),
        _ => {
            return Err(EvalError::ArgumentMismatch(format!(
                "{name} requires 1 or 2 arguments, but {} were given",
                args.len()
            )))
        }
    };
    let mut elements = receiver.elements();
    if from_right {
        elements.reverse();
    }
    let mut elements = elements.into_iter();
    let Some(mut accumulator) = init.or_else(|| elements.next()) else {
        return Ok(Value::empty());
    };
    for element in elements {
        accumulator = ctx.call(function, vec![accumulator, element])?;
    }
    Ok(accumulator)
}

fn fold_left(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    fold(ctx, receiver, args, "foldl", false)
}

fn fold_right(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    fold(ctx, receiver, args, "foldr", true)
}

fn sum(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let total = numeric_values(receiver, "sum")?
        .into_iter()
        .fold(BigDecimal::zero(), |acc, n| acc + n);
    Ok(Value::number(total))
}

fn avg(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let numbers = numeric_values(receiver, "avg")?;
    if numbers.is_empty() {
        return Ok(Value::empty());
    }
    let count = BigDecimal::from(numbers.len() as u64);
    let total = numbers.into_iter().fold(BigDecimal::zero(), |acc, n| acc + n);
    number::divide(&total, &count, DIVISION_SCALE)
        .map(Value::number)
        .ok_or_else(|| EvalError::Runtime("Division by zero".into()))
}

fn extreme(
    ctx: &mut CallContext<'_>,
    receiver: &Value,
    args: Vec<Value>,
    wanted: Ordering,
) -> EvalResult<Value> {
    let comparator = args.first();
    let mut best: Option<Value> = None;
    for value in receiver.elements() {
        best = match best {
            Some(current) if order(ctx, comparator, &value, &current)? != wanted => Some(current),
            _ => Some(value),
        };
    }
    Ok(best.unwrap_or_else(Value::empty))
}

fn max(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    extreme(ctx, receiver, args, Ordering::Greater)
}

fn min(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    extreme(ctx, receiver, args, Ordering::Less)
}

fn head(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(receiver
        .elements()
        .into_iter()
        .next()
        .unwrap_or_else(Value::empty))
}

fn tail(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "tail")?;
    let as_list = receiver.is_array();
    Ok(collect(snapshot(&object).into_iter().skip(1).collect(), as_list))
}

/// Combine two elements of a cross product.
fn combine(a: &Value, b: &Value) -> Value {
    match (a.as_object(), b.as_object()) {
        (Some(left), Some(right)) => {
            let mut merged = left.borrow().clone();
            for (key, value) in right.borrow().iter() {
                merged.insert(key.clone(), value.clone());
            }
            Value::object(merged)
        }
        (Some(left), None) => {
            let mut extended = left.borrow().clone();
            let key = Key::number(next_index(&extended));
            extended.insert(key, b.clone());
            Value::object(extended)
        }
        (None, Some(_)) => Value::array(std::iter::once(a.clone()).chain(b.elements())),
        (None, None) => Value::array([a.clone(), b.clone()]),
    }
}

fn cross(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let other = arg(&args, 0, "cross")?;
    let predicate = args.get(1);
    let mut combined = Vec::new();
    for a in receiver.elements() {
        for b in other.elements() {
            let pair = combine(&a, &b);
            let keep = match predicate {
                Some(p) if arity(p) == Some(2) => ctx.call(p, vec![a.clone(), b.clone()])?.truthy(),
                Some(p) => ctx.call(p, vec![pair.clone()])?.truthy(),
                None => true,
            };
            if keep {
                combined.push(pair);
            }
        }
    }
    Ok(Value::array(combined))
}

fn frequency(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let mut counts: IndexMap<Key, i64> = IndexMap::new();
    for value in receiver.elements() {
        *counts.entry(Key::from_value(&value)).or_insert(0) += 1;
    }
    Ok(Value::object(
        counts.into_iter().map(|(k, n)| (k, Value::int(n))).collect(),
    ))
}

fn rename(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "rename")?;
    let from = Key::from_value(arg(&args, 0, "rename")?);
    let to = Key::from_value(arg(&args, 1, "rename")?);
    let renamed: IndexMap<Key, Value> = snapshot(&object)
        .into_iter()
        .map(|(k, v)| if k == from { (to.clone(), v) } else { (k, v) })
        .collect();
    *object.borrow_mut() = renamed;
    Ok(receiver.clone())
}

fn remove_key(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "removeKey")?;
    let selector = arg(&args, 0, "removeKey")?;
    let mut kept = IndexMap::new();
    for (key, value) in snapshot(&object) {
        if !key_predicate(ctx, selector, &key)? {
            kept.insert(key, value);
        }
    }
    *object.borrow_mut() = kept;
    Ok(receiver.clone())
}

fn retain_key(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let object = object_of(receiver, "retainKey")?;
    let selector = arg(&args, 0, "retainKey")?;
    let mut kept = IndexMap::new();
    for (key, value) in snapshot(&object) {
        if key_predicate(ctx, selector, &key)? {
            kept.insert(key, value);
        }
    }
    *object.borrow_mut() = kept;
    Ok(receiver.clone())
}

// ══════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════

fn char_at(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let index = arg(&args, 0, "charAt")?
        .numeric()
        .and_then(|n| n.to_usize())
        .ok_or_else(|| EvalError::ArgumentMismatch("charAt requires a non-negative index".into()))?;
    Ok(string_of(receiver)
        .chars()
        .nth(index)
        .map_or_else(Value::empty, |c| Value::string(c.to_string())))
}

/// A regex argument as-is; a string argument compiled as a pattern.
fn pattern_arg(value: &Value) -> EvalResult<RegexValue> {
    match value.as_regex() {
        Some(regex) => Ok((*regex).clone()),
        None => RegexValue::new(&string_of(value), ""),
    }
}

fn full_match(regex: &RegexValue, text: &str) -> EvalResult<bool> {
    let anchored = RegexValue::new(&format!("^(?:{})$", regex.pattern), &regex.flags)?;
    Ok(anchored.regex.is_match(text))
}

fn split_with(regex: &RegexValue, text: &str) -> Value {
    split_parts(regex.regex.split(text).collect())
}

/// Trailing empty parts are dropped; a lone empty part is kept.
fn split_parts(mut parts: Vec<&str>) -> Value {
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    Value::array(parts.into_iter().map(Value::string).collect::<Vec<_>>())
}

fn string_matches(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let regex = pattern_arg(arg(&args, 0, "matches")?)?;
    Ok(Value::boolean(full_match(&regex, &string_of(receiver))?))
}

fn string_replace(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let pattern = arg(&args, 0, "replace")?;
    let replacement = arg(&args, 1, "replace")?.display();
    let text = string_of(receiver);
    let replaced = match pattern.as_regex() {
        Some(regex) => regex.regex.replace_all(&text, replacement.as_str()).into_owned(),
        None => text.replace(&pattern.display(), &replacement),
    };
    Ok(Value::string(replaced))
}

fn string_replace_all(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let regex = pattern_arg(arg(&args, 0, "replaceAll")?)?;
    let replacement = arg(&args, 1, "replaceAll")?.display();
    let text = string_of(receiver);
    Ok(Value::string(
        regex.regex.replace_all(&text, replacement.as_str()).into_owned(),
    ))
}

fn string_split(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let separator = arg(&args, 0, "split")?;
    let text = string_of(receiver);
    match separator.as_regex() {
        Some(regex) => Ok(split_with(&regex, &text)),
        None => {
            let separator = separator.display();
            if separator.is_empty() {
                let chars: Vec<Value> =
                    text.chars().map(|c| Value::string(c.to_string())).collect();
                return Ok(Value::array(chars));
            }
            Ok(split_parts(text.split(separator.as_str()).collect()))
        }
    }
}

fn starts_with(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let prefix = arg(&args, 0, "startsWith")?.display();
    Ok(Value::boolean(string_of(receiver).starts_with(&prefix)))
}

fn ends_with(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let suffix = arg(&args, 0, "endsWith")?.display();
    Ok(Value::boolean(string_of(receiver).ends_with(&suffix)))
}

fn string_contains(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let needle = arg(&args, 0, "contains")?.display();
    Ok(Value::boolean(string_of(receiver).contains(&needle)))
}

fn string_equals(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let other = arg(&args, 0, "equals")?.display();
    Ok(Value::boolean(string_of(receiver) == other))
}

fn string_equals_ignore_case(
    _: &mut CallContext<'_>,
    receiver: &Value,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let other = arg(&args, 0, "equalsIgnoreCase")?.display();
    Ok(Value::boolean(
        string_of(receiver).to_lowercase() == other.to_lowercase(),
    ))
}

fn to_upper_case(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::string(string_of(receiver).to_uppercase()))
}

fn to_lower_case(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::string(string_of(receiver).to_lowercase()))
}

fn trim(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let text = string_of(receiver);
    let trimmed = match args.first() {
        Some(chars) => {
            let chars: Vec<char> = chars.display().chars().collect();
            text.trim_matches(|c| chars.contains(&c)).to_string()
        }
        None => text.trim().to_string(),
    };
    Ok(Value::string(trimmed))
}

// ══════════════════════════════════════════════════════════════════════════
// Regex
// ══════════════════════════════════════════════════════════════════════════

fn regex_of(receiver: &Value) -> EvalResult<std::rc::Rc<RegexValue>> {
    receiver
        .as_regex()
        .ok_or_else(|| EvalError::TypeMismatch(format!("expected regex, got {}", receiver.describe())))
}

fn regex_matches(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let regex = regex_of(receiver)?;
    let text = arg(&args, 0, "matches")?.display();
    Ok(Value::boolean(full_match(&regex, &text)?))
}

fn regex_find(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let regex = regex_of(receiver)?;
    let text = arg(&args, 0, "find")?.display();
    let Some(captures) = regex.regex.captures(&text) else {
        return Ok(Value::empty());
    };
    let groups: Vec<Value> = captures
        .iter()
        .map(|group| group.map_or_else(Value::empty, |m| Value::string(m.as_str())))
        .collect();
    Ok(Value::array(groups))
}

fn regex_split(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let regex = regex_of(receiver)?;
    let text = arg(&args, 0, "split")?.display();
    Ok(split_with(&regex, &text))
}

fn regex_replace(_: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let regex = regex_of(receiver)?;
    let text = arg(&args, 0, "replace")?.display();
    let replacement = arg(&args, 1, "replace")?.display();
    Ok(Value::string(
        regex.regex.replace_all(&text, replacement.as_str()).into_owned(),
    ))
}

fn regex_pattern(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::string(regex_of(receiver)?.pattern.clone()))
}

// ══════════════════════════════════════════════════════════════════════════
// Iterators
// ══════════════════════════════════════════════════════════════════════════

fn has_next(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::boolean(receiver.size() > 0))
}

fn next(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let data = receiver.data().clone();
    match data {
        Data::Iterator(sequence) => Ok(sequence
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(Value::empty)),
        _ => Err(EvalError::TypeMismatch(format!(
            "expected iterator, got {}",
            receiver.describe()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Any value
// ══════════════════════════════════════════════════════════════════════════

fn type_of(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::string(receiver.type_name()))
}

fn iterator(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    if matches!(&*receiver.data(), Data::Iterator(_)) {
        return Ok(receiver.clone());
    }
    Ok(Value::iterator(receiver.items()?))
}

/// Call the function for every element and return the last result. Over
/// an object, a two-parameter function receives key and value.
fn for_each(ctx: &mut CallContext<'_>, receiver: &Value, args: Vec<Value>) -> EvalResult<Value> {
    let function = arg(&args, 0, "forEach")?;
    let pairs = receiver.is_object();
    let mut result = Value::empty();
    for item in receiver.items()? {
        let call_args = if pairs {
            let pair = item.elements();
            match (arity(function), pair.as_slice()) {
                (Some(2), [key, value]) => vec![key.clone(), value.clone()],
                (_, [_, value]) => vec![value.clone()],
                _ => vec![item.clone()],
            }
        } else {
            vec![item]
        };
        match ctx.call(function, call_args) {
            Ok(value) => result = value,
            Err(EvalError::Break) => break,
            Err(EvalError::Continue) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(result)
}

fn functions(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    let own: Vec<Value> = table_for(receiver)
        .iter()
        .map(|(name, _)| Value::string(*name))
        .collect();
    Ok(Value::array(own))
}

fn is_null(_: &mut CallContext<'_>, receiver: &Value, _: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::boolean(receiver.is_empty()))
}
