//! The dynamic value model.
//!
//! A [`Value`] is a shared mutable cell. Variables, object entries and
//! function parameters all hold cells, so assigning through one name is
//! observed through every other name bound to the same cell. Objects keep
//! their entries behind a second shared cell: copying an object value
//! copies the reference, matching the reference semantics scripts expect.

use std::cell::{Ref, RefCell};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_traits::{Signed, ToPrimitive, Zero};
use regex::Regex;

use crate::custom::CustomType;
use crate::error::{EvalError, EvalResult};
use crate::function::Function;
use crate::number;

/// Object entries, shared between every value that refers to the object.
pub type Object = Rc<RefCell<IndexMap<Key, Value>>>;

/// Remaining elements of an iterator value.
pub type Sequence = Rc<RefCell<VecDeque<Value>>>;

// ══════════════════════════════════════════════════════════════════════════
// Key
// ══════════════════════════════════════════════════════════════════════════

/// An object key. Numbers are kept normalized so `1.0` and `1` address the
/// same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Number(BigDecimal),
    Text(String),
}

impl Key {
    pub fn number(n: BigDecimal) -> Self {
        Key::Number(n.normalized())
    }

    pub fn index(i: usize) -> Self {
        Key::Number(BigDecimal::from(i as u64))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Key::Text(s.into())
    }

    /// The key a value addresses when used in `obj[value]`.
    pub fn from_value(value: &Value) -> Self {
        match &*value.data() {
            Data::Number(n) => Key::number(n.clone()),
            Data::String(s) => Key::Text(s.clone()),
            _ => Key::Text(value.display()),
        }
    }

    /// Non-negative integral keys, as array positions.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Number(n) if number::is_integer(n) && !n.is_negative() => n.to_usize(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => Value::number(n.clone()),
            Key::Text(s) => Value::string(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => f.write_str(&number::format(n)),
            Key::Text(s) => f.write_str(s),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Data
// ══════════════════════════════════════════════════════════════════════════

/// A compiled regex literal.
#[derive(Debug, Clone)]
pub struct RegexValue {
    pub pattern: String,
    pub flags: String,
    pub regex: Regex,
}

impl RegexValue {
    /// Compile `pattern` with the literal's flags (`i m s u x`).
    pub fn new(pattern: &str, flags: &str) -> EvalResult<Self> {
        let mut builder = regex::RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'u' => builder.unicode(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(EvalError::Runtime(format!("Unknown regex flag: {other}")));
                }
            };
        }
        let regex = builder
            .build()
            .map_err(|e| EvalError::Runtime(format!("Invalid regex r/{pattern}/: {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }
}

/// The payload of a value cell.
#[derive(Clone)]
pub enum Data {
    Empty,
    Number(BigDecimal),
    String(String),
    Boolean(bool),
    Regex(Rc<RegexValue>),
    Object(Object),
    Function(Rc<Function>),
    Iterator(Sequence),
    /// An instance of a host-provided type.
    Custom(Rc<dyn CustomType>),
    /// A host-provided type itself; `new Tag(args)` constructs instances.
    Type(Rc<dyn CustomType>),
}

// ══════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct Value(Rc<RefCell<Data>>);

impl Value {
    // ── Construction ─────────────────────────────────────────

    pub fn new(data: Data) -> Self {
        Value(Rc::new(RefCell::new(data)))
    }

    pub fn empty() -> Self {
        Self::new(Data::Empty)
    }

    pub fn number(n: BigDecimal) -> Self {
        Self::new(Data::Number(n.normalized()))
    }

    pub fn int(n: i64) -> Self {
        Self::new(Data::Number(number::from_i64(n)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(Data::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(Data::Boolean(b))
    }

    pub fn regex(regex: RegexValue) -> Self {
        Self::new(Data::Regex(Rc::new(regex)))
    }

    pub fn function(function: Function) -> Self {
        Self::new(Data::Function(Rc::new(function)))
    }

    pub fn object(entries: IndexMap<Key, Value>) -> Self {
        Self::new(Data::Object(Rc::new(RefCell::new(entries))))
    }

    pub fn new_object() -> Self {
        Self::object(IndexMap::new())
    }

    /// An object keyed `0..items.len()`.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Key::index(i), v))
                .collect(),
        )
    }

    pub fn iterator(items: impl IntoIterator<Item = Value>) -> Self {
        Self::new(Data::Iterator(Rc::new(RefCell::new(items.into_iter().collect()))))
    }

    pub fn custom(instance: Rc<dyn CustomType>) -> Self {
        Self::new(Data::Custom(instance))
    }

    // ── Cell access ──────────────────────────────────────────

    pub fn data(&self) -> Ref<'_, Data> {
        self.0.borrow()
    }

    pub fn set(&self, data: Data) {
        *self.0.borrow_mut() = data;
    }

    /// Take over the payload of `other`; objects stay shared.
    pub fn inherit(&self, other: &Value) {
        let data = other.0.borrow().clone();
        self.set(data);
    }

    /// A new cell holding the same payload.
    pub fn copy(&self) -> Value {
        Value::new(self.0.borrow().clone())
    }

    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ── Inspection ───────────────────────────────────────────

    pub fn type_name(&self) -> String {
        match &*self.data() {
            Data::Empty => "empty".into(),
            Data::Number(_) => "number".into(),
            Data::String(_) => "string".into(),
            Data::Boolean(_) => "boolean".into(),
            Data::Regex(_) => "regex".into(),
            Data::Object(_) => "object".into(),
            Data::Function(f) => f.type_name().into(),
            Data::Iterator(_) => "iterator".into(),
            Data::Custom(c) => c.tag().to_string(),
            Data::Type(_) => "type".into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&*self.data(), Data::Empty)
    }

    pub fn is_object(&self) -> bool {
        matches!(&*self.data(), Data::Object(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(&*self.data(), Data::Function(_))
    }

    pub fn as_number(&self) -> Option<BigDecimal> {
        match &*self.data() {
            Data::Number(n) => Some(n.clone()),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match &*self.data() {
            Data::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.data() {
            Data::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Object> {
        match &*self.data() {
            Data::Object(o) => Some(o.clone()),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<Rc<Function>> {
        match &*self.data() {
            Data::Function(f) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn as_regex(&self) -> Option<Rc<RegexValue>> {
        match &*self.data() {
            Data::Regex(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<Rc<dyn CustomType>> {
        match &*self.data() {
            Data::Custom(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// Numbers, numeric strings and numeric custom values.
    pub fn numeric(&self) -> Option<BigDecimal> {
        match &*self.data() {
            Data::Number(n) => Some(n.clone()),
            Data::String(s) => number::parse(s),
            Data::Custom(c) => c.numeric(),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match &*self.data() {
            Data::Empty => false,
            Data::Boolean(b) => *b,
            Data::Number(n) => !n.is_zero(),
            Data::String(s) => !s.is_empty(),
            Data::Object(o) => !o.borrow().is_empty(),
            Data::Custom(c) => c.truthy(),
            Data::Regex(_) | Data::Function(_) | Data::Iterator(_) | Data::Type(_) => true,
        }
    }

    pub fn size(&self) -> usize {
        match &*self.data() {
            Data::Object(o) => o.borrow().len(),
            Data::String(s) => s.chars().count(),
            Data::Iterator(seq) => seq.borrow().len(),
            Data::Custom(c) => c.size(),
            Data::Empty => 0,
            _ => 1,
        }
    }

    /// Objects whose keys are exactly `0..len`. The empty object counts.
    pub fn is_array(&self) -> bool {
        match &*self.data() {
            Data::Object(o) => is_array_map(&o.borrow()),
            _ => false,
        }
    }

    /// The elements of iteration. Objects yield `[key, value]` pairs whose
    /// value is the entry's own cell.
    pub fn items(&self) -> EvalResult<Vec<Value>> {
        let data = self.data().clone();
        match data {
            Data::Object(o) => Ok(o
                .borrow()
                .iter()
                .map(|(k, v)| Value::array([k.to_value(), v.clone()]))
                .collect()),
            Data::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            Data::Iterator(seq) => Ok(seq.borrow_mut().drain(..).collect()),
            Data::Custom(c) => c
                .iterate()
                .ok_or_else(|| EvalError::TypeMismatch(format!("[{}] is not iterable.", c.tag()))),
            _ => Err(EvalError::TypeMismatch(format!(
                "[{}] is not iterable.",
                self.type_name()
            ))),
        }
    }

    /// Values of an object in key order; other values are a single element.
    pub fn elements(&self) -> Vec<Value> {
        match self.as_object() {
            Some(o) => o.borrow().values().cloned().collect(),
            None => vec![self.clone()],
        }
    }

    /// The entry or indexed element stored under `key`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        let data = self.data().clone();
        match data {
            Data::Object(o) => o.borrow().get(&Key::from_value(key)).cloned(),
            Data::Custom(c) => c.get(key),
            _ => None,
        }
    }

    /// Create a member for `key` on an object or a custom value. Members in
    /// the middle of an access chain start out as empty objects.
    pub fn create(&self, key: &Value, is_final: bool) -> Option<Value> {
        let member = if is_final { Value::empty() } else { Value::new_object() };
        let data = self.data().clone();
        match data {
            Data::Object(o) => {
                o.borrow_mut().insert(Key::from_value(key), member.clone());
                Some(member)
            }
            Data::Custom(c) => c.set(key, member.clone()).then_some(member),
            _ => None,
        }
    }

    // ── Display ──────────────────────────────────────────────

    pub fn display(&self) -> String {
        let mut out = String::new();
        let mut visiting = Vec::new();
        self.write_display(&mut out, &mut visiting);
        out
    }

    /// `display (type)`, used in error messages and symbol listings.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.display(), self.type_name())
    }

    fn write_display(&self, out: &mut String, visiting: &mut Vec<*const RefCell<IndexMap<Key, Value>>>) {
        let data = self.data().clone();
        match data {
            Data::Empty => out.push_str("null"),
            Data::Number(n) => out.push_str(&number::format(&n)),
            Data::String(s) => out.push_str(&s),
            Data::Boolean(b) => out.push_str(if b { "true" } else { "false" }),
            Data::Regex(r) => out.push_str(&r.pattern),
            Data::Function(f) => out.push_str(&f.display()),
            Data::Iterator(_) => out.push_str("<<iterator>>"),
            Data::Custom(c) => out.push_str(&c.display()),
            Data::Type(t) => {
                out.push_str("<<type ");
                out.push_str(t.tag());
                out.push_str(">>");
            }
            Data::Object(o) => {
                let ptr = Rc::as_ptr(&o);
                if visiting.contains(&ptr) {
                    out.push_str("<circular>");
                    return;
                }
                visiting.push(ptr);
                let entries: Vec<(Key, Value)> =
                    o.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let array = is_array_keys(entries.iter().map(|(k, _)| k));
                out.push(if array { '[' } else { '{' });
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if !array {
                        out.push_str(&key.to_string());
                        out.push_str(": ");
                    }
                    value.write_display(out, visiting);
                }
                out.push(if array { ']' } else { '}' });
                visiting.pop();
            }
        }
    }

    // ── Comparison ───────────────────────────────────────────

    /// Structural equality. Values of different types are never equal.
    pub fn equals(&self, other: &Value) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.data().clone(), other.data().clone());
        match (a, b) {
            (Data::Empty, Data::Empty) => true,
            (Data::Number(a), Data::Number(b)) => a == b,
            (Data::String(a), Data::String(b)) => a == b,
            (Data::Boolean(a), Data::Boolean(b)) => a == b,
            (Data::Regex(a), Data::Regex(b)) => a.pattern == b.pattern && a.flags == b.flags,
            (Data::Object(a), Data::Object(b)) => {
                if Rc::ptr_eq(&a, &b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.equals(other)))
            }
            (Data::Function(a), Data::Function(b)) => Rc::ptr_eq(&a, &b),
            (Data::Iterator(a), Data::Iterator(b)) => Rc::ptr_eq(&a, &b),
            (Data::Custom(a), Data::Custom(b)) => {
                Rc::ptr_eq(&a, &b) || a.compare(b.as_ref()) == Some(Ordering::Equal)
            }
            (Data::Type(a), Data::Type(b)) => a.tag() == b.tag(),
            _ => false,
        }
    }

    /// Natural ordering used by comparisons, `sort`, `max` and `min`.
    pub fn compare(&self, other: &Value) -> EvalResult<Ordering> {
        let (a, b) = (self.data().clone(), other.data().clone());
        let ordering = match (&a, &b) {
            (Data::Number(x), Data::Number(y)) => Some(x.cmp(y)),
            (Data::String(x), Data::String(y)) => Some(x.cmp(y)),
            (Data::Boolean(x), Data::Boolean(y)) => Some(x.cmp(y)),
            (Data::Empty, Data::Empty) => Some(Ordering::Equal),
            (Data::Object(x), Data::Object(y)) => Some(x.borrow().len().cmp(&y.borrow().len())),
            (Data::Custom(x), Data::Custom(y)) => x.compare(y.as_ref()),
            _ => match (self.numeric(), other.numeric()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => None,
            },
        };
        ordering.ok_or_else(|| {
            EvalError::TypeMismatch(format!(
                "Cannot compare {} and {}",
                self.describe(),
                other.describe()
            ))
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<BigDecimal> for Value {
    fn from(n: BigDecimal) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

// ── Object helpers ───────────────────────────────────────────

pub(crate) fn is_array_map(map: &IndexMap<Key, Value>) -> bool {
    is_array_keys(map.keys())
}

fn is_array_keys<'a>(keys: impl Iterator<Item = &'a Key>) -> bool {
    let mut count = 0usize;
    let mut max = None;
    for key in keys {
        let Some(index) = key.as_index() else {
            return false;
        };
        max = max.max(Some(index));
        count += 1;
    }
    match max {
        None => true,
        Some(max) => max + 1 == count,
    }
}

/// One past the largest integral key, the slot `push` appends to.
pub(crate) fn next_index(map: &IndexMap<Key, Value>) -> BigDecimal {
    map.keys()
        .filter_map(|k| match k {
            Key::Number(n) => Some(n),
            Key::Text(_) => None,
        })
        .max()
        .map_or_else(BigDecimal::zero, |max| number::floor(max) + BigDecimal::from(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        number::parse(s).unwrap()
    }

    #[test]
    fn test_number_display_is_normalized() {
        assert_eq!(Value::number(dec("2.500")).display(), "2.5");
        assert_eq!(Value::number(dec("-3.50")).display(), "-3.5");
        assert_eq!(Value::number(dec("100")).display(), "100");
    }

    #[test]
    fn test_array_and_object_display() {
        let array = Value::array([Value::int(1), Value::string("a")]);
        assert_eq!(array.display(), "[1, a]");

        let mut entries = IndexMap::new();
        entries.insert(Key::text("test"), Value::int(4));
        entries.insert(Key::text("z"), Value::string("test"));
        assert_eq!(Value::object(entries).display(), "{test: 4, z: test}");
        assert_eq!(Value::new_object().display(), "[]");
        assert_eq!(Value::empty().display(), "null");
    }

    #[test]
    fn test_circular_display() {
        let outer = Value::new_object();
        let object = outer.as_object().unwrap();
        object.borrow_mut().insert(Key::text("me"), outer.clone());
        assert_eq!(outer.display(), "{me: <circular>}");
    }

    #[test]
    fn test_array_detection() {
        let mut entries = IndexMap::new();
        entries.insert(Key::index(1), Value::int(1));
        entries.insert(Key::index(0), Value::int(0));
        assert!(Value::object(entries).is_array());

        let mut gap = IndexMap::new();
        gap.insert(Key::index(0), Value::int(0));
        gap.insert(Key::index(2), Value::int(2));
        assert!(!Value::object(gap).is_array());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::empty().truthy());
        assert!(!Value::int(0).truthy());
        assert!(Value::int(3).truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::string("x").truthy());
        assert!(!Value::new_object().truthy());
        assert!(Value::array([Value::int(1)]).truthy());
    }

    #[test]
    fn test_inherit_shares_objects() {
        let a = Value::array([Value::int(1)]);
        let b = Value::empty();
        b.inherit(&a);
        a.as_object()
            .unwrap()
            .borrow_mut()
            .insert(Key::index(1), Value::int(2));
        assert_eq!(b.display(), "[1, 2]");
    }

    #[test]
    fn test_numeric_keys_compare_by_value() {
        let array = Value::array([Value::int(7)]);
        let found = array.get(&Value::number(dec("0.0")));
        assert_eq!(found.map(|v| v.display()), Some("7".to_string()));
        assert!(array.get(&Value::string("0")).is_none());
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::array([Value::int(1), Value::string("x")]);
        let b = Value::array([Value::int(1), Value::string("x")]);
        assert!(a.equals(&b));
        assert!(!Value::int(1).equals(&Value::string("1")));
        assert!(Value::number(dec("1.0")).equals(&Value::int(1)));
    }

    #[test]
    fn test_compare_mixed_types_fails() {
        let err = Value::boolean(true).compare(&Value::new_object()).unwrap_err();
        assert!(err.message().starts_with("Cannot compare"));
    }

    #[test]
    fn test_string_iteration_yields_characters() {
        let items = Value::string("42").items().unwrap();
        let shown: Vec<String> = items.iter().map(Value::display).collect();
        assert_eq!(shown, vec!["4", "2"]);
    }

    #[test]
    fn test_object_iteration_yields_pairs() {
        let array = Value::array([Value::int(6)]);
        let items = array.items().unwrap();
        assert_eq!(items[0].display(), "[0, 6]");
    }

    #[test]
    fn test_next_index() {
        let mut entries = IndexMap::new();
        entries.insert(Key::index(1), Value::int(1));
        entries.insert(Key::index(2), Value::int(2));
        assert_eq!(next_index(&entries), BigDecimal::from(3));
        assert_eq!(next_index(&IndexMap::new()), BigDecimal::zero());
    }

    #[test]
    fn test_regex_flags() {
        assert!(RegexValue::new("[tes]+", "i").unwrap().regex.is_match("teSt"));
        let err = RegexValue::new("a", "q").unwrap_err();
        assert_eq!(err.message(), "Unknown regex flag: q");
    }
}
