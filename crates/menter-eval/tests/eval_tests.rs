//! Evaluator tests: operators, collections, functions and closures,
//! control flow, value functions, core modules, object constructors,
//! custom types, diagnostics, cancellation and the 100-iteration
//! determinism test.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use menter_eval::{BigDecimal, CustomType, EvalResult, ExtensionError, Runtime, Value};
use menter_types::{ErrorCategory, ErrorCode, MenterError, Operator};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn eval(source: &str) -> String {
    let mut runtime = Runtime::new();
    match runtime.evaluate(source) {
        Ok(value) => value.display(),
        Err(err) => panic!("evaluation of {source:?} failed:\n{err}"),
    }
}

fn eval_error(source: &str) -> MenterError {
    let mut runtime = Runtime::new();
    match runtime.evaluate(source) {
        Ok(value) => panic!("expected {source:?} to fail, got {}", value.display()),
        Err(err) => err,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * (3 + 4)"), "15");
    assert_eq!(eval("1 * 5 + 2 * (3 + 2)"), "15");
    assert_eq!(eval("1 + 2 * 3 / 4 % 5 - 6"), "-3.5");
    assert_eq!(eval("-1 * (2 + 3 * 4) + -5 * 6"), "-44");
}

#[test]
fn numbers_are_arbitrary_precision() {
    assert_eq!(eval("30!"), "265252859812191058636308480000000");
    assert_eq!(eval("2 ^ 100"), "1267650600228229401496703205376");
    assert_eq!(
        eval("99999999999999999999999999999 + 1"),
        "100000000000000000000000000000"
    );
    assert_eq!(eval("1 / 3"), "0.33333333333333333333");
    assert_eq!(eval("2 / 3"), "0.66666666666666666667");
    assert_eq!(eval("0.1 + 0.2"), "0.3");
}

#[test]
fn division_by_zero_fails() {
    let err = eval_error("1 / 0");
    assert!(err.message.contains("Division by zero"), "{err}");
}

#[test]
fn boolean_operators() {
    assert_eq!(eval("!true"), "false");
    assert_eq!(eval("!(1 == 2)"), "true");
    assert_eq!(eval("1 < 2 && 2 < 3"), "true");
    assert_eq!(eval("1 > 2 || 2 > 3"), "false");
}

#[test]
fn string_concatenation_wins_over_numbers() {
    assert_eq!(eval("\"4\" + 45"), "445");
}

#[test]
fn concatenate_operator() {
    assert_eq!(eval("[1, 2] :: [3, 4]"), "[1, 2, 3, 4]");
    assert_eq!(eval("[1, 2] :: 3"), "[1, 2, 3]");
    assert_eq!(eval("1 :: [2, 3]"), "[1, 2, 3]");
    assert_eq!(eval("1 :: 2"), "[1, 2]");
}

#[test]
fn operator_as_function() {
    assert_eq!(eval("(+)(2, 3)"), "5");
    assert_eq!(eval("[1, 2, 3, 4].foldl(10, (-))"), "0");
}

#[test]
fn increment_and_decrement() {
    assert_eq!(eval("x = 4; while (x > 0) { x-- }; x"), "0");
    assert_eq!(eval("x = 1; x++; x++; x"), "3");
}

#[test]
fn custom_operator_routine() {
    let mut runtime = Runtime::new();
    runtime.register_operator(
        Operator::binary("<>", 70),
        Rc::new(|args: &[Value]| -> EvalResult<Value> {
            Ok(Value::string(format!("{}|{}", args[0].display(), args[1].display())))
        }),
    );
    assert_eq!(runtime.evaluate("1 <> 2").unwrap().display(), "1|2");
}

// ─────────────────────────────────────────────────────────────────────
// Collections
// ─────────────────────────────────────────────────────────────────────

#[test]
fn map_literal_display() {
    assert_eq!(eval("hello = 4; {test: hello, z: \"test\"}"), "{test: 4, z: test}");
}

#[test]
fn member_creation_on_assignment() {
    assert_eq!(
        eval("map.hmm = 3; map[\"singlestring\"] = \"val 1\"; map[\"string\" + \" concat\"] = \"val 2\"; map"),
        "{hmm: 3, singlestring: val 1, string concat: val 2}"
    );
    assert_eq!(eval("test.t.t = 4; test.t.t"), "4");
}

#[test]
fn indexed_access() {
    assert_eq!(eval("([2, 3])[0]"), "2");
    assert_eq!(eval("test.t = [x -> x + x]; test.t[0](2)"), "4");
}

#[test]
fn index_directly_on_array_literal() {
    assert_eq!(eval("[1, 2][0]"), "1");
    assert_eq!(eval("[[1, 2], [3]][0][1]"), "2");
    assert_eq!(eval("[[1, 2], [3]][1]"), "[3]");
}

#[test]
fn index_after_method_call_chain() {
    assert_eq!(eval("[3, 1, 2].sort()[0]"), "1");
    assert_eq!(eval("a = [1, 2].map(x -> x * 10); b = [5]; b[0] + a[1]"), "25");
}

// ─────────────────────────────────────────────────────────────────────
// Functions and closures
// ─────────────────────────────────────────────────────────────────────

#[test]
fn pipelines() {
    assert_eq!(eval("1 |> x -> x + 5"), "6");
    assert_eq!(eval("((x, y) -> x + y)(2, 4)"), "6");
    assert_eq!(eval("3 + (4 |> x -> x - 1)"), "6");
    assert_eq!(eval("[1, 2].map(x -> x + 3) |> x -> x[0]"), "4");
}

#[test]
fn pipeline_into_call_arguments() {
    assert_eq!(eval("sub = (x, y) -> x - y; 10 |> sub(4)"), "6");
    assert_eq!(eval("sub = (x, y) -> x - y; 10 >| sub(4)"), "-6");
}

#[test]
fn declared_functions() {
    assert_eq!(eval("double(x) = x * 2; double(21)"), "42");
    assert_eq!(eval("add(a, b) { a + b }; add(1, 2)"), "3");
    assert_eq!(eval("(x -> x + 1)(2)"), "3");
}

#[test]
fn return_from_function() {
    assert_eq!(
        eval("test(a, b) { if (a) return b + 1; return b; }; [test(true, 0), test(false, 0)]"),
        "[1, 0]"
    );
}

#[test]
fn memoized_fibonacci() {
    let source = "fibstorage = {}\n\
                  fib(n) = {\n\
                  \x20 if (!fibstorage.containsKey(n)) { fibstorage[n] = if (n == 0) 0 else if (n == 1) 1 else fib(n - 1) + fib(n - 2) }\n\
                  \x20 fibstorage[n]\n\
                  }\n\
                  fib(30)";
    assert_eq!(eval(source), "832040");
}

#[test]
fn memoized_fibonacci_beyond_machine_width() {
    let source = "fibstorage = {}\n\
                  fib(n) = {\n\
                  \x20 if (!fibstorage.containsKey(n)) { fibstorage[n] = if (n == 0) 0 else if (n == 1) 1 else fib(n - 1) + fib(n - 2) }\n\
                  \x20 fibstorage[n]\n\
                  }\n\
                  fib(150)";
    let result = thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || eval(source))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(result, "9969216677189303386214405760200");
}

#[test]
fn closure_captures_block_locals() {
    assert_eq!(eval("test = if (true) { var = 4; x -> { x + var } }; test(3)"), "7");
}

#[test]
fn arguments_are_not_shared_with_caller() {
    assert_eq!(eval("x = 4; f = x -> x + 1; f(6)"), "7");
    assert_eq!(eval("x = 4; f = x -> x + 1; f(6); x"), "4");
}

#[test]
fn member_functions_receive_self() {
    assert_eq!(eval("{fun: x -> self.a + x, a: 7}.fun(2)"), "9");
}

#[test]
fn function_call_is_not_assignable() {
    let mut runtime = Runtime::new();
    assert!(runtime.evaluate("test = 4; test.f = () -> test; test.f() = 43").is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Control flow
// ─────────────────────────────────────────────────────────────────────

#[test]
fn conditional_branches() {
    assert_eq!(eval("if (2 == 3) { 5 } else if (2 > 1) { 6 } else { 7 }"), "6");
    assert_eq!(eval("if (2 == 3) { 5 } else if (2 < 1) { 6 } else { 7 }"), "7");
}

#[test]
fn for_loop_break_and_continue() {
    let source = "arr = []\n\
                  for (i in [1, 2, 3, 4]) {\n\
                  \x20 if (i == 1) { continue }\n\
                  \x20 if (i == 4) { break }\n\
                  \x20 arr[i - 2] = i\n\
                  }\n\
                  arr";
    assert_eq!(eval(source), "[2, 3]");
}

#[test]
fn for_loop_over_object_entries() {
    assert_eq!(
        eval("out = []; for ((k, v) in {a: 1, b: 2}) { out = out :: (k + v) }; out"),
        "[a1, b2]"
    );
    assert_eq!(eval("sum = 0; for (v in {a: 1, b: 2}) { sum = sum + v }; sum"), "3");
}

#[test]
fn while_condition_must_be_boolean() {
    let err = eval_error("while (1) { 2 }");
    assert_eq!(err.code, ErrorCode::TYPE_MISMATCH);
}

// ─────────────────────────────────────────────────────────────────────
// Value functions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn collection_value_functions() {
    assert_eq!(eval("[1,2].containsValue(1)"), "true");
    assert_eq!(eval("{a:1, b:0}.keys().size()"), "2");
    assert_eq!(eval("[1, 2, 3].sort((a, b) -> b - a)"), "[3, 2, 1]");
    assert_eq!(eval("[\"test\", \"hello\"].map(x -> x.size()).max()"), "5");
}

#[test]
fn range_map_filter_chain() {
    assert_eq!(
        eval("import common inline; range(1, 4)\n  .map(x -> x * 2)\n  .filter(x -> x > 4)"),
        "[6, 8]"
    );
}

#[test]
fn string_value_functions() {
    assert_eq!(eval("\"Hello\".toUpperCase()"), "HELLO");
    assert_eq!(eval("\"a,b,,\".split(\",\")"), "[a, b]");
    assert_eq!(eval("\"  x \".trim().size()"), "1");
}

#[test]
fn is_null_on_any_value() {
    assert_eq!(eval("test = null; test.isNull()"), "true");
}

// ─────────────────────────────────────────────────────────────────────
// Core modules
// ─────────────────────────────────────────────────────────────────────

#[test]
fn print_captures_output() {
    let mut runtime = Runtime::new();
    runtime.evaluate("import common inline; print(\"a\", 1)").unwrap();
    assert_eq!(runtime.take_output(), vec!["a 1".to_string()]);
    assert!(runtime.output().is_empty());
}

#[test]
fn range_variants() {
    assert_eq!(eval("import math; math.range(3, 1)"), "[3, 2, 1]");
    assert_eq!(eval("import math; math.range(0, 1, 0.5)"), "[0, 0.5, 1]");
    assert_eq!(eval("import common inline; range(\"a\", \"c\")"), "[a, b, c]");
    let err = eval_error("import common inline; range(1, 2, 0)");
    assert!(err.message.contains("non-zero step size"), "{err}");
}

#[test]
fn math_functions() {
    assert_eq!(eval("import math inline; round(2.5)"), "3");
    assert_eq!(eval("import math inline; round(1.2345, 2)"), "1.23");
    assert_eq!(eval("import math inline; abs(-4)"), "4");
    assert_eq!(eval("import math inline; max(3, 9, 4)"), "9");
}

#[test]
fn reflect_functions() {
    let mut runtime = Runtime::new();
    runtime.options_mut().add_auto_import("reflect inline").unwrap();
    let value = runtime.evaluate("test = 4; fun() = test; inherit(fun(), 42); test").unwrap();
    assert_eq!(value.display(), "42");
    let value = runtime.evaluate("access({1: 42}, 1)").unwrap();
    assert_eq!(value.display(), "42");
}

// ─────────────────────────────────────────────────────────────────────
// Object constructors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn constructor_with_fields_and_init() {
    let source = "Person(name, age) = { $fields: [name, age], $init: () -> { self.greeting = \"hi \" + self.name } }\n\
                  p = new Person(\"Yan\", 22)\n\
                  [p.greeting, p.age]";
    assert_eq!(eval(source), "[hi Yan, 22]");
}

// ─────────────────────────────────────────────────────────────────────
// Custom types
// ─────────────────────────────────────────────────────────────────────

struct Counter {
    count: Cell<i64>,
}

impl CustomType for Counter {
    fn tag(&self) -> &str {
        "Counter"
    }

    fn construct(&self, args: &[Value]) -> Result<Rc<dyn CustomType>, ExtensionError> {
        let start = match args {
            [] => 0,
            [start] => start
                .display()
                .parse()
                .map_err(|_| ExtensionError::InvalidArguments {
                    tag: "Counter".into(),
                    reason: "start must be an integer".into(),
                })?,
            _ => {
                return Err(ExtensionError::InvalidArguments {
                    tag: "Counter".into(),
                    reason: "expected at most one argument".into(),
                })
            }
        };
        Ok(Rc::new(Counter { count: Cell::new(start) }))
    }

    fn methods(&self) -> Vec<String> {
        vec!["increment".into()]
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, ExtensionError> {
        match method {
            "increment" => {
                self.count.set(self.count.get() + 1);
                Ok(Value::int(self.count.get()))
            }
            other => Err(ExtensionError::UnknownMethod {
                tag: "Counter".into(),
                method: other.into(),
            }),
        }
    }

    fn display(&self) -> String {
        format!("Counter({})", self.count.get())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn runtime_with_counter() -> Runtime {
    let mut runtime = Runtime::new();
    runtime
        .register_extension(Rc::new(Counter { count: Cell::new(0) }))
        .unwrap();
    runtime
}

#[test]
fn custom_type_construct_and_call() {
    let mut runtime = runtime_with_counter();
    let value = runtime
        .evaluate("import counter inline; c = new Counter(5); c.increment(); c")
        .unwrap();
    assert_eq!(value.display(), "Counter(6)");
    assert_eq!(value.type_name(), "Counter");
}

#[test]
fn custom_type_rejects_arguments() {
    let mut runtime = runtime_with_counter();
    let err = runtime
        .evaluate("import counter inline; new Counter(1, 2)")
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EXTENSION_REJECTED);
}

/// An ordered collection that overrides every extension hook.
struct Bag {
    items: RefCell<Vec<Value>>,
}

impl Bag {
    fn index(key: &Value) -> Option<usize> {
        key.display().parse().ok()
    }
}

impl CustomType for Bag {
    fn tag(&self) -> &str {
        "Bag"
    }

    fn construct(&self, args: &[Value]) -> Result<Rc<dyn CustomType>, ExtensionError> {
        Ok(Rc::new(Bag {
            items: RefCell::new(args.iter().map(Value::copy).collect()),
        }))
    }

    fn numeric(&self) -> Option<BigDecimal> {
        Some(BigDecimal::from(self.items.borrow().len() as u64))
    }

    fn truthy(&self) -> bool {
        !self.items.borrow().is_empty()
    }

    fn size(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, key: &Value) -> Option<Value> {
        Bag::index(key).and_then(|i| self.items.borrow().get(i).cloned())
    }

    fn set(&self, key: &Value, value: Value) -> bool {
        let Some(index) = Bag::index(key) else {
            return false;
        };
        let mut items = self.items.borrow_mut();
        match index.cmp(&items.len()) {
            Ordering::Less => items[index] = value,
            Ordering::Equal => items.push(value),
            Ordering::Greater => return false,
        }
        true
    }

    fn display(&self) -> String {
        let items: Vec<String> = self.items.borrow().iter().map(Value::display).collect();
        format!("Bag({})", items.join(", "))
    }

    fn iterate(&self) -> Option<Vec<Value>> {
        Some(self.items.borrow().clone())
    }

    fn compare(&self, other: &dyn CustomType) -> Option<Ordering> {
        let other = other.as_any().downcast_ref::<Bag>()?;
        Some(self.size().cmp(&other.size()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn eval_with_bag(source: &str) -> String {
    let mut runtime = Runtime::new();
    runtime
        .register_extension(Rc::new(Bag { items: RefCell::new(Vec::new()) }))
        .unwrap();
    match runtime.evaluate(&format!("import bag inline\n{source}")) {
        Ok(value) => value.display(),
        Err(err) => panic!("evaluation of {source:?} failed:\n{err}"),
    }
}

#[test]
fn custom_type_size_and_collection_functions() {
    assert_eq!(eval_with_bag("b = new Bag(1, 2, 3); b.size()"), "3");
    assert_eq!(eval_with_bag("b = new Bag(1, 2, 3); b.map(x -> x * 2)"), "[2, 4, 6]");
    assert_eq!(eval_with_bag("b = new Bag(1, 2, 3); b.filter(x -> x > 1).sum()"), "5");
}

#[test]
fn custom_type_numeric_and_truthy() {
    assert_eq!(eval_with_bag("b = new Bag(1, 2, 3); b + 1"), "4");
    assert_eq!(eval_with_bag("e = new Bag(); if (e) \"full\" else \"empty\""), "empty");
    assert_eq!(eval_with_bag("b = new Bag(7); if (b) \"full\" else \"empty\""), "full");
}

#[test]
fn custom_type_indexed_get_and_set() {
    assert_eq!(eval_with_bag("b = new Bag(1, 2, 3); b[0]"), "1");
    assert_eq!(eval_with_bag("b = new Bag(1, 2, 3); b[0] = 9; b"), "Bag(9, 2, 3)");
    assert_eq!(eval_with_bag("b = new Bag(1); b[1] = 4; b.size()"), "2");
}

#[test]
fn custom_type_iteration() {
    assert_eq!(
        eval_with_bag("b = new Bag(1, 2, 3); total = 0; for (x in b) { total = total + x }; total"),
        "6"
    );
}

#[test]
fn custom_type_ordering() {
    assert_eq!(
        eval_with_bag("a = new Bag(1, 2); e = new Bag(); c = new Bag(5); [a, e, c].sort()"),
        "[Bag(), Bag(5), Bag(1, 2)]"
    );
}

#[test]
fn custom_type_registered_once() {
    let mut runtime = runtime_with_counter();
    let err = runtime
        .register_extension(Rc::new(Counter { count: Cell::new(0) }))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EXTENSION_REJECTED);
}

// ─────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────

#[test]
fn unknown_symbol_suggests_names() {
    let err = eval_error("counter = 1; countr + 1");
    assert_eq!(err.code, ErrorCode::UNDEFINED_SYMBOL);
    assert!(err.message.contains("Cannot resolve symbol 'countr'"), "{err}");
    assert!(err.message.contains("Did you mean 'counter'"), "{err}");
}

#[test]
fn stack_trace_lists_watched_values() {
    let mut runtime = Runtime::new();
    runtime.debug_session_mut().stack_trace_values = vec!["a".to_string()];
    let err = runtime.evaluate("a = 5\nb = a + missing").unwrap_err();
    assert_eq!(err.unit, "eval");
    assert!(err.detail.contains("a = 5 (number)"), "{}", err.detail);
}

#[test]
fn debug_switch_from_script() {
    let mut runtime = Runtime::new();
    runtime
        .evaluate("import debug; debug.switch(\"import order\", true)")
        .unwrap();
    assert!(runtime.debug_session().log_import_order);
}

#[test]
fn scan_error_category() {
    let err = eval_error("\"unterminated");
    assert_eq!(err.category, ErrorCategory::Scan);
}

// ─────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn cancel_stops_infinite_loop() {
    let mut runtime = Runtime::new();
    let handle = runtime.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
    });
    let err = runtime.evaluate("while (true) {}").unwrap_err();
    canceller.join().unwrap();
    assert_eq!(err.code, ErrorCode::CANCELLED);

    assert_eq!(runtime.evaluate("1 + 1").unwrap().display(), "2");
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn evaluation_is_deterministic() {
    let source = "import common inline\n\
                  data = {b: 2, a: 1, c: [3, 1, 2]}\n\
                  [data.keys(), data.c.sort(), range(1, 5).map(x -> x * x).sum(), data]";
    let first = eval(source);
    for _ in 0..100 {
        assert_eq!(eval(source), first);
    }
}
