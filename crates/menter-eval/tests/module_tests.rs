//! Module tests: load ordering, import binding forms, export visibility,
//! module errors, runtime options, persistent evaluation contexts and the
//! 100-iteration determinism test.

use menter_eval::{Runtime, RuntimeOptions};
use menter_types::{ErrorCategory, ErrorCode};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// A runtime with every `(name, source)` loaded and evaluated.
fn runtime_with(units: &[(&str, &str)]) -> Runtime {
    let mut runtime = Runtime::new();
    for (name, source) in units {
        runtime.load(source, name).unwrap();
    }
    runtime.finish_loading().unwrap();
    runtime
}

fn display(runtime: &mut Runtime, source: &str) -> String {
    match runtime.evaluate(source) {
        Ok(value) => value.display(),
        Err(err) => panic!("evaluation of {source:?} failed:\n{err}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────

#[test]
fn importer_runs_after_exporter() {
    let mut runtime = runtime_with(&[
        ("b", "import a\nexport [y] as b\ny = a.x + 1"),
        ("a", "export [x] as a\nx = 1"),
    ]);
    assert_eq!(display(&mut runtime, "import b; b.y"), "2");
}

#[test]
fn chained_imports_order_topologically() {
    let mut runtime = runtime_with(&[
        ("c", "import b\nexport [z] as c\nz = b.y * 10"),
        ("b", "import a\nexport [y] as b\ny = a.x + 1"),
        ("a", "export [x] as a\nx = 1"),
    ]);
    assert_eq!(display(&mut runtime, "import c; c.z"), "20");
}

#[test]
fn circular_import_names_units() {
    let mut runtime = Runtime::new();
    runtime.load("import b\nexport [x] as a\nx = 1", "a").unwrap();
    runtime.load("import a\nexport [y] as b\ny = 2", "b").unwrap();
    let err = runtime.finish_loading().unwrap_err();
    assert_eq!(err.code, ErrorCode::CIRCULAR_IMPORT);
    assert_eq!(err.category, ErrorCategory::Module);
    assert!(err.message.contains("a, b"), "{err}");
}

#[test]
fn module_error_discards_pending_batch() {
    let mut runtime = Runtime::new();
    runtime.load("import b\nexport [x] as a\nx = 1", "a").unwrap();
    runtime.load("import a\nexport [y] as b\ny = 2", "b").unwrap();
    assert!(runtime.finish_loading().is_err());
    assert!(runtime.units().iter().all(|u| u.name != "a" && u.name != "b"));

    let err = runtime.evaluate("import a; a.x").unwrap_err();
    assert_eq!(err.code, ErrorCode::UNKNOWN_MODULE);
}

// ─────────────────────────────────────────────────────────────────────
// Imports and exports
// ─────────────────────────────────────────────────────────────────────

#[test]
fn inline_import_exposes_exports() {
    let mut runtime = runtime_with(&[(
        "lib",
        "export [greet] as lib\nprefix = \"hi \"\ngreet(n) = prefix + n",
    )]);
    assert_eq!(display(&mut runtime, "import lib inline; greet(\"yan\")"), "hi yan");

    let err = runtime.evaluate("import lib inline; prefix").unwrap_err();
    assert_eq!(err.code, ErrorCode::UNDEFINED_SYMBOL);
}

#[test]
fn aliased_import() {
    let mut runtime = runtime_with(&[("lib", "export [add] as lib\nadd(a, b) = a + b")]);
    assert_eq!(display(&mut runtime, "import lib as l; l.add(1, 2)"), "3");
}

#[test]
fn missing_export_is_illegal_access() {
    let mut runtime = runtime_with(&[("m", "export [a] as m\na = 1\nb = 2")]);
    assert_eq!(display(&mut runtime, "import m; m.a"), "1");
    let err = runtime.evaluate("import m; m.b").unwrap_err();
    assert_eq!(err.code, ErrorCode::ILLEGAL_ACCESS);
}

#[test]
fn module_reference_lists_exports() {
    let mut runtime = runtime_with(&[("m", "export [a, c] as m\na = 1\nb = 2\nc = 3")]);
    assert_eq!(display(&mut runtime, "import m; m"), "{a: 1, c: 3}");
}

#[test]
fn last_registered_exporter_wins() {
    let mut runtime = runtime_with(&[
        ("first", "export [v] as m\nv = 1"),
        ("second", "export [v] as m\nv = 2"),
    ]);
    assert_eq!(display(&mut runtime, "import m; m.v"), "2");
}

#[test]
fn unknown_module() {
    let err = Runtime::new().evaluate("import nowhere").unwrap_err();
    assert_eq!(err.code, ErrorCode::UNKNOWN_MODULE);
}

#[test]
fn duplicate_import_binding() {
    let err = Runtime::new()
        .evaluate("import math\nimport common as math")
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DUPLICATE_IMPORT);
}

#[test]
fn duplicate_module_in_one_unit() {
    let err = Runtime::new()
        .load("export [a] as m\nexport [b] as m\na = 1\nb = 2", "dup")
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DUPLICATE_MODULE);
}

// ─────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────

#[test]
fn forbidden_import() {
    let mut runtime = Runtime::new();
    runtime.options_mut().forbid_import("io");
    let err = runtime.evaluate("import io").unwrap_err();
    assert_eq!(err.code, ErrorCode::FORBIDDEN_IMPORT);
}

#[test]
fn auto_imports_apply_to_snippets() {
    let mut runtime = Runtime::new();
    runtime.options_mut().add_auto_import("common inline").unwrap();
    assert_eq!(display(&mut runtime, "range(1, 3)"), "[1, 2, 3]");
}

#[test]
fn options_from_json() {
    let options = RuntimeOptions::from_json(
        r#"{ "forbidden_imports": ["io"], "auto_imports": ["math as m"] }"#,
    )
    .unwrap();
    let mut runtime = Runtime::with_options(options);
    assert_eq!(display(&mut runtime, "m.abs(-2)"), "2");
    assert_eq!(
        runtime.evaluate("import io").unwrap_err().code,
        ErrorCode::FORBIDDEN_IMPORT
    );
}

// ─────────────────────────────────────────────────────────────────────
// Evaluation contexts
// ─────────────────────────────────────────────────────────────────────

#[test]
fn evaluate_uses_a_fresh_unit() {
    let mut runtime = Runtime::new();
    display(&mut runtime, "x = 41");
    let err = runtime.evaluate("x").unwrap_err();
    assert_eq!(err.code, ErrorCode::UNDEFINED_SYMBOL);
}

#[test]
fn named_context_keeps_symbols() {
    let mut runtime = Runtime::new();
    runtime.evaluate_in_context_of("x = 41", "session").unwrap();
    let value = runtime.evaluate_in_context_of("x + 1", "session").unwrap();
    assert_eq!(value.display(), "42");
}

#[test]
fn named_context_sees_loaded_modules() {
    let mut runtime = Runtime::new();
    runtime.load("export [x] as a\nx = 5", "a").unwrap();
    runtime.evaluate_in_context_of("import a", "session").unwrap();
    let value = runtime.evaluate_in_context_of("a.x * 2", "session").unwrap();
    assert_eq!(value.display(), "10");
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn load_order_is_deterministic() {
    let units = [
        ("c", "import b\nexport [z] as c\nz = b.y :: \"c\""),
        ("b", "import a\nexport [y] as b\ny = a.x :: \"b\""),
        ("a", "export [x] as a\nx = [\"a\"]"),
    ];
    let first = display(&mut runtime_with(&units), "import c; c.z");
    assert_eq!(first, "[a, b, c]");
    for _ in 0..100 {
        assert_eq!(display(&mut runtime_with(&units), "import c; c.z"), first);
    }
}
