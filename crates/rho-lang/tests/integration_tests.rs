use rho_lang::{
    BridgeError, Compiler, CountLimit, Number, Options, RuntimeError, Shared, StagedResult,
    SymbolTable, SymbolicBridge, VectorView,
};
use rstest::rstest;

fn eval(source: &str) -> Number {
    let mut table = SymbolTable::with_builtins();
    Compiler::new()
        .compile(source, &mut table)
        .unwrap()
        .evaluate()
        .unwrap()
}

#[rstest]
#[case::precedence("2 + 3 * 4", 14.0)]
#[case::power_right_assoc("2 ^ 3 ^ 2", 512.0)]
#[case::unary_minus_below_power("-2 ^ 2", -4.0)]
#[case::ternary("1 < 2 ? 3 : 4", 3.0)]
#[case::if_else("if (1 < 2) 10 else 20", 10.0)]
#[case::switch(
    "switch { case 1 > 2 : 10; case 2 > 1 : 20; default : 30; }",
    20.0
)]
#[case::logic("1 and 0 or 1", 1.0)]
#[case::nand("1 nand 1", 0.0)]
#[case::string_compare("'abc' < 'abd'", 1.0)]
#[case::assignment("x := 5; x + 1", 6.0)]
#[case::compound_assignment("x := 10; x %= 3; x", 1.0)]
#[case::while_loop("var i := 0; var s := 0; while (i < 5) { i += 1; s += i }; s", 15.0)]
#[case::repeat_runs_body_once("var i := 10; repeat i += 1 until (i > 0); i", 11.0)]
#[case::break_with_value(
    "var i; for (i := 0; i < 10; i += 1) { if (i == 3) break[i * 10] }",
    30.0
)]
#[case::continue_skips(
    "var i; var s := 0; for (i := 0; i < 5; i += 1) { if (i % 2 == 1) continue; s += i }; s",
    6.0
)]
#[case::builtin_variadic("max(1, 2, 3)", 3.0)]
#[case::builtin_binary("pow(2, 10) + mod(7, 4)", 1027.0)]
#[case::builtin_native("hypot(3, 4) + clamp(0, 15, 10)", 15.0)]
#[case::builtin_unary("cos(0) + sign(-3)", 0.0)]
#[case::vector_decl("var v[3] := {1, 2, 3}; sum(v) + v[1]", 8.0)]
#[case::vector_slice("var v[5] := {1, 2, 3, 4, 5}; sum(v[1 : 3])", 9.0)]
#[case::vector_fill("var v[3]; v := 7; sum(v)", 21.0)]
#[case::vector_scalar_op("var v[3] := {1, 2, 3}; v += 1; sum(v)", 9.0)]
#[case::vector_agg("var v[4] := {1, 2, 3, 4}; avg(v)", 2.5)]
#[case::swap("x := 1; y := 2; x <=> y; x * 10 + y", 21.0)]
fn test_eval(#[case] source: &str, #[case] expected: f64) {
    assert_eq!(eval(source), Number::new(expected));
}

#[rstest]
#[case::division_by_zero("1 / 0", f64::INFINITY)]
#[case::missing_else("if (2 < 1) 10", f64::NAN)]
#[case::string_value_is_nan("'abc' + 'def'", f64::NAN)]
fn test_eval_special(#[case] source: &str, #[case] expected: f64) {
    let value = eval(source);
    if expected.is_nan() {
        assert!(value.is_nan());
    } else {
        assert_eq!(value, Number::new(expected));
    }
}

#[test]
fn test_assignment_persists_in_table() {
    let mut table = SymbolTable::with_builtins();
    let expr = Compiler::new().compile("x := 5; x + 1", &mut table).unwrap();
    assert_eq!(expr.evaluate().unwrap(), Number::new(6.0));
    assert_eq!(table.value_of("x"), Some(Number::new(5.0)));
}

#[test]
fn test_host_registered_vector() {
    let mut table = SymbolTable::with_builtins();
    let view = table.add_vector(
        "v",
        VectorView::from_values(vec![
            Number::new(1.0),
            Number::new(2.0),
            Number::new(3.0),
        ]),
    );
    let expr = Compiler::new().compile("v[0] := 10; sum(v)", &mut table).unwrap();
    assert_eq!(expr.evaluate().unwrap(), Number::new(15.0));
    assert_eq!(view.get(0), Number::new(10.0));
}

#[test]
fn test_string_assignment_persists() {
    let mut table = SymbolTable::with_builtins();
    let s = table.add_string("s", "abc");
    let expr = Compiler::new().compile("s += 'def'", &mut table).unwrap();
    expr.evaluate().unwrap();
    assert_eq!(s.get(), "abcdef");
}

#[test]
fn test_string_slice_text() {
    let mut table = SymbolTable::with_builtins();
    let expr = Compiler::new().compile("'hello'[1 : 3]", &mut table).unwrap();
    assert_eq!(expr.text().unwrap(), Some("ell".to_string()));
}

#[test]
fn test_loop_guard_violation() {
    let mut table = SymbolTable::with_builtins();
    let compiler = Compiler::with_options(Options {
        guard: Some(Shared::new(CountLimit::new(100))),
        ..Options::default()
    });
    let expr = compiler.compile("while (1) {}", &mut table).unwrap();
    assert_eq!(
        expr.evaluate(),
        Err(RuntimeError::LoopViolation { iterations: 100 })
    );
}

#[test]
fn test_range_violation() {
    let mut table = SymbolTable::with_builtins();
    let expr = Compiler::new()
        .compile("var v[3] := {1, 2, 3}; x := 7; v[x]", &mut table)
        .unwrap();
    assert_eq!(
        expr.evaluate(),
        Err(RuntimeError::RangeViolation { index: 7, len: 3 })
    );
}

#[test]
fn test_unchecked_out_of_bounds_is_nan() {
    let mut table = SymbolTable::with_builtins();
    let compiler = Compiler::with_options(Options {
        disable_range_checks: true,
        ..Options::default()
    });
    let expr = compiler
        .compile("var v[3] := {1, 2, 3}; x := 7; v[x]", &mut table)
        .unwrap();
    assert!(expr.evaluate().unwrap().is_nan());
}

#[test]
fn test_return_stages_mixed_results() {
    let mut table = SymbolTable::with_builtins();
    let expr = Compiler::new()
        .compile("return [1 + 1, 'done', 3 * 3]", &mut table)
        .unwrap();
    assert_eq!(expr.evaluate().unwrap(), Number::new(2.0));
    assert_eq!(
        expr.results(),
        vec![
            StagedResult::Number(Number::new(2.0)),
            StagedResult::Str("done".to_string()),
            StagedResult::Number(Number::new(9.0)),
        ]
    );
}

#[test]
fn test_compile_errors() {
    let mut table = SymbolTable::with_builtins();
    assert!(Compiler::new().compile("y + 1", &mut table).is_err());
    assert!(Compiler::new().compile("sin(1, 2)", &mut table).is_err());
    assert!(Compiler::new().compile("break", &mut table).is_err());
    assert!(Compiler::new().compile("(1 + 2", &mut table).is_err());
    assert!(Compiler::new().compile("'abc' * 2", &mut table).is_err());
}

#[test]
fn test_specialization_does_not_change_values() {
    let source = "x := 2; 3 * x ^ 2 + 1";
    let mut table = SymbolTable::with_builtins();
    let fast = Compiler::new().compile(source, &mut table).unwrap();
    let plain = Compiler::with_options(Options {
        disable_specialization: true,
        ..Options::default()
    })
    .compile(source, &mut table)
    .unwrap();
    assert_eq!(fast.evaluate().unwrap(), plain.evaluate().unwrap());
}

#[test]
fn test_specialization_preserves_side_effect_order() {
    // The left addend writes the variable the polynomial factor reads.
    let source = "x := 2; (x := 5) + 3 * x ^ 2";
    let mut table = SymbolTable::with_builtins();
    let fast = Compiler::new().compile(source, &mut table).unwrap();
    let plain = Compiler::with_options(Options {
        disable_specialization: true,
        ..Options::default()
    })
    .compile(source, &mut table)
    .unwrap();
    assert_eq!(fast.evaluate().unwrap(), Number::new(80.0));
    assert_eq!(plain.evaluate().unwrap(), Number::new(80.0));
}

#[test]
fn test_slice_aggregation_round_trips_through_text() {
    let mut table = SymbolTable::with_builtins();
    let compiler = Compiler::new();
    let first = compiler
        .compile("var v[5] := {1, 2, 3, 4, 5}; sum(v[1 : 3])", &mut table)
        .unwrap();
    assert_eq!(first.evaluate().unwrap(), Number::new(9.0));
    let text = first.to_text();
    let second = compiler.compile(&text, &mut table).unwrap();
    assert_eq!(second.evaluate().unwrap(), Number::new(9.0));
    assert_eq!(second.to_text(), text);
}

#[test]
fn test_negative_zero_constant_round_trips() {
    let mut table = SymbolTable::with_builtins();
    table.add_variable("x", Number::new(1.0));
    let compiler = Compiler::new();
    // `(-2) * 0` folds to -0.0; the serialized constant must keep the sign
    // or the division flips from -inf to +inf on recompilation.
    let first = compiler.compile("x / ((-2) * 0)", &mut table).unwrap();
    assert_eq!(first.evaluate().unwrap(), Number::new(f64::NEG_INFINITY));
    let text = first.to_text();
    let second = compiler.compile(&text, &mut table).unwrap();
    assert_eq!(second.evaluate().unwrap(), Number::new(f64::NEG_INFINITY));
    assert_eq!(second.to_text(), text);
}

#[test]
fn test_dropped_trees_release_storage_handles() {
    let mut table = SymbolTable::with_builtins();
    let x = table.add_variable("x", Number::new(1.0));
    let baseline = x.handle_count();
    let exprs: Vec<_> = (0..8)
        .map(|_| Compiler::new().compile("x + x * x", &mut table).unwrap())
        .collect();
    assert!(x.handle_count() > baseline);
    drop(exprs);
    assert_eq!(x.handle_count(), baseline);
    x.set(Number::new(3.0));
    assert_eq!(table.value_of("x"), Some(Number::new(3.0)));
}

#[derive(Debug)]
struct TableBridge;

impl SymbolicBridge for TableBridge {
    fn evaluate(&self, request: &str) -> Result<String, BridgeError> {
        match request {
            "differentiate(((3 * (x ^ 2)) + (2 * x)))" => Ok("6 * x + 2".to_string()),
            "integrate((2 * x))" => Ok("x ^ 2".to_string()),
            _ => Err(BridgeError::Rejected(format!("unsupported: {request}"))),
        }
    }
}

#[test]
fn test_symbolic_bridge_rewrites_subtree() {
    let mut table = SymbolTable::with_builtins();
    table.add_variable("x", Number::new(5.0));
    let compiler = Compiler::with_options(Options {
        bridge: Some(Box::new(TableBridge)),
        disable_specialization: true,
        ..Options::default()
    });
    let expr = compiler
        .compile("differentiate(3 * x ^ 2 + 2 * x)", &mut table)
        .unwrap();
    assert_eq!(expr.evaluate().unwrap(), Number::new(32.0));
}

#[test]
fn test_symbolic_bridge_rejection_is_compile_error() {
    let mut table = SymbolTable::with_builtins();
    table.add_variable("x", Number::new(5.0));
    let compiler = Compiler::with_options(Options {
        bridge: Some(Box::new(TableBridge)),
        ..Options::default()
    });
    assert!(compiler.compile("integrate(sin(x))", &mut table).is_err());
}

#[test]
fn test_missing_bridge_is_compile_error() {
    let mut table = SymbolTable::with_builtins();
    table.add_variable("x", Number::new(5.0));
    assert!(
        Compiler::new()
            .compile("differentiate(x ^ 2)", &mut table)
            .is_err()
    );
}
