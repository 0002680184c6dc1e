//! End-to-end evaluation through the whole pipeline
//!
//! Every expected value is checked with optimizations both on and off.

use swona::{
    register_runtime_functions, Error, Evaluator, EvaluatorOptions, FunctionType,
    NativeFunction, RuntimeError, Type, Value,
};

fn assert_evaluation(evaluator: &mut Evaluator, code: &str, expected: impl Into<Value>) {
    let expected = expected.into();
    for optimize in [true, false] {
        evaluator.set_options(EvaluatorOptions {
            optimize,
            trace: false,
        });
        let result = evaluator
            .evaluate(code)
            .unwrap_or_else(|e| panic!("{} (optimize={}): {}", code, optimize, e));
        assert_eq!(result.value, expected, "{} (optimize={})", code, optimize);
    }
}

fn evaluate(evaluator: &mut Evaluator, code: &str) -> Value {
    evaluator
        .evaluate(code)
        .unwrap_or_else(|e| panic!("{}: {}", code, e))
        .value
}

fn assert_type_check_fails(evaluator: &mut Evaluator, code: &str) {
    match evaluator.evaluate(code) {
        Err(Error::Compile(e)) if e.is_type_error() => {}
        other => panic!("expected type error for {}, got {:?}", code, other),
    }
}

fn define_square(evaluator: &mut Evaluator) {
    evaluate(evaluator, "fun square(x: Int) = x * x");
}

#[test]
fn test_literal_evaluation() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(&mut evaluator, "42", Value::Integer(42));
    assert_evaluation(&mut evaluator, "true", true);
    assert_evaluation(&mut evaluator, "\"foo\"", "foo");
}

#[test]
fn test_variable_evaluation() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Integer(123), true).unwrap();
    assert_evaluation(&mut evaluator, "x", Value::Integer(123));
}

#[test]
fn test_var_statements() {
    let mut evaluator = Evaluator::new();
    evaluate(&mut evaluator, "var x = 42");
    assert_evaluation(&mut evaluator, "x", Value::Integer(42));
}

#[test]
fn test_assignments() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Integer(42), true).unwrap();
    evaluate(&mut evaluator, "x = 123");
    assert_evaluation(&mut evaluator, "x", Value::Integer(123));
}

#[test]
fn test_arithmetic() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(&mut evaluator, "1 + 2 * 3 + 4 / 2", Value::Integer(9));
    assert_evaluation(&mut evaluator, "7 / 2", Value::Integer(3));
    assert_evaluation(&mut evaluator, "0 - 7 / 2", Value::Integer(-3));
}

#[test]
fn test_if_expressions() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Bool(true), true).unwrap();
    evaluator.bind("y", Value::Integer(42), true).unwrap();
    evaluator.bind("r", Value::Integer(0), true).unwrap();

    evaluate(&mut evaluator, "if (x) r = 123 else r = y");
    assert_evaluation(&mut evaluator, "r", Value::Integer(123));

    evaluate(&mut evaluator, "x = false");
    evaluate(&mut evaluator, "if (x) r = 123 else r = y");
    assert_evaluation(&mut evaluator, "r", Value::Integer(42));
}

#[test]
fn test_if_expression_values() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Bool(true), true).unwrap();
    assert_evaluation(&mut evaluator, "if (x) 1 else 2", Value::Integer(1));
    assert_evaluation(&mut evaluator, "if (!x) 1 else 2", Value::Integer(2));
}

#[test]
fn test_unless_expressions() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Bool(true), true).unwrap();
    evaluator.bind("y", Value::Integer(42), true).unwrap();
    evaluator.bind("r", Value::Integer(0), true).unwrap();

    evaluate(&mut evaluator, "unless (x) r = 123 else r = y");
    assert_evaluation(&mut evaluator, "r", Value::Integer(42));

    evaluate(&mut evaluator, "x = false");
    evaluate(&mut evaluator, "unless (x) r = 123 else r = y");
    assert_evaluation(&mut evaluator, "r", Value::Integer(123));
}

#[test]
fn test_unless_expression_values() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Bool(true), true).unwrap();
    assert_evaluation(&mut evaluator, "unless (x) 1 else 2", Value::Integer(2));
    assert_evaluation(&mut evaluator, "unless (!x) 1 else 2", Value::Integer(1));
}

#[test]
fn test_binary_expressions() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(&mut evaluator, "1 + 2", Value::Integer(3));
    assert_evaluation(&mut evaluator, "1 - 2", Value::Integer(-1));
    assert_evaluation(&mut evaluator, "1 == 2", false);
    assert_evaluation(&mut evaluator, "1 == 1", true);
    assert_evaluation(&mut evaluator, "1 != 2", true);
    assert_evaluation(&mut evaluator, "1 != 1", false);
}

#[test]
fn test_if_without_else() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("r", Value::Integer(0), true).unwrap();

    evaluate(&mut evaluator, "if (false) r = 1");
    assert_evaluation(&mut evaluator, "r", Value::Integer(0));
    evaluate(&mut evaluator, "if (true) r = 2");
    assert_evaluation(&mut evaluator, "r", Value::Integer(2));
    assert_evaluation(&mut evaluator, "if (r == 2) 5", Value::Unit);
}

#[test]
fn test_constant_if_with_mismatched_branches_is_unit() {
    let mut evaluator = Evaluator::new();
    for optimize in [true, false] {
        evaluator.set_options(EvaluatorOptions {
            optimize,
            trace: false,
        });
        for code in ["if (true) 42", "if (false) 1 else \"x\"", "if (true) 1 else \"x\""] {
            let result = evaluator.evaluate(code).unwrap();
            assert_eq!(result.value, Value::Unit, "{} (optimize={})", code, optimize);
            assert_eq!(result.ty, Type::Unit, "{} (optimize={})", code, optimize);
        }

        let err = evaluator
            .evaluate("fun f(): Int = if (true) 1 else \"x\"")
            .unwrap_err();
        assert_eq!(
            err.as_compile_error().map(|e| e.message.as_str()),
            Some("expected type Int, but was Unit"),
            "optimize={}",
            optimize
        );
        assert_eq!(evaluator.get("f"), None);
    }
    assert_evaluation(&mut evaluator, "if (true) 1 else 2", Value::Integer(1));
}

#[test]
fn test_while_loop() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Integer(5), true).unwrap();
    evaluator.bind("a", Value::Integer(0), true).unwrap();
    evaluator.bind("b", Value::Integer(0), true).unwrap();

    evaluate(
        &mut evaluator,
        "while (x != 0) {
             x = x - 1;
             a = a + 1;
             b = a + b
         }",
    );

    assert_evaluation(&mut evaluator, "x", Value::Integer(0));
    assert_evaluation(&mut evaluator, "a", Value::Integer(5));
    assert_evaluation(&mut evaluator, "b", Value::Integer(15));
}

#[test]
fn test_while_loop_counts_down_to_zero() {
    let mut evaluator = Evaluator::new();
    evaluator.bind("x", Value::Integer(5), true).unwrap();
    evaluate(&mut evaluator, "while (x != 0) { x = x - 1 }");
    assert_eq!(evaluator.get("x"), Some(Value::Integer(0)));
}

#[test]
fn test_not() {
    let mut evaluator = Evaluator::new();
    evaluate(&mut evaluator, "val x = true");
    assert_evaluation(&mut evaluator, "!x", false);
    assert_evaluation(&mut evaluator, "!!x", true);
}

#[test]
fn test_evaluation_failures_for_coercions() {
    let mut evaluator = Evaluator::new();
    assert_type_check_fails(&mut evaluator, "1 + \"foo\"");
    assert_type_check_fails(&mut evaluator, "!1");
    assert_type_check_fails(&mut evaluator, "true + 1");
}

#[test]
fn test_direct_calls() {
    let mut evaluator = Evaluator::new();
    define_square(&mut evaluator);
    assert_evaluation(&mut evaluator, "square(4)", Value::Integer(16));
}

#[test]
fn test_function_calls_through_local_variable() {
    let mut evaluator = Evaluator::new();
    define_square(&mut evaluator);
    evaluator.bind("result", Value::Integer(0), true).unwrap();

    evaluate(
        &mut evaluator,
        "if (true) {
             var sq = square;
             result = sq(5)
         }",
    );
    assert_evaluation(&mut evaluator, "result", Value::Integer(25));
}

#[test]
fn test_function_calls_through_expression() {
    let mut evaluator = Evaluator::new();
    define_square(&mut evaluator);
    assert_evaluation(&mut evaluator, "(square)(6)", Value::Integer(36));
}

#[test]
fn test_expression_functions() {
    let mut evaluator = Evaluator::new();
    evaluate(&mut evaluator, "fun sub(x: Int, y: Int): Int = x - y");
    assert_evaluation(&mut evaluator, "sub(7, 4)", Value::Integer(3));
}

#[test]
fn test_functions_with_locals_and_nested_calls() {
    let mut evaluator = Evaluator::new();
    define_square(&mut evaluator);
    evaluate(
        &mut evaluator,
        "fun sumOfSquares(a: Int, b: Int): Int = { val x = square(a); val y = square(b); x + y }",
    );
    evaluate(&mut evaluator, "fun zero() = 0");
    assert_evaluation(&mut evaluator, "sumOfSquares(3, 4)", Value::Integer(25));
    assert_evaluation(&mut evaluator, "sumOfSquares(square(2), zero()) + 1", Value::Integer(17));
}

#[test]
fn test_evaluation_fails_for_unbound_variables() {
    let mut evaluator = Evaluator::new();
    assert_type_check_fails(&mut evaluator, "x");
    assert_type_check_fails(&mut evaluator, "x = 4");
}

#[test]
fn test_logical_operators() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(&mut evaluator, "false || false", false);
    assert_evaluation(&mut evaluator, "false || true", true);
    assert_evaluation(&mut evaluator, "true || false", true);
    assert_evaluation(&mut evaluator, "true || true", true);

    assert_evaluation(&mut evaluator, "false && false", false);
    assert_evaluation(&mut evaluator, "false && true", false);
    assert_evaluation(&mut evaluator, "true && false", false);
    assert_evaluation(&mut evaluator, "true && true", true);
}

#[test]
fn test_logical_operators_short_circuit() {
    let mut evaluator = Evaluator::new();
    register_runtime_functions(&mut evaluator).unwrap();
    evaluate(&mut evaluator, "fun boom(): Boolean = { error(\"evaluated\"); true }");
    assert_evaluation(&mut evaluator, "false && boom()", false);
    assert_evaluation(&mut evaluator, "true || boom()", true);
}

#[test]
fn test_evaluation_fails_for_rebinding_variables() {
    let mut evaluator = Evaluator::new();
    assert_type_check_fails(&mut evaluator, "{ var x = 4; var x = 4 }");
}

#[test]
fn test_shadowing_in_nested_scope() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(
        &mut evaluator,
        "{ var x = 4; if (true) { var x = 5; x = 6 }; x }",
        Value::Integer(4),
    );
}

#[test]
fn test_plus_with_string_on_left_side_is_concatenation() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(&mut evaluator, "\"foo \" + \"bar\"", "foo bar");
    assert_evaluation(&mut evaluator, "\"foo \" + 42", "foo 42");
    assert_evaluation(&mut evaluator, "\"foo \" + true", "foo true");

    let result = evaluator.evaluate("\"foo \" + 42").unwrap();
    assert_eq!(result.ty, Type::String);
    assert_eq!(result.to_string(), "String = \"foo 42\"");
}

#[test]
fn test_relational_operators() {
    let mut evaluator = Evaluator::new();
    for (code, expected) in [
        ("1 == 1", true),
        ("1 != 1", false),
        ("1 < 1", false),
        ("1 <= 1", true),
        ("1 > 1", false),
        ("1 >= 1", true),
        ("1 == 2", false),
        ("1 != 2", true),
        ("1 < 2", true),
        ("1 <= 2", true),
        ("1 > 2", false),
        ("1 >= 2", false),
        ("\"a\" < \"b\"", true),
        ("false < true", true),
        ("true <= false", false),
    ] {
        assert_evaluation(&mut evaluator, code, expected);
    }
}

#[test]
fn test_native_function_call_with_single_parameter() {
    let mut evaluator = Evaluator::new();
    evaluator
        .bind_native(swona::runtime::fun1("inc", Type::Int, Type::Int, |value| {
            value
                .plus(&Value::Integer(1))
                .map_err(|e| RuntimeError::Failure(e.to_string()))
        }))
        .unwrap();
    assert_evaluation(&mut evaluator, "inc(4)", Value::Integer(5));
}

#[test]
fn test_native_function_call_with_multiple_parameters() {
    let mut evaluator = Evaluator::new();
    let sub = NativeFunction::new(
        "sub",
        FunctionType::new(vec![Type::Int, Type::Int], Type::Int),
        |args| match args {
            [Value::Integer(a), Value::Integer(b)] => Ok(Value::Integer(a - b)),
            _ => Err(RuntimeError::Failure("sub expects two integers".into())),
        },
    );
    evaluator.bind_native(sub).unwrap();
    assert_evaluation(&mut evaluator, "sub(7, 4)", Value::Integer(3));
}

#[test]
fn test_nested_ifs() {
    let mut evaluator = Evaluator::new();
    assert_evaluation(&mut evaluator, "if (false) 1 else if (true) 2 else 3", Value::Integer(2));
}

#[test]
fn test_recursion() {
    let mut evaluator = Evaluator::new();
    evaluate(
        &mut evaluator,
        "fun fib(i: Int): Int =
             if (i == 0)
                 0
             else if (i == 1)
                 1
             else
                 fib(i-1) + fib(i-2)",
    );

    assert_evaluation(&mut evaluator, "fib(2)", Value::Integer(1));
    assert_evaluation(&mut evaluator, "fib(10)", Value::Integer(55));
    assert_evaluation(&mut evaluator, "fib(20)", Value::Integer(6765));
}

#[test]
fn test_runtime_functions() {
    let mut evaluator = Evaluator::new();
    register_runtime_functions(&mut evaluator).unwrap();
    evaluate(&mut evaluator, "var a = stringArrayOfSize(3, \"\")");
    evaluate(&mut evaluator, "var done = false");
    evaluate(&mut evaluator, "var i = 0");
    evaluate(
        &mut evaluator,
        "while (!done) { stringArraySet(a, i, \"\" + i); i = i + 1; if (i==stringArrayLength(a)) done=true }",
    );
    assert_evaluation(&mut evaluator, "stringArrayGet(a, 0)", "0");
    assert_evaluation(&mut evaluator, "stringArrayGet(a, 1)", "1");
    assert_evaluation(&mut evaluator, "stringArrayGet(a, 2)", "2");
}

#[test]
fn test_division_by_zero_fails_at_run_time() {
    let mut evaluator = Evaluator::new();
    for optimize in [true, false] {
        evaluator.set_options(EvaluatorOptions {
            optimize,
            trace: false,
        });
        assert!(matches!(
            evaluator.evaluate("1 / 0"),
            Err(Error::Runtime(RuntimeError::DivisionByZero))
        ));
    }
}

#[test]
fn test_overflow_fails_at_run_time() {
    let mut evaluator = Evaluator::new();
    assert!(matches!(
        evaluator.evaluate("9223372036854775807 + 1"),
        Err(Error::Runtime(RuntimeError::Overflow(_)))
    ));
}

#[test]
fn test_syntax_errors() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.evaluate("1 +").unwrap_err();
    assert!(err.is_unexpected_end(), "{}", err);

    let err = evaluator.evaluate("1 $ 2").unwrap_err();
    let compile_error = err.as_compile_error().unwrap();
    assert!(compile_error.is_syntax());
    assert!(!compile_error.is_unexpected_end());
}

#[test]
fn test_function_definitions_evaluate_to_unit() {
    let mut evaluator = Evaluator::new();
    let result = evaluator.evaluate("fun id(s: String) = s").unwrap();
    assert_eq!(result.value, Value::Unit);
    assert_eq!(result.ty, Type::Unit);

    let id = evaluator.get("id").unwrap();
    assert_eq!(id.to_string(), "fun id(String): String");
}

#[test]
fn test_load_source() {
    let mut evaluator = Evaluator::new();
    evaluator
        .load_source(
            "fun double(x: Int): Int = x * 2
             fun quadruple(x: Int): Int = double(double(x))",
            "prelude.swona",
        )
        .unwrap();
    assert_evaluation(&mut evaluator, "quadruple(3)", Value::Integer(12));

    let err = evaluator.load_source("fun broken(): Int =", "broken.swona").unwrap_err();
    let location = &err.as_compile_error().unwrap().location;
    assert_eq!(&*location.file, "broken.swona");
}

#[test]
fn test_binding_names() {
    let mut evaluator = Evaluator::new();
    evaluate(&mut evaluator, "var b = 1");
    evaluate(&mut evaluator, "fun a() = 2");
    let names: Vec<String> = evaluator.binding_names().into_iter().collect();
    assert_eq!(names, vec!["a", "b"]);
}
