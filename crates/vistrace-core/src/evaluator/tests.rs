use pretty_assertions::assert_eq;

use super::*;
use crate::{parser::parse_program, trace::NoTrace};

fn run_source(source: &str) -> (Environment, Vec<String>) {
    let program = parse_program(source).expect("parse");
    let mut hooks = NoTrace;
    let mut evaluator = Evaluator::new(&mut hooks);
    evaluator.run(&program).expect("run");
    let output = evaluator.take_output();
    (evaluator.globals.clone(), output)
}

fn run_error(source: &str, limits: Limits) -> EvaluatorError {
    let program = parse_program(source).expect("parse");
    let mut hooks = NoTrace;
    let mut evaluator = Evaluator::new(&mut hooks).with_limits(limits);
    let err = evaluator.run(&program).unwrap_err();
    err.downcast::<EvaluatorError>().expect("evaluator error")
}

#[test]
fn test_arithmetic_and_precedence() {
    let (env, _) = run_source("a = 1 + 2 * 3;\nb = (1 + 2) * 3;\nc = 7 / 2;\nd = 7.0 / 2;\n");
    assert_eq!(env.get("a"), Some(&Value::Integer(7)));
    assert_eq!(env.get("b"), Some(&Value::Integer(9)));
    assert_eq!(env.get("c"), Some(&Value::Integer(3)));
    assert_eq!(env.get("d"), Some(&Value::Float(3.5)));
}

#[test]
fn test_floor_division_and_modulo_signs() {
    let (env, _) = run_source("a = -7 / 2;\nb = -7 % 3;\nc = 7 % -3;\nd = 6 % 3;\n");
    assert_eq!(env.get("a"), Some(&Value::Integer(-4)));
    assert_eq!(env.get("b"), Some(&Value::Integer(2)));
    assert_eq!(env.get("c"), Some(&Value::Integer(-2)));
    assert_eq!(env.get("d"), Some(&Value::Integer(0)));
}

#[test]
fn test_division_by_zero() {
    let err = run_error("a = 1 / 0;\n", Limits::default());
    assert_eq!(err, EvaluatorError::DivisionByZero);
}

#[test]
fn test_lists_share_references() {
    let (env, _) = run_source("a = [1, 2, 3];\nb = a;\nb[0] = 9;\nappend(a, 4);\n");
    let a = env.get("a").unwrap();
    assert!(a.same_list(env.get("b").unwrap()));
    assert_eq!(a.to_string(), "[9, 2, 3, 4]");
}

#[test]
fn test_functions_recursion_and_locals() {
    let source = r#"
fn fact(n) {
    if n <= 1 {
        return 1;
    }
    return n * fact(n - 1);
}
n = 10;
r = fact(5);
"#;
    let (env, _) = run_source(source);
    assert_eq!(env.get("r"), Some(&Value::Integer(120)));
    // The parameter lives in the call frame only
    assert_eq!(env.get("n"), Some(&Value::Integer(10)));
}

#[test]
fn test_functions_see_globals() {
    let (env, _) = run_source("k = 3;\nfn scale(x) {\n    return x * k;\n}\ny = scale(2);\n");
    assert_eq!(env.get("y"), Some(&Value::Integer(6)));
}

#[test]
fn test_loops_break_and_continue() {
    let source = r#"
total = 0;
for i in range(10) {
    if i % 2 == 0 {
        continue;
    }
    if i > 7 {
        break;
    }
    total = total + i;
}
n = 0;
while true {
    n = n + 1;
    if n == 4 {
        break;
    }
}
"#;
    let (env, _) = run_source(source);
    assert_eq!(env.get("total"), Some(&Value::Integer(1 + 3 + 5 + 7)));
    assert_eq!(env.get("n"), Some(&Value::Integer(4)));
    assert_eq!(env.get("i"), Some(&Value::Integer(9)));
}

#[test]
fn test_for_loop_iterates_snapshot() {
    let (env, _) = run_source("a = [1, 2];\nc = 0;\nfor x in a {\n    append(a, x);\n    c = c + 1;\n}\n");
    assert_eq!(env.get("c"), Some(&Value::Integer(2)));
    assert_eq!(env.get("a").unwrap().to_string(), "[1, 2, 1, 2]");
}

#[test]
fn test_destructure_and_multi_assign() {
    let (env, _) = run_source("a, b = [1, 2];\nc = d = a + b;\n");
    assert_eq!(env.get("b"), Some(&Value::Integer(2)));
    assert_eq!(env.get("c"), Some(&Value::Integer(3)));
    assert_eq!(env.get("d"), Some(&Value::Integer(3)));

    let err = run_error("a, b = [1];\n", Limits::default());
    assert!(matches!(err, EvaluatorError::InvalidOperation { .. }));
}

#[test]
fn test_builtins() {
    let (env, output) = run_source(
        r#"a = range(1, 7, 2);
b = len(a);
c = pop(a);
d = min(4, 2, 8);
e = max([3, 9, 1]);
f = abs(-5);
g = int("12") + int(3.9);
h = str(1) + "x";
print("a is", a, [h]);
"#,
    );
    assert_eq!(env.get("b"), Some(&Value::Integer(3)));
    assert_eq!(env.get("c"), Some(&Value::Integer(5)));
    assert_eq!(env.get("d"), Some(&Value::Integer(2)));
    assert_eq!(env.get("e"), Some(&Value::Integer(9)));
    assert_eq!(env.get("f"), Some(&Value::Integer(5)));
    assert_eq!(env.get("g"), Some(&Value::Integer(15)));
    assert_eq!(output, vec!["a is [1, 3] [\"1x\"]".to_string()]);
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let (env, _) = run_source("a = false and missing;\nb = true or missing;\n");
    assert_eq!(env.get("a"), Some(&Value::Boolean(false)));
    assert_eq!(env.get("b"), Some(&Value::Boolean(true)));
}

#[test]
fn test_runtime_errors() {
    assert_eq!(
        run_error("print(x);\n", Limits::default()),
        EvaluatorError::variable_not_found("x")
    );
    assert_eq!(
        run_error("a = [1];\nb = a[3];\n", Limits::default()),
        EvaluatorError::IndexOutOfRange { index: 3, len: 1 }
    );
    assert!(matches!(
        run_error("a = 1 + \"x\";\n", Limits::default()),
        EvaluatorError::BinaryTypeError { .. }
    ));
    assert!(matches!(
        run_error("fn f(a) {\n    return a;\n}\nf(1, 2);\n", Limits::default()),
        EvaluatorError::ArityMismatch { actual: 2, .. }
    ));
    assert!(matches!(
        run_error("a = 1;\na(2);\n", Limits::default()),
        EvaluatorError::NotCallable { .. }
    ));
    assert!(matches!(
        run_error("a = 9223372036854775807 + 1;\n", Limits::default()),
        EvaluatorError::InvalidOperation { .. }
    ));
}

#[test]
fn test_step_limit_stops_infinite_loop() {
    let limits = Limits {
        max_steps: 500,
        ..Limits::default()
    };
    let err = run_error("while true {\n    x = 1;\n}\n", limits);
    assert_eq!(err, EvaluatorError::StepLimitExceeded { limit: 500 });
    assert!(err.is_limit());
}

#[test]
fn test_call_depth_limit() {
    let limits = Limits {
        max_call_depth: 16,
        ..Limits::default()
    };
    let err = run_error("fn f(n) {\n    return f(n + 1);\n}\nf(0);\n", limits);
    assert_eq!(err, EvaluatorError::CallDepthExceeded { limit: 16 });
}

#[test]
fn test_current_line_tracks_failing_statement() {
    let program = parse_program("a = 1;\nb = 2;\nc = a / 0;\n").unwrap();
    let mut hooks = NoTrace;
    let mut evaluator = Evaluator::new(&mut hooks);
    assert!(evaluator.run(&program).is_err());
    assert_eq!(evaluator.current_line(), 3);
}

#[test]
fn test_trace_nodes_are_transparent_without_tracer() {
    let program = parse_program("a = [1, 2];\nfn f(x) {\n    return x[0];\n}\nb = f(a);\n").unwrap();
    let context = crate::instrument::TransformationContext::for_programs([&program])
        .with_observed(["a", "b"]);
    let instrumented = crate::instrument::Instrumenter::new()
        .instrument(program, &context)
        .unwrap();

    let mut hooks = NoTrace;
    let mut evaluator = Evaluator::new(&mut hooks);
    evaluator.run(&instrumented).unwrap();
    assert_eq!(evaluator.global("b"), Some(&Value::Integer(1)));
}

#[test]
fn test_globals_persist_across_programs() {
    let first = parse_program("fn double(x) {\n    return x * 2;\n}\n").unwrap();
    let second = parse_program("y = double(21);\n").unwrap();
    let mut hooks = NoTrace;
    let mut evaluator = Evaluator::new(&mut hooks);
    evaluator.run(&first).unwrap();
    evaluator.run(&second).unwrap();
    assert_eq!(evaluator.global("y"), Some(&Value::Integer(42)));
}

#[test]
fn test_cyclic_lists_print_and_compare() {
    let (env, output) = run_source(
        "a = [1];\nb = [a];\nappend(a, b);\nprint(a);\ns = str(b);\nsame = a == a;\n",
    );
    assert_eq!(output, vec!["[1, [[...]]]".to_string()]);
    assert_eq!(env.get("s"), Some(&Value::string("[[1, [...]]]")));
    assert_eq!(env.get("same"), Some(&Value::Boolean(true)));

    let err = run_error(
        "a = [1];\nappend(a, a);\nc = [1];\nappend(c, c);\nd = a == c;\n",
        Limits::default(),
    );
    assert!(matches!(err, EvaluatorError::InvalidOperation { .. }));
}
