use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};

use vistrace_core::{
    evaluator::Evaluator,
    instrument::{Instrumenter, TransformationContext},
    parse_program,
    reconstruct::{reconstruct, EntryKind, Reconstruction, TraceEntry},
    trace::{snapshot, Location, MemorySink, NoTrace, OperationKind, TraceContext},
    Value,
};

/// Instrument `source`, run it with a tracer watching `observed` and replay
/// the records. Also returns the listed globals from the traced run.
fn trace(source: &str, observed: &[&str], globals: &[&str]) -> (Reconstruction, Vec<Option<Value>>) {
    let program = parse_program(source).expect("parse");
    let context = TransformationContext::for_programs([&program]).with_observed(observed.iter().copied());
    let instrumented = Instrumenter::new()
        .instrument(program, &context)
        .expect("instrument");

    let mut tracer = TraceContext::new(observed.iter().copied(), MemorySink::new());
    let values = {
        let mut evaluator = Evaluator::new(&mut tracer);
        evaluator.run(&instrumented).expect("run");
        globals
            .iter()
            .map(|name| evaluator.global(name).cloned())
            .collect()
    };
    let (sink, _) = tracer.finish();
    (reconstruct(sink.records(), observed.iter().copied()), values)
}

/// Run `source` without instrumentation
fn run_plain(source: &str, globals: &[&str]) -> Vec<Option<Value>> {
    let program = parse_program(source).expect("parse");
    let mut hooks = NoTrace;
    let mut evaluator = Evaluator::new(&mut hooks);
    evaluator.run(&program).expect("run");
    globals
        .iter()
        .map(|name| evaluator.global(name).cloned())
        .collect()
}

fn kinds(entries: &[TraceEntry]) -> Vec<EntryKind> {
    entries.iter().map(|entry| entry.operation).collect()
}

#[test]
fn test_scenario_a_init_then_write() {
    let (result, _) = trace("a = 1;\na = a + 1;\n", &["a"], &[]);

    assert_eq!(
        result.entries,
        vec![
            TraceEntry::init(None, Location::variable("a"), json!(1), 1, 1),
            TraceEntry::write(None, Location::variable("a"), json!(2), 2, 2),
        ]
    );
}

#[test]
fn test_scenario_b_element_write() {
    let (result, _) = trace("b = [1, 2, 3];\nb[0] = 9;\n", &["b"], &[]);

    assert_eq!(
        result.entries,
        vec![
            TraceEntry::init(None, Location::variable("b"), json!([1, 2, 3]), 1, 1),
            TraceEntry::write(None, Location::indexed("b", vec![0]), json!(9), 2, 2),
        ]
    );
    assert_eq!(result.final_state["b"], json!([9, 2, 3]));
}

#[test]
fn test_scenario_c_parameter_write_attributed_to_argument() {
    let source = "fn inc(x) {\n    x = x + 1;\n}\na = 1;\ninc(a);\n";
    let (result, _) = trace(source, &["a"], &[]);

    assert_eq!(kinds(&result.entries), vec![EntryKind::Init, EntryKind::Write]);
    let write = &result.entries[1];
    assert_eq!(write.operation_body.target, Some(Location::variable("a")));
    assert_eq!(write.operation_body.value, json!(2));
    assert_eq!(write.begin_line, 2);
    assert_eq!(result.stats.links, 1);
}

#[test]
fn test_scenario_d_nothing_observed() {
    let (result, _) = trace("c = 5;\n", &[], &[]);
    assert!(result.entries.is_empty());
}

#[test]
fn test_scenario_e_single_read_leaves_behavior_unchanged() {
    let source = "a = 3;\nc = 0;\nif a > 2 {\n    c = 1;\n}\n";
    let (result, traced) = trace(source, &["a"], &["c"]);

    let reads: Vec<_> = result
        .entries
        .iter()
        .filter(|entry| entry.operation == EntryKind::Read)
        .collect();
    assert_eq!(reads.len(), 1);
    assert_eq!(
        *reads[0],
        TraceEntry::read(Location::variable("a"), json!(3), 3, 3)
    );
    assert_eq!(traced, run_plain(source, &["c"]));
}

#[test]
fn test_replayed_writes_reproduce_final_state() {
    let source = r#"
a = [0, 0, 0];
for i in range(3) {
    a[i] = i * i;
}
b = 7;
b = b + 1;
m = [[0, 0], [0, 0]];
m[1][0] = a[2];
"#;
    let names = ["a", "b", "m"];
    let (result, _) = trace(source, &names, &[]);

    let expected: Vec<JsonValue> = run_plain(source, &names)
        .iter()
        .map(|value| snapshot(value.as_ref().unwrap()).unwrap())
        .collect();
    let replayed: Vec<JsonValue> = names
        .iter()
        .map(|name| result.final_state[*name].clone())
        .collect();
    assert_eq!(replayed, expected);
}

#[test]
fn test_first_write_per_identifier_is_init() {
    let source = "x = 1;\ny = 2;\nx = 3;\ny = x;\nx = 4;\n";
    let (result, _) = trace(source, &["x", "y"], &[]);

    assert_eq!(
        kinds(&result.entries),
        vec![
            EntryKind::Init,
            EntryKind::Init,
            EntryKind::Write,
            EntryKind::Write,
            EntryKind::Write
        ]
    );
    assert_eq!(
        result.entries[3].operation_body.source,
        Some(Location::variable("x"))
    );
}

#[test]
fn test_nested_call_writes_resolve_through_alias_chain() {
    let source = r#"
fn set(cells, v) {
    cells[0] = v;
}
fn fill(row) {
    set(row, 5);
}
m = [[0, 0], [0, 0]];
fill(m[1]);
"#;
    let (result, traced) = trace(source, &["m"], &["m"]);

    let last = result.entries.last().unwrap();
    assert_eq!(last.operation, EntryKind::Write);
    assert_eq!(
        last.operation_body.target,
        Some(Location::indexed("m", vec![1, 0]))
    );
    assert_eq!(
        result.final_state["m"],
        snapshot(traced[0].as_ref().unwrap()).unwrap()
    );
}

#[test]
fn test_unobserved_operations_are_filtered() {
    let source = "a = 1;\nc = 2;\nc = a;\nd = c;\nprint(c, d);\n";
    let (result, _) = trace(source, &["a"], &[]);

    for entry in &result.entries {
        let body = &entry.operation_body;
        let touches_a = [&body.source, &body.target]
            .into_iter()
            .flatten()
            .any(|location| location.identifier == "a");
        assert!(touches_a, "unexpected entry {entry:?}");
    }
    assert_eq!(result.entries.len(), 2);
}

#[test]
fn test_loop_variable_and_read_records() {
    let source = "total = 0;\nfor v in [4, 5] {\n    total = total + v;\n}\nprint(total);\n";
    let (result, _) = trace(source, &["v", "total"], &[]);

    let v_writes: Vec<_> = result
        .entries
        .iter()
        .filter(|entry| {
            entry.operation_body.target.as_ref().map(|t| t.identifier.as_str()) == Some("v")
        })
        .map(|entry| entry.operation_body.value.clone())
        .collect();
    assert_eq!(v_writes, vec![json!(4), json!(5)]);

    let last = result.entries.last().unwrap();
    assert_eq!(
        *last,
        TraceEntry::read(Location::variable("total"), json!(9), 5, 5)
    );
}

#[test]
fn test_tracer_records_are_raw_operations() {
    let program = parse_program("fn f(x) {\n    return x;\n}\na = 2;\nb = f(a);\n").unwrap();
    let context = TransformationContext::for_programs([&program]).with_observed(["a"]);
    let instrumented = Instrumenter::new().instrument(program, &context).unwrap();

    let mut tracer = TraceContext::new(["a"], MemorySink::new());
    Evaluator::new(&mut tracer).run(&instrumented).unwrap();
    assert!(tracer.is_observed("x"));
    let (sink, stats) = tracer.finish();

    let kinds: Vec<_> = sink.records().iter().map(|record| record.kind).collect();
    assert_eq!(
        kinds,
        vec![OperationKind::Write, OperationKind::Link, OperationKind::Read]
    );
    assert_eq!(stats.records, 3);
    assert_eq!(stats.unresolved, 0);
}

#[test]
fn test_arithmetic_source_reads_observed_operand() {
    let (result, _) = trace("a = 3;\nb = a * 2;\n", &["a"], &[]);

    assert_eq!(
        result.entries,
        vec![
            TraceEntry::init(None, Location::variable("a"), json!(3), 1, 1),
            TraceEntry::read(Location::variable("a"), json!(3), 2, 2),
        ]
    );
}

#[test]
fn test_builtin_mutation_keeps_shadow_in_step() {
    let source = "b = [1, 2, 3];\nappend(b, 4);\nb[3] = 9;\nx = pop(b);\n";
    let (result, traced) = trace(source, &["b"], &["b"]);

    assert_eq!(
        kinds(&result.entries),
        vec![
            EntryKind::Init,
            EntryKind::Read,
            EntryKind::Write,
            EntryKind::Write,
            EntryKind::Write,
        ]
    );
    assert_eq!(
        result.entries[3],
        TraceEntry::write(None, Location::indexed("b", vec![3]), json!(9), 3, 3)
    );
    assert_eq!(result.stats.invalid_paths, 0);
    assert_eq!(
        result.final_state["b"],
        snapshot(traced[0].as_ref().unwrap()).unwrap()
    );
    // `pop` inside an assignment is reported on the statement's line
    assert_eq!(result.entries[4].begin_line, 4);
    assert_eq!(result.final_state["b"], json!([1, 2, 3]));
}

#[test]
fn test_observed_parameter_with_unobserved_argument() {
    let source = "fn fill(arr) {\n    arr[0] = 5;\n    arr[1] = 6;\n}\ndata = [0, 0];\nfill(data);\n";
    let (result, _) = trace(source, &["arr"], &[]);

    assert_eq!(
        kinds(&result.entries),
        vec![EntryKind::Init, EntryKind::Write, EntryKind::Write]
    );
    assert_eq!(
        result.entries[0],
        TraceEntry::init(
            Some(Location::variable("data")),
            Location::variable("arr"),
            json!([0, 0]),
            1,
            1
        )
    );
    assert_eq!(result.final_state["arr"], json!([5, 6]));
}

// Aliases are name-based and outlive the call: a later global with the
// parameter's name is still attributed to the argument.
#[test]
fn test_alias_persists_after_call_returns() {
    let source = "fn inc(x) {\n    x = x + 1;\n}\na = 1;\ninc(a);\nx = 10;\n";
    let (result, traced) = trace(source, &["a"], &["a"]);

    let last = result.entries.last().unwrap();
    assert_eq!(
        *last,
        TraceEntry::write(None, Location::variable("a"), json!(10), 6, 6)
    );
    assert_eq!(result.final_state["a"], json!(10));
    assert_eq!(traced[0], Some(Value::Integer(2)));
}
