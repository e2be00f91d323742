// Tests for source code generation

use pretty_assertions::assert_eq;

use super::*;
use crate::parser::parse_program;

fn round_trip(source: &str) -> String {
    parse_program(source).expect("parse").to_source()
}

#[test]
fn test_statements_regenerate_verbatim() {
    let source = "x = 1;\ny = [1, 2.5, \"a\\\"b\"];\nz = x[0][1];\nprint(x, y);\n";
    assert_eq!(round_trip(source), source);
}

#[test]
fn test_parentheses_follow_precedence() {
    assert_eq!(round_trip("x = (1 + 2) * 3;\n"), "x = (1 + 2) * 3;\n");
    assert_eq!(round_trip("x = 1 + 2 * 3;\n"), "x = 1 + 2 * 3;\n");
    assert_eq!(round_trip("x = a - (b - c);\n"), "x = a - (b - c);\n");
    assert_eq!(round_trip("x = -(a + 1);\n"), "x = -(a + 1);\n");
    assert_eq!(round_trip("x = not (a and b);\n"), "x = not (a and b);\n");
}

#[test]
fn test_blocks_are_indented() {
    let source = "fn f(a, b) {\n    if a < b {\n        return a;\n    } else {\n        return b;\n    }\n}\n";
    assert_eq!(round_trip(source), source);
}

#[test]
fn test_loops_regenerate() {
    let source = "for i in range(3) {\n    continue;\n}\nwhile true {\n    break;\n}\n";
    assert_eq!(round_trip(source), source);
}

#[test]
fn test_regenerated_source_parses_to_same_tree() {
    let source = "a, b = [1, 2];\nc = d = a % 2;\nif not a == b or c {\n    print(-a);\n}\n";
    let program = parse_program(source).unwrap();
    let reparsed = parse_program(&program.to_source()).unwrap();
    assert_eq!(
        reparsed.body.iter().map(Stmt::to_source).collect::<Vec<_>>(),
        program.body.iter().map(Stmt::to_source).collect::<Vec<_>>()
    );
}

#[test]
fn test_trace_nodes_render_with_reserved_prefix() {
    let node = Expr::Trace(TraceNode::Read {
        symbol: SymbolicExpr::Subscript {
            base: Box::new(SymbolicExpr::load("m")),
            indices: vec![SymbolicExpr::BinaryOp {
                op: BinaryOp::Add,
                left: Box::new(SymbolicExpr::load("i")),
                right: Box::new(SymbolicExpr::Literal(Literal::Integer(1))),
            }],
        },
        value: Box::new(Expr::index(
            Expr::identifier("m"),
            Expr::binary(BinaryOp::Add, Expr::identifier("i"), Expr::integer(1)),
        )),
        span: LineSpan::new(3, 4),
    });

    assert_eq!(
        node.to_source(),
        "__trace_read(subscript(load(m), binop(\"+\", load(i), 1)), m[i + 1], 3, 4)"
    );
}
