// Source code generation from AST
// Instrumented programs are written back to their staged copies with this, so
// generated tracer nodes get a readable `__trace_*` rendering.

use super::*;
use crate::symbolic::{AccessMode, SymbolicExpr};

/// Trait for types that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

const INDENT: &str = "    ";

fn escape_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn literal_source(literal: &Literal) -> String {
    match literal {
        Literal::Null => "null".to_string(),
        Literal::Boolean(b) => b.to_string(),
        Literal::Integer(n) => n.to_string(),
        Literal::Float(f) => format!("{f:?}"),
        Literal::String(s) => format!("\"{}\"", escape_string(s)),
    }
}

fn join_sources<T: ToSource>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_source())
        .collect::<Vec<_>>()
        .join(", ")
}

// Parenthesize a child whose operator binds looser than its parent
fn expr_source(expr: &Expr, parent_precedence: u8) -> String {
    match expr {
        Expr::Binary { op, left, right } => {
            let precedence = op.precedence();
            let source = format!(
                "{} {} {}",
                expr_source(left, precedence),
                op.symbol(),
                expr_source(right, precedence + 1)
            );
            if precedence < parent_precedence {
                format!("({source})")
            } else {
                source
            }
        }
        Expr::Unary { op, operand } => {
            let operand = expr_source(operand, 7);
            match op {
                UnaryOp::Negate => format!("-{operand}"),
                UnaryOp::Not => format!("not {operand}"),
            }
        }
        Expr::Index { object, index } => {
            format!("{}[{}]", expr_source(object, 8), index.to_source())
        }
        _ => expr.to_source(),
    }
}

impl ToSource for Literal {
    fn to_source(&self) -> String {
        literal_source(self)
    }
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        match self {
            Expr::Literal(literal) => literal_source(literal),
            Expr::Identifier(name) => name.clone(),
            Expr::List { elements } => format!("[{}]", join_sources(elements)),
            Expr::Call { function, args } => format!("{function}({})", join_sources(args)),
            Expr::Trace(node) => node.to_source(),
            Expr::Index { .. } | Expr::Binary { .. } | Expr::Unary { .. } => expr_source(self, 0),
        }
    }
}

impl ToSource for TraceNode {
    fn to_source(&self) -> String {
        match self {
            TraceNode::Read {
                symbol,
                value,
                span,
            } => format!(
                "__trace_read({}, {}, {}, {})",
                symbol.to_source(),
                value.to_source(),
                span.begin,
                span.end
            ),
            TraceNode::Write {
                source,
                target,
                value,
                span,
            } => format!(
                "__trace_write({}, {}, {}, {}, {})",
                source.to_source(),
                target.to_source(),
                value.to_source(),
                span.begin,
                span.end
            ),
            TraceNode::Carry { symbol, value } => {
                format!("__trace_carry({}, {})", symbol.to_source(), value.to_source())
            }
        }
    }
}

impl ToSource for SymbolicExpr {
    fn to_source(&self) -> String {
        match self {
            SymbolicExpr::Variable { name, mode } => match mode {
                AccessMode::Load => format!("load({name})"),
                AccessMode::Store => format!("store({name})"),
            },
            SymbolicExpr::Subscript { base, indices } => {
                format!("subscript({}, {})", base.to_source(), join_sources(indices))
            }
            SymbolicExpr::BinaryOp { op, left, right } => format!(
                "binop(\"{}\", {}, {})",
                op.symbol(),
                left.to_source(),
                right.to_source()
            ),
            SymbolicExpr::Literal(literal) => literal_source(literal),
            SymbolicExpr::Undefined => "undefined".to_string(),
        }
    }
}

fn block_source(stmts: &[Stmt], depth: usize) -> String {
    let mut result = String::from("{\n");
    for stmt in stmts {
        result.push_str(&stmt_source(stmt, depth + 1));
    }
    result.push_str(&INDENT.repeat(depth));
    result.push('}');
    result
}

fn stmt_source(stmt: &Stmt, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    match stmt {
        Stmt::Assign { target, value, .. } => {
            format!("{pad}{} = {};\n", target.to_source(), value.to_source())
        }
        Stmt::MultiAssign { targets, value, .. } => {
            let targets = targets
                .iter()
                .map(|t| t.to_source())
                .collect::<Vec<_>>()
                .join(" = ");
            format!("{pad}{targets} = {};\n", value.to_source())
        }
        Stmt::Destructure { targets, value, .. } => {
            format!("{pad}{} = {};\n", join_sources(targets), value.to_source())
        }
        Stmt::Expression { expr, .. } => format!("{pad}{};\n", expr.to_source()),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            let mut result = format!(
                "{pad}if {} {}",
                condition.to_source(),
                block_source(then_branch, depth)
            );
            if let Some(else_branch) = else_branch {
                result.push_str(" else ");
                result.push_str(&block_source(else_branch, depth));
            }
            result.push('\n');
            result
        }
        Stmt::While {
            condition, body, ..
        } => format!(
            "{pad}while {} {}\n",
            condition.to_source(),
            block_source(body, depth)
        ),
        Stmt::For {
            variable,
            iterable,
            body,
            ..
        } => format!(
            "{pad}for {variable} in {} {}\n",
            iterable.to_source(),
            block_source(body, depth)
        ),
        Stmt::FunctionDef(def) => {
            let mut result = String::new();
            if def.link.is_some() {
                result.push_str(&format!("{pad}@__trace_link\n"));
            }
            result.push_str(&format!(
                "{pad}fn {}({}) {}\n",
                def.name,
                def.params.join(", "),
                block_source(&def.body, depth)
            ));
            result
        }
        Stmt::Return { value, .. } => match value {
            Some(value) => format!("{pad}return {};\n", value.to_source()),
            None => format!("{pad}return;\n"),
        },
        Stmt::Break { .. } => format!("{pad}break;\n"),
        Stmt::Continue { .. } => format!("{pad}continue;\n"),
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        stmt_source(self, 0)
    }
}

impl ToSource for Program {
    fn to_source(&self) -> String {
        self.body.iter().map(|stmt| stmt_source(stmt, 0)).collect()
    }
}
