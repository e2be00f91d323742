// Unified AST for Vistrace scripts
// Produced by the parser, rewritten by the instrumentation passes and executed
// by the evaluator. Generated tracer nodes live in the same tree so that every
// consumer can recognise them by their variant instead of by shape.

pub mod source_gen;
pub use source_gen::ToSource;

#[cfg(test)]
mod source_gen_tests;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::symbolic::SymbolicExpr;

/// Inclusive range of source lines covered by a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineSpan {
    pub begin: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(begin: usize, end: usize) -> Self {
        Self {
            begin: begin.min(end),
            end: begin.max(end),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    /// Smallest span covering both spans
    pub fn merge(self, other: LineSpan) -> Self {
        Self {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::LessThan
            | BinaryOp::LessEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterEqual => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    List {
        elements: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    /// Generated by instrumentation, never produced by the parser
    Trace(TraceNode),
}

/// Tracer call injected into the tree.
///
/// Each node keeps the original sub-expression in `value`; the evaluator runs
/// it exactly once and hands the result to the tracer runtime, which passes it
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceNode {
    Read {
        symbol: SymbolicExpr,
        value: Box<Expr>,
        span: LineSpan,
    },
    Write {
        source: SymbolicExpr,
        target: SymbolicExpr,
        value: Box<Expr>,
        span: LineSpan,
    },
    /// Call-site argument carrying its encoded shape to a linked function
    Carry {
        symbol: SymbolicExpr,
        value: Box<Expr>,
    },
}

impl TraceNode {
    /// The original expression wrapped by this node
    pub fn value(&self) -> &Expr {
        match self {
            TraceNode::Read { value, .. }
            | TraceNode::Write { value, .. }
            | TraceNode::Carry { value, .. } => value,
        }
    }
}

/// Interception point attached to a function definition by the link pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPoint {
    pub span: LineSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub link: Option<LinkPoint>,
    pub span: LineSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `target = value;`
    Assign {
        target: Expr,
        value: Expr,
        span: LineSpan,
    },
    /// `a = b = value;`
    MultiAssign {
        targets: Vec<Expr>,
        value: Expr,
        span: LineSpan,
    },
    /// `a, b = value;`
    Destructure {
        targets: Vec<Expr>,
        value: Expr,
        span: LineSpan,
    },
    Expression {
        expr: Expr,
        span: LineSpan,
    },
    // Compound statements carry the span of their header only
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        span: LineSpan,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        span: LineSpan,
    },
    For {
        variable: String,
        iterable: Expr,
        body: Vec<Stmt>,
        span: LineSpan,
    },
    FunctionDef(FunctionDef),
    Return {
        value: Option<Expr>,
        span: LineSpan,
    },
    Break {
        span: LineSpan,
    },
    Continue {
        span: LineSpan,
    },
}

impl Stmt {
    pub fn span(&self) -> LineSpan {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::MultiAssign { span, .. }
            | Stmt::Destructure { span, .. }
            | Stmt::Expression { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span } => *span,
            Stmt::FunctionDef(def) => def.span,
        }
    }
}

/// A parsed script file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }

    /// Names of all functions defined anywhere in this program
    pub fn function_names(&self) -> Vec<String> {
        fn collect(stmts: &[Stmt], names: &mut Vec<String>) {
            for stmt in stmts {
                match stmt {
                    Stmt::FunctionDef(def) => {
                        names.push(def.name.clone());
                        collect(&def.body, names);
                    }
                    Stmt::If {
                        then_branch,
                        else_branch,
                        ..
                    } => {
                        collect(then_branch, names);
                        if let Some(else_branch) = else_branch {
                            collect(else_branch, names);
                        }
                    }
                    Stmt::While { body, .. } | Stmt::For { body, .. } => collect(body, names),
                    _ => {}
                }
            }
        }

        let mut names = Vec::new();
        collect(&self.body, &mut names);
        names
    }

    /// Every name this program binds: assignment targets, loop variables,
    /// parameters and function names
    pub fn bound_names(&self) -> Vec<String> {
        fn bind_target(target: &Expr, names: &mut Vec<String>) {
            if let Expr::Identifier(name) = target {
                names.push(name.clone());
            }
        }

        fn collect(stmts: &[Stmt], names: &mut Vec<String>) {
            for stmt in stmts {
                match stmt {
                    Stmt::Assign { target, .. } => bind_target(target, names),
                    Stmt::MultiAssign { targets, .. } | Stmt::Destructure { targets, .. } => {
                        targets.iter().for_each(|t| bind_target(t, names));
                    }
                    Stmt::For { variable, body, .. } => {
                        names.push(variable.clone());
                        collect(body, names);
                    }
                    Stmt::While { body, .. } => collect(body, names),
                    Stmt::If {
                        then_branch,
                        else_branch,
                        ..
                    } => {
                        collect(then_branch, names);
                        if let Some(else_branch) = else_branch {
                            collect(else_branch, names);
                        }
                    }
                    Stmt::FunctionDef(def) => {
                        names.push(def.name.clone());
                        names.extend(def.params.iter().cloned());
                        collect(&def.body, names);
                    }
                    _ => {}
                }
            }
        }

        let mut names = Vec::new();
        collect(&self.body, &mut names);
        names
    }
}

// Helper methods
impl Expr {
    pub fn identifier(name: &str) -> Self {
        Expr::Identifier(name.to_string())
    }

    pub fn integer(n: i64) -> Self {
        Expr::Literal(Literal::Integer(n))
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Whether this node was generated by instrumentation
    pub fn is_trace(&self) -> bool {
        matches!(self, Expr::Trace(_))
    }

    /// Plain identifiers and index chains may appear on the left of `=`
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Identifier(_) | Expr::Index { .. })
    }

    /// Variable at the root of an identifier or index chain
    pub fn root_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier(name) => Some(name),
            Expr::Index { object, .. } => object.root_identifier(),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Float(fl) => write!(f, "{fl:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_source())
    }
}
