//! Symbolic expressions
//!
//! A symbolic expression captures the *shape* of a source expression (root
//! identifier plus index path) at instrumentation time, independent of the
//! value it will have when the program runs. The tracer runtime resolves it
//! against the live scope to produce concrete locations for the log.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Expr, Literal};
use crate::evaluator::builtins::BUILTIN_NAMES;


/// Whether a variable appears in read or assignment-target position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Load,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolicExpr {
    Variable {
        name: String,
        mode: AccessMode,
    },
    /// Flattened index chain: `m[i][j]` has one base and two indices
    Subscript {
        base: Box<SymbolicExpr>,
        indices: Vec<SymbolicExpr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<SymbolicExpr>,
        right: Box<SymbolicExpr>,
    },
    Literal(Literal),
    Undefined,
}

impl SymbolicExpr {
    pub fn load(name: &str) -> Self {
        SymbolicExpr::Variable {
            name: name.to_string(),
            mode: AccessMode::Load,
        }
    }

    pub fn store(name: &str) -> Self {
        SymbolicExpr::Variable {
            name: name.to_string(),
            mode: AccessMode::Store,
        }
    }

    /// Root variable of a variable or subscript chain
    pub fn root_identifier(&self) -> Option<&str> {
        match self {
            SymbolicExpr::Variable { name, .. } => Some(name),
            SymbolicExpr::Subscript { base, .. } => base.root_identifier(),
            _ => None,
        }
    }

    /// Names a storage location rather than a computed value
    pub fn is_location(&self) -> bool {
        self.root_identifier().is_some()
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, SymbolicExpr::Undefined)
    }

    /// Variables and index chains this expression reads, left to right. The
    /// indices of a chain are not descended into.
    pub fn variables(&self) -> Vec<&SymbolicExpr> {
        match self {
            SymbolicExpr::Variable { .. } | SymbolicExpr::Subscript { .. } => vec![self],
            SymbolicExpr::BinaryOp { left, right, .. } => {
                let mut found = left.variables();
                found.extend(right.variables());
                found
            }
            SymbolicExpr::Literal(_) | SymbolicExpr::Undefined => Vec::new(),
        }
    }

    /// True when this is exactly the bare variable `name`
    pub fn is_variable_named(&self, name: &str) -> bool {
        matches!(self, SymbolicExpr::Variable { name: n, .. } if n == name)
    }
}

/// Encodes source expressions into symbolic expressions.
///
/// Built-in names are passed through (encoded as `Undefined`) unless the
/// program rebinds them, in which case they are ordinary variables.
#[derive(Debug, Clone)]
pub struct Encoder {
    passthrough: BTreeSet<String>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            passthrough: BUILTIN_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat these names as variables even when they collide with a built-in
    pub fn shadowing<I, S>(mut self, bound: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in bound {
            self.passthrough.remove(name.as_ref());
        }
        self
    }

    /// Whether `name` refers to a built-in that must be left unwrapped
    pub fn is_passthrough(&self, name: &str) -> bool {
        self.passthrough.contains(name)
    }

    /// Encode an expression in read position
    pub fn load(&self, expr: &Expr) -> SymbolicExpr {
        self.encode(expr, AccessMode::Load)
    }

    /// Encode an assignment target
    ///
    /// Only a bare identifier is tagged as a store; the root of an index chain
    /// is read before the element is written.
    pub fn store(&self, expr: &Expr) -> SymbolicExpr {
        self.encode(expr, AccessMode::Store)
    }

    fn encode(&self, expr: &Expr, mode: AccessMode) -> SymbolicExpr {
        match expr {
            Expr::Identifier(name) if self.is_passthrough(name) => SymbolicExpr::Undefined,
            Expr::Identifier(name) => SymbolicExpr::Variable {
                name: name.clone(),
                mode,
            },
            Expr::Literal(literal) => SymbolicExpr::Literal(literal.clone()),
            Expr::Index { object, index } => {
                let index = self.encode(index, AccessMode::Load);
                match self.encode(object, AccessMode::Load) {
                    SymbolicExpr::Subscript { base, mut indices } => {
                        indices.push(index);
                        SymbolicExpr::Subscript { base, indices }
                    }
                    base @ SymbolicExpr::Variable { .. } => SymbolicExpr::Subscript {
                        base: Box::new(base),
                        indices: vec![index],
                    },
                    // Indexing a computed value has no storage root
                    _ => SymbolicExpr::Subscript {
                        base: Box::new(SymbolicExpr::Undefined),
                        indices: vec![index],
                    },
                }
            }
            Expr::Binary { op, left, right } => SymbolicExpr::BinaryOp {
                op: *op,
                left: Box::new(self.encode(left, AccessMode::Load)),
                right: Box::new(self.encode(right, AccessMode::Load)),
            },
            Expr::Trace(node) => self.encode(node.value(), mode),
            Expr::Unary { .. } | Expr::Call { .. } | Expr::List { .. } => SymbolicExpr::Undefined,
        }
    }
}

/// Encode an expression in read position with the default encoder
pub fn encode_load(expr: &Expr) -> SymbolicExpr {
    Encoder::default().load(expr)
}

/// Encode an assignment target with the default encoder
pub fn encode_store(expr: &Expr) -> SymbolicExpr {
    Encoder::default().store(expr)
}
