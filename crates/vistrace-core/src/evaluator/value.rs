use std::{cell::RefCell, fmt, rc::Rc};

use super::builtins::Builtin;
use crate::ast::{FunctionDef, Literal};

const MAX_DISPLAY_DEPTH: usize = 64;

/// Runtime value
///
/// Lists are shared by reference, so `b = a;` makes both names see the same
/// elements, matching the aliasing the reconstructor has to undo.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<FunctionDef>),
    Builtin(Builtin),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Same list object, not merely equal contents
    pub fn same_list(&self, other: &Value) -> bool {
        matches!((self, other), (Value::List(a), Value::List(b)) if Rc::ptr_eq(a, b))
    }

    /// Render into `f`, printing `[...]` for a list already being rendered
    /// further out and for anything nested deeper than `MAX_DISPLAY_DEPTH`
    fn write_at(
        &self,
        f: &mut fmt::Formatter<'_>,
        open: &mut Vec<*const RefCell<Vec<Value>>>,
        nested: bool,
    ) -> fmt::Result {
        match self {
            Value::String(s) if nested => write!(f, "{s:?}"),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items);
                if open.contains(&ptr) || open.len() >= MAX_DISPLAY_DEPTH {
                    return write!(f, "[...]");
                }
                open.push(ptr);
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.write_at(f, open, true)?;
                }
                open.pop();
                write!(f, "]")
            }
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(fl) => write!(f, "{fl:?}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Function(def) => write!(f, "<fn {}>", def.name),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name()),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Integer(n) => Value::Integer(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_at(f, &mut Vec::new(), false)
    }
}
