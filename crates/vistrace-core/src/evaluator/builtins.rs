// Built-in functions available to every script

use super::{errors::EvaluatorError, ops, value::Value};
use crate::ast::BinaryOp;

/// Names the encoder leaves unwrapped unless a program rebinds them
pub const BUILTIN_NAMES: &[&str] = &[
    "len", "range", "print", "append", "pop", "str", "int", "abs", "min", "max",
];

// Guards against `range(10**12)` style runaway allocations
const MAX_RANGE_LEN: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Range,
    Print,
    Append,
    Pop,
    Str,
    Int,
    Abs,
    Min,
    Max,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "len" => Builtin::Len,
            "range" => Builtin::Range,
            "print" => Builtin::Print,
            "append" => Builtin::Append,
            "pop" => Builtin::Pop,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Print => "print",
            Builtin::Append => "append",
            Builtin::Pop => "pop",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
        }
    }

    /// Changes its first argument, a list, in place
    pub fn mutates_argument(&self) -> bool {
        matches!(self, Builtin::Append | Builtin::Pop)
    }
}

fn expect_args(builtin: Builtin, args: &[Value], count: usize) -> Result<(), EvaluatorError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(EvaluatorError::arity(builtin.name(), count.to_string(), args.len()))
    }
}

fn expect_integer(builtin: Builtin, value: &Value) -> Result<i64, EvaluatorError> {
    value.as_integer().ok_or_else(|| {
        EvaluatorError::unary_type_error(builtin.name(), "integer", value.type_name())
    })
}

/// Invoke a built-in. `output` collects everything `print` writes.
pub fn call(
    builtin: Builtin,
    args: Vec<Value>,
    output: &mut Vec<String>,
) -> Result<Value, EvaluatorError> {
    match builtin {
        Builtin::Len => {
            expect_args(builtin, &args, 1)?;
            let len = match &args[0] {
                Value::List(items) => items.borrow().len(),
                Value::String(s) => s.chars().count(),
                other => {
                    return Err(EvaluatorError::unary_type_error(
                        "len",
                        "list or string",
                        other.type_name(),
                    ))
                }
            };
            Ok(Value::Integer(len as i64))
        }
        Builtin::Range => range(&args),
        Builtin::Print => {
            let line = args
                .iter()
                .map(|arg| arg.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            tracing::debug!(target: "vistrace_core::program", "{}", line);
            output.push(line);
            Ok(Value::Null)
        }
        Builtin::Append => {
            expect_args(builtin, &args, 2)?;
            match &args[0] {
                Value::List(items) => {
                    items.borrow_mut().push(args[1].clone());
                    Ok(Value::Null)
                }
                other => Err(EvaluatorError::unary_type_error(
                    "append",
                    "list",
                    other.type_name(),
                )),
            }
        }
        Builtin::Pop => {
            expect_args(builtin, &args, 1)?;
            match &args[0] {
                Value::List(items) => items
                    .borrow_mut()
                    .pop()
                    .ok_or_else(|| EvaluatorError::invalid_operation("pop from empty list")),
                other => Err(EvaluatorError::unary_type_error(
                    "pop",
                    "list",
                    other.type_name(),
                )),
            }
        }
        Builtin::Str => {
            expect_args(builtin, &args, 1)?;
            Ok(Value::String(args[0].to_string()))
        }
        Builtin::Int => {
            expect_args(builtin, &args, 1)?;
            match &args[0] {
                Value::Integer(n) => Ok(Value::Integer(*n)),
                Value::Float(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
                Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
                Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
                    EvaluatorError::invalid_operation(format!("cannot convert {s:?} to int"))
                }),
                other => Err(EvaluatorError::unary_type_error(
                    "int",
                    "number or string",
                    other.type_name(),
                )),
            }
        }
        Builtin::Abs => {
            expect_args(builtin, &args, 1)?;
            match &args[0] {
                Value::Integer(n) => n.checked_abs().map(Value::Integer).ok_or_else(|| {
                    EvaluatorError::invalid_operation("integer overflow in abs")
                }),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(EvaluatorError::unary_type_error(
                    "abs",
                    "number",
                    other.type_name(),
                )),
            }
        }
        Builtin::Min | Builtin::Max => extremum(builtin, args),
    }
}

fn range(args: &[Value]) -> Result<Value, EvaluatorError> {
    let (start, stop, step) = match args {
        [stop] => (0, expect_integer(Builtin::Range, stop)?, 1),
        [start, stop] => (
            expect_integer(Builtin::Range, start)?,
            expect_integer(Builtin::Range, stop)?,
            1,
        ),
        [start, stop, step] => (
            expect_integer(Builtin::Range, start)?,
            expect_integer(Builtin::Range, stop)?,
            expect_integer(Builtin::Range, step)?,
        ),
        _ => return Err(EvaluatorError::arity("range", "1 to 3", args.len())),
    };
    if step == 0 {
        return Err(EvaluatorError::invalid_operation("range step must not be zero"));
    }

    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    let len = if span <= 0 {
        0
    } else {
        (span - 1) / step.saturating_abs() + 1
    };
    if len > MAX_RANGE_LEN {
        return Err(EvaluatorError::invalid_operation(format!(
            "range of {len} elements is too large"
        )));
    }

    let items = (0..len).map(|i| Value::Integer(start + i * step)).collect();
    Ok(Value::list(items))
}

fn extremum(builtin: Builtin, args: Vec<Value>) -> Result<Value, EvaluatorError> {
    if args.is_empty() {
        return Err(EvaluatorError::arity(builtin.name(), "at least 1", 0));
    }
    let single_list = match args.as_slice() {
        [Value::List(items)] => Some(items.borrow().clone()),
        _ => None,
    };
    let mut iter = single_list.unwrap_or(args).into_iter();
    let mut best = iter.next().ok_or_else(|| {
        EvaluatorError::invalid_operation(format!("{}() of empty list", builtin.name()))
    })?;
    let replace_when = if builtin == Builtin::Min {
        BinaryOp::LessThan
    } else {
        BinaryOp::GreaterThan
    };
    for candidate in iter {
        if ops::binary(replace_when, &candidate, &best)?.is_truthy() {
            best = candidate;
        }
    }
    Ok(best)
}
