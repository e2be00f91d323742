// Operator semantics shared by the evaluator and the tracer's symbolic resolver

use std::cmp::Ordering;

use super::{errors::EvaluatorError, value::Value};
use crate::ast::BinaryOp;

const MAX_COMPARE_DEPTH: usize = 64;

/// Apply a binary operator to two evaluated operands.
///
/// `and`/`or` are applied eagerly here; the evaluator short-circuits them
/// before both operands are evaluated.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvaluatorError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Subtract => numeric(left, right, "subtraction", i64::checked_sub, |a, b| a - b),
        BinaryOp::Multiply => {
            numeric(left, right, "multiplication", i64::checked_mul, |a, b| a * b)
        }
        BinaryOp::Divide => divide(left, right),
        BinaryOp::Modulo => modulo(left, right),
        BinaryOp::Equal => values_equal(left, right).map(Value::Boolean),
        BinaryOp::NotEqual => values_equal(left, right).map(|equal| Value::Boolean(!equal)),
        BinaryOp::LessThan => compare(left, right, "<").map(|o| Value::Boolean(o.is_lt())),
        BinaryOp::LessEqual => compare(left, right, "<=").map(|o| Value::Boolean(o.is_le())),
        BinaryOp::GreaterThan => compare(left, right, ">").map(|o| Value::Boolean(o.is_gt())),
        BinaryOp::GreaterEqual => compare(left, right, ">=").map(|o| Value::Boolean(o.is_ge())),
        BinaryOp::And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
    }
}

fn overflow(operation: &str) -> EvaluatorError {
    EvaluatorError::invalid_operation(format!("integer overflow in {operation}"))
}

fn add(left: &Value, right: &Value) -> Result<Value, EvaluatorError> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
        (Value::List(l), Value::List(r)) => {
            let mut items = l.borrow().clone();
            items.extend(r.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        _ => numeric(left, right, "addition", i64::checked_add, |a, b| a + b),
    }
}

fn numeric(
    left: &Value,
    right: &Value,
    operation: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvaluatorError> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => int_op(*l, *r)
            .map(Value::Integer)
            .ok_or_else(|| overflow(operation)),
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(float_op(*l, *r))),
        (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(float_op(*l as f64, *r))),
        (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(float_op(*l, *r as f64))),
        _ => Err(EvaluatorError::binary_type_error(
            operation,
            left.type_name(),
            right.type_name(),
        )),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

// Integer division rounds toward negative infinity
fn divide(left: &Value, right: &Value) -> Result<Value, EvaluatorError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(EvaluatorError::DivisionByZero),
        (Value::Integer(l), Value::Integer(r)) => {
            let quotient = l.checked_div(*r).ok_or_else(|| overflow("division"))?;
            if l % r != 0 && ((*l < 0) != (*r < 0)) {
                Ok(Value::Integer(quotient - 1))
            } else {
                Ok(Value::Integer(quotient))
            }
        }
        _ => match (as_float(left), as_float(right)) {
            (Some(_), Some(r)) if r == 0.0 => Err(EvaluatorError::DivisionByZero),
            (Some(l), Some(r)) => Ok(Value::Float(l / r)),
            _ => Err(EvaluatorError::binary_type_error(
                "division",
                left.type_name(),
                right.type_name(),
            )),
        },
    }
}

// Result takes the sign of the divisor
fn modulo(left: &Value, right: &Value) -> Result<Value, EvaluatorError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(EvaluatorError::DivisionByZero),
        (Value::Integer(l), Value::Integer(r)) => {
            let rem = l.checked_rem(*r).ok_or_else(|| overflow("modulo"))?;
            if rem != 0 && ((rem < 0) != (*r < 0)) {
                Ok(Value::Integer(rem + r))
            } else {
                Ok(Value::Integer(rem))
            }
        }
        _ => match (as_float(left), as_float(right)) {
            (Some(_), Some(r)) if r == 0.0 => Err(EvaluatorError::DivisionByZero),
            (Some(l), Some(r)) => Ok(Value::Float(l - r * (l / r).floor())),
            _ => Err(EvaluatorError::binary_type_error(
                "modulo",
                left.type_name(),
                right.type_name(),
            )),
        },
    }
}

/// Structural equality with integer/float promotion. Lists nested deeper
/// than `MAX_COMPARE_DEPTH`, such as two distinct cyclic lists, are an error.
pub fn values_equal(left: &Value, right: &Value) -> Result<bool, EvaluatorError> {
    equal_at(left, right, 0)
}

fn equal_at(left: &Value, right: &Value, depth: usize) -> Result<bool, EvaluatorError> {
    match (left, right) {
        (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
            Ok(as_float(left) == as_float(right))
        }
        (Value::List(l), Value::List(r)) => {
            if left.same_list(right) {
                return Ok(true);
            }
            if depth >= MAX_COMPARE_DEPTH {
                return Err(EvaluatorError::invalid_operation(format!(
                    "cannot compare lists nested deeper than {MAX_COMPARE_DEPTH} levels"
                )));
            }
            let (l, r) = (l.borrow(), r.borrow());
            if l.len() != r.len() {
                return Ok(false);
            }
            for (a, b) in l.iter().zip(r.iter()) {
                if !equal_at(a, b, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::List(_), _) | (_, Value::List(_)) => Ok(false),
        _ => Ok(left == right),
    }
}

fn compare(left: &Value, right: &Value, symbol: &str) -> Result<Ordering, EvaluatorError> {
    let ordering = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => match (as_float(left), as_float(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        EvaluatorError::binary_type_error(
            &format!("compare ({symbol})"),
            left.type_name(),
            right.type_name(),
        )
    })
}

pub fn negate(value: &Value) -> Result<Value, EvaluatorError> {
    match value {
        Value::Integer(n) => n
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| overflow("negation")),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(EvaluatorError::unary_type_error(
            "negation",
            "number",
            other.type_name(),
        )),
    }
}

/// Element `index` of a list or string
pub fn index(object: &Value, index: &Value) -> Result<Value, EvaluatorError> {
    let Value::Integer(i) = index else {
        return Err(EvaluatorError::unary_type_error(
            "indexing",
            "integer index",
            index.type_name(),
        ));
    };
    match object {
        Value::List(items) => {
            let items = items.borrow();
            checked_position(*i, items.len()).map(|pos| items[pos].clone())
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            checked_position(*i, chars.len()).map(|pos| Value::String(chars[pos].to_string()))
        }
        other => Err(EvaluatorError::unary_type_error(
            "indexing",
            "list or string",
            other.type_name(),
        )),
    }
}

/// Validate a zero-based index against a length
pub fn checked_position(index: i64, len: usize) -> Result<usize, EvaluatorError> {
    usize::try_from(index)
        .ok()
        .filter(|pos| *pos < len)
        .ok_or(EvaluatorError::IndexOutOfRange { index, len })
}
