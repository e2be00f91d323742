// Operation records as they are appended to the raw log

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

use super::errors::TraceError;
use crate::{ast::LineSpan, evaluator::Value};

// Deeper nesting is treated as a cycle
const MAX_SNAPSHOT_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Write,
    Read,
    Link,
    Init,
}

/// A resolved storage location: root identifier plus concrete index path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index: Vec<i64>,
}

impl Location {
    pub fn variable(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            index: Vec::new(),
        }
    }

    pub fn indexed(identifier: &str, index: Vec<i64>) -> Self {
        Self {
            identifier: identifier.to_string(),
            index,
        }
    }

    /// This location with `suffix` appended to its index path
    pub fn extend(&self, suffix: &[i64]) -> Self {
        let mut index = self.index.clone();
        index.extend_from_slice(suffix);
        Self {
            identifier: self.identifier.clone(),
            index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Location>,
    pub value: JsonValue,
    pub begin_line: usize,
    pub end_line: usize,
}

impl OperationRecord {
    pub fn new(
        kind: OperationKind,
        source: Option<Location>,
        target: Option<Location>,
        value: JsonValue,
        span: LineSpan,
    ) -> Self {
        Self {
            kind,
            source,
            target,
            value,
            begin_line: span.begin,
            end_line: span.end,
        }
    }

    pub fn span(&self) -> LineSpan {
        LineSpan::new(self.begin_line, self.end_line)
    }
}

/// Structural snapshot of a runtime value for the log
pub fn snapshot(value: &Value) -> Result<JsonValue, TraceError> {
    snapshot_at(value, 0)
}

fn snapshot_at(value: &Value, depth: usize) -> Result<JsonValue, TraceError> {
    if depth > MAX_SNAPSHOT_DEPTH {
        return Err(TraceError::Serialization(format!(
            "value nested deeper than {MAX_SNAPSHOT_DEPTH} levels"
        )));
    }
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
        Value::Integer(n) => Ok(JsonValue::from(*n)),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| TraceError::Serialization(format!("non-finite float {f}"))),
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        Value::List(items) => items
            .borrow()
            .iter()
            .map(|item| snapshot_at(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        Value::Function(_) | Value::Builtin(_) => Err(TraceError::Serialization(format!(
            "{} values have no structural snapshot",
            value.type_name()
        ))),
    }
}
