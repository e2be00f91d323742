// Shadow variable table: the reconstructor's own copy of observed state

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use super::ReconstructError;
use crate::trace::Location;

const MAX_PLACEHOLDER_LEN: usize = 1 << 16;

/// How a write landed in the shadow table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// First appearance of the root identifier
    Initialized,
    Updated,
}

#[derive(Debug, Clone, Default)]
pub struct ShadowTable {
    values: IndexMap<String, JsonValue>,
}

impl ShadowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.values.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&JsonValue> {
        self.values.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply a write at `target`.
    ///
    /// An unknown root is an initialization. An indexed write to an unknown
    /// root creates a placeholder list padded with nulls around the written
    /// element, so later writes to the same root are updates.
    pub fn apply(
        &mut self,
        target: &Location,
        value: JsonValue,
    ) -> Result<Applied, ReconstructError> {
        let Some(root) = self.values.get_mut(&target.identifier) else {
            if let Some(placeholder) = placeholder(&target.index, value) {
                self.values.insert(target.identifier.clone(), placeholder);
            }
            return Ok(Applied::Initialized);
        };

        let mut slot = root;
        for &i in &target.index {
            let invalid = |reason: &str| ReconstructError::InvalidPath {
                identifier: target.identifier.clone(),
                index: target.index.clone(),
                reason: reason.to_string(),
            };
            let JsonValue::Array(items) = slot else {
                return Err(invalid("indexing a non-list value"));
            };
            let len = items.len();
            slot = usize::try_from(i)
                .ok()
                .and_then(|pos| items.get_mut(pos))
                .ok_or_else(|| invalid(&format!("index {i} out of range for length {len}")))?;
        }
        *slot = value;
        Ok(Applied::Updated)
    }

    pub fn values(&self) -> &IndexMap<String, JsonValue> {
        &self.values
    }

    pub fn into_values(self) -> IndexMap<String, JsonValue> {
        self.values
    }
}

/// Nested lists holding `value` at `index`, nulls elsewhere. `None` for
/// negative or oversized indices.
fn placeholder(index: &[i64], value: JsonValue) -> Option<JsonValue> {
    index.iter().rev().try_fold(value, |inner, &i| {
        let pos = usize::try_from(i).ok().filter(|&pos| pos < MAX_PLACEHOLDER_LEN)?;
        let mut items = vec![JsonValue::Null; pos + 1];
        items[pos] = inner;
        Some(JsonValue::Array(items))
    })
}
