/*!
# Trace Reconstructor

Replays the raw operation log in order against a [`ShadowTable`] and an
[`AliasMap`], classifying each write as an initialization or a mutation and
keeping only operations on observed variables.

Every source and target is rewritten through the alias map before it is
replayed, so a write to a formal parameter lands on the caller's argument.
Link records feed the alias map. A link into a parameter that is itself
observed binds it to the argument's value and is reported as a write.
*/

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::trace::{Location, OperationKind, OperationRecord};

pub mod alias;
pub mod shadow;

pub use alias::AliasMap;
pub use shadow::{Applied, ShadowTable};


#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructError {
    #[error("cannot apply write to {identifier}{index:?}: {reason}")]
    InvalidPath {
        identifier: String,
        index: Vec<i64>,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Init,
    Write,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Location>,
    pub value: JsonValue,
    /// Top-level length, 1 for scalars. Init entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Dimension sizes of a rectangular nested list. Init entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
}

/// One operation of the final trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub operation: EntryKind,
    pub operation_body: OperationBody,
    pub begin_line: usize,
    pub end_line: usize,
}

impl TraceEntry {
    pub fn init(
        source: Option<Location>,
        target: Location,
        value: JsonValue,
        begin_line: usize,
        end_line: usize,
    ) -> Self {
        let (size, shape) = (size_of(&value), shape_of(&value));
        Self {
            operation: EntryKind::Init,
            operation_body: OperationBody {
                source,
                target: Some(target),
                value,
                size: Some(size),
                shape: Some(shape),
            },
            begin_line,
            end_line,
        }
    }

    pub fn write(
        source: Option<Location>,
        target: Location,
        value: JsonValue,
        begin_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            operation: EntryKind::Write,
            operation_body: OperationBody {
                source,
                target: Some(target),
                value,
                size: None,
                shape: None,
            },
            begin_line,
            end_line,
        }
    }

    pub fn read(source: Location, value: JsonValue, begin_line: usize, end_line: usize) -> Self {
        Self {
            operation: EntryKind::Read,
            operation_body: OperationBody {
                source: Some(source),
                target: None,
                value,
                size: None,
                shape: None,
            },
            begin_line,
            end_line,
        }
    }
}

fn size_of(value: &JsonValue) -> usize {
    match value {
        JsonValue::Array(items) => items.len(),
        _ => 1,
    }
}

/// Dimensions of a rectangular nested list; ragged levels stop the descent
fn shape_of(value: &JsonValue) -> Vec<usize> {
    let JsonValue::Array(items) = value else {
        return Vec::new();
    };
    let mut shape = vec![items.len()];
    let inner: Vec<Vec<usize>> = items
        .iter()
        .filter(|item| item.is_array())
        .map(shape_of)
        .collect();
    if !items.is_empty() && inner.len() == items.len() && inner.windows(2).all(|w| w[0] == w[1]) {
        shape.extend(inner[0].iter().copied());
    }
    shape
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconstructStats {
    pub replayed: usize,
    pub retained: usize,
    pub links: usize,
    pub dropped_unobserved: usize,
    pub invalid_paths: usize,
    pub malformed: usize,
}

/// Result of replaying one log
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub entries: Vec<TraceEntry>,
    pub stats: ReconstructStats,
    /// Shadow table after the last record
    pub final_state: IndexMap<String, JsonValue>,
}

pub struct Reconstructor {
    observed: BTreeSet<String>,
    shadow: ShadowTable,
    aliases: AliasMap,
    stats: ReconstructStats,
}

impl Reconstructor {
    pub fn new<I, T>(observed: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            observed: observed.into_iter().map(Into::into).collect(),
            shadow: ShadowTable::new(),
            aliases: AliasMap::new(),
            stats: ReconstructStats::default(),
        }
    }

    fn is_observed(&self, location: Option<&Location>) -> bool {
        location.is_some_and(|l| self.observed.contains(&l.identifier))
    }

    /// Replay a single record, returning the entry it contributes, if any
    pub fn replay(&mut self, record: &OperationRecord) -> Option<TraceEntry> {
        self.stats.replayed += 1;
        let source = record.source.as_ref().map(|l| self.aliases.resolve(l));

        let entry = match record.kind {
            OperationKind::Link => {
                let entry = self.link(record, source);
                if entry.is_some() {
                    self.stats.retained += 1;
                }
                return entry;
            }
            OperationKind::Read => {
                let Some(source) = source else {
                    self.stats.malformed += 1;
                    return None;
                };
                self.is_observed(Some(&source)).then(|| {
                    TraceEntry::read(
                        source,
                        record.value.clone(),
                        record.begin_line,
                        record.end_line,
                    )
                })
            }
            OperationKind::Write | OperationKind::Init => {
                let Some(target) = record.target.as_ref().map(|l| self.aliases.resolve(l)) else {
                    self.stats.malformed += 1;
                    return None;
                };
                // A path the shadow copy cannot hold is still a write to its root
                let applied = match self.shadow.apply(&target, record.value.clone()) {
                    Ok(applied) => applied,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            line = record.begin_line,
                            "shadow table out of step"
                        );
                        self.stats.invalid_paths += 1;
                        Applied::Updated
                    }
                };
                let retained = self.is_observed(Some(&target)) || self.is_observed(source.as_ref());
                retained.then(|| match applied {
                    Applied::Initialized => TraceEntry::init(
                        source,
                        target,
                        record.value.clone(),
                        record.begin_line,
                        record.end_line,
                    ),
                    Applied::Updated => TraceEntry::write(
                        source,
                        target,
                        record.value.clone(),
                        record.begin_line,
                        record.end_line,
                    ),
                })
            }
        };

        match &entry {
            Some(_) => self.stats.retained += 1,
            None => self.stats.dropped_unobserved += 1,
        }
        entry
    }

    fn link(&mut self, record: &OperationRecord, actual: Option<Location>) -> Option<TraceEntry> {
        self.stats.links += 1;
        let Some(formal) = record.target.as_ref().map(|l| l.identifier.clone()) else {
            self.stats.malformed += 1;
            return None;
        };
        match actual {
            Some(actual) if self.is_observed(Some(&actual)) && !self.observed.contains(&formal) => {
                tracing::debug!(formal = %formal, actual = %actual.identifier, "alias");
                self.aliases.bind(&formal, &actual);
                None
            }
            // A new call with an untracked argument ends the previous alias
            actual => {
                self.aliases.unbind(&formal);
                self.observed
                    .contains(&formal)
                    .then(|| self.bind_parameter(&formal, actual, record))
            }
        }
    }

    /// An observed parameter takes the argument's value when the call begins
    fn bind_parameter(
        &mut self,
        formal: &str,
        actual: Option<Location>,
        record: &OperationRecord,
    ) -> TraceEntry {
        let target = Location::variable(formal);
        let applied = self
            .shadow
            .apply(&target, record.value.clone())
            .unwrap_or(Applied::Updated);
        let (begin_line, end_line) = (record.begin_line, record.end_line);
        match applied {
            Applied::Initialized => {
                TraceEntry::init(actual, target, record.value.clone(), begin_line, end_line)
            }
            Applied::Updated => {
                TraceEntry::write(actual, target, record.value.clone(), begin_line, end_line)
            }
        }
    }

    pub fn reconstruct(mut self, records: &[OperationRecord]) -> Reconstruction {
        let entries = records
            .iter()
            .filter_map(|record| self.replay(record))
            .collect();
        tracing::debug!(
            replayed = self.stats.replayed,
            retained = self.stats.retained,
            "reconstruction finished"
        );
        Reconstruction {
            entries,
            stats: self.stats,
            final_state: self.shadow.into_values(),
        }
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    pub fn shadow(&self) -> &ShadowTable {
        &self.shadow
    }
}

/// Replay `records` with `observed` as the observed set
pub fn reconstruct<I, T>(records: &[OperationRecord], observed: I) -> Reconstruction
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    Reconstructor::new(observed).reconstruct(records)
}
