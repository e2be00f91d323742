//! Output assembly: variable descriptors, embedded sources and the
//! reconstructed body combined into one JSON artifact.

use std::{fs, path::Path, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::reconstruct::TraceEntry;

pub const FORMAT_VERSION: u32 = 1;

/// A variable the caller wants traced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    pub identifier: String,
    pub raw_type: String,
    /// Defaults to the normalized `raw_type` at assembly time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_type: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, JsonValue>,
}

impl VariableDescriptor {
    pub fn new(identifier: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            raw_type: raw_type.into(),
            abstract_type: None,
            attributes: IndexMap::new(),
        }
    }

    pub fn with_abstract_type(mut self, abstract_type: impl Into<String>) -> Self {
        self.abstract_type = Some(abstract_type.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid variable descriptor '{0}': expected name[:type[:abstract]]")]
pub struct DescriptorParseError(String);

/// `name`, `name:type` or `name:type:abstract`. A bare name has type `any`.
impl FromStr for VariableDescriptor {
    type Err = DescriptorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':').map(str::trim);
        let identifier = parts.next().filter(|name| !name.is_empty());
        let raw_type = parts.next().unwrap_or("any");
        let abstract_type = parts.next();
        match (identifier, parts.next()) {
            (Some(identifier), None) if !raw_type.is_empty() => {
                let descriptor = Self::new(identifier, raw_type);
                Ok(match abstract_type.filter(|t| !t.is_empty()) {
                    Some(abstract_type) => descriptor.with_abstract_type(abstract_type),
                    None => descriptor,
                })
            }
            _ => Err(DescriptorParseError(s.to_string())),
        }
    }
}

/// Open translation table from source-level type names to abstract ones
#[derive(Debug, Clone)]
pub struct TypeTable {
    mappings: IndexMap<String, String>,
}

impl Default for TypeTable {
    fn default() -> Self {
        let mut mappings = IndexMap::new();
        for (raw, normalized) in [
            ("list", "array"),
            ("tuple", "array"),
            ("dict", "map"),
            ("str", "string"),
        ] {
            mappings.insert(raw.to_string(), normalized.to_string());
        }
        Self { mappings }
    }
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, raw: impl Into<String>, normalized: impl Into<String>) -> Self {
        self.mappings.insert(raw.into(), normalized.into());
        self
    }

    /// Unknown names pass through unchanged
    pub fn normalize(&self, raw_type: &str) -> String {
        self.mappings
            .get(raw_type)
            .cloned()
            .unwrap_or_else(|| raw_type.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHeader {
    pub version: u32,
    pub annotated_variables: IndexMap<String, VariableDescriptor>,
    pub sources: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceArtifact {
    pub header: ArtifactHeader,
    pub body: Vec<TraceEntry>,
}

impl TraceArtifact {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let json = self.to_json_pretty()?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub struct Assembler {
    types: TypeTable,
    version: u32,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(TypeTable::default(), FORMAT_VERSION)
    }
}

impl Assembler {
    pub fn new(types: TypeTable, version: u32) -> Self {
        Self { types, version }
    }

    /// Build the artifact. `sources` are `(file name, full text)` pairs and
    /// are embedded line by line.
    pub fn assemble<'a, I>(
        &self,
        descriptors: &[VariableDescriptor],
        sources: I,
        entries: Vec<TraceEntry>,
    ) -> TraceArtifact
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let annotated_variables = descriptors
            .iter()
            .map(|descriptor| {
                let mut descriptor = descriptor.clone();
                if descriptor.abstract_type.is_none() {
                    descriptor.abstract_type = Some(self.types.normalize(&descriptor.raw_type));
                }
                (descriptor.identifier.clone(), descriptor)
            })
            .collect();
        let sources = sources
            .into_iter()
            .map(|(name, text)| (name.to_string(), text.lines().map(String::from).collect()))
            .collect();

        TraceArtifact {
            header: ArtifactHeader {
                version: self.version,
                annotated_variables,
                sources,
            },
            body: entries,
        }
    }
}

/// Assemble with the default type table
pub fn assemble<'a, I>(
    descriptors: &[VariableDescriptor],
    sources: I,
    entries: Vec<TraceEntry>,
    version: u32,
) -> TraceArtifact
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    Assembler::new(TypeTable::default(), version).assemble(descriptors, sources, entries)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::trace::Location;

    #[test]
    fn test_descriptor_from_str() {
        let descriptor: VariableDescriptor = "a:list".parse().unwrap();
        assert_eq!(descriptor, VariableDescriptor::new("a", "list"));

        let descriptor: VariableDescriptor = "m:list:matrix".parse().unwrap();
        assert_eq!(descriptor.abstract_type.as_deref(), Some("matrix"));

        let descriptor: VariableDescriptor = "n".parse().unwrap();
        assert_eq!(descriptor.raw_type, "any");

        assert!("".parse::<VariableDescriptor>().is_err());
        assert!("a:b:c:d".parse::<VariableDescriptor>().is_err());
        assert!("a:".parse::<VariableDescriptor>().is_err());

        let err = "a:b:c:d".parse::<VariableDescriptor>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid variable descriptor 'a:b:c:d': expected name[:type[:abstract]]"
        );
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn test_type_table_normalizes_and_extends() {
        let table = TypeTable::new().with_mapping("set", "collection");
        assert_eq!(table.normalize("list"), "array");
        assert_eq!(table.normalize("set"), "collection");
        assert_eq!(table.normalize("int"), "int");
    }

    #[test]
    fn test_artifact_layout() {
        let descriptors = vec![
            VariableDescriptor::new("b", "list").with_attribute("length", json!(3)),
            VariableDescriptor::new("a", "int").with_abstract_type("counter"),
        ];
        let entries = vec![TraceEntry::init(
            None,
            Location::variable("b"),
            json!([1, 2, 3]),
            1,
            1,
        )];

        let artifact = assemble(&descriptors, [("main.vt", "b = [1, 2, 3];\n")], entries, 1);

        assert_eq!(
            serde_json::to_value(&artifact).unwrap(),
            json!({
                "header": {
                    "version": 1,
                    "annotatedVariables": {
                        "b": {
                            "identifier": "b",
                            "rawType": "list",
                            "abstractType": "array",
                            "attributes": {"length": 3}
                        },
                        "a": {
                            "identifier": "a",
                            "rawType": "int",
                            "abstractType": "counter",
                            "attributes": {}
                        }
                    },
                    "sources": {"main.vt": ["b = [1, 2, 3];"]}
                },
                "body": [{
                    "operation": "init",
                    "operationBody": {
                        "target": {"identifier": "b"},
                        "value": [1, 2, 3],
                        "size": 3,
                        "shape": [3]
                    },
                    "beginLine": 1,
                    "endLine": 1
                }]
            })
        );
        let keys: Vec<_> = artifact.header.annotated_variables.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_artifact_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let artifact = assemble(
            &[VariableDescriptor::new("a", "int")],
            std::iter::empty(),
            Vec::new(),
            1,
        );

        artifact.write_to(&path).unwrap();

        assert_eq!(TraceArtifact::read_from(&path).unwrap(), artifact);
    }
}
