use serde::{Deserialize, Serialize};

/// Identity of a source unit within one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UnitKey {
    #[serde(rename = "Type", skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl UnitKey {
    pub fn new(unit_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit_type: unit_type.into(),
            name: name.into(),
        }
    }
}

/// A source-unit manifest, stored as `<unit-type>/<unit-name>.unit`.
///
/// A unit is a compilable/analyzable subset of a repository: one package,
/// module or build target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SourceUnit {
    pub name: String,
    #[serde(rename = "Type")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SourceUnit {
    pub fn new(unit_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit_type: unit_type.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey {
            unit_type: self.unit_type.clone(),
            name: self.name.clone(),
        }
    }
}
