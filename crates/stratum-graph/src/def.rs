use serde::{Deserialize, Serialize};

/// Identity of a def: its scope prefix plus an analyzer-chosen path.
///
/// `path` is opaque to the store; analyzers guarantee it is unique within
/// one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DefKey {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(rename = "CommitID", skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub path: String,
}

/// A source-code symbol definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Def {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(rename = "CommitID", skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub path: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    pub def_start: u32,
    pub def_end: u32,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exported: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,

    /// Free-form analyzer metadata, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Def {
    pub fn key(&self) -> DefKey {
        DefKey {
            repo: self.repo.clone(),
            commit_id: self.commit_id.clone(),
            unit_type: self.unit_type.clone(),
            unit: self.unit.clone(),
            path: self.path.clone(),
        }
    }
}
