use serde::{Deserialize, Serialize};

use crate::DefKey;

/// A documentation blob attached to a def.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Doc {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(rename = "CommitID", skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub path: String,

    /// MIME type of `data` (e.g. `text/html`, `text/plain`).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data: String,

    /// Where the documentation appears in the source, when known.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    pub start: u32,
    pub end: u32,
}

impl Doc {
    pub fn def_key(&self) -> DefKey {
        DefKey {
            repo: self.repo.clone(),
            commit_id: self.commit_id.clone(),
            unit_type: self.unit_type.clone(),
            unit: self.unit.clone(),
            path: self.path.clone(),
        }
    }
}
