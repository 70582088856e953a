use serde::{Deserialize, Serialize};

/// A file-range annotation (highlighting, semantic colorization).
///
/// Anns are keyed by `(file, start, end)` within their unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ann {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(rename = "CommitID", skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,

    pub file: String,
    pub start: u32,
    pub end: u32,

    #[serde(rename = "Type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
