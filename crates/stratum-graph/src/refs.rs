use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The referent of a ref: which def it points at.
///
/// Blank `def_repo`/`def_unit_type`/`def_unit` mean "the referrer's own
/// scope"; the store resolves them when it knows which unit is being read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RefDefKey {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub def_repo: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub def_unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub def_unit: String,
    pub def_path: String,
}

/// A reference from a source byte range to a def.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ref {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub def_repo: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub def_unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub def_unit: String,
    pub def_path: String,

    /// True when this ref is the definition site itself.
    pub def: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(rename = "CommitID", skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    pub start: u32,
    pub end: u32,
}

/// Canonical total key for refs: referent first, then referrer scope and
/// span. Sorting `ref.dat` by this key clusters refs to the same def into
/// one contiguous run, which is what the referent index relies on.
///
/// Field order is the ordering; the derived `Ord` is the canonical one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefKey {
    pub def_path: String,
    pub def_repo: String,
    pub def_unit_type: String,
    pub def_unit: String,
    pub repo: String,
    pub unit_type: String,
    pub unit: String,
    pub file: String,
    pub start: u32,
    pub end: u32,
}

impl Ref {
    pub fn key(&self) -> RefKey {
        RefKey {
            def_path: self.def_path.clone(),
            def_repo: self.def_repo.clone(),
            def_unit_type: self.def_unit_type.clone(),
            def_unit: self.def_unit.clone(),
            repo: self.repo.clone(),
            unit_type: self.unit_type.clone(),
            unit: self.unit.clone(),
            file: self.file.clone(),
            start: self.start,
            end: self.end,
        }
    }

    pub fn ref_def_key(&self) -> RefDefKey {
        RefDefKey {
            def_repo: self.def_repo.clone(),
            def_unit_type: self.def_unit_type.clone(),
            def_unit: self.def_unit.clone(),
            def_path: self.def_path.clone(),
        }
    }
}

/// Tracks ref keys seen during an import and flags duplicates.
#[derive(Debug, Default)]
pub struct RefSet {
    seen: HashSet<RefKey>,
}

impl RefSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `r`'s key to the set; returns true when it was already present.
    pub fn add_and_check_unique(&mut self, r: &Ref) -> bool {
        !self.seen.insert(r.key())
    }
}
